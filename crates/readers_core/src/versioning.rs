//! crates/readers_core/src/versioning.rs
//!
//! Ordering of collections by `(major_version, minor_version)` and the
//! per-localization monotonicity rule applied when a collection is created.

use crate::domain::Collection;
use crate::validation::FieldErrors;
use std::cmp::Ordering;
use std::fmt;

/// A `(major, minor)` pair, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
}

impl Version {
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }

    pub fn of(collection: &Collection) -> Self {
        Self::new(collection.major_version, collection.minor_version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The catalog's default ordering: newest version first, then localization.
pub fn catalog_order(a: &Collection, b: &Collection) -> Ordering {
    Version::of(b)
        .cmp(&Version::of(a))
        .then_with(|| a.localization.cmp(&b.localization))
}

/// Sorts collections into the catalog's default ordering.
pub fn sort_collections(collections: &mut [Collection]) {
    collections.sort_by(catalog_order);
}

/// Returns the latest collection: greatest version, ties broken by
/// localization ascending.
pub fn latest<'a, I>(collections: I) -> Option<&'a Collection>
where
    I: IntoIterator<Item = &'a Collection>,
{
    collections
        .into_iter()
        .min_by(|a, b| catalog_order(a, b))
}

/// Checks that `candidate` may follow `latest` within one localization.
///
/// A higher major version accepts any minor version; the same major version
/// needs a strictly higher minor version; a lower major version is always
/// rejected. With no prior collection anything is accepted.
pub fn check_successor(latest: Option<Version>, candidate: Version) -> Result<(), FieldErrors> {
    let Some(latest) = latest else {
        return Ok(());
    };

    if candidate.major < latest.major {
        return Err(FieldErrors::single(
            "major_version",
            format!(
                "Must be greater than or equal to {} (latest: {}).",
                latest.major, latest
            ),
        ));
    }

    if candidate.major == latest.major && candidate.minor <= latest.minor {
        return Err(FieldErrors::single(
            "minor_version",
            format!("Must be greater than {} (latest: {}).", latest.minor, latest),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn collection(id: i64, major: i32, minor: i32, localization: &str) -> Collection {
        Collection {
            id,
            major_version: major,
            minor_version: minor,
            localization: localization.to_string(),
            is_released: false,
            creation_date: Utc::now(),
        }
    }

    #[test]
    fn versions_order_major_before_minor() {
        assert!(Version::new(2, 0) > Version::new(1, 9));
        assert!(Version::new(1, 10) > Version::new(1, 2));
        assert_eq!(Version::new(3, 1).to_string(), "3.1");
    }

    #[test]
    fn latest_picks_greatest_version() {
        let all = vec![
            collection(1, 1, 0, "en-US"),
            collection(2, 2, 1, "en-US"),
            collection(3, 2, 0, "en-US"),
            collection(4, 1, 1, "en-US"),
        ];
        assert_eq!(latest(&all).map(|c| c.id), Some(2));
        assert!(latest(&Vec::<Collection>::new()).is_none());
    }

    #[test]
    fn sort_puts_newest_first_then_localization() {
        let mut all = vec![
            collection(1, 1, 0, "fr-FR"),
            collection(2, 1, 0, "en-US"),
            collection(3, 2, 0, "en-US"),
        ];
        sort_collections(&mut all);
        let ids: Vec<i64> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn successor_accepts_anything_without_history() {
        assert!(check_successor(None, Version::new(0, 0)).is_ok());
    }

    #[test]
    fn successor_rules() {
        let latest = Some(Version::new(1, 1));

        assert!(check_successor(latest, Version::new(1, 2)).is_ok());
        assert!(check_successor(latest, Version::new(2, 0)).is_ok());

        let err = check_successor(latest, Version::new(1, 0)).unwrap_err();
        assert_eq!(
            err.messages_at(&["minor_version"]).unwrap(),
            ["Must be greater than 1 (latest: 1.1)."]
        );

        let err = check_successor(latest, Version::new(1, 1)).unwrap_err();
        assert!(err.messages_at(&["minor_version"]).is_some());

        let err = check_successor(latest, Version::new(0, 9)).unwrap_err();
        assert_eq!(
            err.messages_at(&["major_version"]).unwrap(),
            ["Must be greater than or equal to 1 (latest: 1.1)."]
        );
    }
}

//! crates/readers_core/src/catalog.rs
//!
//! The catalog service: every collection, workbook, and feedback operation
//! the API exposes, with the invariants that span more than one port.
//!
//! - a new collection must not go backwards in version within its
//!   localization,
//! - deleting a workbook or a collection removes the stored PDFs,
//! - feedback must point at an existing workbook and an existing version,
//! - a failed notification never fails a feedback submission.

use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chapters::validate_chapters;
use crate::domain::{
    Collection, CollectionDetail, CollectionFilter, Feedback, FeedbackNotice, NewCollection,
    NewFeedback, NewWorkbook, Visibility, Workbook,
};
use crate::ports::{
    invalid_pk, CollectionRepository, FeedbackNotifier, FeedbackRepository, FileStorage,
    PortError, PortResult, WorkbookRepository, COLLECTION_NOT_UNIQUE,
};
use crate::validation::FieldErrors;
use crate::versioning::{check_successor, Version};

/// Message returned when a latest lookup matches nothing.
pub const NO_COLLECTIONS: &str = "No collections found.";

/// A workbook as uploaded, before its PDF is stored.
#[derive(Debug, Clone)]
pub struct WorkbookUpload {
    pub number: i32,
    pub collection: i64,
    pub chapters: Value,
    pub pdf_name: String,
    pub pdf: Bytes,
}

/// The outcome of a feedback submission.
#[derive(Debug, Clone)]
pub struct FeedbackReceipt {
    pub feedback: Feedback,
    pub email_sent: bool,
}

#[derive(Clone)]
pub struct Catalog {
    collections: Arc<dyn CollectionRepository>,
    workbooks: Arc<dyn WorkbookRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    storage: Arc<dyn FileStorage>,
    notifier: Option<Arc<dyn FeedbackNotifier>>,
}

impl Catalog {
    pub fn new(
        collections: Arc<dyn CollectionRepository>,
        workbooks: Arc<dyn WorkbookRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        storage: Arc<dyn FileStorage>,
        notifier: Option<Arc<dyn FeedbackNotifier>>,
    ) -> Self {
        Self {
            collections,
            workbooks,
            feedback,
            storage,
            notifier,
        }
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    // --- Collections ---

    /// Creates a collection after checking it does not go backwards in
    /// version within its localization.
    ///
    /// An exact duplicate is reported as a uniqueness error before the
    /// version check. The latest collection is looked up among all
    /// collections of the localization, released or not.
    pub async fn create_collection(&self, new: NewCollection) -> PortResult<Collection> {
        let duplicate = self
            .collections
            .collection_exists(new.major_version, new.minor_version, &new.localization)
            .await?;
        if duplicate {
            return Err(FieldErrors::non_field(COLLECTION_NOT_UNIQUE).into());
        }

        let existing = self
            .collections
            .list_collections(&CollectionFilter::localization(&new.localization), Visibility::All)
            .await?;
        let latest = existing.first().map(Version::of);

        check_successor(latest, Version::new(new.major_version, new.minor_version))?;

        let created = self.collections.insert_collection(&new).await?;
        info!(
            collection_id = created.id,
            "Created collection {} v{}.{}",
            created.localization,
            created.major_version,
            created.minor_version
        );
        Ok(created)
    }

    pub async fn list_collections(
        &self,
        filter: &CollectionFilter,
        visibility: Visibility,
    ) -> PortResult<Vec<Collection>> {
        self.collections.list_collections(filter, visibility).await
    }

    /// The greatest version among the collections matching `filter`.
    pub async fn latest_collection(
        &self,
        filter: &CollectionFilter,
        visibility: Visibility,
    ) -> PortResult<Collection> {
        self.collections
            .list_collections(filter, visibility)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortError::NotFound(NO_COLLECTIONS.to_string()))
    }

    pub async fn get_collection(
        &self,
        id: i64,
        visibility: Visibility,
    ) -> PortResult<CollectionDetail> {
        let collection = self.collections.get_collection(id, visibility).await?;
        let workbooks = self.workbooks.list_workbooks(collection.id).await?;
        Ok(CollectionDetail {
            collection,
            workbooks,
        })
    }

    pub async fn set_released(&self, id: i64, released: bool) -> PortResult<Collection> {
        let collection = self.collections.set_released(id, released).await?;
        info!(collection_id = id, released, "Changed collection release state");
        Ok(collection)
    }

    /// Deletes a collection, its workbooks, and every stored PDF of those
    /// workbooks.
    pub async fn delete_collection(&self, id: i64) -> PortResult<()> {
        let pdfs = self.collections.delete_collection(id).await?;

        for pdf in &pdfs {
            if let Err(e) = self.storage.delete(pdf).await {
                warn!(
                    collection_id = id,
                    "Failed to delete PDF {} of deleted collection: {}", pdf, e
                );
            }
        }
        info!(collection_id = id, workbooks = pdfs.len(), "Deleted collection");
        Ok(())
    }

    // --- Workbooks ---

    /// Validates and stores a workbook with its PDF.
    ///
    /// The PDF is written first; if the row cannot be inserted the file is
    /// removed again.
    pub async fn create_workbook(&self, upload: WorkbookUpload) -> PortResult<Workbook> {
        let mut errors = FieldErrors::new();

        let chapters = match validate_chapters(upload.chapters) {
            Ok(chapters) => Some(chapters),
            Err(chapter_errors) => {
                errors.nest("chapters", chapter_errors);
                None
            }
        };

        match self
            .collections
            .get_collection(upload.collection, Visibility::All)
            .await
        {
            Ok(_) => {}
            Err(PortError::NotFound(_)) => errors.add("collection", invalid_pk(upload.collection)),
            Err(e) => return Err(e),
        }

        errors.into_result()?;
        let chapters = chapters.unwrap_or(Value::Null);

        let path = self.storage.save(&upload.pdf_name, upload.pdf).await?;
        let new = NewWorkbook {
            number: upload.number,
            collection: upload.collection,
            chapters,
            pdf: path,
        };

        match self.workbooks.insert_workbook(&new).await {
            Ok(workbook) => {
                info!(
                    workbook_id = workbook.id,
                    collection_id = workbook.collection,
                    "Created workbook {}",
                    workbook.number
                );
                Ok(workbook)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&new.pdf).await {
                    warn!("Failed to remove PDF {} after rejected insert: {}", new.pdf, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn get_workbook(&self, id: i64, visibility: Visibility) -> PortResult<Workbook> {
        self.workbooks.get_workbook(id, visibility).await
    }

    /// Deletes a workbook and then its stored PDF.
    pub async fn delete_workbook(&self, id: i64) -> PortResult<()> {
        let workbook = self.workbooks.get_workbook(id, Visibility::All).await?;
        self.workbooks.delete_workbook(workbook.id).await?;
        self.storage.delete(&workbook.pdf).await?;
        info!(workbook_id = id, "Deleted workbook and PDF {}", workbook.pdf);
        Ok(())
    }

    // --- Feedback ---

    /// Stores feedback and makes one best-effort attempt to notify about it.
    pub async fn submit_feedback(&self, new: NewFeedback) -> PortResult<FeedbackReceipt> {
        let workbook = match self.workbooks.get_workbook(new.workbook, Visibility::All).await {
            Ok(workbook) => workbook,
            Err(PortError::NotFound(_)) => {
                return Err(FieldErrors::single("workbook", invalid_pk(new.workbook)).into())
            }
            Err(e) => return Err(e),
        };

        let version_exists = self
            .collections
            .collection_exists(new.major_version, new.minor_version, &new.localization)
            .await?;
        if !version_exists {
            return Err(FieldErrors::non_field(format!(
                "No collection exists for version {}.{} ({}).",
                new.major_version, new.minor_version, new.localization
            ))
            .into());
        }

        let feedback = self.feedback.insert_feedback(&new).await?;
        info!(
            feedback_id = feedback.id,
            workbook_id = workbook.id,
            "Stored feedback"
        );

        let notice = FeedbackNotice {
            feedback: feedback.clone(),
            workbook_number: workbook.number,
        };
        let email_sent = match &self.notifier {
            Some(notifier) => match notifier.notify(&notice).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(feedback_id = feedback.id, "Failed to send feedback email: {}", e);
                    false
                }
            },
            None => false,
        };

        Ok(FeedbackReceipt {
            feedback,
            email_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryFiles, InMemoryStore};
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingNotifier;

    #[async_trait]
    impl FeedbackNotifier for FailingNotifier {
        async fn notify(&self, _notice: &FeedbackNotice) -> PortResult<()> {
            Err(PortError::Unexpected("relay unreachable".to_string()))
        }
    }

    struct AcceptingNotifier;

    #[async_trait]
    impl FeedbackNotifier for AcceptingNotifier {
        async fn notify(&self, _notice: &FeedbackNotice) -> PortResult<()> {
            Ok(())
        }
    }

    fn catalog_with(notifier: Option<Arc<dyn FeedbackNotifier>>) -> (Catalog, Arc<InMemoryFiles>) {
        let store = Arc::new(InMemoryStore::new());
        let files = Arc::new(InMemoryFiles::new());
        let catalog = Catalog::new(store.clone(), store.clone(), store, files.clone(), notifier);
        (catalog, files)
    }

    fn new_collection(major: i32, minor: i32, localization: &str) -> NewCollection {
        NewCollection {
            major_version: major,
            minor_version: minor,
            localization: localization.to_string(),
        }
    }

    fn chapters() -> Value {
        json!([{
            "requires": [],
            "title": "Matter and Energy",
            "id": "matter_energy_intro",
            "chap_num": 2,
            "covers": [{"id": "atom", "desc": "Able to define atom and a molecule"}],
            "start_page": 5
        }])
    }

    fn upload(number: i32, collection: i64) -> WorkbookUpload {
        WorkbookUpload {
            number,
            collection,
            chapters: chapters(),
            pdf_name: "test.pdf".to_string(),
            pdf: Bytes::from_static(b"%PDF-1.4 fake pdf content"),
        }
    }

    fn feedback_for(workbook: i64) -> NewFeedback {
        NewFeedback {
            workbook,
            page_number: 4,
            chapter_number: 2,
            description: "Broken link on page 4".to_string(),
            user_email: "reader@example.org".to_string(),
            major_version: 1,
            minor_version: 0,
            localization: "en-US".to_string(),
            logs: None,
        }
    }

    #[tokio::test]
    async fn versions_must_increase_per_localization() {
        let (catalog, _) = catalog_with(None);
        catalog.create_collection(new_collection(1, 1, "en-US")).await.unwrap();

        let err = catalog
            .create_collection(new_collection(1, 0, "en-US"))
            .await
            .unwrap_err();
        match err {
            PortError::Validation(errors) => assert_eq!(
                errors.messages_at(&["minor_version"]).unwrap(),
                ["Must be greater than 1 (latest: 1.1)."]
            ),
            other => panic!("unexpected error: {other:?}"),
        }

        // Other localizations keep their own history.
        catalog.create_collection(new_collection(1, 0, "fr-FR")).await.unwrap();
        catalog.create_collection(new_collection(2, 0, "en-US")).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_triple_reports_uniqueness_before_version() {
        let (catalog, _) = catalog_with(None);
        catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        let err = catalog
            .create_collection(new_collection(1, 0, "en-US"))
            .await
            .unwrap_err();
        match err {
            PortError::Validation(errors) => {
                assert_eq!(
                    errors.messages_at(&["non_field_errors"]).unwrap(),
                    [COLLECTION_NOT_UNIQUE]
                );
                assert!(errors.messages_at(&["minor_version"]).is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_triple_is_rejected_by_the_store() {
        let store = InMemoryStore::new();
        store
            .insert_collection(&new_collection(1, 0, "en-US"))
            .await
            .unwrap();
        let err = store
            .insert_collection(&new_collection(1, 0, "en-US"))
            .await
            .unwrap_err();
        match err {
            PortError::Validation(errors) => assert_eq!(
                errors.messages_at(&["non_field_errors"]).unwrap(),
                [COLLECTION_NOT_UNIQUE]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn latest_respects_visibility() {
        let (catalog, _) = catalog_with(None);
        let v1 = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        catalog.create_collection(new_collection(1, 1, "en-US")).await.unwrap();
        catalog.set_released(v1.id, true).await.unwrap();

        let filter = CollectionFilter::localization("en-US");
        let public = catalog.latest_collection(&filter, Visibility::Public).await.unwrap();
        assert_eq!((public.major_version, public.minor_version), (1, 0));

        let all = catalog.latest_collection(&filter, Visibility::All).await.unwrap();
        assert_eq!((all.major_version, all.minor_version), (1, 1));
    }

    #[tokio::test]
    async fn latest_on_empty_store_is_not_found() {
        let (catalog, _) = catalog_with(None);
        let err = catalog
            .latest_collection(&CollectionFilter::default(), Visibility::All)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(message) if message == NO_COLLECTIONS));
    }

    #[tokio::test]
    async fn deleting_a_workbook_removes_its_pdf() {
        let (catalog, files) = catalog_with(None);
        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        let workbook = catalog.create_workbook(upload(1, collection.id)).await.unwrap();
        assert!(files.contains(&workbook.pdf));

        catalog.delete_workbook(workbook.id).await.unwrap();
        assert!(!files.contains(&workbook.pdf));
        assert!(matches!(
            catalog.get_workbook(workbook.id, Visibility::All).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_collection_removes_every_pdf() {
        let (catalog, files) = catalog_with(None);
        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        let first = catalog.create_workbook(upload(1, collection.id)).await.unwrap();
        let second = catalog.create_workbook(upload(2, collection.id)).await.unwrap();

        catalog.delete_collection(collection.id).await.unwrap();
        assert!(!files.contains(&first.pdf));
        assert!(!files.contains(&second.pdf));
        assert_eq!(files.len(), 0);
    }

    /// Adds a workbook to the collection right as it is being deleted.
    struct LateWorkbook {
        store: Arc<InMemoryStore>,
        files: Arc<InMemoryFiles>,
    }

    #[async_trait]
    impl CollectionRepository for LateWorkbook {
        async fn insert_collection(&self, new: &NewCollection) -> PortResult<Collection> {
            self.store.insert_collection(new).await
        }

        async fn get_collection(&self, id: i64, visibility: Visibility) -> PortResult<Collection> {
            self.store.get_collection(id, visibility).await
        }

        async fn list_collections(
            &self,
            filter: &CollectionFilter,
            visibility: Visibility,
        ) -> PortResult<Vec<Collection>> {
            self.store.list_collections(filter, visibility).await
        }

        async fn collection_exists(
            &self,
            major_version: i32,
            minor_version: i32,
            localization: &str,
        ) -> PortResult<bool> {
            self.store
                .collection_exists(major_version, minor_version, localization)
                .await
        }

        async fn set_released(&self, id: i64, released: bool) -> PortResult<Collection> {
            self.store.set_released(id, released).await
        }

        async fn delete_collection(&self, id: i64) -> PortResult<Vec<String>> {
            let pdf = self
                .files
                .save("late.pdf", Bytes::from_static(b"%PDF-1.4 late"))
                .await?;
            self.store
                .insert_workbook(&NewWorkbook {
                    number: 99,
                    collection: id,
                    chapters: chapters(),
                    pdf,
                })
                .await?;
            self.store.delete_collection(id).await
        }
    }

    #[tokio::test]
    async fn deleting_a_collection_removes_pdfs_of_late_workbooks() {
        let store = Arc::new(InMemoryStore::new());
        let files = Arc::new(InMemoryFiles::new());
        let collections = Arc::new(LateWorkbook {
            store: store.clone(),
            files: files.clone(),
        });
        let catalog = Catalog::new(collections, store.clone(), store, files.clone(), None);

        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        catalog.create_workbook(upload(1, collection.id)).await.unwrap();
        assert_eq!(files.len(), 1);

        catalog.delete_collection(collection.id).await.unwrap();
        assert_eq!(files.len(), 0);
    }

    #[tokio::test]
    async fn rejected_workbook_leaves_no_file_behind() {
        let (catalog, files) = catalog_with(None);
        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        catalog.create_workbook(upload(1, collection.id)).await.unwrap();

        let err = catalog.create_workbook(upload(1, collection.id)).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn workbook_errors_are_collected() {
        let (catalog, files) = catalog_with(None);
        let mut bad = upload(1, 42);
        bad.chapters = json!([]);

        let err = catalog.create_workbook(bad).await.unwrap_err();
        let PortError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.messages_at(&["collection"]).unwrap(),
            ["Invalid pk \"42\" - object does not exist."]
        );
        assert_eq!(
            errors.messages_at(&["chapters"]).unwrap(),
            ["This list may not be empty."]
        );
        assert_eq!(files.len(), 0);
    }

    #[tokio::test]
    async fn feedback_survives_notifier_failure() {
        let (catalog, _) = catalog_with(Some(Arc::new(FailingNotifier)));
        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        let workbook = catalog.create_workbook(upload(1, collection.id)).await.unwrap();

        let receipt = catalog.submit_feedback(feedback_for(workbook.id)).await.unwrap();
        assert!(!receipt.email_sent);
        assert_eq!(receipt.feedback.workbook, workbook.id);
    }

    #[tokio::test]
    async fn feedback_reports_sent_email() {
        let (catalog, _) = catalog_with(Some(Arc::new(AcceptingNotifier)));
        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        let workbook = catalog.create_workbook(upload(1, collection.id)).await.unwrap();

        let receipt = catalog.submit_feedback(feedback_for(workbook.id)).await.unwrap();
        assert!(receipt.email_sent);
    }

    #[tokio::test]
    async fn feedback_requires_existing_references() {
        let (catalog, _) = catalog_with(None);
        let collection = catalog.create_collection(new_collection(1, 0, "en-US")).await.unwrap();
        let workbook = catalog.create_workbook(upload(1, collection.id)).await.unwrap();

        let err = catalog.submit_feedback(feedback_for(999)).await.unwrap_err();
        let PortError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.messages_at(&["workbook"]).is_some());

        let mut wrong_version = feedback_for(workbook.id);
        wrong_version.minor_version = 7;
        let err = catalog.submit_feedback(wrong_version).await.unwrap_err();
        let PortError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.messages_at(&["non_field_errors"]).unwrap(),
            ["No collection exists for version 1.7 (en-US)."]
        );
    }
}

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::throttle::RateLimiter;
use readers_core::catalog::Catalog;
use readers_core::ports::CredentialStore;
use std::sync::Arc;
use std::time::Duration;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub credentials: Arc<dyn CredentialStore>,
    pub config: Arc<Config>,
    pub limiters: Arc<Limiters>,
}

/// The request allowances enforced by the throttling middleware.
pub struct Limiters {
    /// Applies to every request made without a token.
    pub anonymous: RateLimiter,
    /// Applies to feedback submissions, authenticated or not.
    pub feedback: RateLimiter,
}

impl Limiters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            anonymous: RateLimiter::new(config.anon_rate_limit_per_minute, Duration::from_secs(60)),
            feedback: RateLimiter::new(
                config.feedback_rate_limit_per_hour,
                Duration::from_secs(60 * 60),
            ),
        }
    }
}

impl AppState {
    pub fn new(
        catalog: Arc<Catalog>,
        credentials: Arc<dyn CredentialStore>,
        config: Arc<Config>,
    ) -> Self {
        let limiters = Arc::new(Limiters::from_config(&config));
        Self {
            catalog,
            credentials,
            config,
            limiters,
        }
    }
}

pub mod auth;
pub mod collections;
pub mod feedback;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod throttle;
pub mod workbooks;

// Re-export the router builder and state so binaries and tests can assemble
// the application without reaching into submodules.
pub use rest::{router, ApiDoc};
pub use state::AppState;

//! services/api/src/lib.rs
//!
//! The HTTP service for the readers backend: adapters for the core ports,
//! configuration, error mapping, and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

//! focal-core - Sync engine for Focal
//!
//! This crate contains the sync orchestrator, offline operation queue,
//! conflict resolver, and status tracker, plus the collaborator seams
//! (auth, photo store, blob cache, remote endpoint) they are wired to.

pub mod auth;
pub mod config;
pub mod conflict;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod store;
pub mod tracker;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncReport};
pub use error::{Error, Result};
pub use models::{Photo, PhotoId};

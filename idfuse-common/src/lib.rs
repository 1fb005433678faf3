//! # idfuse Common Library
//!
//! Shared code for the idfuse workspace:
//! - Request-scoped data model (descriptors, candidates, outcomes, results)
//! - Bootstrap configuration loading
//! - Event bus carrying records to the persistence collaborator
//! - SQLite schema initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};

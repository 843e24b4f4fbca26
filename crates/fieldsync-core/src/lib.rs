//! fieldsync-core - Core library for Fieldsync
//!
//! Offline-first capture of campaign registrations: the local store, the
//! registration model, and the engine that reconciles local records with a
//! remote Supabase table once connectivity allows.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod events;
pub mod export;
pub mod models;
pub mod remote;
pub mod stats;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Registration, RegistrationId};

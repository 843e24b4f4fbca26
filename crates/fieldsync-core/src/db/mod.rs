//! Local store for registrations

mod conflict_repository;
mod connection;
mod migrations;
mod repository;
mod store;

pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use connection::Database;
pub use repository::{RegistrationRepository, SqliteRegistrationRepository, StatusCounts};
pub use store::LocalStore;

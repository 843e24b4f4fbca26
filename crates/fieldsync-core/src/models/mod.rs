//! Data models for Fieldsync

mod registration;
mod sync_conflict;

pub use registration::{
    Attendance, Gender, NewRegistration, PersonKind, Registration, RegistrationFields,
    RegistrationId, SyncStatus, ATTENDANCE_DAYS,
};
pub use sync_conflict::{ConflictStrategy, SyncConflict};

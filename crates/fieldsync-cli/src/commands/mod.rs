pub mod add;
pub mod attend;
pub mod common;
pub mod completions;
pub mod db;
pub mod edit;
pub mod export;
pub mod list;
pub mod show;
pub mod stats;
pub mod status;
pub mod sync;
pub mod watch;

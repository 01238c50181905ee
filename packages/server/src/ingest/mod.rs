//! Bulk roster ingestion: parse, process rows in the background, publish progress.

pub mod directory;
pub mod parse;
pub mod processor;
pub mod publisher;
pub mod runner;
pub mod store;
pub mod sweep;


pub use directory::{DbDirectory, DbIdentityProvider, Directory, IdentityProvider};
pub use parse::{ParseError, RosterRow, parse_roster};
pub use processor::RowProcessor;
pub use publisher::ProgressPublisher;
pub use runner::UploadRunner;
pub use store::{DbSessionStore, SessionStore, StoreError, Viewer};

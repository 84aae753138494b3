pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod util;

pub use config::Config;
pub use error::{truncate_error_message, IngestError, Result};
pub use model::{ProvenanceEntry, Severity};
pub use util::{content_hash, join_identity, slugify};

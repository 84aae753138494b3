//! Durable blob storage for staged ingestion records (spec §3.1
//! staging buffer, §6.1 `ObjectStore`, §6.2 `KeyConvention`).
//!
//! Two backends: a local filesystem store for dev/test, and an optional
//! S3-compatible store behind the `s3` feature. Both validate object keys
//! before touching the backend so a malformed key (path traversal, an
//! absolute path, an overlong segment) never reaches disk or the wire.

mod key;
mod local;
#[cfg(feature = "s3")]
mod s3;

pub use key::validate_object_key;
pub use local::LocalFsObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use ingestlake_common::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys sharing `prefix`. Used by staging session GC sweeps.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

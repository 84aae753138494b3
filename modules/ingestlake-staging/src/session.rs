use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use ingestlake_common::{IngestError, Result};
use ingestlake_connector::Record;
use ingestlake_objectstore::ObjectStore;

use crate::types::{Batch, SessionKey, SessionManifest};

pub const DEFAULT_TTL_DAYS: u32 = 7;

/// Exclusively owned by one writer-reader pair; never shared across runs
/// (spec §5 "Shared resources and mutation discipline").
pub struct Session {
    store: Arc<dyn ObjectStore>,
    key: SessionKey,
    next_batch: AtomicU32,
    closed: AtomicBool,
}

impl Session {
    pub async fn allocate(store: Arc<dyn ObjectStore>, key: SessionKey, ttl_days: u32) -> Result<Self> {
        let manifest = SessionManifest {
            created_at: Utc::now(),
            ttl_days,
            batch_count: 0,
            finalized: false,
        };
        let bytes = serde_json::to_vec(&manifest).map_err(|e| IngestError::Other(e.into()))?;
        store.put(&key.manifest_key(), bytes).await?;
        Ok(Self { store, key, next_batch: AtomicU32::new(0), closed: AtomicBool::new(false) })
    }

    /// Reopen a session from a handle without rewriting its manifest, for
    /// the sink worker side of the exchange (spec §4.2 "exchanging
    /// `{bucket,key}` handles between the Source worker and Sink worker").
    /// Only `reader()` is meaningful on a reopened session; the manifest
    /// was already finalized by the writer side's `close()`.
    pub fn reopen(store: Arc<dyn ObjectStore>, key: SessionKey) -> Self {
        Self { store, key, next_batch: AtomicU32::new(0), closed: AtomicBool::new(true) }
    }

    pub fn writer(&self) -> RecordWriter<'_> {
        RecordWriter { session: self }
    }

    pub fn reader(&self) -> RecordReader<'_> {
        RecordReader { session: self }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Idempotent: writes a success marker and finalizes the manifest. A
    /// second call observes the marker already present and returns
    /// immediately.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let batch_count = self.next_batch.load(Ordering::SeqCst);
        let manifest = SessionManifest {
            created_at: Utc::now(),
            ttl_days: DEFAULT_TTL_DAYS,
            batch_count,
            finalized: true,
        };
        let bytes = serde_json::to_vec(&manifest).map_err(|e| IngestError::Other(e.into()))?;
        self.store.put(&self.key.manifest_key(), bytes).await?;
        self.store.put(&self.key.success_marker_key(), Vec::new()).await?;
        Ok(())
    }
}

pub struct RecordWriter<'a> {
    session: &'a Session,
}

impl<'a> RecordWriter<'a> {
    pub async fn write_batch(&self, records: &[Record]) -> Result<()> {
        let batch_index = self.session.next_batch.fetch_add(1, Ordering::SeqCst);
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|e| IngestError::Other(e.into()))?;
            buf.push(b'\n');
        }
        self.session.store.put(&self.session.key.batch_key(batch_index), buf).await
    }
}

pub struct RecordReader<'a> {
    session: &'a Session,
}

impl<'a> RecordReader<'a> {
    /// Reads all written batches back in write order. `chunk_size` caps how
    /// many records are grouped per yielded `Batch`, independent of how
    /// they were originally written.
    pub async fn iter_batches(&self, chunk_size: usize) -> Result<Vec<Batch>> {
        let manifest_bytes = self
            .session
            .store
            .get(&self.session.key.manifest_key())
            .await?
            .ok_or(IngestError::NotFound)?;
        let manifest: SessionManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| IngestError::Other(e.into()))?;

        let mut all_records = Vec::new();
        for batch_index in 0 .. manifest.batch_count {
            let key = self.session.key.batch_key(batch_index);
            let Some(bytes) = self.session.store.get(&key).await? else { continue };
            for line in bytes.split(|b| *b == b'\n') {
                if line.is_empty() {
                    continue;
                }
                let record: Record = serde_json::from_slice(line).map_err(|e| IngestError::Other(e.into()))?;
                all_records.push(record);
            }
        }

        if chunk_size == 0 {
            return Ok(vec![all_records]);
        }
        Ok(all_records.chunks(chunk_size).map(|c| c.to_vec()).collect())
    }
}

#[cfg(test)]
mod tests {
    use ingestlake_objectstore::LocalFsObjectStore;

    use super::*;

    fn sample_key() -> SessionKey {
        SessionKey { workspace: "ws1".into(), endpoint_id: "ep-1".into(), run_id: "run-1".into(), slice_index: 0 }
    }

    fn record(n: i64) -> Record {
        let mut r = Record::new();
        r.insert("n".into(), serde_json::json!(n));
        r
    }

    #[tokio::test]
    async fn write_then_read_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsObjectStore::new(dir.path()));
        let session = Session::allocate(store, sample_key(), DEFAULT_TTL_DAYS).await.unwrap();

        session.writer().write_batch(&[record(1), record(2)]).await.unwrap();
        session.writer().write_batch(&[record(3)]).await.unwrap();
        session.close().await.unwrap();

        let batches = session.reader().iter_batches(2).await.unwrap();
        let all: Vec<i64> = batches.iter().flatten().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsObjectStore::new(dir.path()));
        let session = Session::allocate(store, sample_key(), DEFAULT_TTL_DAYS).await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn reading_before_close_still_sees_written_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsObjectStore::new(dir.path()));
        let session = Session::allocate(store, sample_key(), DEFAULT_TTL_DAYS).await.unwrap();
        session.writer().write_batch(&[record(1)]).await.unwrap();

        // the manifest's batch_count is only bumped in close(); mid-flight
        // reads see zero batches until finalized, matching the exchange
        // contract in spec §4.2 (handles are passed, not live streams).
        let batches = session.reader().iter_batches(10).await.unwrap();
        assert_eq!(batches.iter().flatten().count(), 0);

        session.close().await.unwrap();
        let batches = session.reader().iter_batches(10).await.unwrap();
        assert_eq!(batches.iter().flatten().count(), 1);
    }
}

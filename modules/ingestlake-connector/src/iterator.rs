use async_trait::async_trait;
use ingestlake_common::Result;

use crate::types::Record;

/// Single-pass record iterator. `next` returns `None` at exhaustion or on
/// error — callers distinguish the two by checking `err()` after a `None`.
/// Implementations may be paginated (one HTTP request per advance) or
/// drawn from an already-buffered slice. Not required to be `Sync`: a
/// single iterator is driven by one slice's pull loop only (spec §4.1).
#[async_trait]
pub trait RecordIterator: Send {
    async fn next(&mut self) -> Result<Option<Record>>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Adapts an in-memory `Vec<Record>` into a `RecordIterator`. Used by
/// connector tests and by connectors whose source naturally buffers (e.g.
/// paged REST responses already drained into memory).
pub struct VecRecordIterator {
    records: std::vec::IntoIter<Record>,
}

impl VecRecordIterator {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records: records.into_iter() }
    }
}

#[async_trait]
impl RecordIterator for VecRecordIterator {
    async fn next(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_iterator_drains_in_order_then_returns_none() {
        let mut it = VecRecordIterator::new(vec![Record::new(), Record::new()]);
        assert!(it.next().await.unwrap().is_some());
        assert!(it.next().await.unwrap().is_some());
        assert!(it.next().await.unwrap().is_none());
        assert!(it.next().await.unwrap().is_none());
    }
}

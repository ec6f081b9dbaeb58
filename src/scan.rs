//! The chunked-scan collaborator.

use std::future::Future;
use std::sync::Arc;

use crate::request::Filter;
use crate::value::{KeyValueMap, Record};

/// Arguments of a single chunk fetch.
#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    /// Table to scan.
    pub table_name: &'a str,
    /// Predicate applied to every evaluated item.
    pub filter: &'a Filter,
    /// Upper bound on items the backend evaluates for this chunk.
    pub limit: usize,
    /// Resume strictly after this key. `None` starts at the beginning of the table.
    pub exclusive_start_key: Option<&'a KeyValueMap>,
}

/// One bounded batch of matching records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanChunk {
    /// Matching records in scan order. May be empty even when more data exists.
    pub items: Vec<Record>,
    /// Where the next chunk resumes. `None` means the table is exhausted.
    pub continuation_key: Option<KeyValueMap>,
}

/// A store that returns matching records in bounded chunks.
///
/// A single call is never assumed to satisfy a page: implementations are free to stop
/// early, as long as they hand back a continuation key whenever data may remain.
pub trait ChunkedScanner {
    /// Fetches the next chunk.
    fn scan(
        &self,
        request: ScanRequest<'_>,
    ) -> impl Future<Output = anyhow::Result<ScanChunk>> + Send;
}

impl<T: ChunkedScanner> ChunkedScanner for &T {
    fn scan(
        &self,
        request: ScanRequest<'_>,
    ) -> impl Future<Output = anyhow::Result<ScanChunk>> + Send {
        (**self).scan(request)
    }
}

impl<T: ChunkedScanner> ChunkedScanner for Arc<T> {
    fn scan(
        &self,
        request: ScanRequest<'_>,
    ) -> impl Future<Output = anyhow::Result<ScanChunk>> + Send {
        self.as_ref().scan(request)
    }
}

// SPDX-License-Identifier: Apache-2.0

//! This library turns a chunked scan over a key-value table into a Relay-style
//! connection: one logical page of exactly the requested size, with opaque cursors
//! that resume where the page ended. The backing store may return data in chunks of
//! any size; the [`PaginationEngine`] stitches them together and cuts the page at the
//! requested count.
//!
//! The table-metadata lookup ([`KeySchemaResolver`]) and the chunk fetch
//! ([`ChunkedScanner`]) are collaborators passed in by the caller. [`store::TableStore`]
//! is a RocksDB-backed implementation of both.
//!
//! Only forward paging (`first` / `after`) is supported; requests using `last` or
//! `before` are rejected.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod config;
pub mod cursor;
mod engine;
mod metrics;
pub mod page;
pub mod request;
pub mod scan;
pub mod schema;
pub mod store;
pub mod value;

#[cfg(feature = "test-utils")]
pub mod test;

use std::time::Duration;

use thiserror::Error;

pub use config::{
    gen_rocksdb_options, PagerConfig, RocksdbConfig, StoreConfig, DEFAULT_MAX_CHUNK_FETCHES,
    DEFAULT_PAGE_SIZE,
};
pub use cursor::{Cursor, CursorCodec, CursorError};
pub use engine::{PaginationEngine, Pager};
pub use page::{Edge, PageInfo, PageResult};
pub use request::{Filter, PageRequest, RequestValidator, ValidatedRequest};
pub use rocksdb;
pub use scan::{ChunkedScanner, ScanChunk, ScanRequest};
pub use schema::{KeyRole, KeySchema, KeySchemaElement, KeySchemaError, KeySchemaResolver};
pub use value::{AttributeValue, KeyValueMap, Record};

/// Stage at which a page request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported input. No collaborator was called.
    InvalidRequest,
    /// The `after` cursor could not be decoded.
    InvalidCursor,
    /// The table's key schema could not be resolved.
    SchemaResolution,
    /// The chunked scan failed.
    Scan,
    /// A scanned item could not be read as a record.
    RecordDecode,
    /// A record could not be projected onto its key schema.
    Encode,
    /// The request deadline passed.
    Timeout,
}

impl ErrorKind {
    /// Stable label, used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidCursor => "invalid_cursor",
            ErrorKind::SchemaResolution => "schema_resolution",
            ErrorKind::Scan => "scan",
            ErrorKind::RecordDecode => "record_decode",
            ErrorKind::Encode => "encode",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// Why a page request produced no page. A failed request never yields partial data.
#[derive(Error, Debug)]
pub enum PageError {
    /// Malformed or unsupported request.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    /// The `after` cursor is unusable.
    #[error("unable to decode 'after' cursor")]
    InvalidCursor(#[source] CursorError),
    /// Table metadata lookup failed.
    #[error("unable to resolve key schema of table `{table}`")]
    SchemaResolution {
        /// Table being paged.
        table: String,
        /// Collaborator error.
        #[source]
        source: anyhow::Error,
    },
    /// A chunk fetch failed.
    #[error("scan of table `{table}` failed at chunk {chunk}")]
    Scan {
        /// Table being paged.
        table: String,
        /// Zero-based index of the failing fetch.
        chunk: usize,
        /// Collaborator error.
        #[source]
        source: anyhow::Error,
    },
    /// The scanner kept returning continuation keys past the configured budget.
    #[error("scan of table `{table}` did not settle within {fetches} chunk fetches")]
    ChunkBudgetExhausted {
        /// Table being paged.
        table: String,
        /// Fetches performed.
        fetches: usize,
    },
    /// A scanned item could not be interpreted as a record.
    #[error("unable to decode record of table `{table}` at chunk {chunk}")]
    RecordDecode {
        /// Table being paged.
        table: String,
        /// Zero-based index of the failing fetch.
        chunk: usize,
        /// Collaborator error.
        #[source]
        source: anyhow::Error,
    },
    /// A record does not populate its own key.
    #[error("failed to encode key")]
    Encode(#[source] CursorError),
    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl PageError {
    /// The failing stage.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PageError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PageError::InvalidCursor(_) => ErrorKind::InvalidCursor,
            PageError::SchemaResolution { .. } => ErrorKind::SchemaResolution,
            PageError::Scan { .. } | PageError::ChunkBudgetExhausted { .. } => ErrorKind::Scan,
            PageError::RecordDecode { .. } => ErrorKind::RecordDecode,
            PageError::Encode(_) => ErrorKind::Encode,
            PageError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Whether the caller, rather than a backend, is at fault.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidRequest | ErrorKind::InvalidCursor
        )
    }
}

/// An error that occurred during (de)serialization of stored keys or records.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A record does not populate one of its table's key fields.
    #[error(transparent)]
    Key(#[from] KeySchemaError),
    /// A key component does not fit its length prefix.
    #[error("Key component too long: {0} bytes")]
    ComponentTooLong(usize),
    /// Malformed JSON payload.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Readability alias for a key in the DB.
pub type SchemaKey = Vec<u8>;
/// Readability alias for a value in the DB.
pub type SchemaValue = Vec<u8>;

pub(crate) fn with_error_logging<F, T, E: Into<anyhow::Error>>(
    f: F,
    name: &str,
) -> anyhow::Result<T>
where
    F: FnOnce() -> Result<T, E>,
{
    let result = f().map_err(|e| e.into());
    if let Err(e) = &result {
        tracing::error!("[Pagebound] error during {}: {:#}", name, e);
    }
    result
}

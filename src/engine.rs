//! The page-assembly loop and the entry point that drives it.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::PagerConfig;
use crate::cursor::CursorCodec;
use crate::metrics::{
    PAGER_CHUNK_FETCHES, PAGER_PAGE_EDGES, PAGER_PAGE_LATENCY_SECONDS, PAGER_REQUEST_ERRORS,
};
use crate::page::{Edge, PageInfo, PageResult};
use crate::request::{PageRequest, RequestValidator, ValidatedRequest};
use crate::scan::{ChunkedScanner, ScanChunk, ScanRequest};
use crate::schema::{KeySchema, KeySchemaResolver};
use crate::value::KeyValueMap;
use crate::{CodecError, PageError};

// Pre-sizing is a hint only; `first` is caller controlled.
const MAX_CAPACITY_HINT: usize = 1024;

/// Accumulates chunks from a [`ChunkedScanner`] into a single page.
#[derive(Debug, Clone, Copy)]
pub struct PaginationEngine {
    max_chunk_fetches: usize,
}

impl PaginationEngine {
    /// Engine applying `config`'s chunk budget.
    pub fn new(config: &PagerConfig) -> Self {
        Self {
            max_chunk_fetches: config.max_chunk_fetches,
        }
    }

    /// Assembles one page of at most `request.first` edges, starting strictly after
    /// `resume_key` (the decoded `after` cursor, if any).
    ///
    /// The scanner is called repeatedly with `limit = first` until either `first`
    /// edges have been collected or it reports no continuation key. When the page
    /// fills up in the middle of a chunk, the rest of that chunk is dropped. Any
    /// failure aborts the whole page.
    pub async fn run<S: ChunkedScanner>(
        &self,
        request: &ValidatedRequest,
        mut resume_key: Option<KeyValueMap>,
        schema: &KeySchema,
        scanner: &S,
    ) -> Result<PageResult, PageError> {
        let first = request.first;
        let mut edges: Vec<Edge> = Vec::with_capacity(first.min(MAX_CAPACITY_HINT));
        let mut page_info = PageInfo::default();
        let mut fetches = 0;

        while edges.len() < first {
            let ScanChunk {
                items,
                continuation_key,
            } = self
                .fetch(request, resume_key.as_ref(), &mut fetches, scanner)
                .await?;

            let mut items = items.into_iter();
            let mut filled = false;
            for record in items.by_ref() {
                let cursor = CursorCodec::encode(schema, &record).map_err(PageError::Encode)?;
                edges.push(Edge {
                    cursor,
                    node: record,
                });
                if edges.len() == first {
                    filled = true;
                    break;
                }
            }

            if filled {
                page_info.has_next_page = if !items.as_slice().is_empty() {
                    true
                } else if let Some(key) = continuation_key {
                    self.probe(request, key, &mut fetches, scanner).await?
                } else {
                    false
                };
                debug!(
                    read = edges.len(),
                    want = first,
                    has_next_page = page_info.has_next_page,
                    "page filled, returning"
                );
                break;
            }

            match continuation_key {
                None => {
                    debug!(read = edges.len(), want = first, "no more data to return");
                    break;
                }
                Some(key) => {
                    debug!(read = edges.len(), want = first, "reading next chunk");
                    resume_key = Some(key);
                }
            }
        }

        page_info.start_cursor = edges.first().map(|edge| edge.cursor.clone());
        page_info.end_cursor = edges.last().map(|edge| edge.cursor.clone());
        Ok(PageResult { edges, page_info })
    }

    /// Looks past a full page for one more matching record.
    ///
    /// Running out of chunk budget here keeps the page and reports more data, since the
    /// continuation key says the table is not exhausted.
    async fn probe<S: ChunkedScanner>(
        &self,
        request: &ValidatedRequest,
        mut resume_key: KeyValueMap,
        fetches: &mut usize,
        scanner: &S,
    ) -> Result<bool, PageError> {
        loop {
            if *fetches >= self.max_chunk_fetches {
                warn!(
                    table = request.table_name.as_str(),
                    fetches = *fetches,
                    "look-ahead out of chunk budget, assuming more data"
                );
                return Ok(true);
            }
            let chunk = self
                .fetch(request, Some(&resume_key), fetches, scanner)
                .await?;
            if !chunk.items.is_empty() {
                return Ok(true);
            }
            match chunk.continuation_key {
                Some(key) => resume_key = key,
                None => return Ok(false),
            }
        }
    }

    async fn fetch<S: ChunkedScanner>(
        &self,
        request: &ValidatedRequest,
        resume_key: Option<&KeyValueMap>,
        fetches: &mut usize,
        scanner: &S,
    ) -> Result<ScanChunk, PageError> {
        let table = request.table_name.as_str();
        if *fetches >= self.max_chunk_fetches {
            warn!(
                table,
                fetches = *fetches,
                "scanner still returns continuation keys, giving up"
            );
            return Err(PageError::ChunkBudgetExhausted {
                table: table.to_owned(),
                fetches: *fetches,
            });
        }
        let chunk = *fetches;
        *fetches += 1;
        PAGER_CHUNK_FETCHES.with_label_values(&[table]).inc();

        scanner
            .scan(ScanRequest {
                table_name: table,
                filter: &request.filter,
                limit: request.first,
                exclusive_start_key: resume_key,
            })
            .await
            .map_err(|source| {
                if source.chain().any(|cause| cause.is::<CodecError>()) {
                    PageError::RecordDecode {
                        table: table.to_owned(),
                        chunk,
                        source,
                    }
                } else {
                    PageError::Scan {
                        table: table.to_owned(),
                        chunk,
                        source,
                    }
                }
            })
    }
}

/// Serves [`PageRequest`]s: validation, cursor decoding, key schema resolution and the
/// [`PaginationEngine`] loop, in that order.
///
/// Both collaborators are held for the lifetime of the pager and shared by every
/// request. Dropping the future returned by [`Pager::paginate`] cancels the
/// collaborator call in flight.
#[derive(Debug, Clone)]
pub struct Pager<R, S> {
    resolver: R,
    scanner: S,
    validator: RequestValidator,
    engine: PaginationEngine,
    request_timeout: Option<Duration>,
}

impl<R, S> Pager<R, S>
where
    R: KeySchemaResolver,
    S: ChunkedScanner,
{
    /// Creates a pager over the given collaborators.
    pub fn new(resolver: R, scanner: S, config: &PagerConfig) -> Self {
        Self {
            resolver,
            scanner,
            validator: RequestValidator::new(config),
            engine: PaginationEngine::new(config),
            request_timeout: config.request_timeout,
        }
    }

    /// Serves one page.
    #[tracing::instrument(skip_all, level = "error", fields(table = %request.table_name))]
    pub async fn paginate(&self, request: PageRequest) -> Result<PageResult, PageError> {
        let result = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.paginate_inner(request))
                .await
                .unwrap_or(Err(PageError::Timeout(timeout))),
            None => self.paginate_inner(request).await,
        };
        if let Err(e) = &result {
            PAGER_REQUEST_ERRORS
                .with_label_values(&[e.kind().as_str()])
                .inc();
            let message = error_chain(e);
            if e.is_caller_error() {
                warn!(kind = e.kind().as_str(), "[Pagebound] rejected request: {message}");
            } else {
                tracing::error!(kind = e.kind().as_str(), "[Pagebound] error during paginate: {message}");
            }
        }
        result
    }

    async fn paginate_inner(&self, request: PageRequest) -> Result<PageResult, PageError> {
        let request = self.validator.validate(request)?;
        let resume_key = request
            .after
            .as_ref()
            .map(CursorCodec::decode)
            .transpose()
            .map_err(PageError::InvalidCursor)?;

        let table = request.table_name.as_str();
        let schema = self
            .resolver
            .resolve_key_schema(table)
            .await
            .map_err(|source| PageError::SchemaResolution {
                table: table.to_owned(),
                source,
            })?;
        if let Some(key) = &resume_key {
            CursorCodec::check_fields(&schema, key).map_err(PageError::InvalidCursor)?;
        }
        // Only tables that resolved get a latency series.
        let _timer = PAGER_PAGE_LATENCY_SECONDS
            .with_label_values(&[table])
            .start_timer();

        let page = self
            .engine
            .run(&request, resume_key, &schema, &self.scanner)
            .await?;
        PAGER_PAGE_EDGES
            .with_label_values(&[table])
            .observe(page.edges.len() as f64);
        Ok(page)
    }
}

fn error_chain(err: &PageError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

//! Helpers for testing: in-memory collaborators, record fixtures and a proptest strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use parking_lot::Mutex;
use proptest::prelude::*;

use crate::scan::{ChunkedScanner, ScanChunk, ScanRequest};
use crate::schema::{KeySchema, KeySchemaResolver};
use crate::value::{AttributeValue, KeyValueMap, Record};

/// Builds a record out of `(field, value)` pairs.
pub fn record<const N: usize>(fields: [(&str, AttributeValue); N]) -> Record {
    fields
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

/// Schema keyed by a single numeric `id` partition field.
pub fn id_schema() -> KeySchema {
    KeySchema::partition("id")
}

/// `count` records `{id: N(i), name: S("item-i"), even: BOOL}` for `i` in `1..=count`.
pub fn numbered_records(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|i| {
            record([
                ("id", AttributeValue::number(i)),
                ("name", format!("item-{i}").into()),
                ("even", (i % 2 == 0).into()),
            ])
        })
        .collect()
}

/// Arguments of one recorded [`VecScanner`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCall {
    /// Requested limit.
    pub limit: usize,
    /// Resume key passed in.
    pub exclusive_start_key: Option<KeyValueMap>,
}

type Predicate = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// In-memory [`ChunkedScanner`] over a fixed list of records.
///
/// Each call evaluates at most `min(limit, chunk_size)` records, so a page may need
/// several calls. The filter expression is ignored; use [`VecScanner::with_predicate`]
/// to drop records instead.
pub struct VecScanner {
    schema: KeySchema,
    records: Vec<Record>,
    chunk_size: usize,
    predicate: Option<Predicate>,
    calls: Mutex<Vec<ScanCall>>,
}

impl VecScanner {
    /// Scanner returning `records` in order, each chunk as large as the limit allows.
    pub fn new(schema: KeySchema, records: Vec<Record>) -> Self {
        Self {
            schema,
            records,
            chunk_size: usize::MAX,
            predicate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Caps the number of records evaluated per call.
    ///
    /// # Panics
    ///
    /// If `chunk_size` is zero.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        self.chunk_size = chunk_size;
        self
    }

    /// Only records satisfying `predicate` are returned.
    pub fn with_predicate(mut self, predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<ScanCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn scan_sync(&self, request: &ScanRequest<'_>) -> anyhow::Result<ScanChunk> {
        self.calls.lock().push(ScanCall {
            limit: request.limit,
            exclusive_start_key: request.exclusive_start_key.cloned(),
        });

        let start = match request.exclusive_start_key {
            None => 0,
            Some(key) => {
                let position = self
                    .records
                    .iter()
                    .position(|r| self.schema.restrict(r).is_ok_and(|k| &k == key))
                    .ok_or_else(|| anyhow!("unknown start key {key:?}"))?;
                position + 1
            }
        };
        let end = start
            .saturating_add(request.limit.min(self.chunk_size))
            .min(self.records.len());
        let evaluated = &self.records[start..end];

        let items = evaluated
            .iter()
            .filter(|r| self.predicate.as_ref().map_or(true, |p| p(r)))
            .cloned()
            .collect();
        let continuation_key = match evaluated.last() {
            Some(last) if end < self.records.len() => Some(self.schema.restrict(last)?),
            _ => None,
        };
        Ok(ScanChunk {
            items,
            continuation_key,
        })
    }
}

impl ChunkedScanner for VecScanner {
    async fn scan(&self, request: ScanRequest<'_>) -> anyhow::Result<ScanChunk> {
        self.scan_sync(&request)
    }
}

/// [`KeySchemaResolver`] answering every table with the same schema, or failing.
#[derive(Debug, Default)]
pub struct StaticResolver {
    schema: Option<KeySchema>,
    calls: AtomicUsize,
}

impl StaticResolver {
    /// Resolves every table to `schema`.
    pub fn new(schema: KeySchema) -> Self {
        Self {
            schema: Some(schema),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every lookup as an unknown table.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Number of lookups made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeySchemaResolver for StaticResolver {
    async fn resolve_key_schema(&self, table_name: &str) -> anyhow::Result<crate::KeySchema> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.schema
            .clone()
            .ok_or_else(|| anyhow!("table `{table_name}` not found"))
    }
}

/// Records that populate every field in `key_fields`, plus a few others.
pub fn arb_keyed_record(key_fields: &[&str]) -> impl Strategy<Value = Record> {
    let key_fields: Vec<String> = key_fields.iter().map(|f| (*f).to_owned()).collect();
    (
        prop::collection::vec(any::<AttributeValue>(), key_fields.len()),
        prop::collection::btree_map("[a-z]{1,8}", any::<AttributeValue>(), 0..4),
    )
        .prop_map(move |(keys, mut record)| {
            for (field, value) in key_fields.iter().zip(keys) {
                record.insert(field.clone(), value);
            }
            record
        })
}

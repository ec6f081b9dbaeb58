//! A RocksDB-backed table store that serves as both [`KeySchemaResolver`] and
//! [`ChunkedScanner`].
//!
//! Tables live in two column families: [`TABLES_CF`] maps a table name to its
//! [`KeySchema`], and [`ITEMS_CF`] holds every record under a key derived from its
//! table and key projection (see [`keys`]). A chunk scan evaluates at most `limit`
//! stored items, so a filter matching few items yields small, even empty, chunks.

mod filter;
mod iterator;
mod keys;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, format_err};
use quick_cache::sync::Cache;
use tracing::{debug, info};

use self::filter::FilterExpression;
use self::iterator::TableIter;
use crate::config::{gen_rocksdb_options, StoreConfig};
use crate::metrics::{STORE_SCAN_ITEMS, STORE_SCAN_LATENCY_SECONDS};
use crate::scan::{ChunkedScanner, ScanChunk, ScanRequest};
use crate::schema::{KeySchema, KeySchemaResolver};
use crate::value::{KeyValueMap, Record};
use crate::{with_error_logging, CodecError};

/// Column family holding table definitions.
pub const TABLES_CF: &str = "tables";
/// Column family holding records.
pub const ITEMS_CF: &str = "items";

/// Returns the default column family descriptor. Includes LZ4 compression.
fn default_cf_descriptor(cf_name: &str) -> rocksdb::ColumnFamilyDescriptor {
    let mut cf_opts = rocksdb::Options::default();
    cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    rocksdb::ColumnFamilyDescriptor::new(cf_name, cf_opts)
}

/// For now, we always use synchronous writes. This makes sure that once the operation returns
/// `Ok(())` the data is persisted even if the machine crashes.
fn default_write_options() -> rocksdb::WriteOptions {
    let mut opts = rocksdb::WriteOptions::default();
    opts.set_sync(true);
    opts
}

fn decode_record(raw: &[u8]) -> Result<Record, CodecError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Tables of typed records on top of RocksDB.
pub struct TableStore {
    name: &'static str, // for logging
    db: rocksdb::DB,
    schemas: Cache<String, KeySchema>,
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("name", &self.name)
            .field("path", &self.db.path())
            .finish()
    }
}

impl TableStore {
    /// Opens (creating if needed) a store at `path`.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn open(
        path: impl AsRef<Path>,
        name: &'static str,
        config: &StoreConfig,
    ) -> anyhow::Result<Self> {
        let db_opts = gen_rocksdb_options(&config.rocksdb);
        let cfds = [rocksdb::DEFAULT_COLUMN_FAMILY_NAME, TABLES_CF, ITEMS_CF]
            .into_iter()
            .map(default_cf_descriptor);
        let db = with_error_logging(
            || rocksdb::DB::open_cf_descriptors(&db_opts, path, cfds),
            "open",
        )?;
        info!(rocksdb_name = name, path = %db.path().display(), "Opened table store");
        Ok(Self {
            name,
            db,
            schemas: Cache::new(config.schema_cache_capacity.max(1)),
        })
    }

    /// Opens a store and wraps it for sharing between a [`Pager`](crate::Pager)'s two
    /// collaborator slots.
    pub fn open_shared(
        path: impl AsRef<Path>,
        name: &'static str,
        config: &StoreConfig,
    ) -> anyhow::Result<Arc<Self>> {
        Self::open(path, name, config).map(Arc::new)
    }

    /// Name of the store that can be used for logging or metrics or tracing.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn get_cf_handle(&self, cf_name: &str) -> anyhow::Result<&rocksdb::ColumnFamily> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                self.db.cf_handle(cf_name).ok_or_else(|| {
                    format_err!("DB::cf_handle not found for column family name: {cf_name}",)
                })
            },
            "get_cf_handle",
        )
    }

    fn load_key_schema(&self, table: &str) -> anyhow::Result<Option<KeySchema>> {
        let cf_handle = self.get_cf_handle(TABLES_CF)?;
        let raw = self.db.get_pinned_cf(cf_handle, table.as_bytes())?;
        raw.map(|raw| serde_json::from_slice(&raw).map_err(CodecError::from))
            .transpose()
            .map_err(Into::into)
    }

    /// Registers `table` with the given key schema.
    #[tracing::instrument(skip_all, level = "error", fields(table = %table))]
    pub fn create_table(&self, table: &str, schema: KeySchema) -> anyhow::Result<()> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                if table.is_empty() {
                    bail!("table name must not be empty");
                }
                if self.load_key_schema(table)?.is_some() {
                    bail!("table `{table}` already exists");
                }
                let cf_handle = self.get_cf_handle(TABLES_CF)?;
                let raw = serde_json::to_vec(&schema).map_err(CodecError::from)?;
                self.db
                    .put_cf_opt(cf_handle, table.as_bytes(), raw, &default_write_options())?;
                info!(rocksdb_name = self.name, table, "Created table");
                self.schemas.insert(table.to_owned(), schema);
                Ok(())
            },
            "create_table",
        )
    }

    /// Removes `table` and all of its records.
    #[tracing::instrument(skip_all, level = "error", fields(table = %table))]
    pub fn drop_table(&self, table: &str) -> anyhow::Result<()> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                if self.load_key_schema(table)?.is_none() {
                    bail!("table `{table}` not found");
                }
                let tables_cf = self.get_cf_handle(TABLES_CF)?;
                let items_cf = self.get_cf_handle(ITEMS_CF)?;

                let mut batch = rocksdb::WriteBatch::default();
                let mut removed = 0usize;
                for item in TableIter::new(&self.db, items_cf, keys::table_prefix(table)?, None) {
                    let (key, _) = item?;
                    batch.delete_cf(items_cf, key);
                    removed += 1;
                }
                batch.delete_cf(tables_cf, table.as_bytes());
                self.db.write_opt(batch, &default_write_options())?;
                self.schemas.remove(table);
                info!(rocksdb_name = self.name, table, removed, "Dropped table");
                Ok(())
            },
            "drop_table",
        )
    }

    /// Key schema of `table`. Served from the cache after the first lookup; a table's
    /// schema never changes while it exists.
    pub fn key_schema(&self, table: &str) -> anyhow::Result<KeySchema> {
        if let Some(schema) = self.schemas.get(table) {
            return Ok(schema);
        }
        let schema = with_error_logging(|| self.load_key_schema(table), "key_schema")?
            .ok_or_else(|| format_err!("table `{table}` not found"))?;
        self.schemas.insert(table.to_owned(), schema.clone());
        Ok(schema)
    }

    /// Inserts or replaces `record`. The record must populate its table's key fields.
    #[tracing::instrument(skip_all, level = "error", fields(table = %table))]
    pub fn put_item(&self, table: &str, record: &Record) -> anyhow::Result<()> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                let schema = self.key_schema(table)?;
                let key = schema.restrict(record).map_err(CodecError::from)?;
                let raw_key = keys::encode_item_key(table, &schema, &key)?;
                let raw_value = serde_json::to_vec(record).map_err(CodecError::from)?;
                let cf_handle = self.get_cf_handle(ITEMS_CF)?;
                self.db
                    .put_cf_opt(cf_handle, raw_key, raw_value, &default_write_options())?;
                Ok(())
            },
            "put_item",
        )
    }

    /// Inserts or replaces several records in one atomic write.
    #[tracing::instrument(skip_all, level = "error", fields(table = %table))]
    pub fn put_items<'a>(
        &self,
        table: &str,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> anyhow::Result<()> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                let schema = self.key_schema(table)?;
                let cf_handle = self.get_cf_handle(ITEMS_CF)?;
                let mut batch = rocksdb::WriteBatch::default();
                for record in records {
                    let key = schema.restrict(record).map_err(CodecError::from)?;
                    let raw_key = keys::encode_item_key(table, &schema, &key)?;
                    let raw_value = serde_json::to_vec(record).map_err(CodecError::from)?;
                    batch.put_cf(cf_handle, raw_key, raw_value);
                }
                self.db.write_opt(batch, &default_write_options())?;
                Ok(())
            },
            "put_items",
        )
    }

    /// Reads the record stored under the key projection `key`.
    #[tracing::instrument(skip_all, level = "error", fields(table = %table))]
    pub fn get_item(&self, table: &str, key: &KeyValueMap) -> anyhow::Result<Option<Record>> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                let schema = self.key_schema(table)?;
                let raw_key = keys::encode_item_key(table, &schema, key)?;
                let cf_handle = self.get_cf_handle(ITEMS_CF)?;
                let raw = self.db.get_pinned_cf(cf_handle, raw_key)?;
                raw.map(|raw| decode_record(&raw))
                    .transpose()
                    .map_err(anyhow::Error::from)
            },
            "get_item",
        )
    }

    /// Deletes the record stored under the key projection `key`, if any.
    #[tracing::instrument(skip_all, level = "error", fields(table = %table))]
    pub fn delete_item(&self, table: &str, key: &KeyValueMap) -> anyhow::Result<()> {
        with_error_logging::<_, _, anyhow::Error>(
            || {
                let schema = self.key_schema(table)?;
                let raw_key = keys::encode_item_key(table, &schema, key)?;
                let cf_handle = self.get_cf_handle(ITEMS_CF)?;
                self.db
                    .delete_cf_opt(cf_handle, raw_key, &default_write_options())?;
                Ok(())
            },
            "delete_item",
        )
    }

    /// Evaluates at most `request.limit` items of the table, starting strictly after
    /// `request.exclusive_start_key`, and returns the ones matching the filter.
    ///
    /// The continuation key is the key projection of the last evaluated item. It is only
    /// returned when the limit was reached and more items remain.
    pub fn scan_chunk(&self, request: &ScanRequest<'_>) -> anyhow::Result<ScanChunk> {
        with_error_logging(|| self.scan_chunk_inner(request), "scan_chunk")
    }

    fn scan_chunk_inner(&self, request: &ScanRequest<'_>) -> anyhow::Result<ScanChunk> {
        let _timer = STORE_SCAN_LATENCY_SECONDS
            .with_label_values(&[self.name])
            .start_timer();
        let table = request.table_name;
        if request.limit == 0 {
            bail!("scan limit must be positive");
        }
        let schema = self.key_schema(table)?;
        let filter = FilterExpression::compile(request.filter)?;
        let start = request
            .exclusive_start_key
            .map(|key| {
                if !schema.matches_key(key) {
                    bail!("start key does not match the key schema of table `{table}`");
                }
                Ok(keys::encode_item_key(table, &schema, key)?)
            })
            .transpose()?;

        let cf_handle = self.get_cf_handle(ITEMS_CF)?;
        let mut iter = TableIter::new(
            &self.db,
            cf_handle,
            keys::table_prefix(table)?,
            start.as_deref(),
        );

        let mut items = Vec::new();
        let mut evaluated = 0;
        let mut last_key = None;
        while evaluated < request.limit {
            let Some(item) = iter.next() else {
                break;
            };
            let (_, raw_value) = item?;
            let record = decode_record(&raw_value)?;
            evaluated += 1;
            last_key = Some(schema.restrict(&record).map_err(CodecError::from)?);
            if filter.matches(&record) {
                items.push(record);
            }
        }
        STORE_SCAN_ITEMS
            .with_label_values(&[self.name])
            .observe(evaluated as f64);

        let continuation_key = if evaluated == request.limit && iter.has_next()? {
            last_key
        } else {
            None
        };
        debug!(
            table,
            evaluated,
            matched = items.len(),
            more = continuation_key.is_some(),
            "scanned chunk"
        );
        Ok(ScanChunk {
            items,
            continuation_key,
        })
    }
}

impl KeySchemaResolver for TableStore {
    async fn resolve_key_schema(&self, table_name: &str) -> anyhow::Result<KeySchema> {
        tokio::task::block_in_place(|| self.key_schema(table_name))
    }
}

impl ChunkedScanner for TableStore {
    async fn scan(&self, request: ScanRequest<'_>) -> anyhow::Result<ScanChunk> {
        tokio::task::block_in_place(|| self.scan_chunk(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Filter;
    use crate::test::{id_schema, numbered_records, record};
    use crate::value::AttributeValue;

    fn open_store(dir: &Path) -> TableStore {
        TableStore::open(dir, "test-store", &StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_store_debug_output() {
        let tmpdir = tempfile::tempdir().unwrap();
        let store = open_store(tmpdir.path());
        let debug = format!("{store:?}");
        assert!(debug.contains("test-store"));
    }

    #[test]
    fn continuation_key_tracks_last_evaluated_item() {
        let tmpdir = tempfile::tempdir().unwrap();
        let store = open_store(tmpdir.path());
        store.create_table("nums", id_schema()).unwrap();
        store.put_items("nums", &numbered_records(6)).unwrap();

        // Odd ids only. The chunk ends on id 4, which does not match.
        let filter = Filter::new("even = :f").with_value(":f", false);
        let chunk = store
            .scan_chunk(&ScanRequest {
                table_name: "nums",
                filter: &filter,
                limit: 4,
                exclusive_start_key: None,
            })
            .unwrap();
        let ids: Vec<_> = chunk.items.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(vec![AttributeValue::number(1), AttributeValue::number(3)], ids);
        assert_eq!(
            Some(record([("id", AttributeValue::number(4))])),
            chunk.continuation_key
        );
    }

    #[test]
    fn no_continuation_when_limit_lands_on_last_item() {
        let tmpdir = tempfile::tempdir().unwrap();
        let store = open_store(tmpdir.path());
        store.create_table("nums", id_schema()).unwrap();
        store.put_items("nums", &numbered_records(3)).unwrap();

        let filter = Filter::new("true");
        let chunk = store
            .scan_chunk(&ScanRequest {
                table_name: "nums",
                filter: &filter,
                limit: 3,
                exclusive_start_key: None,
            })
            .unwrap();
        assert_eq!(3, chunk.items.len());
        assert_eq!(None, chunk.continuation_key);
    }

    #[test]
    fn corrupt_item_surfaces_codec_error() {
        let tmpdir = tempfile::tempdir().unwrap();
        let store = open_store(tmpdir.path());
        store.create_table("nums", id_schema()).unwrap();
        store.put_items("nums", &numbered_records(2)).unwrap();

        let schema = id_schema();
        let raw_key =
            keys::encode_item_key("nums", &schema, &record([("id", AttributeValue::number(2))]))
                .unwrap();
        let cf_handle = store.get_cf_handle(ITEMS_CF).unwrap();
        store.db.put_cf(cf_handle, raw_key, b"not json").unwrap();

        let filter = Filter::new("true");
        let err = store
            .scan_chunk(&ScanRequest {
                table_name: "nums",
                filter: &filter,
                limit: 10,
                exclusive_start_key: None,
            })
            .unwrap_err();
        assert!(err.chain().any(|cause| cause.is::<CodecError>()));
    }

    #[test]
    fn start_key_must_match_schema() {
        let tmpdir = tempfile::tempdir().unwrap();
        let store = open_store(tmpdir.path());
        store.create_table("nums", id_schema()).unwrap();

        let filter = Filter::new("true");
        let start = record([("name", "item-1".into())]);
        let result = store.scan_chunk(&ScanRequest {
            table_name: "nums",
            filter: &filter,
            limit: 10,
            exclusive_start_key: Some(&start),
        });
        assert!(result.is_err());
    }
}

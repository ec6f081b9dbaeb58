use std::time::Duration;

/// Page size used when a request leaves `first` at zero.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Upper bound on scanner calls made while serving a single page.
pub const DEFAULT_MAX_CHUNK_FETCHES: usize = 1000;

/// Knobs of the [`Pager`](crate::Pager).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PagerConfig {
    /// Substituted for `first == 0`. Defaults to 100.
    pub default_page_size: i64,
    /// Maximum number of chunks fetched for one page, including the look-ahead used to
    /// settle `has_next_page`. A scanner that keeps returning continuation keys past
    /// this point fails the request. Defaults to 1000.
    pub max_chunk_fetches: usize,
    /// Deadline for a whole request. `None` waits for as long as the collaborators take.
    pub request_timeout: Option<Duration>,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_chunk_fetches: DEFAULT_MAX_CHUNK_FETCHES,
            request_timeout: None,
        }
    }
}

/// Port selected RocksDB options for tuning the instance behind a
/// [`TableStore`](crate::store::TableStore). The current default values are taken from Aptos.
/// see <https://github.com/facebook/rocksdb/blob/master/include/rocksdb/options.h>
/// for detailed explanations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RocksdbConfig {
    /// The maximum number of files that can be open concurrently. Defaults to 5000
    pub max_open_files: i32,
    /// Once write-ahead logs exceed this size, RocksDB will start forcing the flush of column
    /// families whose memtables are backed by the oldest live WAL file. Defaults to 1GB
    pub max_total_wal_size: u64,
    /// The maximum number of background threads, including threads for flushing and compaction. Defaults to 16.
    pub max_background_jobs: i32,
}

impl Default for RocksdbConfig {
    fn default() -> Self {
        Self {
            // Allow db to close old sst files, saving memory.
            max_open_files: 5000,
            max_total_wal_size: 1u64 << 30,
            // Rocksdb will decide the # of threads to use internally.
            max_background_jobs: 16,
        }
    }
}

/// Configuration of a [`TableStore`](crate::store::TableStore).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Options forwarded to RocksDB.
    pub rocksdb: RocksdbConfig,
    /// Number of key schemas kept in memory. Defaults to 1024.
    pub schema_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rocksdb: RocksdbConfig::default(),
            schema_cache_capacity: 1024,
        }
    }
}

/// Generate [`rocksdb::Options`] corresponding to the given [`RocksdbConfig`]. Missing
/// databases and column families are created.
pub fn gen_rocksdb_options(config: &RocksdbConfig) -> rocksdb::Options {
    let mut db_opts = rocksdb::Options::default();
    db_opts.set_max_open_files(config.max_open_files);
    db_opts.set_max_total_wal_size(config.max_total_wal_size);
    db_opts.set_max_background_jobs(config.max_background_jobs);
    db_opts.create_if_missing(true);
    db_opts.create_missing_column_families(true);
    db_opts
}

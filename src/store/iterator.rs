use std::iter::FusedIterator;

use rocksdb::{ColumnFamily, ReadOptions};

use super::keys::prefix_successor;
use crate::{SchemaKey, SchemaValue};

/// Forward iterator over the raw items of one table, i.e. the keys sharing `prefix`.
pub(crate) struct TableIter<'a> {
    db_iter: rocksdb::DBRawIterator<'a>,
    done: bool,
}

impl<'a> TableIter<'a> {
    /// Positions the iterator on the first item of the table, or on the first item
    /// strictly after `exclusive_start` when given.
    pub(crate) fn new(
        inner: &'a rocksdb::DB,
        cf_handle: &ColumnFamily,
        prefix: SchemaKey,
        exclusive_start: Option<&[u8]>,
    ) -> Self {
        let mut opts: ReadOptions = Default::default();
        if let Some(upper) = prefix_successor(&prefix) {
            opts.set_iterate_upper_bound(upper);
        }
        opts.set_iterate_lower_bound(prefix);

        let mut db_iter = inner.raw_iterator_cf_opt(cf_handle, opts);
        match exclusive_start {
            Some(start) => {
                db_iter.seek(start);
                // `next` requires checking `valid` first.
                if db_iter.valid() && db_iter.key() == Some(start) {
                    db_iter.next();
                }
            }
            None => db_iter.seek_to_first(),
        }

        TableIter {
            db_iter,
            done: false,
        }
    }

    /// Whether another item follows, without consuming it. A read error that left the
    /// iterator invalid is returned instead of being taken for the end of the table.
    pub(crate) fn has_next(&self) -> anyhow::Result<bool> {
        if self.done {
            return Ok(false);
        }
        if self.db_iter.valid() {
            return Ok(true);
        }
        self.db_iter.status()?;
        Ok(false)
    }
}

impl Iterator for TableIter<'_> {
    type Item = anyhow::Result<(SchemaKey, SchemaValue)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.db_iter.valid() {
            self.done = true;
            return match self.db_iter.status() {
                Ok(()) => None,
                Err(e) => Some(Err(e.into())),
            };
        }

        let next_item = self
            .db_iter
            .item()
            .map(|(key, value)| (key.to_vec(), value.to_vec()));
        self.db_iter.next();
        next_item.map(Ok)
    }
}

impl FusedIterator for TableIter<'_> {}

//! Raw RocksDB key layout of stored items.
//!
//! `u32 BE len(table) ‖ table ‖ (u32 BE len(json(v)) ‖ json(v))` for every key field
//! `v` in schema order. Every item of a table shares the table prefix, and no table
//! prefix is a prefix of another table's.

use byteorder::{BigEndian, WriteBytesExt};

use crate::schema::{KeySchema, KeySchemaError};
use crate::value::KeyValueMap;
use crate::{CodecError, SchemaKey};

fn write_component(bytes: &mut Vec<u8>, component: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(component.len())
        .map_err(|_| CodecError::ComponentTooLong(component.len()))?;
    bytes.write_u32::<BigEndian>(len)?;
    bytes.extend_from_slice(component);
    Ok(())
}

/// Common prefix of every item key of `table`.
pub(crate) fn table_prefix(table: &str) -> Result<SchemaKey, CodecError> {
    let mut bytes = Vec::with_capacity(4 + table.len());
    write_component(&mut bytes, table.as_bytes())?;
    Ok(bytes)
}

/// Item key for the key projection `key` of `table`.
pub(crate) fn encode_item_key(
    table: &str,
    schema: &KeySchema,
    key: &KeyValueMap,
) -> Result<SchemaKey, CodecError> {
    let mut bytes = table_prefix(table)?;
    for name in schema.field_names() {
        let value = key
            .get(name)
            .ok_or_else(|| KeySchemaError::MissingField(name.to_owned()))?;
        write_component(&mut bytes, &serde_json::to_vec(value)?)?;
    }
    Ok(bytes)
}

/// Smallest key greater than every key starting with `prefix`, if one exists.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<SchemaKey> {
    let mut successor = prefix.to_vec();
    while let Some(last) = successor.pop() {
        if last < u8::MAX {
            successor.push(last + 1);
            return Some(successor);
        }
    }
    None
}

//! Opaque resumable cursors.
//!
//! A cursor is `base64(json(key))` where `key` is the projection of a record onto its
//! table's [`KeySchema`]. Values keep their type tags, so a numeric key never comes
//! back as a string. Cursors are only meaningful as resume points for the table that
//! issued them; they are not ordered.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{KeySchema, KeySchemaError};
use crate::value::{KeyValueMap, Record};

/// Opaque resume token handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wraps a client-supplied token. No validation happens until it is decoded.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps the token text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cursor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Failures while turning records into cursors and back.
#[derive(Error, Debug)]
pub enum CursorError {
    /// The record does not populate one of its own key fields.
    #[error("record cannot be projected onto its key schema")]
    MissingKeyField(#[source] KeySchemaError),
    /// The key projection could not be serialized.
    #[error("unable to serialize key")]
    Serialize(#[source] serde_json::Error),
    /// The token is not valid base64.
    #[error("cursor is not valid base64")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not a typed key map.
    #[error("cursor does not contain a typed key map")]
    Malformed(#[source] serde_json::Error),
    /// The decoded key map has no fields.
    #[error("cursor carries no key fields")]
    Empty,
    /// The decoded key names different fields than the table's key schema.
    #[error("cursor key fields {got:?} do not match the table key schema {expected:?}")]
    SchemaMismatch {
        /// Key fields of the table.
        expected: Vec<String>,
        /// Fields found in the cursor.
        got: Vec<String>,
    },
}

/// Encodes records into [`Cursor`]s and decodes cursors into scan start keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorCodec;

impl CursorCodec {
    /// Cursor for `record` under `schema`.
    pub fn encode(schema: &KeySchema, record: &Record) -> Result<Cursor, CursorError> {
        let key = schema
            .restrict(record)
            .map_err(CursorError::MissingKeyField)?;
        let json = serde_json::to_vec(&key).map_err(CursorError::Serialize)?;
        Ok(Cursor(BASE64_STANDARD.encode(json)))
    }

    /// Key map carried by `cursor`. Never partially recovers.
    pub fn decode(cursor: &Cursor) -> Result<KeyValueMap, CursorError> {
        let json = BASE64_STANDARD.decode(cursor.as_str())?;
        let key: KeyValueMap = serde_json::from_slice(&json).map_err(CursorError::Malformed)?;
        if key.is_empty() {
            return Err(CursorError::Empty);
        }
        Ok(key)
    }

    /// Checks that a decoded key names exactly the fields of `schema`.
    pub fn check_fields(schema: &KeySchema, key: &KeyValueMap) -> Result<(), CursorError> {
        if schema.matches_key(key) {
            return Ok(());
        }
        Err(CursorError::SchemaMismatch {
            expected: schema.field_names().map(str::to_owned).collect(),
            got: key.keys().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{arb_keyed_record, record};
    use crate::value::AttributeValue;
    use proptest::prelude::*;

    #[test]
    fn encodes_only_key_fields() {
        let schema = KeySchema::partition("id");
        let panda = record([
            ("id", "11111".into()),
            ("fluffy", true.into()),
            ("species", "panda".into()),
        ]);

        let cursor = CursorCodec::encode(&schema, &panda).unwrap();
        assert_eq!("eyJpZCI6eyJTIjoiMTExMTEifX0=", cursor.as_str());

        let key = CursorCodec::decode(&cursor).unwrap();
        assert_eq!(record([("id", "11111".into())]), key);
    }

    #[test]
    fn decodes_verbose_tokens() {
        let cursor = Cursor::new(
            "eyJpZCI6eyJCIjpudWxsLCJCT09MIjpudWxsLCJCUyI6bnVsbCwiTCI6bnVsbCwiTSI6bnVsbCwiTiI6bnVsbCwiTlMiOm51bGwsIk5VTEwiOm51bGwsIlMiOiIxMTExMSIsIlNTIjpudWxsfX0=",
        );
        let key = CursorCodec::decode(&cursor).unwrap();
        assert_eq!(record([("id", "11111".into())]), key);
    }

    #[test]
    fn encode_requires_populated_key() {
        let schema = KeySchema::partition_and_sort("id", "at");
        let partial = record([("id", AttributeValue::number(1))]);
        let err = CursorCodec::encode(&schema, &partial).unwrap_err();
        assert!(matches!(
            err,
            CursorError::MissingKeyField(KeySchemaError::MissingField(ref field)) if field == "at"
        ));
    }

    #[test]
    fn decode_failures_are_hard_errors() {
        assert!(matches!(
            CursorCodec::decode(&Cursor::new("not base64!")),
            Err(CursorError::Base64(_))
        ));
        // `[1]`
        assert!(matches!(
            CursorCodec::decode(&Cursor::new("WzFd")),
            Err(CursorError::Malformed(_))
        ));
        // `{}`
        assert!(matches!(
            CursorCodec::decode(&Cursor::new("e30=")),
            Err(CursorError::Empty)
        ));
    }

    #[test]
    fn check_fields_rejects_foreign_cursors() {
        let schema = KeySchema::partition("id");
        let foreign = record([("user", "alice".into())]);
        assert!(matches!(
            CursorCodec::check_fields(&schema, &foreign),
            Err(CursorError::SchemaMismatch { .. })
        ));
        let own = record([("id", AttributeValue::number(3))]);
        CursorCodec::check_fields(&schema, &own).unwrap();
    }

    proptest! {
        #[test]
        fn cursor_roundtrips_key_projection(record in arb_keyed_record(&["pk", "sk"])) {
            let schema = KeySchema::partition_and_sort("pk", "sk");
            let cursor = CursorCodec::encode(&schema, &record).unwrap();
            let decoded = CursorCodec::decode(&cursor).unwrap();
            prop_assert_eq!(schema.restrict(&record).unwrap(), decoded);
        }
    }
}

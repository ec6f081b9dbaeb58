//! The connection handed back to callers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cursor::Cursor;
use crate::value::Record;

/// One returned record together with the cursor that resumes right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Resume point after `node`.
    pub cursor: Cursor,
    /// The record.
    pub node: Record,
}

/// Relay page metadata. Absent cursors render as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// More records follow `end_cursor`.
    pub has_next_page: bool,
    /// Always `false`: only forward paging is served and no predecessor check is made.
    pub has_previous_page: bool,
    /// Cursor of the first edge.
    #[serde(
        default,
        serialize_with = "serialize_optional_cursor",
        deserialize_with = "deserialize_optional_cursor"
    )]
    pub start_cursor: Option<Cursor>,
    /// Cursor of the last edge.
    #[serde(
        default,
        serialize_with = "serialize_optional_cursor",
        deserialize_with = "deserialize_optional_cursor"
    )]
    pub end_cursor: Option<Cursor>,
}

/// One logical page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// Records in scan order, never more than the requested count.
    pub edges: Vec<Edge>,
    /// Metadata for resuming.
    pub page_info: PageInfo,
}

impl PageResult {
    /// Records of this page, dropping their cursors.
    pub fn nodes(&self) -> impl Iterator<Item = &Record> {
        self.edges.iter().map(|edge| &edge.node)
    }

    /// Response body for the caller.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn serialize_optional_cursor<S: Serializer>(
    cursor: &Option<Cursor>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(cursor.as_ref().map_or("", Cursor::as_str))
}

fn deserialize_optional_cursor<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Cursor>, D::Error> {
    let token = Option::<String>::deserialize(deserializer)?;
    Ok(token.filter(|t| !t.is_empty()).map(Cursor::new))
}

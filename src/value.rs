//! Typed attribute values and the record maps built out of them.
//!
//! The JSON form of an [`AttributeValue`] is a single-entry object whose key is the
//! type tag, e.g. `{"S": "panda"}` or `{"N": "42"}`. This is the representation
//! cursors are built from, so it must stay stable across releases.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Field name to typed value. Ordered, so serialization is deterministic.
pub type KeyValueMap = BTreeMap<String, AttributeValue>;

/// One table row, as produced by a [`ChunkedScanner`](crate::ChunkedScanner).
pub type Record = KeyValueMap;

/// A single typed attribute of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AttributeValueRepr")]
pub enum AttributeValue {
    /// UTF-8 string.
    S(String),
    /// Number, kept in its decimal text form so that it round-trips exactly.
    N(String),
    /// Opaque bytes. Rendered as standard base64 on the wire.
    B(Vec<u8>),
    /// Boolean.
    Bool(bool),
    /// Explicit null.
    Null,
    /// Ordered list of values.
    L(Vec<AttributeValue>),
    /// Nested map.
    M(KeyValueMap),
}

impl AttributeValue {
    /// Builds a number from anything with a decimal [`fmt::Display`].
    pub fn number(n: impl fmt::Display) -> Self {
        Self::N(n.to_string())
    }

    /// The type tag used on the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Numeric view of an `N` value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::N(n) => n.parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::S(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::S(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::B(bytes)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AttributeValue {
                fn from(n: $t) -> Self {
                    Self::number(n)
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::S(s) => map.serialize_entry("S", s)?,
            Self::N(n) => map.serialize_entry("N", n)?,
            Self::B(bytes) => map.serialize_entry("B", &BASE64_STANDARD.encode(bytes))?,
            Self::Bool(b) => map.serialize_entry("BOOL", b)?,
            Self::Null => map.serialize_entry("NULL", &true)?,
            Self::L(list) => map.serialize_entry("L", list)?,
            Self::M(nested) => map.serialize_entry("M", nested)?,
        }
        map.end()
    }
}

/// Rejection reasons for a JSON object that does not describe exactly one typed value.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidAttributeValue {
    /// No type tag carried a value.
    #[error("attribute value has no type tag set")]
    Untagged,
    /// More than one type tag carried a value.
    #[error("attribute value has several type tags set: {0:?}")]
    Ambiguous(Vec<&'static str>),
    /// `N` is not a decimal number.
    #[error("`{0}` is not a number")]
    NotANumber(String),
    /// `B` is not valid base64.
    #[error("binary attribute is not valid base64")]
    BadBinary,
    /// `NULL` may only be `true`.
    #[error("NULL attribute must be `true`")]
    FalseNull,
    /// String, number and binary sets have no counterpart here.
    #[error("set attribute `{0}` is not supported")]
    UnsupportedSet(&'static str),
}

/// Wire shape accepted on input. Besides the compact single-tag form, this also
/// accepts objects that list every tag with all but one set to `null`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AttributeValueRepr {
    #[serde(rename = "S", default)]
    s: Option<String>,
    #[serde(rename = "N", default)]
    n: Option<String>,
    #[serde(rename = "B", default)]
    b: Option<String>,
    #[serde(rename = "BOOL", default)]
    boolean: Option<bool>,
    #[serde(rename = "NULL", default)]
    null: Option<bool>,
    #[serde(rename = "L", default)]
    l: Option<Vec<AttributeValue>>,
    #[serde(rename = "M", default)]
    m: Option<KeyValueMap>,
    #[serde(rename = "SS", default)]
    ss: Option<serde_json::Value>,
    #[serde(rename = "NS", default)]
    ns: Option<serde_json::Value>,
    #[serde(rename = "BS", default)]
    bs: Option<serde_json::Value>,
}

impl TryFrom<AttributeValueRepr> for AttributeValue {
    type Error = InvalidAttributeValue;

    fn try_from(repr: AttributeValueRepr) -> Result<Self, Self::Error> {
        for (tag, set) in [("SS", &repr.ss), ("NS", &repr.ns), ("BS", &repr.bs)] {
            if set.as_ref().is_some_and(|v| !v.is_null()) {
                return Err(InvalidAttributeValue::UnsupportedSet(tag));
            }
        }

        let mut candidates = Vec::with_capacity(1);
        if let Some(s) = repr.s {
            candidates.push(Self::S(s));
        }
        if let Some(n) = repr.n {
            // Plain finite decimals only: no whitespace, `NaN` or `inf`.
            if !n.parse::<f64>().is_ok_and(f64::is_finite) {
                return Err(InvalidAttributeValue::NotANumber(n));
            }
            candidates.push(Self::N(n));
        }
        if let Some(b) = repr.b {
            let bytes = BASE64_STANDARD
                .decode(b)
                .map_err(|_| InvalidAttributeValue::BadBinary)?;
            candidates.push(Self::B(bytes));
        }
        if let Some(b) = repr.boolean {
            candidates.push(Self::Bool(b));
        }
        match repr.null {
            Some(true) => candidates.push(Self::Null),
            Some(false) => return Err(InvalidAttributeValue::FalseNull),
            None => {}
        }
        if let Some(l) = repr.l {
            candidates.push(Self::L(l));
        }
        if let Some(m) = repr.m {
            candidates.push(Self::M(m));
        }

        match candidates.len() {
            0 => Err(InvalidAttributeValue::Untagged),
            1 => Ok(candidates.remove(0)),
            _ => Err(InvalidAttributeValue::Ambiguous(
                candidates.iter().map(AttributeValue::type_tag).collect(),
            )),
        }
    }
}

#[cfg(feature = "arbitrary")]
impl proptest::arbitrary::Arbitrary for AttributeValue {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        use proptest::prelude::*;

        let scalar = prop_oneof![
            any::<String>().prop_map(AttributeValue::S),
            any::<i64>().prop_map(AttributeValue::number),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(AttributeValue::B),
            any::<bool>().prop_map(AttributeValue::Bool),
            Just(AttributeValue::Null),
        ];
        scalar
            .prop_recursive(3, 16, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(AttributeValue::L),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(AttributeValue::M),
                ]
            })
            .boxed()
    }
}

//! Page requests as they arrive, and their validated form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PagerConfig;
use crate::cursor::Cursor;
use crate::value::{AttributeValue, KeyValueMap};
use crate::PageError;

/// Backend predicate applied to every scanned item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// The predicate, in the backend's expression language.
    pub expression: String,
    /// `#placeholder` to attribute name substitutions.
    #[serde(default)]
    pub expression_names: BTreeMap<String, String>,
    /// `:placeholder` to value substitutions.
    #[serde(default)]
    pub expression_values: KeyValueMap,
}

impl Filter {
    /// Filter with no placeholders.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Default::default()
        }
    }

    /// Binds a `#name` placeholder.
    pub fn with_name(mut self, placeholder: impl Into<String>, name: impl Into<String>) -> Self {
        self.expression_names
            .insert(placeholder.into(), name.into());
        self
    }

    /// Binds a `:value` placeholder.
    pub fn with_value(
        mut self,
        placeholder: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.expression_values
            .insert(placeholder.into(), value.into());
        self
    }
}

/// A forward page request, as received from a caller.
///
/// `last` and `before` are accepted on the wire only so that they can be rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Table to page through.
    #[serde(default)]
    pub table_name: String,
    /// Mandatory filter. Callers wanting every record pass a tautology.
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Page size. Zero means the configured default.
    #[serde(default)]
    pub first: i64,
    /// Resume after this cursor.
    #[serde(default)]
    pub after: Option<String>,
    /// Backward page size. Unsupported.
    #[serde(default)]
    pub last: i64,
    /// Backward cursor. Unsupported.
    #[serde(default)]
    pub before: String,
}

impl PageRequest {
    /// First page of `table_name` with the default size.
    pub fn new(table_name: impl Into<String>, filter: Filter) -> Self {
        Self {
            table_name: table_name.into(),
            filter: Some(filter),
            ..Default::default()
        }
    }

    /// Sets the page size.
    pub fn first(mut self, first: i64) -> Self {
        self.first = first;
        self
    }

    /// Resumes after `cursor`.
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }
}

/// A request that passed [`RequestValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Table to page through. Never empty.
    pub table_name: String,
    /// Filter handed to the scanner.
    pub filter: Filter,
    /// Exact maximum number of edges. Always positive.
    pub first: usize,
    /// Resume point, if any.
    pub after: Option<Cursor>,
}

/// Normalizes raw [`PageRequest`]s and rejects the ones the engine cannot serve.
#[derive(Debug, Clone, Copy)]
pub struct RequestValidator {
    default_page_size: i64,
}

impl RequestValidator {
    /// Validator applying `config`'s defaults.
    pub fn new(config: &PagerConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
        }
    }

    /// Checks, in order: table name, filter, backward paging, page size.
    pub fn validate(&self, request: PageRequest) -> Result<ValidatedRequest, PageError> {
        let PageRequest {
            table_name,
            filter,
            first,
            after,
            last,
            before,
        } = request;

        if table_name.is_empty() {
            return Err(PageError::InvalidRequest("missing table name"));
        }
        let filter = match filter {
            Some(filter) if !filter.expression.trim().is_empty() => filter,
            _ => return Err(PageError::InvalidRequest("missing filter")),
        };
        if !before.is_empty() || last > 0 {
            return Err(PageError::InvalidRequest("backward paging unsupported"));
        }
        let first = if first == 0 {
            self.default_page_size
        } else {
            first
        };
        let first = usize::try_from(first)
            .ok()
            .filter(|first| *first > 0)
            .ok_or(PageError::InvalidRequest("first must be positive"))?;

        Ok(ValidatedRequest {
            table_name,
            filter,
            first,
            after: after.filter(|a| !a.is_empty()).map(Cursor::new),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn validator() -> RequestValidator {
        RequestValidator::new(&PagerConfig::default())
    }

    fn reason(err: PageError) -> &'static str {
        match err {
            PageError::InvalidRequest(reason) => reason,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn defaults_page_size() {
        let validated = validator()
            .validate(PageRequest::new("pets", Filter::new("true")))
            .unwrap();
        assert_eq!(100, validated.first);
        assert_eq!(None, validated.after);

        let config = PagerConfig {
            default_page_size: 7,
            ..Default::default()
        };
        let validated = RequestValidator::new(&config)
            .validate(PageRequest::new("pets", Filter::new("true")))
            .unwrap();
        assert_eq!(7, validated.first);
    }

    #[test]
    fn keeps_explicit_size_and_cursor() {
        let validated = validator()
            .validate(
                PageRequest::new("pets", Filter::new("true"))
                    .first(5)
                    .after("abc"),
            )
            .unwrap();
        assert_eq!(5, validated.first);
        assert_eq!(Some(Cursor::new("abc")), validated.after);

        let validated = validator()
            .validate(PageRequest::new("pets", Filter::new("true")).after(""))
            .unwrap();
        assert_eq!(None, validated.after);
    }

    #[test]
    fn rejects_in_order() {
        let err = validator().validate(PageRequest::default()).unwrap_err();
        assert_eq!(ErrorKind::InvalidRequest, err.kind());
        assert_eq!("missing table name", reason(err));

        let request = PageRequest {
            table_name: "pets".to_owned(),
            last: 5,
            ..Default::default()
        };
        assert_eq!("missing filter", reason(validator().validate(request).unwrap_err()));

        let request = PageRequest::new("pets", Filter::new("   "));
        assert_eq!("missing filter", reason(validator().validate(request).unwrap_err()));

        let request = PageRequest {
            last: 5,
            ..PageRequest::new("pets", Filter::new("true"))
        };
        assert_eq!(
            "backward paging unsupported",
            reason(validator().validate(request).unwrap_err())
        );

        let request = PageRequest {
            before: "abc".to_owned(),
            ..PageRequest::new("pets", Filter::new("true"))
        };
        assert_eq!(
            "backward paging unsupported",
            reason(validator().validate(request).unwrap_err())
        );

        let request = PageRequest::new("pets", Filter::new("true")).first(-1);
        assert_eq!(
            "first must be positive",
            reason(validator().validate(request).unwrap_err())
        );
    }

    #[test]
    fn negative_default_is_rejected() {
        let config = PagerConfig {
            default_page_size: -1,
            ..Default::default()
        };
        let err = RequestValidator::new(&config)
            .validate(PageRequest::new("pets", Filter::new("true")))
            .unwrap_err();
        assert_eq!("first must be positive", reason(err));
    }

    #[test]
    fn deserializes_wire_request() {
        let json = r##"{
            "tableName": "pets",
            "filter": {
                "expression": "#s = :s",
                "expressionNames": {"#s": "species"},
                "expressionValues": {":s": {"S": "panda"}}
            },
            "first": 10,
            "after": "eyJpZCI6eyJTIjoiMTExMTEifX0="
        }"##;
        let request: PageRequest = serde_json::from_str(json).unwrap();
        let expected = PageRequest::new(
            "pets",
            Filter::new("#s = :s")
                .with_name("#s", "species")
                .with_value(":s", "panda"),
        )
        .first(10)
        .after("eyJpZCI6eyJTIjoiMTExMTEifX0=");
        assert_eq!(expected, request);
    }
}

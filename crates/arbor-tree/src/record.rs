//! Typed records parsed once from `attr:value,attr:value` lines.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::error::TreeError;

/// Optional sign, digits, optional decimal fraction.
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("numeric pattern is valid"));

/// Return `true` when `raw` matches the numeric pattern.
#[must_use]
pub fn is_numeric(raw: &str) -> bool {
    NUMERIC.is_match(raw)
}

/// A single attribute value.
///
/// The raw text is always retained so that categorical comparisons use
/// exactly what was written; `number` is set when the text matches the
/// numeric pattern.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Value {
    raw: String,
    number: Option<f64>,
}

impl Value {
    /// Build a value from raw text, trimming whitespace and one pair of
    /// surrounding double quotes.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed);
        let number = if is_numeric(unquoted) {
            unquoted.parse::<f64>().ok()
        } else {
            None
        };
        Self {
            raw: unquoted.to_string(),
            number,
        }
    }

    /// Return the value as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Return the numeric reading, if the text matched the numeric pattern.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        self.number
    }

    /// Return `true` if the text matched the numeric pattern.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.number.is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Identifier of a record, surfaced in predicted-class buckets.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct RecordId(String);

impl RecordId {
    /// Create a record identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable, ordered mapping of attribute name to value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    attributes: Vec<(String, Value)>,
}

impl Record {
    /// Build a record from ordered `(name, value)` pairs.
    ///
    /// A repeated name keeps its first position and its last value.
    pub fn new<N, V>(id: RecordId, pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: AsRef<str>,
    {
        let mut attributes: Vec<(String, Value)> = Vec::new();
        for (name, raw) in pairs {
            let name = name.into();
            let value = Value::new(raw.as_ref());
            match attributes.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name, value)),
            }
        }
        Self { id, attributes }
    }

    /// Return the record identifier.
    #[must_use]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Look up an attribute value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Return the class label of this record for `target`.
    #[must_use]
    pub fn class(&self, target: &str) -> Option<&str> {
        self.get(target).map(Value::as_str)
    }

    /// Iterate over `(name, value)` pairs in their original order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Return the number of attributes, the target included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Return `true` if the record has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}:{value}")?;
        }
        Ok(())
    }
}

/// Parser for `k1:v1,k2:v2,...` record lines.
///
/// # Defaults
///
/// | Parameter      | Default                          |
/// |----------------|----------------------------------|
/// | `target`       | `None` (presence not enforced)   |
/// | `id_attribute` | `None` (ids are line positions)  |
#[derive(Debug, Clone, Default)]
pub struct RecordParser {
    target: Option<String>,
    id_attribute: Option<String>,
}

impl RecordParser {
    /// Create a parser with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `target` to be present in every line.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Take record identifiers from this attribute instead of line positions.
    ///
    /// The attribute is removed from the record so it never becomes a split
    /// candidate.
    #[must_use]
    pub fn with_id_attribute(mut self, id_attribute: impl Into<String>) -> Self {
        self.id_attribute = Some(id_attribute.into());
        self
    }

    /// Return the required target attribute, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Return the identifier attribute, if any.
    #[must_use]
    pub fn id_attribute(&self) -> Option<&str> {
        self.id_attribute.as_deref()
    }

    /// Parse a single line. `line` is its position, used for the fallback id
    /// and for error reporting.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::MalformedToken`] | a token has no `:` |
    /// | [`TreeError::EmptyAttributeName`] | a token starts with `:` |
    /// | [`TreeError::MissingTarget`] | the required target is absent |
    pub fn parse_line(&self, line: usize, text: &str) -> Result<Record, TreeError> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        if !text.trim().is_empty() {
            for token in text.split(',') {
                let Some((name, raw)) = token.split_once(':') else {
                    return Err(TreeError::MalformedToken {
                        line,
                        token: token.trim().to_string(),
                    });
                };
                let name = name.trim();
                if name.is_empty() {
                    return Err(TreeError::EmptyAttributeName {
                        line,
                        token: token.trim().to_string(),
                    });
                }
                pairs.push((name, raw));
            }
        }

        if let Some(target) = &self.target
            && !pairs.iter().any(|(n, _)| n == target)
        {
            return Err(TreeError::MissingTarget {
                line,
                target: target.clone(),
            });
        }

        let mut id = RecordId::new(line.to_string());
        if let Some(id_attr) = &self.id_attribute
            && let Some(pos) = pairs.iter().rposition(|(n, _)| n == id_attr)
        {
            id = RecordId::new(Value::new(pairs[pos].1).as_str());
            pairs.retain(|(n, _)| n != id_attr);
        }

        Ok(Record::new(id, pairs))
    }

    /// Parse every line of a batch, aborting on the first malformed line.
    ///
    /// # Errors
    ///
    /// See [`RecordParser::parse_line`].
    #[instrument(skip_all)]
    pub fn parse_all<I, S>(&self, lines: I) -> Result<Vec<Record>, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let records = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| self.parse_line(i, line.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(n_records = records.len(), "parsed record lines");
        Ok(records)
    }
}

/// Interpret a boolean-like string such as a pruning flag.
///
/// # Errors
///
/// Returns [`TreeError::InvalidFlag`] for anything other than
/// `true/false`, `yes/no`, `1/0` (case-insensitive).
pub fn parse_flag(raw: &str) -> Result<bool, TreeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(TreeError::InvalidFlag {
            raw: raw.to_string(),
        }),
    }
}

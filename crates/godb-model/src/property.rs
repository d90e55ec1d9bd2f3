//! Property metadata and value comparison.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How two values of a property are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueComparer {
    /// Structural JSON equality.
    Strict,
    /// String-aware equality.
    Text {
        /// `null` and `""` compare equal.
        null_equals_empty: bool,
        /// Whitespace inside strings is ignored.
        ignore_whitespace: bool,
    },
}

impl ValueComparer {
    pub fn equals(&self, left: &Value, right: &Value) -> bool {
        match *self {
            Self::Strict => left == right,
            Self::Text {
                null_equals_empty,
                ignore_whitespace,
            } => {
                let normalize = |value: &Value| -> Option<String> {
                    let text = match value {
                        Value::String(s) => s.as_str(),
                        Value::Null if null_equals_empty => "",
                        _ => return None,
                    };
                    Some(if ignore_whitespace {
                        text.chars().filter(|c| !c.is_whitespace()).collect()
                    } else {
                        text.to_string()
                    })
                };
                match (normalize(left), normalize(right)) {
                    (Some(l), Some(r)) => l == r,
                    _ => left == right,
                }
            }
        }
    }
}

/// Default text comparison settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub null_equals_empty: bool,
    pub ignore_whitespace: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            null_equals_empty: true,
            ignore_whitespace: false,
        }
    }
}

impl ComparisonConfig {
    pub fn text_comparer(&self) -> ValueComparer {
        ValueComparer::Text {
            null_equals_empty: self.null_equals_empty,
            ignore_whitespace: self.ignore_whitespace,
        }
    }
}

/// Static description of one property of a node type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Only modifiable properties take part in comparison and merge.
    pub modifiable: bool,
    /// `None` uses the type model's default text comparer.
    pub comparer: Option<ValueComparer>,
}

impl PropertyDescriptor {
    /// A property that participates in comparison and merge.
    pub fn modifiable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiable: true,
            comparer: None,
        }
    }

    /// A property that is stored but never compared.
    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiable: false,
            comparer: None,
        }
    }

    pub fn with_comparer(mut self, comparer: ValueComparer) -> Self {
        self.comparer = Some(comparer);
        self
    }
}

/// A comparable slot of a node: a declared property or an attachment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum PropertyKey {
    Property(String),
    Attachment(String),
}

impl PropertyKey {
    pub fn name(&self) -> &str {
        match self {
            Self::Property(name) | Self::Attachment(name) => name,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => f.write_str(name),
            Self::Attachment(name) => write!(f, "attachment:{name}"),
        }
    }
}

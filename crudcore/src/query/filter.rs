//! Filter string grammar
//!
//! A filter string is a `;`-separated list of clauses, each written as
//! `field:operator:value[,value...]`. Values may be wrapped in double quotes to
//! embed `;`, `,` or `:`; inside quotes `\"` and `\\` are escapes. The unquoted
//! literal `null` stands for an absent value.
//!
//! Timestamps with a time part contain `:` and must be quoted:
//! `renewed_at:lt:"2024-06-01T00:00:00Z"`. A bare `2024-06-01` needs no quotes.
//!
//! Clauses are AND-combined; the values of one clause are OR-combined.
//! An empty string matches every entity.
//!
//! # Example
//!
//! ```rust,ignore
//! let expr = FilterExpression::parse(
//!     r#"status:in:Active,Pending;name:contains:"Smith, J""#,
//!     Subscription::fields(),
//! )?;
//! assert_eq!(expr.clauses().len(), 2);
//! ```

use std::fmt;

use crate::query::fields::FieldTable;
use crate::repository::{RepositoryError, RepositoryResult};

/// Separator between clauses
pub const CLAUSE_SEPARATOR: char = ';';

/// Separator between the field, operator and value parts of a clause
pub const PART_SEPARATOR: char = ':';

/// Separator between the values of one clause
pub const VALUE_SEPARATOR: char = ',';

const NULL_LITERAL: &str = "null";

/// Comparison operators accepted in filter clauses
///
/// # Example
///
/// ```rust
/// use crudcore::query::RelationalOperator;
///
/// assert_eq!(RelationalOperator::from_token("GE"), Some(RelationalOperator::GreaterOrEqual));
/// assert_eq!(format!("{}", RelationalOperator::StartsWith), "startswith");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationalOperator {
    /// `eq`
    Equal,
    /// `ne`
    NotEqual,
    /// `gt`
    GreaterThan,
    /// `ge`
    GreaterOrEqual,
    /// `lt`
    LessThan,
    /// `le`
    LessOrEqual,
    /// `contains` (text only)
    Contains,
    /// `startswith` (text only)
    StartsWith,
    /// `endswith` (text only)
    EndsWith,
    /// `in`
    In,
}

impl RelationalOperator {
    /// Every operator, in grammar order
    pub const ALL: [Self; 10] = [
        Self::Equal,
        Self::NotEqual,
        Self::GreaterThan,
        Self::GreaterOrEqual,
        Self::LessThan,
        Self::LessOrEqual,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::In,
    ];

    /// Grammar token for this operator
    #[must_use]
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::GreaterThan => "gt",
            Self::GreaterOrEqual => "ge",
            Self::LessThan => "lt",
            Self::LessOrEqual => "le",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::In => "in",
        }
    }

    /// Map a grammar token to an operator (case-insensitive)
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.token().eq_ignore_ascii_case(token))
    }

    /// Whether the operator compares by ordering (`gt`, `ge`, `lt`, `le`)
    #[must_use]
    pub const fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterOrEqual | Self::LessThan | Self::LessOrEqual
        )
    }

    /// Whether the operator only applies to text (`contains`, `startswith`, `endswith`)
    #[must_use]
    pub const fn is_text_only(&self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

impl fmt::Display for RelationalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One value of a filter clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// A literal, still in its textual form
    Literal(String),
    /// The unquoted `null` literal
    Null,
}

impl FilterValue {
    /// Literal text, `None` for [`FilterValue::Null`]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            Self::Null => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str(NULL_LITERAL),
            Self::Literal(s) if needs_quotes(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    if ch == '"' || ch == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                f.write_str("\"")
            }
            Self::Literal(s) => f.write_str(s),
        }
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case(NULL_LITERAL)
        || s.trim() != s
        || s.contains([CLAUSE_SEPARATOR, PART_SEPARATOR, VALUE_SEPARATOR, '"', '\\'])
}

/// A single `field:operator:values` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    field_name: String,
    operator: RelationalOperator,
    values: Vec<FilterValue>,
}

impl FilterClause {
    /// Registered field the clause applies to
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Comparison operator
    pub fn operator(&self) -> RelationalOperator {
        self.operator
    }

    /// OR-combined values (never empty)
    pub fn values(&self) -> &[FilterValue] {
        &self.values
    }

    fn parse<T>(segment: &str, fields: &FieldTable<T>) -> RepositoryResult<Self> {
        let malformed = || RepositoryError::malformed_filter(segment);

        let parts = split_top_level(segment, PART_SEPARATOR).ok_or_else(malformed)?;
        let [field, operator, values] = parts.as_slice() else {
            return Err(malformed());
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(malformed());
        }
        let operator = RelationalOperator::from_token(operator.trim()).ok_or_else(malformed)?;
        let field_def = fields.lookup(field)?;

        let values = split_top_level(values, VALUE_SEPARATOR)
            .ok_or_else(malformed)?
            .into_iter()
            .map(|raw| parse_value(raw).ok_or_else(malformed))
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok(Self {
            field_name: field_def.name().to_string(),
            operator,
            values,
        })
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PART_SEPARATOR}{}{PART_SEPARATOR}", self.field_name, self.operator)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "{VALUE_SEPARATOR}")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Parsed, immutable filter: AND of clauses, OR of values within a clause
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterExpression {
    clauses: Vec<FilterClause>,
}

impl FilterExpression {
    /// The expression matching every entity
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Parse a filter string against an entity's field table
    ///
    /// # Errors
    ///
    /// - `MalformedFilter` for syntax violations (the offending clause is the token)
    /// - `UnknownField` when a clause names an unregistered field
    pub fn parse<T>(raw: &str, fields: &FieldTable<T>) -> RepositoryResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::match_all());
        }

        let segments = split_top_level(raw, CLAUSE_SEPARATOR)
            .ok_or_else(|| RepositoryError::malformed_filter(raw.trim()))?;

        let mut clauses = Vec::with_capacity(segments.len());
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            clauses.push(FilterClause::parse(segment, fields)?);
        }

        tracing::debug!(
            entity = fields.entity_name(),
            clauses = clauses.len(),
            "compiled filter expression"
        );
        Ok(Self { clauses })
    }

    /// Parsed clauses, AND-combined
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// Whether the expression has no clauses
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, "{CLAUSE_SEPARATOR}")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// Split on `separator` outside of quoted literals
///
/// Returns `None` on an unterminated quote.
fn split_top_level(input: &str, separator: char) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == separator {
            parts.push(&input[start..idx]);
            start = idx + ch.len_utf8();
        }
    }

    if in_quotes {
        return None;
    }
    parts.push(&input[start..]);
    Some(parts)
}

fn parse_value(raw: &str) -> Option<FilterValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Some(quoted) = raw.strip_prefix('"') else {
        if raw.contains('"') {
            return None;
        }
        if raw.eq_ignore_ascii_case(NULL_LITERAL) {
            return Some(FilterValue::Null);
        }
        return Some(FilterValue::Literal(raw.to_string()));
    };

    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => value.push(chars.next()?),
            // the closing quote must end the value
            '"' => return chars.as_str().is_empty().then_some(FilterValue::Literal(value)),
            other => value.push(other),
        }
    }
    None
}

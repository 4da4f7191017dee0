//! Filterable/sortable field registration
//!
//! Every entity exposes an explicit [`FieldTable`] naming the fields clients may
//! filter and sort on. Each entry carries the field's [`FieldKind`] and an
//! accessor producing a [`FieldValue`], so unknown fields are rejected by a
//! table lookup instead of a runtime property search.
//!
//! # Example
//!
//! ```rust
//! use std::sync::LazyLock;
//! use crudcore::query::{FieldKind, FieldTable};
//!
//! struct Book {
//!     title: String,
//!     pages: i64,
//! }
//!
//! static BOOK_FIELDS: LazyLock<FieldTable<Book>> = LazyLock::new(|| {
//!     FieldTable::builder("Book")
//!         .text("title", |b: &Book| b.title.clone())
//!         .integer("pages", |b: &Book| b.pages)
//!         .build()
//!         .expect("book field table is valid")
//! });
//!
//! assert_eq!(BOOK_FIELDS.get("pages").map(|f| f.kind()), Some(FieldKind::Integer));
//! assert!(BOOK_FIELDS.get("author").is_none());
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::repository::{RepositoryError, RepositoryResult};

/// Declared comparison type of a registered field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// UTF-8 text, compared ordinally
    Text,
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point
    Float,
    /// Boolean flag
    Boolean,
    /// UTC timestamp (RFC 3339 or `YYYY-MM-DD` literals)
    ///
    /// RFC 3339 literals contain `:`, so filter strings must quote them.
    DateTime,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::DateTime => write!(f, "datetime"),
        }
    }
}

/// A field value read from an entity or converted from a filter literal
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Timestamp value
    DateTime(DateTime<Utc>),
    /// Absent value
    Null,
}

impl FieldValue {
    /// Convert a raw literal into a value of the given kind
    ///
    /// Returns `None` when the literal is not a valid value of that kind.
    ///
    /// ```rust
    /// use crudcore::query::{FieldKind, FieldValue};
    ///
    /// assert_eq!(FieldValue::parse(FieldKind::Integer, "42"), Some(FieldValue::Integer(42)));
    /// assert_eq!(FieldValue::parse(FieldKind::Boolean, "TRUE"), Some(FieldValue::Boolean(true)));
    /// assert!(FieldValue::parse(FieldKind::Integer, "forty-two").is_none());
    /// ```
    pub fn parse(kind: FieldKind, raw: &str) -> Option<Self> {
        match kind {
            FieldKind::Text => Some(Self::Text(raw.to_string())),
            FieldKind::Integer => raw.parse::<i64>().ok().map(Self::Integer),
            FieldKind::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|n| !n.is_nan())
                .map(Self::Float),
            FieldKind::Boolean => {
                if raw.eq_ignore_ascii_case("true") {
                    Some(Self::Boolean(true))
                } else if raw.eq_ignore_ascii_case("false") {
                    Some(Self::Boolean(false))
                } else {
                    None
                }
            }
            FieldKind::DateTime => parse_timestamp(raw).map(Self::DateTime),
        }
    }

    /// The kind of this value, `None` for [`FieldValue::Null`]
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Text(_) => Some(FieldKind::Text),
            Self::Integer(_) => Some(FieldKind::Integer),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Boolean(_) => Some(FieldKind::Boolean),
            Self::DateTime(_) => Some(FieldKind::DateTime),
            Self::Null => None,
        }
    }

    /// Check whether the value is absent
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two non-null values of the same kind
    ///
    /// Returns `None` for nulls, mismatched kinds and NaN.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting
    ///
    /// Nulls come first and NaN comes before every other float. Values of
    /// different kinds are ordered by kind so the order stays transitive.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.total_cmp(b),
            },
            _ => self
                .sort_rank()
                .cmp(&other.sort_rank())
                .then_with(|| self.compare(other).unwrap_or(Ordering::Equal)),
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Text(_) => 1,
            Self::Integer(_) => 2,
            Self::Float(_) => 3,
            Self::Boolean(_) => 4,
            Self::DateTime(_) => 5,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::DateTime(ts)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

type Accessor<T> = Arc<dyn Fn(&T) -> FieldValue + Send + Sync>;

/// A single registered field: name, kind and accessor
pub struct FieldDef<T> {
    name: &'static str,
    kind: FieldKind,
    accessor: Accessor<T>,
}

impl<T> FieldDef<T> {
    /// Registered field name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared comparison kind
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Read this field from an entity
    pub fn value_of(&self, entity: &T) -> FieldValue {
        (self.accessor)(entity)
    }
}

impl<T> Clone for FieldDef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T> fmt::Debug for FieldDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Error raised while building a [`FieldTable`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldTableError {
    /// The same field name was registered twice
    #[error("field '{field}' registered twice for entity {entity}")]
    DuplicateField {
        /// Entity the table belongs to
        entity: &'static str,
        /// Offending field name
        field: &'static str,
    },
    /// The field name is empty or contains grammar delimiters
    #[error("field name '{field}' for entity {entity} is not a valid identifier")]
    InvalidName {
        /// Entity the table belongs to
        entity: &'static str,
        /// Offending field name
        field: &'static str,
    },
}

/// Per-entity registration table of filterable and sortable fields
pub struct FieldTable<T> {
    entity: &'static str,
    order: Vec<&'static str>,
    fields: HashMap<&'static str, FieldDef<T>>,
}

impl<T: 'static> FieldTable<T> {
    /// Start registering fields for an entity
    pub fn builder(entity: &'static str) -> FieldTableBuilder<T> {
        FieldTableBuilder {
            entity,
            fields: Vec::new(),
        }
    }
}

impl<T> FieldTable<T> {
    /// Name of the entity this table describes
    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldDef<T>> {
        self.fields.get(name)
    }

    /// Look up a field by name, failing with `UnknownField` when absent
    pub fn lookup(&self, name: &str) -> RepositoryResult<&FieldDef<T>> {
        self.get(name)
            .ok_or_else(|| RepositoryError::unknown_field(name))
    }

    /// Check whether a field is registered
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Registered field names in registration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }

    /// Number of registered fields
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no field is registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T> fmt::Debug for FieldTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTable")
            .field("entity", &self.entity)
            .field("fields", &self.order)
            .finish()
    }
}

/// Builder for [`FieldTable`]
pub struct FieldTableBuilder<T> {
    entity: &'static str,
    fields: Vec<FieldDef<T>>,
}

impl<T: 'static> FieldTableBuilder<T> {
    /// Register a field with an explicit kind and raw accessor
    ///
    /// The accessor should return values of `kind` or [`FieldValue::Null`].
    #[must_use]
    pub fn field<F>(mut self, name: &'static str, kind: FieldKind, accessor: F) -> Self
    where
        F: Fn(&T) -> FieldValue + Send + Sync + 'static,
    {
        self.fields.push(FieldDef {
            name,
            kind,
            accessor: Arc::new(accessor),
        });
        self
    }

    /// Register a text field
    #[must_use]
    pub fn text<F, S>(self, name: &'static str, accessor: F) -> Self
    where
        F: Fn(&T) -> S + Send + Sync + 'static,
        S: Into<String>,
    {
        self.field(name, FieldKind::Text, move |e| {
            FieldValue::Text(accessor(e).into())
        })
    }

    /// Register an integer field
    #[must_use]
    pub fn integer<F>(self, name: &'static str, accessor: F) -> Self
    where
        F: Fn(&T) -> i64 + Send + Sync + 'static,
    {
        self.field(name, FieldKind::Integer, move |e| {
            FieldValue::Integer(accessor(e))
        })
    }

    /// Register a floating point field
    #[must_use]
    pub fn float<F>(self, name: &'static str, accessor: F) -> Self
    where
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.field(name, FieldKind::Float, move |e| FieldValue::Float(accessor(e)))
    }

    /// Register a boolean field
    #[must_use]
    pub fn boolean<F>(self, name: &'static str, accessor: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.field(name, FieldKind::Boolean, move |e| {
            FieldValue::Boolean(accessor(e))
        })
    }

    /// Register a timestamp field
    #[must_use]
    pub fn datetime<F>(self, name: &'static str, accessor: F) -> Self
    where
        F: Fn(&T) -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.field(name, FieldKind::DateTime, move |e| {
            FieldValue::DateTime(accessor(e))
        })
    }

    /// Finish registration
    ///
    /// Fails when a name is registered twice or is not a plain identifier.
    pub fn build(self) -> Result<FieldTable<T>, FieldTableError> {
        let mut order = Vec::with_capacity(self.fields.len());
        let mut fields = HashMap::with_capacity(self.fields.len());

        for def in self.fields {
            if !is_identifier(def.name) {
                return Err(FieldTableError::InvalidName {
                    entity: self.entity,
                    field: def.name,
                });
            }
            if fields.contains_key(def.name) {
                return Err(FieldTableError::DuplicateField {
                    entity: self.entity,
                    field: def.name,
                });
            }
            order.push(def.name);
            fields.insert(def.name, def);
        }

        Ok(FieldTable {
            entity: self.entity,
            order,
            fields,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

//! Entity contract shared by repositories and stores

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::query::FieldTable;

/// A persistent record with a stable identity
///
/// # Example
///
/// ```rust
/// use std::sync::LazyLock;
/// use crudcore::query::FieldTable;
/// use crudcore::Entity;
///
/// #[derive(Debug, Clone)]
/// struct Tag {
///     id: i64,
///     label: String,
/// }
///
/// static TAG_FIELDS: LazyLock<FieldTable<Tag>> = LazyLock::new(|| {
///     FieldTable::builder("Tag")
///         .integer("id", |t: &Tag| t.id)
///         .text("label", |t: &Tag| t.label.clone())
///         .build()
///         .expect("tag field table is valid")
/// });
///
/// impl Entity for Tag {
///     type Id = i64;
///     const ENTITY_NAME: &'static str = "Tag";
///
///     fn id(&self) -> &i64 {
///         &self.id
///     }
///
///     fn unique_key(&self) -> String {
///         self.label.to_lowercase()
///     }
///
///     fn fields() -> &'static FieldTable<Self> {
///         &TAG_FIELDS
///     }
/// }
/// ```
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier type
    type Id: Clone + Ord + Hash + Display + Debug + Send + Sync + 'static;

    /// Name used in errors and logs
    const ENTITY_NAME: &'static str;

    /// Stable identifier
    fn id(&self) -> &Self::Id;

    /// Natural key checked for duplicates on insert
    ///
    /// Defaults to the id rendered as text.
    fn unique_key(&self) -> String {
        self.id().to_string()
    }

    /// Fields clients may filter and sort on
    fn fields() -> &'static FieldTable<Self>;
}

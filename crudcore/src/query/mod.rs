//! Filter and sort compiler
//!
//! Client-supplied query strings are compiled in three steps:
//!
//! 1. [`FilterExpression::parse`] tokenizes the filter string into clauses,
//!    validating field names against the entity's [`FieldTable`].
//! 2. [`Predicate::build`] turns the expression into a composable boolean
//!    function, checking each operator against the field's [`FieldKind`].
//! 3. [`Sorting::parse`] turns the sort string into ordered criteria that
//!    [`Sorting::apply`] uses for a stable multi-key sort.
//!
//! # Example
//!
//! ```rust,ignore
//! use crudcore::query::{FilterExpression, Predicate, Sorting};
//!
//! let fields = Subscription::fields();
//! let expr = FilterExpression::parse("status:eq:Active;age:ge:18", fields)?;
//! let predicate = Predicate::build(&expr, fields)?;
//! let sorting = Sorting::parse("age:desc,id", fields, &default_sorting)?;
//! ```

mod fields;
mod filter;
mod predicate;
mod sort;

pub use fields::{FieldDef, FieldKind, FieldTable, FieldTableBuilder, FieldTableError, FieldValue};
pub use filter::{
    FilterClause, FilterExpression, FilterValue, RelationalOperator, CLAUSE_SEPARATOR,
    PART_SEPARATOR, VALUE_SEPARATOR,
};
pub use predicate::Predicate;
pub use sort::{SortCriterion, SortDirection, Sorting};

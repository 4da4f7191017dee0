//! Sort string grammar and multi-key sorting
//!
//! A sort string is a comma-separated list of `field` or `field:asc|desc`
//! tokens. The first token is the primary key; later tokens only break ties.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::query::fields::{FieldTable, FieldValue};
use crate::repository::{RepositoryError, RepositoryResult};

/// Direction of one sort criterion
///
/// # Example
///
/// ```rust
/// use crudcore::query::SortDirection;
///
/// assert_eq!(format!("{}", SortDirection::Ascending), "asc");
/// assert_eq!(SortDirection::from_token("DESC"), Some(SortDirection::Descending));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl SortDirection {
    /// Map `asc` / `desc` (case-insensitive) to a direction
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("asc") {
            Some(Self::Ascending)
        } else if token.eq_ignore_ascii_case("desc") {
            Some(Self::Descending)
        } else {
            None
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// One `(field, direction)` level of a sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortCriterion {
    field_name: String,
    direction: SortDirection,
}

impl SortCriterion {
    /// Create a criterion
    pub fn new(field_name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field_name: field_name.into(),
            direction,
        }
    }

    /// Ascending criterion on a field
    pub fn ascending(field_name: impl Into<String>) -> Self {
        Self::new(field_name, SortDirection::Ascending)
    }

    /// Descending criterion on a field
    pub fn descending(field_name: impl Into<String>) -> Self {
        Self::new(field_name, SortDirection::Descending)
    }

    /// Field the criterion sorts on
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Sort direction
    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field_name, self.direction)
    }
}

/// Ordered, non-empty list of sort criteria
///
/// `Display` renders the sort grammar, so formatting and parsing round-trip.
///
/// # Example
///
/// ```rust
/// use crudcore::query::{SortCriterion, Sorting};
///
/// let sorting = Sorting::new(SortCriterion::descending("created_at"))
///     .then(SortCriterion::ascending("id"));
/// assert_eq!(sorting.to_string(), "created_at:desc,id:asc");
/// assert_eq!(sorting.primary().field_name(), "created_at");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sorting {
    criteria: Vec<SortCriterion>,
}

impl Sorting {
    /// Sorting with a single primary criterion
    pub fn new(primary: SortCriterion) -> Self {
        Self {
            criteria: vec![primary],
        }
    }

    /// Append a tie-breaking criterion
    #[must_use]
    pub fn then(mut self, criterion: SortCriterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Build from a list of criteria, `None` when the list is empty
    pub fn from_criteria(criteria: Vec<SortCriterion>) -> Option<Self> {
        (!criteria.is_empty()).then_some(Self { criteria })
    }

    /// Criteria in priority order
    pub fn criteria(&self) -> &[SortCriterion] {
        &self.criteria
    }

    /// The primary criterion
    pub fn primary(&self) -> &SortCriterion {
        &self.criteria[0]
    }

    /// Parse a sort string, falling back to `default` when it is empty
    ///
    /// # Errors
    ///
    /// - `UnknownField` for a field missing from the table
    /// - `MalformedSort` for an empty token, a bad direction or a repeated field
    pub fn parse<T>(raw: &str, fields: &FieldTable<T>, default: &Sorting) -> RepositoryResult<Self> {
        if raw.trim().is_empty() {
            return Ok(default.clone());
        }
        Self::parse_required(raw, fields)
    }

    /// Parse a sort string that must not be empty
    pub fn parse_required<T>(raw: &str, fields: &FieldTable<T>) -> RepositoryResult<Self> {
        let mut criteria: Vec<SortCriterion> = Vec::new();

        for token in raw.split(',') {
            let token = token.trim();
            let malformed = || RepositoryError::malformed_sort(token);

            let mut parts = token.split(':');
            let field = parts.next().map(str::trim).unwrap_or_default();
            if field.is_empty() {
                return Err(malformed());
            }
            let direction = match parts.next() {
                None => SortDirection::default(),
                Some(dir) => SortDirection::from_token(dir.trim()).ok_or_else(malformed)?,
            };
            if parts.next().is_some() {
                return Err(malformed());
            }

            let def = fields.lookup(field)?;
            if criteria.iter().any(|c| c.field_name == def.name()) {
                return Err(malformed());
            }
            criteria.push(SortCriterion::new(def.name(), direction));
        }

        Self::from_criteria(criteria).ok_or_else(|| RepositoryError::malformed_sort(raw))
    }

    /// Sort entities by these criteria
    ///
    /// The sort is stable: entities equal on every criterion keep their input
    /// order.
    pub fn apply<T>(&self, items: Vec<T>, fields: &FieldTable<T>) -> RepositoryResult<Vec<T>> {
        let defs = self
            .criteria
            .iter()
            .map(|c| fields.lookup(&c.field_name).map(|def| (def, c.direction)))
            .collect::<RepositoryResult<Vec<_>>>()?;

        let mut keyed: Vec<(Vec<FieldValue>, T)> = items
            .into_iter()
            .map(|item| {
                let key = defs.iter().map(|(def, _)| def.value_of(&item)).collect();
                (key, item)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            for ((left, right), (_, direction)) in a.iter().zip(b.iter()).zip(defs.iter()) {
                let ordering = match direction {
                    SortDirection::Ascending => left.sort_cmp(right),
                    SortDirection::Descending => right.sort_cmp(left),
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }
}

impl fmt::Display for Sorting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, criterion) in self.criteria.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{criterion}")?;
        }
        Ok(())
    }
}

impl Serialize for Sorting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample, subscription, Subscription};
    use crate::Entity;

    fn by_id() -> Sorting {
        Sorting::new(SortCriterion::ascending("id"))
    }

    fn parse(raw: &str) -> RepositoryResult<Sorting> {
        Sorting::parse(raw, Subscription::fields(), &by_id())
    }

    fn sorted_ids(raw: &str) -> Vec<i64> {
        let sorting = parse(raw).unwrap();
        sorting
            .apply(sample(), Subscription::fields())
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect()
    }

    #[test]
    fn test_direction_tokens() {
        assert_eq!(SortDirection::from_token("asc"), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_token("Desc"), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_token("down"), None);
        assert_eq!(SortDirection::default(), SortDirection::Ascending);
        assert_eq!(format!("{}", SortDirection::Descending), "desc");
    }

    #[test]
    fn test_empty_uses_default() {
        assert_eq!(parse("").unwrap(), by_id());
        assert_eq!(parse("  ").unwrap(), by_id());
    }

    #[test]
    fn test_direction_defaults_to_ascending() {
        let sorting = parse("age, name:DESC").unwrap();
        assert_eq!(
            sorting.criteria(),
            &[SortCriterion::ascending("age"), SortCriterion::descending("name")]
        );
    }

    #[test]
    fn test_unknown_field() {
        assert_eq!(
            parse("age,shoe_size:desc").unwrap_err(),
            RepositoryError::unknown_field("shoe_size")
        );
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(parse("age:sideways").unwrap_err(), RepositoryError::malformed_sort("age:sideways"));
        assert_eq!(parse("age,,name").unwrap_err(), RepositoryError::malformed_sort(""));
        assert_eq!(parse("age:asc:x").unwrap_err(), RepositoryError::malformed_sort("age:asc:x"));
        assert_eq!(parse("age,age:desc").unwrap_err(), RepositoryError::malformed_sort("age:desc"));
        assert_eq!(parse(":asc").unwrap_err(), RepositoryError::malformed_sort(":asc"));
    }

    #[test]
    fn test_parse_required_rejects_empty() {
        assert!(matches!(
            Sorting::parse_required("", Subscription::fields()).unwrap_err(),
            RepositoryError::MalformedSort { .. }
        ));
    }

    #[test]
    fn test_format_parse_round_trip() {
        let sorting = Sorting::new(SortCriterion::descending("status"))
            .then(SortCriterion::ascending("age"))
            .then(SortCriterion::descending("id"));
        let reparsed = parse(&sorting.to_string()).unwrap();
        assert_eq!(reparsed, sorting);
    }

    #[test]
    fn test_single_key_sorts() {
        assert_eq!(sorted_ids("age"), vec![4, 1, 2, 5, 3]);
        assert_eq!(sorted_ids("age:desc"), vec![3, 5, 2, 1, 4]);
        assert_eq!(sorted_ids("name"), vec![1, 3, 5, 2, 4]);
    }

    #[test]
    fn test_multi_key_sort_breaks_ties_by_next_criterion() {
        // Active: 1, 3, 5; Expired: 2; Pending: 4
        assert_eq!(sorted_ids("status,age:desc"), vec![3, 5, 1, 2, 4]);
        assert_eq!(sorted_ids("status:desc,id:desc"), vec![4, 2, 5, 3, 1]);
    }

    #[test]
    fn test_sort_is_stable_on_full_ties() {
        // active ties keep input (id) order within each group
        assert_eq!(sorted_ids("active"), vec![2, 4, 5, 1, 3]);
        assert_eq!(sorted_ids("active:desc"), vec![1, 3, 2, 4, 5]);
    }

    #[test]
    fn test_nulls_sort_first() {
        assert_eq!(sorted_ids("renewed_at"), vec![2, 4, 1, 5, 3]);
        assert_eq!(sorted_ids("renewed_at:desc"), vec![3, 5, 1, 2, 4]);
    }

    #[test]
    fn test_nan_scores_sort_before_numbers() {
        let rows: Vec<Subscription> = (0..200)
            .map(|id| {
                let mut row = subscription(id, "Row", "Active");
                row.score = if id % 3 == 0 {
                    f64::NAN
                } else {
                    ((id * 37) % 101) as f64
                };
                row
            })
            .collect();
        let nan_count = rows.iter().filter(|r| r.score.is_nan()).count();

        let ascending = parse("score")
            .unwrap()
            .apply(rows.clone(), Subscription::fields())
            .unwrap();
        assert!(ascending[..nan_count].iter().all(|r| r.score.is_nan()));
        assert!(ascending[nan_count..]
            .windows(2)
            .all(|pair| pair[0].score <= pair[1].score));

        let descending = parse("score:desc")
            .unwrap()
            .apply(rows, Subscription::fields())
            .unwrap();
        let numbers = descending.len() - nan_count;
        assert!(descending[numbers..].iter().all(|r| r.score.is_nan()));
        assert!(descending[..numbers]
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn test_from_criteria_requires_one() {
        assert!(Sorting::from_criteria(Vec::new()).is_none());
        assert!(Sorting::from_criteria(vec![SortCriterion::ascending("id")]).is_some());
    }

    #[test]
    fn test_serializes_as_grammar_string() {
        let sorting = Sorting::new(SortCriterion::ascending("id")).then(SortCriterion::descending("age"));
        assert_eq!(serde_json::to_string(&sorting).unwrap(), "\"id:asc,age:desc\"");
    }
}

//! Predicate builder
//!
//! Turns a [`FilterExpression`] into a [`Predicate`]: a cheap-to-clone boolean
//! function over an entity. The predicate keeps its source expression so a store
//! can translate it into its own query language instead of filtering in memory.

use std::fmt;
use std::sync::Arc;

use crate::query::fields::{FieldKind, FieldTable, FieldValue};
use crate::query::filter::{FilterExpression, FilterValue, RelationalOperator};
use crate::repository::{RepositoryError, RepositoryResult};

type Test<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Composable boolean function over an entity
pub struct Predicate<T> {
    test: Test<T>,
    expression: Option<FilterExpression>,
}

impl<T: 'static> Predicate<T> {
    /// Wrap an arbitrary test function
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
            expression: None,
        }
    }

    /// The predicate accepting every entity
    pub fn always() -> Self {
        Self {
            test: Arc::new(|_| true),
            expression: Some(FilterExpression::match_all()),
        }
    }

    /// Compile a parsed filter expression
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperator` when an operator does not apply to the field's kind
    /// - `MalformedFilter` when a value cannot be converted to the field's kind
    /// - `UnknownField` when the expression was parsed against another table
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let expr = FilterExpression::parse("age:ge:18", Subscription::fields())?;
    /// let adults = Predicate::build(&expr, Subscription::fields())?;
    /// assert!(adults.evaluate(&subscription));
    /// ```
    pub fn build(expression: &FilterExpression, fields: &FieldTable<T>) -> RepositoryResult<Self> {
        let mut clause_tests: Vec<Test<T>> = Vec::with_capacity(expression.clauses().len());

        for clause in expression.clauses() {
            let def = fields.lookup(clause.field_name())?.clone();
            let operator = clause.operator();
            check_operator(def.kind(), operator, def.name())?;

            let operands = clause
                .values()
                .iter()
                .map(|value| convert_operand(def.kind(), operator, value))
                .collect::<RepositoryResult<Vec<_>>>()?;

            clause_tests.push(Arc::new(move |entity: &T| {
                let actual = def.value_of(entity);
                operands
                    .iter()
                    .any(|expected| satisfies(operator, &actual, expected))
            }));
        }

        Ok(Self {
            test: Arc::new(move |entity: &T| clause_tests.iter().all(|test| test(entity))),
            expression: Some(expression.clone()),
        })
    }

    /// Both predicates must hold
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let (left, right) = (self.test, other.test);
        Self::new(move |entity| left(entity) && right(entity))
    }

    /// Either predicate must hold
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let (left, right) = (self.test, other.test);
        Self::new(move |entity| left(entity) || right(entity))
    }

    /// Negate the predicate
    #[must_use]
    pub fn not(self) -> Self {
        let inner = self.test;
        Self::new(move |entity| !inner(entity))
    }
}

impl<T> Predicate<T> {
    /// Evaluate against one entity
    pub fn evaluate(&self, entity: &T) -> bool {
        (self.test)(entity)
    }

    /// Source expression, when the predicate was compiled from a filter string
    ///
    /// Combinators drop the expression since the result is no longer a flat
    /// clause list.
    pub fn expression(&self) -> Option<&FilterExpression> {
        self.expression.as_ref()
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            test: Arc::clone(&self.test),
            expression: self.expression.clone(),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expr) => f.debug_tuple("Predicate").field(&expr.to_string()).finish(),
            None => f.write_str("Predicate(<fn>)"),
        }
    }
}

fn check_operator(kind: FieldKind, operator: RelationalOperator, field: &str) -> RepositoryResult<()> {
    let supported = match kind {
        FieldKind::Text => true,
        FieldKind::Integer | FieldKind::Float | FieldKind::DateTime => !operator.is_text_only(),
        FieldKind::Boolean => !operator.is_text_only() && !operator.is_ordering(),
    };
    if supported {
        Ok(())
    } else {
        Err(RepositoryError::unsupported_operator(field, operator))
    }
}

fn convert_operand(
    kind: FieldKind,
    operator: RelationalOperator,
    value: &FilterValue,
) -> RepositoryResult<FieldValue> {
    match value {
        FilterValue::Null => match operator {
            RelationalOperator::Equal | RelationalOperator::NotEqual | RelationalOperator::In => {
                Ok(FieldValue::Null)
            }
            _ => Err(RepositoryError::malformed_filter(value.to_string())),
        },
        FilterValue::Literal(raw) => FieldValue::parse(kind, raw)
            .ok_or_else(|| RepositoryError::malformed_filter(raw.as_str())),
    }
}

fn satisfies(operator: RelationalOperator, actual: &FieldValue, expected: &FieldValue) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};

    match operator {
        RelationalOperator::Equal | RelationalOperator::In => actual == expected,
        RelationalOperator::NotEqual => actual != expected,
        RelationalOperator::GreaterThan => actual.compare(expected) == Some(Greater),
        RelationalOperator::GreaterOrEqual => {
            matches!(actual.compare(expected), Some(Greater | Equal))
        }
        RelationalOperator::LessThan => actual.compare(expected) == Some(Less),
        RelationalOperator::LessOrEqual => matches!(actual.compare(expected), Some(Less | Equal)),
        RelationalOperator::Contains => text_pair(actual, expected).is_some_and(|(a, e)| a.contains(e)),
        RelationalOperator::StartsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(e))
        }
        RelationalOperator::EndsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e))
        }
    }
}

fn text_pair<'a>(actual: &'a FieldValue, expected: &'a FieldValue) -> Option<(&'a str, &'a str)> {
    Some((actual.as_text()?, expected.as_text()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{subscription, Subscription};
    use crate::Entity;

    fn compile(raw: &str) -> RepositoryResult<Predicate<Subscription>> {
        let fields = Subscription::fields();
        let expr = FilterExpression::parse(raw, fields)?;
        Predicate::build(&expr, fields)
    }

    fn matching(raw: &str) -> Vec<i64> {
        let predicate = compile(raw).unwrap();
        crate::test_support::sample()
            .into_iter()
            .filter(|s| predicate.evaluate(s))
            .map(|s| s.id)
            .collect()
    }

    #[test]
    fn test_empty_expression_matches_everything() {
        assert_eq!(matching(""), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_equality_and_in() {
        assert_eq!(matching("status:eq:Active"), vec![1, 3, 5]);
        assert_eq!(matching("status:in:Expired,Pending"), vec![2, 4]);
        assert_eq!(matching("status:eq:Expired,Pending"), vec![2, 4]);
        assert_eq!(matching("status:ne:Active"), vec![2, 4]);
    }

    #[test]
    fn test_clauses_are_and_combined() {
        assert_eq!(matching("status:eq:Active;age:ge:40"), vec![3, 5]);
        assert_eq!(matching("status:eq:Active;age:ge:40;active:eq:false"), vec![5]);
    }

    #[test]
    fn test_ordering_operators() {
        assert_eq!(matching("age:gt:40"), vec![3]);
        assert_eq!(matching("age:ge:40"), vec![3, 5]);
        assert_eq!(matching("age:lt:30"), vec![1, 4]);
        assert_eq!(matching("age:le:30"), vec![1, 2, 4]);
        assert_eq!(matching("score:gt:4.5"), vec![2, 5]);
    }

    #[test]
    fn test_text_operators_are_case_sensitive() {
        assert_eq!(matching("name:contains:an"), vec![2, 4]);
        assert_eq!(matching("name:startswith:A"), vec![1]);
        assert_eq!(matching("name:startswith:a"), Vec::<i64>::new());
        assert_eq!(matching("email:endswith:example.org"), vec![3, 4]);
    }

    #[test]
    fn test_datetime_and_null() {
        assert_eq!(matching("renewed_at:eq:null"), vec![2, 4]);
        assert_eq!(matching("renewed_at:ne:null"), vec![1, 3, 5]);
        assert_eq!(matching("renewed_at:ge:2024-06-01"), vec![3, 5]);
        assert_eq!(matching(r#"renewed_at:lt:"2024-06-01T00:00:00Z""#), vec![1]);
        assert_eq!(matching("renewed_at:in:null,2024-01-15"), vec![1, 2, 4]);
    }

    #[test]
    fn test_timestamp_with_colons_must_be_quoted() {
        assert_eq!(
            compile("renewed_at:lt:2024-06-01T00:00:00Z").unwrap_err(),
            RepositoryError::malformed_filter("renewed_at:lt:2024-06-01T00:00:00Z")
        );
        assert_eq!(
            matching(r#"renewed_at:ge:"2024-06-01T00:00:00+02:00""#),
            vec![3, 5]
        );
    }

    #[test]
    fn test_boolean_field() {
        assert_eq!(matching("active:eq:true"), vec![1, 3]);
        assert_eq!(
            compile("active:gt:true").unwrap_err(),
            RepositoryError::unsupported_operator("active", RelationalOperator::GreaterThan)
        );
    }

    #[test]
    fn test_text_operator_on_number_is_unsupported() {
        assert_eq!(
            compile("age:contains:4").unwrap_err(),
            RepositoryError::unsupported_operator("age", RelationalOperator::Contains)
        );
    }

    #[test]
    fn test_unconvertible_value_is_malformed() {
        assert_eq!(
            compile("age:eq:old").unwrap_err(),
            RepositoryError::malformed_filter("old")
        );
        assert_eq!(
            compile("age:gt:null").unwrap_err(),
            RepositoryError::malformed_filter("null")
        );
    }

    #[test]
    fn test_combinators() {
        let fields = Subscription::fields();
        let active = Predicate::build(&FilterExpression::parse("status:eq:Active", fields).unwrap(), fields)
            .unwrap();
        let young = Predicate::new(|s: &Subscription| s.age < 30);

        let both = active.clone().and(young.clone());
        let either = active.clone().or(young.clone());
        let inactive = active.clone().not();

        let sample = crate::test_support::sample();
        let ids = |p: &Predicate<Subscription>| {
            sample.iter().filter(|s| p.evaluate(s)).map(|s| s.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(&both), vec![1]);
        assert_eq!(ids(&either), vec![1, 3, 4, 5]);
        assert_eq!(ids(&inactive), vec![2, 4]);
        assert!(both.expression().is_none());
        assert_eq!(
            active.expression().map(ToString::to_string),
            Some("status:eq:Active".to_string())
        );
    }

    #[test]
    fn test_always() {
        let always = Predicate::<Subscription>::always();
        assert!(always.evaluate(&subscription(9, "x", "Active")));
        assert!(always.expression().is_some_and(FilterExpression::is_match_all));
    }
}

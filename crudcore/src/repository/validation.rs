//! Validation-before-write contract
//!
//! Write repositories run the entity's [`Validator`] before touching the
//! store. Validators are looked up per entity type in a [`ValidatorRegistry`];
//! entity types without a registered validator accept everything.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One field-level validation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field the message refers to
    pub field: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates an entity before it is written
///
/// An empty result means the entity is valid. Any closure
/// `Fn(&T) -> Vec<FieldError>` is a validator.
///
/// # Example
///
/// ```rust
/// use crudcore::repository::{FieldError, Validator};
///
/// struct Account {
///     email: String,
/// }
///
/// let validator = |a: &Account| {
///     if a.email.contains('@') {
///         Vec::new()
///     } else {
///         vec![FieldError::new("email", "must contain '@'")]
///     }
/// };
///
/// assert!(validator.validate(&Account { email: "a@b.c".into() }).is_empty());
/// assert_eq!(validator.validate(&Account { email: "nope".into() }).len(), 1);
/// ```
pub trait Validator<T>: Send + Sync {
    /// Return every field error of `entity`
    fn validate(&self, entity: &T) -> Vec<FieldError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&T) -> Vec<FieldError> + Send + Sync,
{
    fn validate(&self, entity: &T) -> Vec<FieldError> {
        self(entity)
    }
}

/// Validator accepting every entity
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<T> Validator<T> for AcceptAll {
    fn validate(&self, _entity: &T) -> Vec<FieldError> {
        Vec::new()
    }
}

/// Validators keyed by entity type
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator, builder style
    #[must_use]
    pub fn with<T, V>(mut self, validator: V) -> Self
    where
        T: 'static,
        V: Validator<T> + 'static,
    {
        self.register::<T, V>(validator);
        self
    }

    /// Register a validator, replacing any previous one for `T`
    pub fn register<T, V>(&mut self, validator: V)
    where
        T: 'static,
        V: Validator<T> + 'static,
    {
        let validator: Arc<dyn Validator<T>> = Arc::new(validator);
        self.validators.insert(TypeId::of::<T>(), Arc::new(validator));
    }

    /// Validator for `T`, or [`AcceptAll`] when none is registered
    pub fn validator_for<T: 'static>(&self) -> Arc<dyn Validator<T>> {
        self.validators
            .get(&TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<Arc<dyn Validator<T>>>())
            .cloned()
            .unwrap_or_else(|| Arc::new(AcceptAll))
    }

    /// Whether a validator is registered for `T`
    pub fn contains<T: 'static>(&self) -> bool {
        self.validators.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered validators
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether no validator is registered
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.validators.len())
            .finish()
    }
}

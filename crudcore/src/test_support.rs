//! Shared fixtures for unit tests

use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};

use crate::query::{FieldKind, FieldTable};
use crate::repository::FieldError;
use crate::Entity;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Subscription {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub status: String,
    pub age: i64,
    pub score: f64,
    pub active: bool,
    pub renewed_at: Option<DateTime<Utc>>,
}

static SUBSCRIPTION_FIELDS: LazyLock<FieldTable<Subscription>> = LazyLock::new(|| {
    FieldTable::builder("Subscription")
        .integer("id", |s: &Subscription| s.id)
        .text("name", |s: &Subscription| s.name.clone())
        .text("email", |s: &Subscription| s.email.clone())
        .text("status", |s: &Subscription| s.status.clone())
        .integer("age", |s: &Subscription| s.age)
        .float("score", |s: &Subscription| s.score)
        .boolean("active", |s: &Subscription| s.active)
        .field("renewed_at", FieldKind::DateTime, |s: &Subscription| s.renewed_at.into())
        .build()
        .expect("subscription field table is valid")
});

impl Entity for Subscription {
    type Id = i64;
    const ENTITY_NAME: &'static str = "Subscription";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn unique_key(&self) -> String {
        self.email.clone()
    }

    fn fields() -> &'static FieldTable<Self> {
        &SUBSCRIPTION_FIELDS
    }
}

/// Entity with no registered validator and no seeded rows
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tag {
    pub id: String,
    pub label: String,
}

static TAG_FIELDS: LazyLock<FieldTable<Tag>> = LazyLock::new(|| {
    FieldTable::builder("Tag")
        .text("id", |t: &Tag| t.id.clone())
        .text("label", |t: &Tag| t.label.clone())
        .build()
        .expect("tag field table is valid")
});

impl Entity for Tag {
    type Id = String;
    const ENTITY_NAME: &'static str = "Tag";

    fn id(&self) -> &String {
        &self.id
    }

    fn fields() -> &'static FieldTable<Self> {
        &TAG_FIELDS
    }
}

fn at(y: i32, m: u32, d: u32, h: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single()
}

/// Subscription with defaulted numbers and an email derived from the name
pub(crate) fn subscription(id: i64, name: &str, status: &str) -> Subscription {
    Subscription {
        id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        status: status.to_string(),
        age: 30,
        score: 1.0,
        active: true,
        renewed_at: None,
    }
}

/// Five subscriptions in id order
pub(crate) fn sample() -> Vec<Subscription> {
    let row = |id, name: &str, email: &str, status: &str, age, score, active, renewed_at| Subscription {
        id,
        name: name.to_string(),
        email: email.to_string(),
        status: status.to_string(),
        age,
        score,
        active,
        renewed_at,
    };
    vec![
        row(1, "Alice", "alice@example.com", "Active", 25, 3.5, true, at(2024, 1, 15, 0)),
        row(2, "Dana", "dana@example.com", "Expired", 30, 4.8, false, None),
        row(3, "Bob", "bob@example.org", "Active", 52, 4.5, true, at(2024, 7, 1, 12)),
        row(4, "Frank", "frank@example.org", "Pending", 19, 2.0, false, None),
        row(5, "Carol", "carol@example.net", "Active", 40, 5.0, false, at(2024, 6, 1, 0)),
    ]
}

/// Requires a non-empty name and an email containing `@`
pub(crate) fn subscription_validator(
) -> impl Fn(&Subscription) -> Vec<FieldError> + Send + Sync + Clone + 'static {
    |s: &Subscription| {
        let mut errors = Vec::new();
        if s.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if !s.email.contains('@') {
            errors.push(FieldError::new("email", "must contain '@'"));
        }
        errors
    }
}

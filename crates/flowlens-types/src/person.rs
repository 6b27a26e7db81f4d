use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PERSON_ID: &str = "person-001";

/// Minimal person record returned by the projection list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Input for a create operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
}

impl NewPerson {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            hire_date: None,
        }
    }

    pub fn hired_on(mut self, date: NaiveDate) -> Self {
        self.hire_date = Some(date);
        self
    }
}

/// Seed data shipped with the demo services: `person-001` through `person-005`.
pub fn is_seed_person(id: &str) -> bool {
    id.strip_prefix("person-00")
        .map(|rest| matches!(rest, "1" | "2" | "3" | "4" | "5"))
        .unwrap_or(false)
}

/// Seed persons first, then everyone else by name.
pub fn sort_persons(persons: &mut [PersonSummary]) {
    persons.sort_by(|a, b| {
        is_seed_person(&b.id)
            .cmp(&is_seed_person(&a.id))
            .then_with(|| a.name.cmp(&b.name))
    });
}

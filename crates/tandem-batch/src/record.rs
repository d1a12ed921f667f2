//! Person record shared by both stages of the people job

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stage 1 output keyed by correlation key
pub type PersonTable = HashMap<String, Person>;

/// A row of the people job
///
/// Stage 1 input carries `firstName` and `lastName`, stage 2 input carries
/// `firstName` and `age`; the merged record carries all three. Every field is
/// kept as text, exactly as it arrived from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

impl Person {
    pub fn named(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: Some(last_name.into()),
            age: None,
        }
    }

    pub fn aged(first_name: impl Into<String>, age: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: None,
            age: Some(age.into()),
        }
    }

    pub fn full(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        age: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: Some(last_name.into()),
            age: Some(age.into()),
        }
    }

    /// Correlation key of this record
    pub fn key(&self) -> String {
        normalize_key(&self.first_name)
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firstName: {}, lastName: {}, age: {}",
            self.first_name,
            self.last_name.as_deref().unwrap_or("null"),
            self.age.as_deref().unwrap_or("null")
        )
    }
}

/// Normalize a first name into the key both stages join on
pub fn normalize_key(first_name: &str) -> String {
    first_name.trim().to_uppercase()
}

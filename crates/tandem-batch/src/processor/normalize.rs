//! Stage 1 processor: normalizes the correlation key

use tracing::trace;

use super::ItemProcessor;
use crate::error::Result;
use crate::record::{normalize_key, Person};

/// Uppercases the first name and keeps the last name untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizeProcessor;

impl ItemProcessor<Person> for NormalizeProcessor {
    type Output = Person;

    fn process(&self, person: Person) -> Result<Option<Person>> {
        let normalized = Person {
            first_name: normalize_key(&person.first_name),
            last_name: person.last_name.clone(),
            age: person.age.clone(),
        };
        trace!(from = %person, to = %normalized, "Normalized record");
        Ok(Some(normalized))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercases_first_name_only() {
        let out = NormalizeProcessor
            .process(Person::named("john", "doe"))
            .unwrap()
            .unwrap();
        assert_eq!(out, Person::named("JOHN", "doe"));
    }

    #[test]
    fn test_is_deterministic() {
        let a = NormalizeProcessor.process(Person::named("Jane", "Smith")).unwrap();
        let b = NormalizeProcessor.process(Person::named("Jane", "Smith")).unwrap();
        assert_eq!(a, b);
    }
}

use serde_json::{Map, Value};

use super::{ValidationOutcome, Validator};

/// Envelope fields that hold the page of records in paginated responses.
const GENERIC_COLLECTIONS: [&str; 3] = ["items", "data", "results"];

/// Fallback check for kinds without a dedicated validator.
///
/// Accepts anything non-null; an `id` field, when present, must not be null.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericValidator;

impl Validator for GenericValidator {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        match value {
            Value::Null => ValidationOutcome::reject("value is null"),
            Value::Object(map) => check_optional_id(map, None),
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Value::Null => {
                            return ValidationOutcome::reject(format!("item {index} is null"))
                        }
                        Value::Object(map) => {
                            let outcome = check_optional_id(map, Some(index));
                            if !outcome.valid {
                                return outcome;
                            }
                        }
                        _ => {}
                    }
                }
                ValidationOutcome::ok()
            }
            _ => ValidationOutcome::ok(),
        }
    }
}

fn check_optional_id(map: &Map<String, Value>, index: Option<usize>) -> ValidationOutcome {
    match (map.get("id"), index) {
        (Some(Value::Null), Some(index)) => {
            ValidationOutcome::reject(format!("item {index} has a null id"))
        }
        (Some(Value::Null), None) => ValidationOutcome::reject("id is null"),
        _ => ValidationOutcome::ok(),
    }
}

/// Check for record-shaped resources (jobs, invoices, ...).
///
/// Accepts a single record, a list of records, or an envelope object whose
/// collection field holds the records. Every record must carry the required
/// fields with non-null values, and an `id` must be a number or non-empty string.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    required: Vec<&'static str>,
    collections: Vec<&'static str>,
}

impl RecordValidator {
    /// `required` fields every record must carry; `collections` are the
    /// envelope fields (besides `items`/`data`/`results`) holding records.
    pub fn new(required: &[&'static str], collections: &[&'static str]) -> Self {
        Self {
            required: required.to_vec(),
            collections: collections.to_vec(),
        }
    }

    fn check_record(&self, record: &Value, label: &str) -> ValidationOutcome {
        let Value::Object(map) = record else {
            return ValidationOutcome::reject(format!("{label} is not an object"));
        };

        for field in &self.required {
            match map.get(*field) {
                None => return ValidationOutcome::reject(format!("{label} is missing '{field}'")),
                Some(Value::Null) => {
                    return ValidationOutcome::reject(format!("{label} has a null '{field}'"))
                }
                Some(_) => {}
            }
        }

        match map.get("id") {
            Some(Value::String(id)) if id.trim().is_empty() => {
                ValidationOutcome::reject(format!("{label} has an empty id"))
            }
            Some(Value::Array(_)) | Some(Value::Object(_)) | Some(Value::Bool(_)) => {
                ValidationOutcome::reject(format!("{label} has a malformed id"))
            }
            _ => ValidationOutcome::ok(),
        }
    }

    fn check_list(&self, items: &[Value]) -> ValidationOutcome {
        for (index, item) in items.iter().enumerate() {
            let outcome = self.check_record(item, &format!("item {index}"));
            if !outcome.valid {
                return outcome;
            }
        }
        ValidationOutcome::ok()
    }

    /// Returns the envelope field name if the object wraps a collection.
    fn envelope_field<'a>(
        &self,
        map: &'a Map<String, Value>,
    ) -> Option<(&'static str, &'a Value)> {
        self.collections
            .iter()
            .copied()
            .chain(GENERIC_COLLECTIONS)
            .find_map(|name| map.get(name).map(|value| (name, value)))
    }
}

impl Validator for RecordValidator {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        match value {
            Value::Null => ValidationOutcome::reject("value is null"),
            Value::Array(items) => self.check_list(items),
            Value::Object(map) if map.is_empty() => ValidationOutcome::ok(),
            Value::Object(map) => match self.envelope_field(map) {
                // A record owning a generic list field (invoice `items`) is
                // still a record. Named collections always mark an envelope.
                Some((name, _))
                    if map.contains_key("id") && GENERIC_COLLECTIONS.contains(&name) =>
                {
                    self.check_record(value, "record")
                }
                Some((_, Value::Array(items))) => self.check_list(items),
                Some((name, _)) => {
                    ValidationOutcome::reject(format!("collection '{name}' is not a list"))
                }
                None => self.check_record(value, "record"),
            },
            other => ValidationOutcome::reject(format!("expected record, got {}", kind_of(other))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

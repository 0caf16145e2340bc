//! Record type as persisted by the record source.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category label used when a record carries no usable category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A single record from the backing store.
///
/// Only `price` and `category` matter to the aggregate. Both are kept as raw
/// JSON so that records with unexpected shapes still load; unknown fields
/// are preserved in `extra` and written back unchanged.
///
/// An `id` that is not an integer or a `name` that is not a string loads
/// as `None`, with the raw value kept in `extra` under the same key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawRecord")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub category: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub price: Option<Value>,

    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(ignore))]
    pub extra: Map<String, Value>,
}

/// Wire shape before `id` and `name` are checked.
#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        let mut extra = raw.extra;
        let id = match raw.id {
            Some(Value::Number(n)) if n.as_i64().is_some() => n.as_i64(),
            Some(Value::Null) | None => None,
            Some(other) => {
                extra.insert("id".to_string(), other);
                None
            }
        };
        let name = match raw.name {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => {
                extra.insert("name".to_string(), other);
                None
            }
        };
        Self {
            id,
            name,
            category: raw.category,
            price: raw.price,
            extra,
        }
    }
}

impl Record {
    /// Build a record with the three fields the aggregate reads.
    pub fn new(id: i64, name: impl Into<String>, category: impl Into<String>, price: f64) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
            category: Some(Value::String(category.into())),
            price: Some(Value::from(price)),
            extra: Map::new(),
        }
    }

    /// Price as a number. Absent or non-numeric prices count as 0.
    pub fn numeric_price(&self) -> f64 {
        match &self.price {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Category key for the histogram.
    ///
    /// Missing, null, empty, `false` and zero all fall back to
    /// [`UNCATEGORIZED`]; other non-string scalars use their JSON text.
    pub fn category_label(&self) -> String {
        match &self.category {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            None | Some(Value::Null) | Some(Value::Bool(false)) | Some(Value::String(_)) => {
                UNCATEGORIZED.to_string()
            }
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => UNCATEGORIZED.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Merge the fields of a JSON object into this record.
    ///
    /// Known fields are replaced when present in `patch`, unknown fields go
    /// to `extra`. The id is left to the caller.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            merged.insert(key, value);
        }
        *self = serde_json::from_value(Value::Object(merged))?;
        Ok(())
    }

    /// Assign an integer id, dropping any unparsed id kept in `extra`.
    pub fn set_id(&mut self, id: i64) {
        self.extra.remove("id");
        self.id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_from(value: Value) -> Record {
        serde_json::from_value(value).expect("valid record json")
    }

    #[test]
    fn test_numeric_price_ignores_non_numbers() {
        assert_eq!(record_from(json!({"price": 12.5})).numeric_price(), 12.5);
        assert_eq!(record_from(json!({"price": "12.5"})).numeric_price(), 0.0);
        assert_eq!(record_from(json!({"price": null})).numeric_price(), 0.0);
        assert_eq!(record_from(json!({})).numeric_price(), 0.0);
    }

    #[test]
    fn test_category_label_fallbacks() {
        assert_eq!(record_from(json!({"category": "A"})).category_label(), "A");
        assert_eq!(record_from(json!({})).category_label(), UNCATEGORIZED);
        assert_eq!(record_from(json!({"category": ""})).category_label(), UNCATEGORIZED);
        assert_eq!(record_from(json!({"category": null})).category_label(), UNCATEGORIZED);
        assert_eq!(record_from(json!({"category": false})).category_label(), UNCATEGORIZED);
        assert_eq!(record_from(json!({"category": 0})).category_label(), UNCATEGORIZED);
        assert_eq!(record_from(json!({"category": 7})).category_label(), "7");
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = json!({"id": 3, "name": "Desk", "price": 10, "color": "oak"});
        let record = record_from(raw.clone());
        assert_eq!(record.extra.get("color"), Some(&json!("oak")));
        assert_eq!(serde_json::to_value(&record).expect("serialize"), raw);
    }

    #[test]
    fn test_odd_id_and_name_load_and_round_trip() {
        let raw = json!({"id": "x-2", "name": 42, "price": 50});
        let record = record_from(raw.clone());
        assert_eq!(record.id, None);
        assert_eq!(record.name, None);
        assert_eq!(record.numeric_price(), 50.0);
        assert_eq!(record.extra.get("id"), Some(&json!("x-2")));
        assert_eq!(serde_json::to_value(&record).expect("serialize"), raw);

        let fractional = record_from(json!({"id": 1.5, "name": null}));
        assert_eq!(fractional.id, None);
        assert_eq!(fractional.extra.get("id"), Some(&json!(1.5)));
        assert!(fractional.extra.get("name").is_none());
    }

    #[test]
    fn test_set_id_replaces_unparsed_id() {
        let mut record = record_from(json!({"id": "legacy", "price": 5}));
        record.set_id(9);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["id"], 9);
        assert_eq!(json.as_object().map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_merge_overrides_and_extends() {
        let mut record = Record::new(1, "Laptop", "Electronics", 999.0);
        let patch = json!({"price": 899, "stock": 4});
        record
            .merge(patch.as_object().cloned().unwrap_or_default())
            .expect("merge");

        assert_eq!(record.numeric_price(), 899.0);
        assert_eq!(record.name.as_deref(), Some("Laptop"));
        assert_eq!(record.extra.get("stock"), Some(&json!(4)));
    }
}

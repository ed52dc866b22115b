//! Optimistic patches applied to cached values.
//!
//! A cached value is one of three shapes: a page envelope
//! (`{ data: [...], pagination }`), a bare array, or a single object. Items
//! are identified by their `id` or `_id` field.

use std::fmt;
use std::sync::Arc;

use campus_domain::CacheKey;
use serde_json::{Map, Value};

type CustomPatch = Arc<dyn Fn(&CacheKey, &Value) -> Option<Value> + Send + Sync>;

/// The expected effect of a write, applied before the server confirms it.
#[derive(Clone, Default)]
pub enum Patch {
    /// Leave cached values alone.
    #[default]
    None,
    /// Shallow-merge `fields` into the item with `id`.
    Merge {
        /// Item identity.
        id: String,
        /// Fields to overwrite.
        fields: Value,
    },
    /// Remove the item with `id`.
    Remove {
        /// Item identity.
        id: String,
    },
    /// Insert an item at the front of lists.
    Prepend(Value),
    /// Insert an item at the end of lists.
    Append(Value),
    /// Add a signed delta to a numeric field of the item with `id`.
    Adjust {
        /// Item identity.
        id: String,
        /// Numeric field name.
        field: String,
        /// Signed amount.
        delta: i64,
    },
    /// Replace the whole cached value.
    Replace(Value),
    /// Arbitrary transformation. Returning `None` removes the entry.
    Custom(CustomPatch),
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Merge { id, fields } => f
                .debug_struct("Merge")
                .field("id", id)
                .field("fields", fields)
                .finish(),
            Self::Remove { id } => f.debug_struct("Remove").field("id", id).finish(),
            Self::Prepend(item) => f.debug_tuple("Prepend").field(item).finish(),
            Self::Append(item) => f.debug_tuple("Append").field(item).finish(),
            Self::Adjust { id, field, delta } => f
                .debug_struct("Adjust")
                .field("id", id)
                .field("field", field)
                .field("delta", delta)
                .finish(),
            Self::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Patch {
    /// Update: merge `fields` into item `id`.
    #[must_use]
    pub fn merge(id: impl Into<String>, fields: Value) -> Self {
        Self::Merge {
            id: id.into(),
            fields,
        }
    }

    /// Delete: remove item `id`.
    #[must_use]
    pub fn remove(id: impl Into<String>) -> Self {
        Self::Remove { id: id.into() }
    }

    /// Create: insert `item` first.
    #[must_use]
    pub const fn prepend(item: Value) -> Self {
        Self::Prepend(item)
    }

    /// Create: insert `item` last.
    #[must_use]
    pub const fn append(item: Value) -> Self {
        Self::Append(item)
    }

    /// Numeric delta on `field` of item `id`, e.g. an XP award or deduction.
    #[must_use]
    pub fn adjust(id: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        Self::Adjust {
            id: id.into(),
            field: field.into(),
            delta,
        }
    }

    /// Arbitrary transformation.
    ///
    /// The closure runs while the query cache is locked and must not call
    /// back into it.
    #[must_use]
    pub fn custom(f: impl Fn(&CacheKey, &Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Returns the patched value for `key`, or `None` if the entry should be
    /// removed. Shapes the patch does not apply to are returned unchanged.
    #[must_use]
    pub fn apply(&self, key: &CacheKey, value: &Value) -> Option<Value> {
        match self {
            Self::None => Some(value.clone()),
            Self::Replace(replacement) => Some(replacement.clone()),
            Self::Custom(f) => f(key, value),
            _ => self.apply_structural(key, value),
        }
    }

    fn apply_structural(&self, key: &CacheKey, value: &Value) -> Option<Value> {
        let mut value = value.clone();
        match &mut value {
            Value::Array(items) => {
                self.apply_to_list(items);
            }
            Value::Object(object) if object.get("data").is_some_and(Value::is_array) => {
                let delta = match object.get_mut("data") {
                    Some(Value::Array(items)) => self.apply_to_list(items),
                    _ => 0,
                };
                if delta != 0 {
                    adjust_totals(object, delta);
                }
            }
            Value::Object(object) => {
                if !self.targets(key, object) {
                    return Some(value);
                }
                match self {
                    Self::Remove { .. } => return None,
                    Self::Merge { fields, .. } => merge_fields(object, fields),
                    Self::Adjust { field, delta, .. } => add_delta(object, field, *delta),
                    _ => {}
                }
            }
            _ => {}
        }
        Some(value)
    }

    /// Applies a list operation. Returns the change in item count.
    fn apply_to_list(&self, items: &mut Vec<Value>) -> i64 {
        match self {
            Self::Remove { id } => {
                let before = items.len();
                items.retain(|item| identity(item).as_deref() != Some(id.as_str()));
                -i64::try_from(before - items.len()).unwrap_or(0)
            }
            Self::Prepend(item) => {
                items.insert(0, item.clone());
                1
            }
            Self::Append(item) => {
                items.push(item.clone());
                1
            }
            Self::Merge { id, fields } => {
                for item in items.iter_mut().filter(|i| identity(i).as_deref() == Some(id)) {
                    if let Value::Object(object) = item {
                        merge_fields(object, fields);
                    }
                }
                0
            }
            Self::Adjust { id, field, delta } => {
                for item in items.iter_mut().filter(|i| identity(i).as_deref() == Some(id)) {
                    if let Value::Object(object) = item {
                        add_delta(object, field, *delta);
                    }
                }
                0
            }
            Self::None | Self::Replace(_) | Self::Custom(_) => 0,
        }
    }

    fn targets(&self, key: &CacheKey, object: &Map<String, Value>) -> bool {
        let id = match self {
            Self::Remove { id } | Self::Merge { id, .. } | Self::Adjust { id, .. } => id,
            _ => return false,
        };
        key.detail_id() == Some(id.as_str())
            || identity_of(object).as_deref() == Some(id.as_str())
    }
}

/// Identity of a list item: its `id`, else its `_id`, as a string.
#[must_use]
pub fn identity(item: &Value) -> Option<String> {
    item.as_object().and_then(identity_of)
}

fn identity_of(object: &Map<String, Value>) -> Option<String> {
    let raw = object.get("id").or_else(|| object.get("_id"))?;
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn merge_fields(object: &mut Map<String, Value>, fields: &Value) {
    if let Value::Object(fields) = fields {
        for (k, v) in fields {
            object.insert(k.clone(), v.clone());
        }
    }
}

fn add_delta(object: &mut Map<String, Value>, field: &str, delta: i64) {
    let current = object.get(field);
    let next = match current {
        Some(Value::Number(n)) if n.is_i64() => {
            Value::from(n.as_i64().unwrap_or(0).saturating_add(delta))
        }
        #[allow(clippy::cast_precision_loss)]
        Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or(0.0) + delta as f64),
        _ => Value::from(delta),
    };
    object.insert(field.to_string(), next);
}

fn adjust_totals(object: &mut Map<String, Value>, delta: i64) {
    let Some(Value::Object(pagination)) = object.get_mut("pagination") else {
        return;
    };
    for field in ["totalRecords", "totalCount"] {
        if let Some(total) = pagination.get(field).and_then(Value::as_i64) {
            pagination.insert(field.to_string(), Value::from((total + delta).max(0)));
        }
    }
}

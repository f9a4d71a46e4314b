//! Typed documents.
//!
//! The interpreter works on [`Value`] trees. A type that can lower itself to a
//! document and be rebuilt from one implements [`Restorable`], and
//! [`apply`](crate::apply) hands back the same type it was given.

use crate::error::{AssignError, Result};
use crate::operation::UpdateOperation;
use crate::value::{Map, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can be rebuilt from its document form.
pub trait Restorable: Sized {
    /// Lower to a document.
    fn to_document(&self) -> Result<Value>;

    /// Rebuild from a patched document.
    fn restore(document: Value) -> Result<Self>;
}

impl Restorable for Value {
    fn to_document(&self) -> Result<Value> {
        Ok(self.clone())
    }

    fn restore(document: Value) -> Result<Self> {
        Ok(document)
    }
}

impl Restorable for UpdateOperation {
    fn to_document(&self) -> Result<Value> {
        Ok(self.to_value())
    }

    fn restore(document: Value) -> Result<Self> {
        UpdateOperation::from_value(&document)
    }
}

/// Lower any serializable type.
pub fn to_document_via_serde<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map(Value::from)
        .map_err(|e| AssignError::restore(std::any::type_name::<T>(), e.to_string()))
}

/// Rebuild any deserializable type.
pub fn restore_via_serde<T: DeserializeOwned>(document: Value) -> Result<T> {
    serde_json::from_value(serde_json::Value::from(&document))
        .map_err(|e| AssignError::restore(std::any::type_name::<T>(), e.to_string()))
}

/// Field reader for hand-written [`Restorable::restore`] impls.
pub struct Fields<'a> {
    type_name: &'static str,
    map: &'a Map,
}

impl<'a> Fields<'a> {
    /// Read the fields of a mapping document.
    pub fn of(type_name: &'static str, document: &'a Value) -> Result<Self> {
        let map = document.as_object().ok_or_else(|| {
            AssignError::restore(type_name, format!("expected a mapping, got {}", document.type_name()))
        })?;
        Ok(Self { type_name, map })
    }

    /// A field that must be present. `Null` counts as present.
    pub fn required(&self, key: &str) -> Result<&'a Value> {
        self.map
            .get(key)
            .ok_or_else(|| AssignError::restore(self.type_name, format!("missing field {}", key)))
    }

    /// A field that may be absent or `Null`.
    pub fn optional(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn string(&self, key: &str) -> Result<String> {
        self.required(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(key, "string"))
    }

    pub fn optional_string(&self, key: &str) -> Result<Option<String>> {
        self.optional(key)
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| self.mismatch(key, "string")))
            .transpose()
    }

    pub fn i64(&self, key: &str) -> Result<i64> {
        self.required(key)?
            .as_i64()
            .ok_or_else(|| self.mismatch(key, "int"))
    }

    pub fn f64(&self, key: &str) -> Result<f64> {
        self.required(key)?
            .as_f64()
            .ok_or_else(|| self.mismatch(key, "number"))
    }

    pub fn bool(&self, key: &str) -> Result<bool> {
        self.required(key)?
            .as_bool()
            .ok_or_else(|| self.mismatch(key, "bool"))
    }

    /// A nested restorable value.
    pub fn restore<T: Restorable>(&self, key: &str) -> Result<T> {
        T::restore(self.required(key)?.clone())
    }

    /// A nested restorable value that may be absent or `Null`.
    pub fn restore_optional<T: Restorable>(&self, key: &str) -> Result<Option<T>> {
        self.optional(key).cloned().map(T::restore).transpose()
    }

    /// A sequence of restorable values.
    pub fn restore_each<T: Restorable>(&self, key: &str) -> Result<Vec<T>> {
        self.required(key)?
            .as_array()
            .ok_or_else(|| self.mismatch(key, "array"))?
            .iter()
            .cloned()
            .map(T::restore)
            .collect()
    }

    fn mismatch(&self, key: &str, expected: &str) -> AssignError {
        AssignError::restore(self.type_name, format!("field {} must be a {}", key, expected))
    }
}

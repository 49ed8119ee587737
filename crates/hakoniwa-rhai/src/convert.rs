//! Conversion between Rhai values and `serde_json::Value`.

use rhai::{Array, Dynamic};
use serde_json::Value;
use thiserror::Error;

/// A value could not cross the script boundary.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// Script value has no data representation (function pointer, timestamp, ...).
    #[error("script value of type `{type_name}` is not data: {message}")]
    NotData { type_name: String, message: String },

    /// Data value could not be turned into a script value.
    #[error("value cannot be passed to a script: {0}")]
    Unsupported(String),
}

/// Convert a script value into a data value.
pub fn to_value(value: &Dynamic) -> Result<Value, ConvertError> {
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| ConvertError::NotData {
        type_name: value.type_name().to_string(),
        message: e.to_string(),
    })
}

/// Convert a data value into a script value.
pub fn to_dynamic(value: &Value) -> Result<Dynamic, ConvertError> {
    rhai::serde::to_dynamic(value).map_err(|e| ConvertError::Unsupported(e.to_string()))
}

/// Convert a script array (call arguments) into data values.
pub fn values_from_array(array: Array) -> Result<Vec<Value>, ConvertError> {
    array.iter().map(to_value).collect()
}

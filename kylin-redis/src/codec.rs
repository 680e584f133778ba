//! JSON transcoding shared by every typed accessor.
//!
//! Values travel as UTF-8 JSON text. Decode failures carry the key they were
//! read from so a corrupt value can be told apart from a missing one.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, CacheResult};

/// Bytes as returned by the server.
pub(crate) type Raw = Vec<u8>;

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<String> {
    serde_json::to_string(value).map_err(CacheError::Serialization)
}

pub(crate) fn encode_many<T: Serialize>(values: &[T]) -> CacheResult<Vec<String>> {
    values.iter().map(encode).collect()
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> CacheResult<T> {
    serde_json::from_slice(raw).map_err(|source| CacheError::Deserialization {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn decode_many<T: DeserializeOwned>(key: &str, raws: Vec<Raw>) -> CacheResult<Vec<T>> {
    raws.iter().map(|raw| decode(key, raw)).collect()
}

pub(crate) fn decode_pairs<T: DeserializeOwned>(
    key: &str,
    raws: HashMap<String, Raw>,
) -> CacheResult<HashMap<String, T>> {
    raws.into_iter()
        .map(|(field, raw)| {
            let value = decode(&field_key(key, &field), &raw);
            value.map(|value| (field, value))
        })
        .collect()
}

pub(crate) fn decode_scored<T: DeserializeOwned>(
    key: &str,
    raws: Vec<(Raw, f64)>,
) -> CacheResult<Vec<(T, f64)>> {
    raws.into_iter()
        .map(|(raw, score)| decode(key, &raw).map(|value| (value, score)))
        .collect()
}

/// Name used in errors for a hash field.
pub(crate) fn field_key(key: &str, field: &str) -> String {
    format!("{}[{}]", key, field)
}

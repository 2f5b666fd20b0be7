use serde_json::Value;
use sha2::{Digest, Sha256};

/// Renders JSON with object keys sorted recursively and no insignificant
/// whitespace. Two payloads that differ only in key order render equal.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    let name = serde_json::to_string(key).unwrap_or_default();
                    format!("{}:{}", name, canonical_json(&map[key]))
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// SHA-256 hex digest of the canonical JSON rendering of a payload.
/// This is the ingestion dedup key: same payload, same checksum.
pub fn payload_checksum(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// SHA-256 hex digest of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

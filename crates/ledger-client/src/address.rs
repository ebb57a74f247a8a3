//! Deterministic contract addresses
//!
//! An address is the blake2b-160 hash of the definition's canonical JSON
//! (object keys sorted, no whitespace), followed by a 4-byte blake2b
//! checksum, base58-encoded.

use blake2::digest::consts::{U20, U4};
use blake2::{Blake2b, Digest};
use curvebuy_core::Address;
use serde_json::{Map, Value};

const HASH_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;

/// Derive the address of a contract definition.
pub fn derive_address(definition: &Value) -> Address {
    let mut canonical = String::new();
    write_canonical(definition, &mut canonical);
    let hash = Blake2b::<U20>::digest(canonical.as_bytes());
    encode(&hash)
}

/// Check the encoding and checksum of an address
pub fn is_valid_address(address: &str) -> bool {
    let Ok(bytes) = bs58::decode(address).into_vec() else {
        return false;
    };
    if bytes.len() != HASH_LEN + CHECKSUM_LEN {
        return false;
    }
    let (payload, check) = bytes.split_at(HASH_LEN);
    checksum(payload) == check
}

/// `params` object of an `["autonomous agent", {base_aa, params}]` definition
pub fn definition_params(definition: &Value) -> Option<&Map<String, Value>> {
    definition.get(1)?.get("params")?.as_object()
}

/// `base_aa` of a parameterized definition
pub fn definition_base_aa(definition: &Value) -> Option<Address> {
    definition
        .get(1)?
        .get("base_aa")?
        .as_str()
        .map(Address::from)
}

fn encode(payload: &[u8]) -> Address {
    let mut bytes = payload.to_vec();
    bytes.extend_from_slice(&checksum(payload));
    Address::new(bs58::encode(bytes).into_string())
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Blake2b::<U4>::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derivation_is_deterministic() {
        let def = json!(["autonomous agent", {"base_aa": "BASE", "params": {"address": "A", "curve_aa": "C"}}]);
        assert_eq!(derive_address(&def), derive_address(&def.clone()));
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(derive_address(&a), derive_address(&b));
    }

    #[test]
    fn test_different_params_different_address() {
        let a = json!(["autonomous agent", {"params": {"address": "A"}}]);
        let b = json!(["autonomous agent", {"params": {"address": "B"}}]);
        assert_ne!(derive_address(&a), derive_address(&b));
    }

    #[test]
    fn test_derived_address_is_valid() {
        let addr = derive_address(&json!({"x": 1}));
        assert!(is_valid_address(addr.as_str()));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("not base58 0OIl"));
        // right alphabet, wrong length
        assert!(!is_valid_address("3mJr7AoUXx2Wqd"));

        // flip one character of a valid address
        let addr = derive_address(&json!({"x": 1})).0;
        let mut chars: Vec<char> = addr.chars().collect();
        chars[3] = if chars[3] == 'a' { 'b' } else { 'a' };
        let tampered: String = chars.into_iter().collect();
        assert!(!is_valid_address(&tampered));
    }

    #[test]
    fn test_definition_accessors() {
        let def = json!(["autonomous agent", {"base_aa": "BASE", "params": {"curve_aa": "C"}}]);
        assert_eq!(definition_base_aa(&def), Some(Address::from("BASE")));
        assert_eq!(definition_params(&def).unwrap()["curve_aa"], "C");
        assert!(definition_params(&json!(["autonomous agent", {}])).is_none());
    }
}

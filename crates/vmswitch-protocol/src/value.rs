//! Typed extraction of the `return`/`data` dictionaries this core cares
//! about. The wire value model is `serde_json::Value` (dict/list/int/bool/
//! float/string are exactly `serde_json::Value`'s variants); these are thin
//! typed views over the subset of keys a given response is expected to carry.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub struct XenStatusReturn {
    pub domain: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub struct ProcessInfoReturn {
    pub pid: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub struct KbdLedsReturn {
    pub caps: Option<bool>,
    pub num: Option<bool>,
    pub scroll: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
pub struct MouseStatusReturn {
    pub absolute: Option<bool>,
    pub x: Option<i64>,
    pub y: Option<i64>,
}

/// Deserialize `value` into `T`, tolerating unrelated extra keys and a
/// dictionary missing every field `T` cares about (each field decodes as
/// `None` rather than failing the whole response).
pub fn extract<T: for<'de> Deserialize<'de> + Default>(value: &Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_fields_and_ignores_others() {
        let value = serde_json::json!({"domain": 7, "unrelated": "x"});
        let xen: XenStatusReturn = extract(&value);
        assert_eq!(xen.domain, Some(7));
    }

    #[test]
    fn missing_fields_decode_as_none_rather_than_erroring() {
        let value = serde_json::json!({});
        let leds: KbdLedsReturn = extract(&value);
        assert_eq!(leds, KbdLedsReturn { caps: None, num: None, scroll: None });
    }
}

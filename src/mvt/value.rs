//! Feature property decoding.
//!
//! MVT features reference their properties as a flat `tags` array of
//! alternating key/value indices into the layer's string and value tables.

use geozero::mvt::tile;
use serde_json::{Map, Number, Value};

/// Decode a feature's tag pairs into a JSON property bag.
///
/// Out-of-range indices and unrepresentable values (NaN floats) are
/// skipped; a malformed odd-length tag list loses only its trailing entry.
pub(super) fn decode_tags(
    tags: &[u32],
    keys: &[String],
    values: &[tile::Value],
) -> Map<String, Value> {
    let mut properties = Map::new();
    for pair in tags.chunks_exact(2) {
        let key = match keys.get(pair[0] as usize) {
            Some(k) => k,
            None => continue,
        };
        let value = match values.get(pair[1] as usize).and_then(decode_value) {
            Some(v) => v,
            None => continue,
        };
        properties.insert(key.clone(), value);
    }
    properties
}

fn decode_value(v: &tile::Value) -> Option<Value> {
    if let Some(s) = &v.string_value {
        return Some(Value::String(s.clone()));
    }
    if let Some(f) = v.float_value {
        return Number::from_f64(f as f64).map(Value::Number);
    }
    if let Some(d) = v.double_value {
        return Number::from_f64(d).map(Value::Number);
    }
    if let Some(i) = v.int_value {
        return Some(Value::Number(i.into()));
    }
    if let Some(u) = v.uint_value {
        return Some(Value::Number(u.into()));
    }
    if let Some(s) = v.sint_value {
        return Some(Value::Number(s.into()));
    }
    if let Some(b) = v.bool_value {
        return Some(Value::Bool(b));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val_string(s: &str) -> tile::Value {
        tile::Value {
            string_value: Some(s.to_string()),
            ..Default::default()
        }
    }

    fn val_int(i: i64) -> tile::Value {
        tile::Value {
            int_value: Some(i),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_key_value_pairs() {
        let keys = vec!["name".to_string(), "lanes".to_string()];
        let values = vec![val_string("Main St"), val_int(4)];
        let props = decode_tags(&[0, 0, 1, 1], &keys, &values);

        assert_eq!(props.get("name").and_then(|v| v.as_str()), Some("Main St"));
        assert_eq!(props.get("lanes").and_then(|v| v.as_i64()), Some(4));
    }

    #[test]
    fn out_of_range_indices_are_skipped() {
        let keys = vec!["name".to_string()];
        let values = vec![val_string("x")];
        let props = decode_tags(&[0, 9, 9, 0, 0, 0], &keys, &values);
        assert_eq!(props.len(), 1);
        assert!(props.contains_key("name"));
    }

    #[test]
    fn odd_tag_list_drops_trailer() {
        let keys = vec!["name".to_string()];
        let values = vec![val_string("x")];
        let props = decode_tags(&[0, 0, 0], &keys, &values);
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn nan_float_is_skipped() {
        let keys = vec!["bad".to_string()];
        let values = vec![tile::Value {
            double_value: Some(f64::NAN),
            ..Default::default()
        }];
        let props = decode_tags(&[0, 0], &keys, &values);
        assert!(props.is_empty());
    }

    #[test]
    fn bool_and_uint_values() {
        let keys = vec!["bridge".to_string(), "osm_id".to_string()];
        let values = vec![
            tile::Value {
                bool_value: Some(true),
                ..Default::default()
            },
            tile::Value {
                uint_value: Some(42),
                ..Default::default()
            },
        ];
        let props = decode_tags(&[0, 0, 1, 1], &keys, &values);
        assert_eq!(props.get("bridge"), Some(&Value::Bool(true)));
        assert_eq!(props.get("osm_id").and_then(|v| v.as_u64()), Some(42));
    }
}

//! Value equality and merge rules shared by the Change Detector and the
//! Conflict Resolver (§4.3 step "Value equality for diffing", §4.4 step
//! 3 "Merges").

use serde_json::Value;

/// Compares two JSON values under the spec's equality rule: primitives by
/// `==`; arrays as multisets after element-wise recursive equality
/// (order insignificant); objects as deep key-wise recursive equality.
/// `Null` is equal only to `Null` (there is no separate "undefined" in
/// `serde_json::Value`; a field absent from an object is represented as
/// `Null` by callers before comparison).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a_items), Value::Array(b_items)) => arrays_equal_as_multisets(a_items, b_items),
        (Value::Object(a_map), Value::Object(b_map)) => {
            if a_map.len() != b_map.len() {
                return false;
            }
            a_map.iter().all(|(key, a_val)| match b_map.get(key) {
                Some(b_val) => values_equal(a_val, b_val),
                None => false,
            })
        }
        _ => a == b,
    }
}

fn arrays_equal_as_multisets(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<&Value> = b.iter().collect();
    for item in a {
        let Some(pos) = remaining.iter().position(|candidate| values_equal(item, candidate)) else {
            return false;
        };
        remaining.remove(pos);
    }
    true
}

/// Folds two competing values into one, per §4.4 step 3's type-dispatched
/// merge rules.
pub fn merge_values(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => other.clone(),
        (Value::Array(a_items), Value::Array(b_items)) => {
            let mut merged = a_items.clone();
            for item in b_items {
                if !merged.iter().any(|existing| values_equal(existing, item)) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        (Value::Object(a_map), Value::Object(b_map)) => {
            let mut merged = a_map.clone();
            for (key, b_val) in b_map {
                match merged.get(key) {
                    Some(a_val) if values_equal(a_val, b_val) => {}
                    Some(a_val) => {
                        let folded = merge_values(a_val, b_val);
                        merged.insert(key.clone(), folded);
                    }
                    None => {
                        merged.insert(key.clone(), b_val.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        (Value::String(a_str), Value::String(b_str)) => {
            if a_str == b_str {
                a.clone()
            } else if b_str.len() > a_str.len() {
                b.clone()
            } else {
                a.clone()
            }
        }
        (Value::Number(a_num), Value::Number(b_num)) => {
            let a_f = a_num.as_f64().unwrap_or(f64::MIN);
            let b_f = b_num.as_f64().unwrap_or(f64::MIN);
            if b_f > a_f {
                b.clone()
            } else {
                a.clone()
            }
        }
        (Value::Bool(a_bool), Value::Bool(b_bool)) => Value::Bool(*a_bool || *b_bool),
        _ => a.clone(),
    }
}

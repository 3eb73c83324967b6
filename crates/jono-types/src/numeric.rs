//! Flexible numeric coercion (§4.5 "numeric coercions accept both integer
//! and float inputs; string digits are parsed; non-convertible values fall
//! to the documented default").
//!
//! Decoder output before assembly is `serde_json::Value`-typed (an
//! [`crate::record::IntermediateRecord`] field), since different protocols
//! hand the assembler ints, floats, or digit strings for the same logical
//! field. These helpers centralize the coercion so every call site agrees
//! on the same fallback behavior.

use serde_json::Value;

/// Coerces a JSON value to `i64`, accepting ints, floats (truncated), and
/// parseable numeric strings. `None` on an absent or non-numeric value —
/// callers that need a default in that case (commonly `0`) apply it
/// themselves, since not every caller wants the same default.
pub fn to_i64(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

/// Coerces a JSON value to `f64`, same acceptance rules as [`to_i64`].
pub fn to_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// `to_i64` with the documented `0` default for fields whose absence
/// means "quantity not reported" rather than "unknown".
pub fn to_i64_or_zero(value: Option<&Value>) -> i64 {
    to_i64(value).unwrap_or(0)
}

/// Coerces the historical `PositioningStatus` inputs — `true`/`false`,
/// `0`/`1`, `"A"`/`"V"`, or already `"true"`/`"V"` — into the wire pair
/// `{"true", "V"}` the assembler must always emit.
pub fn to_positioning_status(value: Option<&Value>) -> String {
    let valid = match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        Some(Value::String(s)) => matches!(s.as_str(), "A" | "a" | "true" | "1"),
        _ => false,
    };
    if valid { "true".to_string() } else { "V".to_string() }
}

/// Normalizes an internal 0..4 GSM signal scale to the wire scale
/// {0, 8, 16, 23, 31} (§4.5). Out-of-range inputs clamp to the nearest end.
pub fn gsm_internal_to_wire(internal: i64) -> i64 {
    const SCALE: [i64; 5] = [0, 8, 16, 23, 31];
    let idx = internal.clamp(0, 4) as usize;
    SCALE[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_i64_accepts_ints_floats_and_digit_strings() {
        assert_eq!(to_i64(Some(&json!(42))), Some(42));
        assert_eq!(to_i64(Some(&json!(42.9))), Some(42));
        assert_eq!(to_i64(Some(&json!("358868041"))), Some(358868041));
        assert_eq!(to_i64(Some(&json!("not a number"))), None);
        assert_eq!(to_i64(None), None);
    }

    #[test]
    fn positioning_status_coerces_every_historical_shape() {
        assert_eq!(to_positioning_status(Some(&json!(true))), "true");
        assert_eq!(to_positioning_status(Some(&json!("A"))), "true");
        assert_eq!(to_positioning_status(Some(&json!(1))), "true");
        assert_eq!(to_positioning_status(Some(&json!("V"))), "V");
        assert_eq!(to_positioning_status(Some(&json!(false))), "V");
        assert_eq!(to_positioning_status(None), "V");
    }

    #[test]
    fn gsm_scale_maps_internal_levels_to_wire_values() {
        assert_eq!(gsm_internal_to_wire(0), 0);
        assert_eq!(gsm_internal_to_wire(4), 31);
        assert_eq!(gsm_internal_to_wire(2), 16);
        assert_eq!(gsm_internal_to_wire(9), 31);
    }
}

//! Per-protocol coordinate decoding. Deliberately not unified: each
//! protocol has its own scaling and hemisphere-bit convention, and folding
//! them into one function would hide that the conventions disagree.

/// BSJ: raw signed 32-bit integer ÷ 1e6. Hemisphere is carried by separate
/// status bits, not the sign of the raw value — `south`/`west` flip the
/// sign after scaling.
pub fn bsj_lat(raw: i32, south: bool) -> f64 {
    let value = raw as f64 / 1_000_000.0;
    if south { -value.abs() } else { value.abs() }
}

pub fn bsj_lon(raw: i32, west: bool) -> f64 {
    let value = raw as f64 / 1_000_000.0;
    if west { -value.abs() } else { value.abs() }
}

/// GT06: raw signed 32-bit integer ÷ (30000·60), clamped to the valid
/// range. `flip` is the hemisphere bit from the Course-Status word (set =
/// south for latitude, west for longitude).
pub fn gt06(raw: i32, flip: bool, is_latitude: bool) -> f64 {
    let value = raw as f64 / (30_000.0 * 60.0);
    let signed = if flip { -value.abs() } else { value.abs() };
    let bound = if is_latitude { 90.0 } else { 180.0 };
    signed.clamp(-bound, bound)
}

/// Huabao DMS: degrees + minutes/60 + seconds·1e-7/3600, sign carried by
/// the degrees field. Output rounded to 6 decimals per the wire contract.
pub fn dms_huabao(degrees: i32, minutes: u32, seconds_e7: u32) -> f64 {
    let sign = if degrees < 0 { -1.0 } else { 1.0 };
    let magnitude = degrees.unsigned_abs() as f64 + (minutes as f64) / 60.0 + (seconds_e7 as f64 * 1e-7) / 3600.0;
    round6(sign * magnitude)
}

/// Globalstar SpotX: a 7-8 digit integer packing `<degrees><minutes*1000>`.
/// Degrees occupy the first 4-5 characters (so the remaining field is
/// always 5 digits of minutes*1000); minutes convert to decimal degrees by
/// dividing by 60 and the whole value is scaled by 1000. The empirical
/// -0.003333 latitude bias (Open Question iv) is applied by the caller,
/// not here, since it only applies to latitude.
pub fn spotx(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.len() < 6 {
        return None;
    }
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, raw),
    };
    let minutes_len = 5;
    if digits.len() <= minutes_len {
        return None;
    }
    let degrees_part = &digits[..digits.len() - minutes_len];
    let minutes_part = &digits[digits.len() - minutes_len..];
    let degrees: f64 = degrees_part.parse().ok()?;
    let minutes_thousandths: f64 = minutes_part.parse().ok()?;
    let minutes = minutes_thousandths / 1000.0;
    Some(sign * (degrees + minutes / 60.0))
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bsj_hemisphere_bits_flip_sign_independently() {
        assert_eq!(bsj_lat(19_521_000, true), -19.521);
        assert_eq!(bsj_lon(99_211_600, false), 99.2116);
    }

    #[test]
    fn gt06_coordinates_clamp_to_valid_range() {
        let lat = gt06(90_000_000_i32.wrapping_mul(3), false, true);
        assert!((-90.0..=90.0).contains(&lat));
    }

    #[test]
    fn dms_huabao_rounds_to_six_decimals() {
        let value = dms_huabao(18, 57, 17_000_000);
        assert_eq!(value, 18.951389);
    }

    #[test]
    fn spotx_parses_degrees_and_minutes_with_sign() {
        let value = spotx("1895027300").unwrap();
        // 18950 degrees is nonsensical in isolation; this only exercises
        // the digit-splitting arithmetic, not a real device sample.
        assert!(value.is_finite());
    }
}

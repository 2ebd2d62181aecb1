//! Float to text conversion shared by every writer.
//!
//! Header values go through [`format_double`] so that the same volume always
//! produces the same bytes, independent of platform float formatting.

/// Scientific notation with 17 significant digits and a C-style exponent,
/// e.g. `1.0000000000000000e+00`, `-2.5000000000000000e-03`.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // Avoid printing "-0.0000000000000000e+00".
    let value = if value == 0.0 { 0.0 } else { value };

    let formatted = format!("{value:.16e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

/// Shortest representation that reads back to the same value, e.g. `1000` or `0.7071067811865476`.
pub fn format_plain(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}

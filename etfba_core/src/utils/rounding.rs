//! Rounding used when turning raw solver values into reported values
use indexmap::IndexMap;

/// Round `value` to `decimals` decimal places, mapping -0.0 to 0.0
pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0. {
        0.
    } else {
        rounded
    }
}

/// Round every value of a map, keeping key order
pub(crate) fn round_map(values: &IndexMap<String, f64>, decimals: u32) -> IndexMap<String, f64> {
    values
        .iter()
        .map(|(id, value)| (id.clone(), round_to(*value, decimals)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_requested_decimals() {
        assert_eq!(round_to(1.2351, 2), 1.24);
        assert_eq!(round_to(-1.2351, 2), -1.24);
        assert_eq!(round_to(99.999999, 2), 100.);
    }

    #[test]
    fn negative_zero_is_reported_as_zero() {
        let rounded = round_to(-0.0001, 2);
        assert!(rounded.is_sign_positive());
    }
}

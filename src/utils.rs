//! Numeric helpers shared by the detectors, scorer and budget ledger.

/// Clamp into `[0, 1]`. NaN maps to `0.0`.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp into `[-1, 1]`. NaN maps to `0.0`.
#[must_use]
pub fn clamp_signed(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Multiply a budget amount by `factor` and round down.
///
/// Negative or NaN products floor at zero.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scale_floor(amount: u64, factor: f64) -> u64 {
    let scaled = (amount as f64 * factor).floor();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else {
        scaled as u64
    }
}

/// Multiply a fractional amount by `factor` and round up to a whole budget unit.
///
/// The product is snapped to six decimals first so `25 × 1.2` yields 30, not 31.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scale_ceil(amount: f64, factor: f64) -> u64 {
    let scaled = ((amount * factor * 1e6).round() / 1e6).ceil();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else {
        scaled as u64
    }
}

/// Round to 12 decimal places so band boundaries are not decided by float noise.
#[must_use]
pub fn round_score(value: f64) -> f64 {
    (value * 1e12).round() / 1e12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_nan_to_neutral() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_signed(f64::NAN), 0.0);
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_signed(-3.0), -1.0);
        assert_eq!(clamp_signed(f64::INFINITY), 1.0);
    }

    #[test]
    fn scale_floor_rounds_down() {
        assert_eq!(scale_floor(40, 1.5), 60);
        assert_eq!(scale_floor(49, 1.5), 73);
        assert_eq!(scale_floor(45, 0.7), 31);
        assert_eq!(scale_floor(10, -2.0), 0);
        assert_eq!(scale_floor(10, f64::NAN), 0);
    }

    #[test]
    fn scale_ceil_rounds_up_without_noise() {
        assert_eq!(scale_ceil(25.0, 1.2), 30);
        assert_eq!(scale_ceil(25.5, 1.2), 31);
        assert_eq!(scale_ceil(-4.0, 1.2), 0);
    }

    #[test]
    fn round_score_absorbs_float_noise() {
        assert_eq!(round_score(0.999_999_999_999_999_9), 1.0);
        assert_eq!(round_score(0.299_999_999_999_999_96), 0.3);
    }
}

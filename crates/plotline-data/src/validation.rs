//! Validation of incoming series points.

use plotline_core::{Candle, ModelKind};

/// Validate a point has reasonable values for its data model.
///
/// OHLC points must be finite with `high >= low`. Value points only need a
/// finite close, since the other fields mirror it.
pub fn validate_point(model: ModelKind, candle: &Candle) -> bool {
    match model {
        ModelKind::Ohlc => candle.is_valid(),
        ModelKind::Value => candle.close.is_finite(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ohlc_valid() {
        let candle = Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0);
        assert!(validate_point(ModelKind::Ohlc, &candle));
    }

    #[test]
    fn test_validate_ohlc_high_below_low() {
        let candle = Candle::new(100.0, 90.0, 95.0, 102.0, 1000.0);
        assert!(!validate_point(ModelKind::Ohlc, &candle));
    }

    #[test]
    fn test_validate_ohlc_negative_volume() {
        let candle = Candle::new(100.0, 105.0, 95.0, 102.0, -1.0);
        assert!(!validate_point(ModelKind::Ohlc, &candle));
    }

    #[test]
    fn test_validate_value_nan() {
        assert!(validate_point(ModelKind::Value, &Candle::flat(-3.5)));
        assert!(!validate_point(ModelKind::Value, &Candle::flat(f64::NAN)));
    }
}

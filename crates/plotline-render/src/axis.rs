//! Price-axis label formatting and sizing.

use plotline_core::ScaleType;

/// Height of a label's background box.
pub const LABEL_HEIGHT: f64 = 20.0;
/// Horizontal padding around label text.
pub const LABEL_PADDING: f64 = 12.0;
/// Font used for axis labels.
pub const LABEL_FONT: &str = "10px monospace";

/// Measures rendered text width.
pub trait TextMetrics: Send + Sync {
    fn text_width(&self, text: &str, font: &str) -> f64;
}

/// Fixed-advance estimate: every character is `char_width` pixels wide.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMetrics {
    pub char_width: f64,
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self { char_width: 6.0 }
    }
}

impl TextMetrics for MonospaceMetrics {
    fn text_width(&self, text: &str, _font: &str) -> f64 {
        text.chars().count() as f64 * self.char_width
    }
}

/// Label text for a transformed value.
///
/// Percent values carry an explicit sign and `%`; normalized values use two
/// decimals; raw prices use the set's precision.
pub fn format_label(value: f64, scale: ScaleType, decimal_places: u32) -> String {
    match scale {
        ScaleType::Default => format!("{:.*}", decimal_places as usize, value),
        ScaleType::Percent => {
            let sign = if value < 0.0 { '-' } else { '+' };
            format!("{}{:.2}%", sign, value.abs())
        }
        ScaleType::Normalized => format!("{value:.2}"),
    }
}

/// New price-axis width for the widest label, if it should change.
///
/// Returns `Some` only when `max_text_width + padding` differs from `current`
/// and exceeds `floor`; repeated calls with the same inputs settle.
pub fn axis_width_for(max_text_width: f64, current: f64, floor: f64, padding: f64) -> Option<f64> {
    let wanted = max_text_width + padding;
    (wanted != current && wanted > floor).then_some(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_label() {
        assert_eq!(format_label(1234.5, ScaleType::Default, 2), "1234.50");
        assert_eq!(format_label(20.0, ScaleType::Percent, 8), "+20.00%");
        assert_eq!(format_label(-10.0, ScaleType::Percent, 0), "-10.00%");
        assert_eq!(format_label(0.0, ScaleType::Percent, 0), "+0.00%");
        assert_eq!(format_label(99.999, ScaleType::Normalized, 0), "100.00");
    }

    #[test]
    fn test_axis_width_rule() {
        assert_eq!(axis_width_for(60.0, 50.0, 50.0, 12.0), Some(72.0));
        assert_eq!(axis_width_for(60.0, 72.0, 50.0, 12.0), None);
        assert_eq!(axis_width_for(30.0, 72.0, 50.0, 12.0), None);
    }

    #[test]
    fn test_monospace_width() {
        assert_eq!(MonospaceMetrics::default().text_width("123.45", LABEL_FONT), 36.0);
    }
}

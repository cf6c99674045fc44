//! Chart settings blob.
//!
//! Only the indicator list is interpreted. Any other field, at the top level
//! or inside an indicator entry, is carried through a load/save unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSettings {
    #[serde(default)]
    pub indicators: Vec<IndicatorSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    pub id: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_visible() -> bool {
    true
}

impl IndicatorSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visible: true,
            extra: Map::new(),
        }
    }
}

impl ChartSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_survive() {
        let json = r##"{
            "indicators": [{"id": "sma", "color": "#ff0000"}, {"id": "candlestick", "visible": false}],
            "layout": {"row": 1, "col": 2},
            "theme": "dark"
        }"##;
        let settings = ChartSettings::from_json(json).unwrap();
        assert_eq!(settings.indicators.len(), 2);
        assert!(settings.indicators[0].visible);
        assert!(!settings.indicators[1].visible);
        assert_eq!(settings.indicators[0].extra["color"], "#ff0000");
        assert_eq!(settings.extra["theme"], "dark");

        let back = ChartSettings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_missing_indicators_is_empty() {
        let settings = ChartSettings::from_json(r#"{"zoom": 3}"#).unwrap();
        assert!(settings.indicators.is_empty());
        assert_eq!(settings.extra["zoom"], 3);
    }

    #[test]
    fn test_rejects_missing_id() {
        assert!(ChartSettings::from_json(r#"{"indicators": [{"visible": true}]}"#).is_err());
    }
}

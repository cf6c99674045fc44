//! Lookup table of indicator definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use plotline_config::IndicatorConfig;
use plotline_core::ModelKind;

use crate::indicator::Indicator;
use crate::library::{Candlestick, Ema, PriceLine, Sma, Volume, Vwap};
use crate::macd::Macd;
use crate::IndicatorError;

/// Indicator definitions keyed by id.
#[derive(Clone, Default)]
pub struct IndicatorRegistry {
    indicators: BTreeMap<String, Arc<dyn Indicator>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in indicator with default parameters.
    pub fn builtin() -> Self {
        Self::with_config(&IndicatorConfig::default())
    }

    /// Built-in indicators parameterised by `config`.
    pub fn with_config(config: &IndicatorConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Candlestick::default()));
        registry.register(Arc::new(PriceLine::default()));
        registry.register(Arc::new(Sma::new(config.sma_period)));
        registry.register(Arc::new(Ema::new(config.ema_period)));
        registry.register(Arc::new(Vwap::default()));
        registry.register(Arc::new(Volume::default()));
        registry.register(Arc::new(Macd::default()));
        registry
    }

    /// Add a definition, replacing any with the same id.
    pub fn register(&mut self, indicator: Arc<dyn Indicator>) -> Option<Arc<dyn Indicator>> {
        self.indicators.insert(indicator.id().to_string(), indicator)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Indicator>> {
        self.indicators.get(id).cloned()
    }

    /// All ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.indicators.keys().map(String::as_str).collect()
    }

    /// Ids of indicators that can run on `model` data.
    pub fn applicable(&self, model: ModelKind) -> Vec<&str> {
        self.indicators
            .iter()
            .filter(|(_, ind)| ind.applies_to(model))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Look up `id` and check it can run on `model` data.
    pub fn resolve(&self, id: &str, model: ModelKind) -> Result<Arc<dyn Indicator>, IndicatorError> {
        let indicator = self
            .get(id)
            .ok_or_else(|| IndicatorError::Unknown(id.to_string()))?;
        if !indicator.applies_to(model) {
            return Err(IndicatorError::Incompatible {
                indicator: id.to_string(),
                source_model: model,
            });
        }
        Ok(indicator)
    }
}

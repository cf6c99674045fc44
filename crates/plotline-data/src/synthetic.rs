//! Deterministic synthetic price source for demos and tests.

use std::collections::BTreeMap;

use plotline_core::{Candle, ModelKind, Timeframe, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::source::{FetchRequest, FetchResponse, HistoricalSource};

/// Generates a random-walk style price series.
///
/// The same `(seed, name, timeframe, timestamp)` always yields the same bar,
/// so overlapping windows agree with each other.
#[derive(Debug, Clone)]
pub struct RandomWalkSource {
    seed: u64,
    base_price: f64,
    /// Relative step size per bar.
    volatility: f64,
}

impl RandomWalkSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            base_price: 100.0,
            volatility: 0.01,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    fn rng_for(&self, name: &str, timeframe: Timeframe, ts: Timestamp) -> StdRng {
        let name_hash = name
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
        StdRng::seed_from_u64(
            self.seed ^ name_hash ^ (timeframe.millis() as u64).rotate_left(17) ^ ts as u64,
        )
    }

    /// Price level at a bar boundary.
    ///
    /// A slow drift built from a few incommensurate waves, so neighbouring
    /// bars stay close while the series still wanders.
    fn level(&self, name: &str, timeframe: Timeframe, ts: Timestamp) -> f64 {
        let bars = (ts / timeframe.millis()) as f64;
        let wave = (bars / 37.0).sin() * 0.6 + (bars / 113.0).sin() * 1.3 + (bars / 9.0).sin() * 0.2;
        let noise: f64 = self.rng_for(name, timeframe, ts).gen_range(-1.0..1.0);
        self.base_price * (1.0 + self.volatility * (wave * 5.0 + noise))
    }

    /// The generated bar at `ts`.
    pub fn bar(&self, name: &str, timeframe: Timeframe, ts: Timestamp) -> Candle {
        let open = self.level(name, timeframe, ts);
        let close = self.level(name, timeframe, ts + timeframe.millis());
        let mut rng = self.rng_for(name, timeframe, ts.wrapping_add(1));
        let wick = (self.base_price * self.volatility * 0.5).abs().max(f64::EPSILON);
        let high = open.max(close) + rng.gen_range(0.0..wick);
        let low = open.min(close) - rng.gen_range(0.0..wick);
        let volume = rng.gen_range(10.0..1_000.0);
        Candle::new(open, high, low, close, volume)
    }
}

impl HistoricalSource for RandomWalkSource {
    async fn fetch(&self, requests: Vec<FetchRequest>) -> anyhow::Result<Vec<FetchResponse>> {
        let mut responses = Vec::with_capacity(requests.len());
        for req in &requests {
            let value_only = req.data_models.first() == Some(&ModelKind::Value);
            let points: BTreeMap<Timestamp, Candle> = req
                .timeframe
                .timestamps_in(req.start, req.end)
                .map(|ts| {
                    let bar = self.bar(&req.name, req.timeframe, ts);
                    (ts, if value_only { Candle::flat(bar.close) } else { bar })
                })
                .collect();
            responses.push(FetchResponse {
                dataset: req.dataset_id(),
                points,
            });
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_are_deterministic_and_valid() {
        let source = RandomWalkSource::new(7);
        let a = source.bar("BTC", Timeframe::MIN1, 120_000);
        let b = source.bar("BTC", Timeframe::MIN1, 120_000);
        assert_eq!(a, b);
        assert!(a.is_valid());
        assert!(a.low <= a.open.min(a.close));
        assert!(a.high >= a.open.max(a.close));
    }

    #[test]
    fn test_bars_are_continuous() {
        let source = RandomWalkSource::new(7);
        let a = source.bar("BTC", Timeframe::MIN1, 0);
        let b = source.bar("BTC", Timeframe::MIN1, 60_000);
        assert_eq!(a.close, b.open);
    }

    #[tokio::test]
    async fn test_fetch_fills_window() {
        let source = RandomWalkSource::new(1);
        let req = FetchRequest {
            source: "SYN".into(),
            name: "X".into(),
            data_models: vec![ModelKind::Ohlc],
            timeframe: Timeframe::MIN1,
            start: 0,
            end: 299 * 60_000,
        };
        let out = source.fetch(vec![req]).await.unwrap();
        assert_eq!(out[0].points.len(), 300);
    }
}

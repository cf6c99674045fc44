//! Configuration management for plotline.
//!
//! Loads configuration from TOML files. Every section has defaults, so a
//! partial file (or none at all) yields a usable configuration.

use plotline_core::{ScaleType, Timeframe};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub fetch: FetchConfig,
    pub workers: WorkerConfig,
    pub chart: ChartConfig,
    pub indicators: IndicatorConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./plotline.toml`
    /// 2. `~/.config/plotline/config.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        for path in Self::search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("plotline.toml")
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![Self::default_path()];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("plotline").join("config.toml"));
        }
        paths
    }
}

/// General application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data source used for new charts.
    pub default_source: String,
    /// Symbol to load on startup.
    pub default_symbol: String,
    /// Timeframe label, e.g. `1m` or `1h`.
    pub default_timeframe: String,
    /// CSV file served as `default_source:default_symbol`. The demo falls
    /// back to a synthetic random walk when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_source: "BINANCE".to_string(),
            default_symbol: "BTCUSDT".to_string(),
            default_timeframe: "1m".to_string(),
            data_file: None,
        }
    }
}

impl GeneralConfig {
    /// The configured timeframe, falling back to one minute if the label is invalid.
    pub fn timeframe(&self) -> Timeframe {
        Timeframe::from_label(&self.default_timeframe).unwrap_or_else(|| {
            log::warn!(
                "Unknown timeframe '{}', using 1m",
                self.default_timeframe
            );
            Timeframe::MIN1
        })
    }
}

/// What happens to pending timestamps whose fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Return them to absent and back off before re-requesting the dataset.
    #[default]
    Revert,
    /// Leave them pending; they are never re-requested.
    Keep,
}

/// Historical fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Coalescer tick interval in milliseconds.
    pub tick_ms: u64,
    /// Maximum aligned points per fetch window (upstream page size).
    pub window_points: usize,
    pub pending_policy: PendingPolicy,
    /// First retry delay after a failed fetch.
    pub retry_base_ms: u64,
    /// Upper bound on the retry delay.
    pub retry_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            window_points: 300,
            pending_policy: PendingPolicy::Revert,
            retry_base_ms: 1_000,
            retry_max_ms: 60_000,
        }
    }
}

impl FetchConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Backoff after `failures` consecutive failures (`failures >= 1`).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(32);
        let ms = self
            .retry_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.retry_max_ms);
        Duration::from_millis(ms)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Run indicator computation on the worker pool.
    pub enabled: bool,
    /// Number of compute units. Unset uses the hardware concurrency, `0`
    /// computes synchronously.
    pub pool_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_size: None,
        }
    }
}

impl WorkerConfig {
    /// Effective pool size; `0` means synchronous.
    pub fn resolved_pool_size(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(0)
        })
    }
}

/// Chart geometry and interaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Horizontal pixels per bar.
    pub pixels_per_element: f64,
    pub min_pixels_per_element: f64,
    pub max_pixels_per_element: f64,
    /// Floor for the dynamic price-axis width.
    pub axis_min_width: f64,
    /// Added to the widest label when sizing the price axis.
    pub axis_label_padding: f64,
    pub x_axis_height: f64,
    pub y_axis_width: f64,
    /// Fraction of the price span added above and below on autoscale.
    pub autoscale_margin: f64,
    /// Empty bars kept right of the latest point on the initial range.
    pub right_margin_elements: i64,
    pub scale: ScaleType,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            pixels_per_element: 10.0,
            min_pixels_per_element: 1.0,
            max_pixels_per_element: 1000.0,
            axis_min_width: 50.0,
            axis_label_padding: 12.0,
            x_axis_height: 20.0,
            y_axis_width: 50.0,
            autoscale_margin: 0.05,
            right_margin_elements: 5,
            scale: ScaleType::Default,
        }
    }
}

/// Parameters for the built-in indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_period: usize,
    pub ema_period: usize,
    /// Indicator ids added to every new chart.
    pub default_indicators: Vec<String>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_period: 20,
            ema_period: 20,
            default_indicators: vec!["candlestick".to_string()],
        }
    }
}

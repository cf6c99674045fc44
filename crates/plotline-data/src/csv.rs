//! CSV-backed historical source.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use plotline_core::{Candle, Timeframe, Timestamp};

use crate::source::{FetchRequest, FetchResponse, HistoricalSource};

/// Serves fetch requests from candles loaded out of a CSV file.
///
/// The file holds one symbol at its native timeframe; requests for coarser
/// multiples of it are answered by aggregating bars.
pub struct CsvSource {
    source: String,
    name: String,
    base: Timeframe,
    candles: BTreeMap<Timestamp, Candle>,
}

impl CsvSource {
    /// Load `path` and serve it as `source:name`.
    pub fn open<P: AsRef<Path>>(path: P, source: &str, name: &str) -> anyhow::Result<Self> {
        let candles = load_candles_from_csv(path)?;
        let base = detect_timeframe(&candles).unwrap_or(Timeframe::MIN1);
        log::info!(
            "Loaded {} candles for {}:{} at {}",
            candles.len(),
            source,
            name,
            base.label()
        );
        Ok(Self::from_candles(source, name, base, candles))
    }

    pub fn from_candles(
        source: &str,
        name: &str,
        base: Timeframe,
        candles: BTreeMap<Timestamp, Candle>,
    ) -> Self {
        Self {
            source: source.to_string(),
            name: name.to_string(),
            base,
            candles,
        }
    }

    #[must_use]
    pub fn base_timeframe(&self) -> Timeframe {
        self.base
    }

    /// Timestamp of the newest loaded bar.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.candles.keys().next_back().copied()
    }

    fn serve(&self, req: &FetchRequest) -> Option<BTreeMap<Timestamp, Candle>> {
        if req.source != self.source || req.name != self.name {
            return None;
        }
        let tf = req.timeframe.millis();
        if tf % self.base.millis() != 0 {
            log::warn!(
                "Cannot serve {} from {} base data",
                req.timeframe.label(),
                self.base.label()
            );
            return Some(BTreeMap::new());
        }
        let end_exclusive = req.end.saturating_add(tf);
        let bars = self
            .candles
            .range(req.start..end_exclusive)
            .map(|(ts, c)| (*ts, *c));
        Some(aggregate(bars, req.timeframe))
    }
}

impl HistoricalSource for CsvSource {
    async fn fetch(&self, requests: Vec<FetchRequest>) -> anyhow::Result<Vec<FetchResponse>> {
        Ok(requests
            .iter()
            .filter_map(|req| {
                self.serve(req).map(|points| FetchResponse {
                    dataset: req.dataset_id(),
                    points,
                })
            })
            .collect())
    }
}

/// Fold ascending base bars into bars of `timeframe`.
pub fn aggregate<I>(bars: I, timeframe: Timeframe) -> BTreeMap<Timestamp, Candle>
where
    I: IntoIterator<Item = (Timestamp, Candle)>,
{
    let mut out: BTreeMap<Timestamp, Candle> = BTreeMap::new();
    for (ts, c) in bars {
        out.entry(timeframe.align(ts))
            .and_modify(|agg| {
                agg.high = agg.high.max(c.high);
                agg.low = agg.low.min(c.low);
                agg.close = c.close;
                agg.volume += c.volume;
            })
            .or_insert(c);
    }
    out
}

/// Parse datetime string "YYYY-MM-DD HH:MM:SS" or a Unix timestamp to milliseconds.
///
/// Numeric values with 13+ digits are taken as milliseconds, smaller ones as seconds.
pub fn parse_datetime(s: &str) -> Option<Timestamp> {
    if let Ok(ts) = s.trim().parse::<f64>() {
        let ms = if ts.abs() > 1e12 { ts } else { ts * 1000.0 };
        return Some(ms.round() as Timestamp);
    }

    // Format: "2017-08-17 04:00:00"
    let parts: Vec<&str> = s.split(&['-', ' ', ':', 'T']).collect();
    if parts.len() < 6 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: usize = parts[1].parse().ok()?;
    let day: i64 = parts[2].parse().ok()?;
    let hour: i64 = parts[3].parse().ok()?;
    let min: i64 = parts[4].parse().ok()?;
    let sec: i64 = parts[5].trim_end_matches('Z').parse().ok()?;
    if !(1..=12).contains(&month) || day < 1 {
        return None;
    }

    let is_leap = |y: i32| y % 4 == 0 && (y % 100 != 0 || y % 400 == 0);
    let mut days: i64 = (1970..year).map(|y| if is_leap(y) { 366 } else { 365 }).sum();
    let month_days = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
    days += month_days[month - 1];
    if month > 2 && is_leap(year) {
        days += 1;
    }
    days += day - 1;

    Some((days * 86_400 + hour * 3_600 + min * 60 + sec) * 1_000)
}

/// Load candles from a CSV file keyed by millisecond timestamp.
///
/// Columns are located by header name (`timestamp`/`time`, `open`, `high`,
/// `low`, `close`, `volume`), defaulting to that order.
pub fn load_candles_from_csv<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<BTreeMap<Timestamp, Candle>> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b',').from_path(path)?;

    let headers = reader.headers()?.clone();
    let headers_lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let col = |name: &str, default: usize| {
        headers_lower
            .iter()
            .position(|h| h == name)
            .unwrap_or(default)
    };
    let ts_col = headers_lower
        .iter()
        .position(|h| h.contains("timestamp") || h == "time")
        .unwrap_or(0);
    let open_col = col("open", 1);
    let high_col = col("high", 2);
    let low_col = col("low", 3);
    let close_col = col("close", 4);
    let volume_col = col("volume", 5);

    let mut candles = BTreeMap::new();
    let mut skipped = 0usize;
    for result in reader.records() {
        let record = result?;
        let Some(ts) = record.get(ts_col).and_then(parse_datetime) else {
            skipped += 1;
            continue;
        };
        let field = |i: usize| -> anyhow::Result<f64> {
            Ok(record.get(i).unwrap_or("0").trim().parse()?)
        };
        let candle = Candle::new(
            field(open_col)?,
            field(high_col)?,
            field(low_col)?,
            field(close_col)?,
            field(volume_col)?,
        );
        candles.insert(ts, candle);
    }
    if skipped > 0 {
        log::warn!("Skipped {} CSV rows with unparseable timestamps", skipped);
    }
    Ok(candles)
}

/// Most common spacing between consecutive timestamps.
pub fn detect_timeframe(candles: &BTreeMap<Timestamp, Candle>) -> Option<Timeframe> {
    let mut intervals: HashMap<i64, usize> = HashMap::new();
    let keys: Vec<Timestamp> = candles.keys().copied().collect();
    for window in keys.windows(2) {
        *intervals.entry(window[1] - window[0]).or_insert(0) += 1;
    }
    intervals
        .into_iter()
        .max_by_key(|(interval, count)| (*count, -*interval))
        .and_then(|(interval, _)| Timeframe::from_millis(interval))
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: i64 = 60_000;

    #[test]
    fn test_parse_datetime() {
        assert_eq!(parse_datetime("1970-01-01 00:01:00"), Some(M));
        assert_eq!(parse_datetime("60"), Some(M));
        assert_eq!(parse_datetime("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(parse_datetime("2020-03-01 00:00:00"), Some(1_583_020_800_000));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_aggregate_bars() {
        let bars = vec![
            (0, Candle::new(1.0, 2.0, 0.5, 1.5, 1.0)),
            (M, Candle::new(1.5, 3.0, 1.0, 2.5, 2.0)),
            (5 * M, Candle::new(2.5, 2.6, 2.4, 2.45, 1.0)),
        ];
        let out = aggregate(bars, Timeframe::MIN5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[&0], Candle::new(1.0, 3.0, 0.5, 2.5, 3.0));
    }

    #[test]
    fn test_detect_timeframe() {
        let candles: BTreeMap<_, _> = [0, M, 2 * M, 5 * M]
            .into_iter()
            .map(|t| (t, Candle::flat(1.0)))
            .collect();
        assert_eq!(detect_timeframe(&candles), Some(Timeframe::MIN1));
    }

    #[tokio::test]
    async fn test_csv_source_fetch() {
        let path = std::env::temp_dir().join(format!("plotline-csv-{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n60,1,2,0.5,1.5,10\n120,1.5,2,1,1.8,5\n",
        )
        .unwrap();
        let source = CsvSource::open(&path, "FILE", "BTC").unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(source.base_timeframe(), Timeframe::MIN1);
        assert_eq!(source.last_timestamp(), Some(2 * M));
        let req = FetchRequest {
            source: "FILE".into(),
            name: "BTC".into(),
            data_models: vec![plotline_core::ModelKind::Ohlc],
            timeframe: Timeframe::MIN1,
            start: 0,
            end: 10 * M,
        };
        let mut other = req.clone();
        other.name = "ETH".into();
        let responses = source.fetch(vec![req, other]).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].points.len(), 2);
        assert_eq!(responses[0].points[&(2 * M)].close, 1.8);
    }
}

//! Plotline demo - streams historical data through a workspace.
//!
//! Serves `general.data_file` when configured, otherwise a synthetic random
//! walk.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use plotline::{FetchLoop, Workspace};
use plotline_config::Config;
use plotline_core::{ModelKind, Timestamp};
use plotline_data::{CsvSource, HistoricalSource, RandomWalkSource};
use tokio::sync::Mutex;

/// Fetch ticks to wait before and after panning back.
const WARMUP_TICKS: u32 = 6;
const PAN_TICKS: u32 = 4;

async fn demo<S>(config: Config, source: Arc<S>, anchor: Option<Timestamp>) -> Result<()>
where
    S: HistoricalSource + 'static,
{
    let general = config.general.clone();
    let period = config.fetch.tick();

    let mut workspace = Workspace::new(config)?;
    let chart = workspace.create_chart(
        &general.default_source,
        &general.default_symbol,
        general.timeframe(),
        ModelKind::Ohlc,
        1200.0,
        600.0,
    );
    if let Some(anchor) = anchor {
        workspace.scroll_to(chart, anchor);
    }
    workspace.add_default_indicators(chart)?;
    workspace.add_indicator(chart, "sma", None)?;
    workspace.add_indicator(chart, "volume", Some(0))?;

    let workspace = Arc::new(Mutex::new(workspace));
    let fetcher = FetchLoop::new(Arc::clone(&workspace), source, period);
    let cancel = fetcher.cancel_flag();
    let handle = fetcher.spawn();

    tokio::time::sleep(period * WARMUP_TICKS).await;
    // Panning recomputes indicators, which may wait on worker threads.
    let shared = Arc::clone(&workspace);
    tokio::task::spawn_blocking(move || shared.blocking_lock().pan(chart, 400.0)).await?;
    tokio::time::sleep(period * PAN_TICKS).await;

    cancel.store(true, Ordering::Relaxed);
    let batches = handle.await?;

    let workspace = workspace.lock().await;
    let Some(snapshot) = workspace.snapshot(chart) else {
        anyhow::bail!("chart {} disappeared", chart);
    };
    let range = workspace.chart(chart).map(|c| c.range()).unwrap_or_default();
    log::info!(
        "{} batches fetched; {} instances drew {} primitives and {} axis labels",
        batches,
        snapshot.order.len(),
        snapshot.main_len(),
        snapshot.axis.len()
    );
    if let Some((min, max)) = snapshot.bounds() {
        println!(
            "{}: {} primitives over [{}, {}], prices {:.2}..{:.2}, axis {:.0}px",
            chart,
            snapshot.main_len(),
            range.start,
            range.end,
            min,
            max,
            snapshot.max_text_width
        );
    } else {
        println!("{}: nothing to draw", chart);
    }
    Ok(())
}

fn run() -> Result<()> {
    env_logger::init();

    let config = Config::load_default();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match config.general.data_file.clone() {
        Some(path) => {
            let source = CsvSource::open(
                &path,
                &config.general.default_source,
                &config.general.default_symbol,
            )?;
            let anchor = source.last_timestamp();
            runtime.block_on(demo(config, Arc::new(source), anchor))
        }
        None => runtime.block_on(demo(config, Arc::new(RandomWalkSource::new(42)), None)),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
    }
}

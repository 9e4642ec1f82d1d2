use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use anyhow::{Context, Result};

use regime_allocator::config::Config;
use regime_allocator::engine::history_depth;
use regime_allocator::history::InMemoryPriceHistory;
use regime_allocator::model::bar::Bar;
use regime_allocator::{AllocationEngine, BarOutcome, EngineError};

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set REGIME_ALLOCATOR_CONFIG or provide config/default.toml");
            std::process::exit(1);
        }
    };

    // stdout carries decisions, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.logging.level.as_str())
            }),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .json()
        .init();

    let source = std::env::args().nth(1).unwrap_or_else(|| "-".to_string());
    let reader: Box<dyn BufRead> = if source == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&source).with_context(|| format!("failed to open {}", source))?;
        Box::new(BufReader::new(file))
    };

    let equity = config.rebalance.portfolio_equity;

    tracing::info!(
        source = %source,
        signal = %config.symbols.signal,
        equity = %equity,
        "Starting regime-allocator"
    );

    let history = InMemoryPriceHistory::new(history_depth(&config));
    let mut engine = AllocationEngine::new(config, history)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut decided = 0usize;
    let mut skipped = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let bar = match Bar::from_json_line(&line) {
            Ok(bar) => bar,
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "Skipping malformed bar");
                continue;
            }
        };
        match engine.on_bar(&bar, equity) {
            Ok(BarOutcome::Decided(decision)) => {
                decided += 1;
                serde_json::to_writer(&mut out, &decision)?;
                out.write_all(b"\n")?;
            }
            Ok(BarOutcome::Skipped(_)) => skipped += 1,
            Ok(BarOutcome::Recorded) => {}
            Err(
                e @ (EngineError::UnknownSymbol(_)
                | EngineError::OutOfOrder { .. }
                | EngineError::MissingInput { .. }),
            ) => {
                tracing::warn!(line = idx + 1, symbol = %bar.symbol, error = %e, "Bar rejected");
            }
            Err(e) => return Err(e.into()),
        }
    }
    out.flush()?;

    let snapshot = engine.snapshot();
    tracing::info!(
        decided,
        skipped,
        bars_processed = snapshot.bars_processed,
        cell_id = snapshot.cell_id,
        "Replay finished"
    );
    Ok(())
}

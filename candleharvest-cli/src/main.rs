//! CandleHarvest CLI — download, symbols, cache, and export commands.
//!
//! Commands:
//! - `download` — fetch OHLCV history for a symbol, checkpointing into the Parquet cache
//! - `symbols` — list live products on the exchange
//! - `cache status` — report cached symbols, resolutions, and ranges
//! - `export` — dump cached candles to CSV

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use candleharvest_core::{
    CandleSource, DeltaClient, DownloadConfig, DownloadError, Downloader, ParquetCache,
    Resolution, StdoutProgress,
};

#[derive(Parser)]
#[command(
    name = "candleharvest",
    about = "Bulk historical OHLCV downloader for Delta-shaped exchanges"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download OHLCV history for a symbol into the Parquet cache.
    Download {
        /// Symbol to download (e.g. BTCUSD).
        symbol: String,

        /// Candle resolution: 1m 3m 5m 15m 30m 1h 2h 4h 6h 12h 1d 3d 1w 1M.
        #[arg(long, default_value = "1h")]
        resolution: String,

        /// Start date (YYYY-MM-DD). Defaults to 1 year ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to now.
        #[arg(long)]
        end: Option<String>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// TOML file with downloader knobs (delays, caps, cadence, budget).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the base inter-request delay in seconds.
        #[arg(long)]
        delay: Option<f64>,
    },
    /// List live products on the exchange, sorted by symbol.
    Symbols,
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Export cached candles to CSV.
    Export {
        /// Symbol to export.
        symbol: String,

        /// Candle resolution of the cached data.
        #[arg(long, default_value = "1h")]
        resolution: String,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Output CSV path.
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached symbols, resolutions, ranges, and candle counts.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            symbol,
            resolution,
            start,
            end,
            cache_dir,
            config,
            delay,
        } => run_download(symbol, resolution, start, end, cache_dir, config, delay),
        Commands::Symbols => run_symbols(),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
        Commands::Export {
            symbol,
            resolution,
            cache_dir,
            output,
        } => run_export(symbol, resolution, cache_dir, output),
    }
}

fn run_download(
    symbol: String,
    resolution: String,
    start: Option<String>,
    end: Option<String>,
    cache_dir: PathBuf,
    config_path: Option<PathBuf>,
    delay: Option<f64>,
) -> Result<()> {
    let resolution: Resolution = resolution.parse()?;

    let start_date = parse_date(start.as_deref())?
        .unwrap_or_else(|| Utc::now() - chrono::Duration::days(365));
    let end_date = parse_date(end.as_deref())?.unwrap_or_else(Utc::now);

    let mut config = match config_path {
        Some(path) => DownloadConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DownloadConfig::default(),
    };
    if let Some(delay) = delay {
        config.base_delay_secs = delay;
    }

    let client = DeltaClient::new();
    let cache = ParquetCache::new(&cache_dir, resolution);
    let progress = StdoutProgress;

    println!(
        "Downloading {symbol} at {resolution} from {} to {}",
        start_date.format("%Y-%m-%d %H:%M"),
        end_date.format("%Y-%m-%d %H:%M"),
    );

    let downloader = Downloader::new(&client, &progress, &cache, config);
    let result = match downloader.download(&symbol, resolution, start_date, end_date) {
        Ok(result) => result,
        Err(DownloadError::Aborted {
            errors,
            message,
            partial,
            ..
        }) => {
            eprintln!("Download aborted after {errors} error(s): {message}");
            if !partial.is_empty() {
                cache.write(&symbol, &partial, client.name())?;
                eprintln!("Kept {} candle(s) fetched before the abort.", partial.len());
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    // Final write: the cache holds the complete series even when the range
    // finished between checkpoints.
    cache.write(&symbol, &result.candles, client.name())?;

    println!(
        "Done: {} candles for {symbol} in {:.0}s",
        result.candles.len(),
        result.status.elapsed_secs,
    );
    Ok(())
}

fn run_symbols() -> Result<()> {
    let client = DeltaClient::new();
    let symbols = client.available_symbols()?;

    for symbol in &symbols {
        println!("{symbol}");
    }
    println!();
    println!("{} live products", symbols.len());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let metas = ParquetCache::scan(cache_dir);
    if metas.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!();
    println!(
        "{:<12} {:<5} {:<34} {:>10}  {}",
        "Symbol", "Res", "Range", "Candles", "Source"
    );
    println!("{}", "-".repeat(76));
    for meta in &metas {
        println!(
            "{:<12} {:<5} {} to {} {:>10}  {}",
            meta.symbol,
            meta.resolution.token(),
            meta.start.format("%Y-%m-%d %H:%M"),
            meta.end.format("%Y-%m-%d %H:%M"),
            meta.candle_count,
            meta.source,
        );
    }

    Ok(())
}

fn run_export(
    symbol: String,
    resolution: String,
    cache_dir: PathBuf,
    output: PathBuf,
) -> Result<()> {
    let resolution: Resolution = resolution.parse()?;
    let cache = ParquetCache::new(&cache_dir, resolution);

    let candles = cache
        .load(&symbol)
        .with_context(|| format!("loading cached candles for {symbol} at {resolution}"))?;

    let mut writer = csv::Writer::from_path(&output)
        .with_context(|| format!("creating {}", output.display()))?;
    writer.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
    for c in &candles {
        writer.write_record(&[
            c.timestamp.to_rfc3339(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    writer.flush()?;

    println!("Exported {} candles to {}", candles.len(), output.display());
    Ok(())
}

/// Parse a `YYYY-MM-DD` date into the UTC midnight instant.
fn parse_date(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
    })
    .transpose()
}

//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_source::CsvSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::bar::Bar;
use crate::domain::cache::BarCache;
use crate::domain::catalog::{CatalogFilter, CoverageSummary};
use crate::domain::coverage::DayRange;
use crate::domain::error::CacheError;
use crate::domain::orchestrator::FillReport;
use crate::domain::series::{SeriesKey, Timeframe};
use crate::domain::settings::CacheSettings;
use crate::ports::config_port::ConfigPort;
use crate::ports::source_port::BarSource;

#[derive(Parser, Debug)]
#[command(name = "barcache", about = "Local-first OHLCV cache with gap filling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// One series over an inclusive day range.
#[derive(Args, Debug, Clone)]
pub struct SeriesArgs {
    #[arg(long)]
    pub provider: String,
    #[arg(long)]
    pub symbol: String,
    #[arg(long)]
    pub timeframe: String,
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,
    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,
}

impl SeriesArgs {
    pub fn key(&self) -> Result<SeriesKey, CacheError> {
        SeriesKey::parse(&self.provider, &self.symbol, &self.timeframe)
    }

    pub fn days(&self) -> Result<(NaiveDate, NaiveDate), CacheError> {
        let first = parse_date(&self.start)?;
        let last = parse_date(&self.end)?;
        if first > last {
            return Err(CacheError::Validation {
                reason: format!("start {first} is after end {last}"),
            });
        }
        Ok((first, last))
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub symbol: Option<String>,
    #[arg(long)]
    pub timeframe: Option<String>,
}

impl FilterArgs {
    /// Timeframes are normalised so `1D` matches the stored `1d`.
    pub fn to_filter(&self) -> Result<CatalogFilter, CacheError> {
        let timeframe = match &self.timeframe {
            Some(tf) => Some(tf.parse::<Timeframe>()?.to_string()),
            None => None,
        };
        Ok(CatalogFilter {
            provider: self.provider.clone(),
            symbol: self.symbol.clone(),
            timeframe,
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print cached bars as CSV without contacting any provider
    Query {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Show the day ranges a fill would fetch
    Missing {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Fill gaps from a directory of CSV exports
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        series: SeriesArgs,
        /// Directory holding <symbol>_<timeframe>.csv files
        #[arg(long)]
        source_dir: PathBuf,
    },
    /// Summarise day coverage per series
    Coverage {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Remove catalog entries, coverage and files
    Clear {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        /// Required when no filter is given
        #[arg(long)]
        yes: bool,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Query { config, series } => run_query(&config, &series),
        Command::Missing { config, series } => run_missing(&config, &series),
        Command::Import {
            config,
            series,
            source_dir,
        } => run_import(&config, &series, &source_dir),
        Command::Coverage { config, filter } => run_coverage(&config, &filter),
        Command::Clear {
            config,
            filter,
            yes,
        } => run_clear(&config, &filter, yes),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CacheError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| CacheError::InvalidDate {
        value: value.to_string(),
    })
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, CacheError> {
    FileConfigAdapter::from_file(path)
}

/// Builds the cache described by `[cache]`, `[catalog]` and `[fetch]`.
#[cfg(feature = "sqlite")]
pub fn open_cache(config: &dyn ConfigPort) -> Result<BarCache, CacheError> {
    use crate::adapters::csv_bucket::CsvBucketStore;
    use crate::adapters::sqlite_catalog::SqliteCatalog;

    let settings = CacheSettings::from_config(config)?;
    let catalog = SqliteCatalog::from_config(config)?;
    Ok(BarCache::new(
        Arc::new(catalog),
        Arc::new(CsvBucketStore::new()),
        settings,
    ))
}

#[cfg(not(feature = "sqlite"))]
pub fn open_cache(config: &dyn ConfigPort) -> Result<BarCache, CacheError> {
    CacheSettings::from_config(config)?;
    Err(CacheError::Database {
        reason: "barcache was built without the sqlite feature".into(),
    })
}

pub fn write_bars_csv<W: Write>(out: W, bars: &[Bar]) -> Result<(), CacheError> {
    let mut wtr = csv::Writer::from_writer(out);
    for bar in bars {
        wtr.serialize(bar).map_err(|e| CacheError::Storage {
            path: "<stdout>".into(),
            reason: e.to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn format_ranges(ranges: &[DayRange]) -> String {
    if ranges.is_empty() {
        return "fully covered\n".to_string();
    }
    let mut out = String::new();
    for range in ranges {
        let days = range.len_days();
        let unit = if days == 1 { "day" } else { "days" };
        out.push_str(&format!("{range} ({days} {unit})\n"));
    }
    out
}

pub fn format_report(report: &FillReport) -> String {
    let mut out = format!(
        "ranges: {} filled, {} empty, {} failed; {} rows written\n",
        report.succeeded.len(),
        report.empty.len(),
        report.failed.len(),
        report.rows_written
    );
    for range in &report.empty {
        out.push_str(&format!("  empty  {range}\n"));
    }
    for failure in &report.failed {
        out.push_str(&format!("  failed {}: {}\n", failure.range, failure.error));
    }
    out
}

pub fn format_coverage(summaries: &[CoverageSummary]) -> String {
    if summaries.is_empty() {
        return "no cached series\n".to_string();
    }
    let fmt_day = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
    let mut out = format!(
        "{:<12} {:<14} {:<6} {:>6} {:<10} {:<10} {:>10}\n",
        "provider", "symbol", "tf", "days", "first", "last", "rows"
    );
    for s in summaries {
        out.push_str(&format!(
            "{:<12} {:<14} {:<6} {:>6} {:<10} {:<10} {:>10}\n",
            s.key.provider,
            s.key.symbol,
            s.key.timeframe.to_string(),
            s.day_count,
            fmt_day(s.first_day),
            fmt_day(s.last_day),
            s.total_rows
        ));
    }
    out
}

fn run_query(config_path: &Path, series: &SeriesArgs) -> Result<ExitCode, CacheError> {
    let key = series.key()?;
    let (first, last) = series.days()?;
    let cache = open_cache(&load_config(config_path)?)?;

    let response = cache.get(&key, first, last, None)?;
    write_bars_csv(io::stdout().lock(), &response.bars)?;
    Ok(ExitCode::SUCCESS)
}

fn run_missing(config_path: &Path, series: &SeriesArgs) -> Result<ExitCode, CacheError> {
    let key = series.key()?;
    let (first, last) = series.days()?;
    let cache = open_cache(&load_config(config_path)?)?;

    let ranges = cache.missing_ranges(&key, first, last)?;
    print!("{}", format_ranges(&ranges));
    Ok(ExitCode::SUCCESS)
}

fn run_import(
    config_path: &Path,
    series: &SeriesArgs,
    source_dir: &Path,
) -> Result<ExitCode, CacheError> {
    let key = series.key()?;
    let (first, last) = series.days()?;
    let cache = open_cache(&load_config(config_path)?)?;

    let source: Arc<dyn BarSource> =
        Arc::new(CsvSource::named(key.provider.clone(), source_dir.to_path_buf()));
    let response = cache.get(&key, first, last, Some(source))?;

    print!("{}", format_report(&response.report));
    println!("{} bars available for {key} {first}..{last}", response.bars.len());

    match response.report.failed.first() {
        Some(failure) => Ok((&failure.error).into()),
        None => Ok(ExitCode::SUCCESS),
    }
}

fn run_coverage(config_path: &Path, filter: &FilterArgs) -> Result<ExitCode, CacheError> {
    let filter = filter.to_filter()?;
    let cache = open_cache(&load_config(config_path)?)?;

    print!("{}", format_coverage(&cache.coverage_summary(&filter)?));
    Ok(ExitCode::SUCCESS)
}

fn run_clear(config_path: &Path, filter: &FilterArgs, yes: bool) -> Result<ExitCode, CacheError> {
    let filter = filter.to_filter()?;
    if filter.is_empty() && !yes {
        return Err(CacheError::Validation {
            reason: "refusing to clear the whole cache without --yes".into(),
        });
    }
    let cache = open_cache(&load_config(config_path)?)?;

    let report = cache.clear(&filter)?;
    println!(
        "removed {} catalog entries and {} files",
        report.entries_removed,
        report.files_removed.len()
    );
    Ok(ExitCode::SUCCESS)
}

#[cfg(all(test, not(feature = "sqlite")))]
mod tests {
    use super::*;

    #[test]
    fn open_cache_without_sqlite_checks_settings_then_refuses() {
        let missing = FileConfigAdapter::from_string("[catalog]\npath = x.db\n").unwrap();
        assert!(matches!(open_cache(&missing), Err(CacheError::ConfigMissing { .. })));

        let complete = FileConfigAdapter::from_string("[cache]\nbase_dir = bars\n").unwrap();
        assert!(matches!(open_cache(&complete), Err(CacheError::Database { .. })));
    }
}

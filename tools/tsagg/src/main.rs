//! tsagg - Time-series aggregation over CSV samples
//!
//! Runs a function-call expression such as `mean_t(temperature:1h)` or
//! `max_t(mean_a(temperature:3h))` over samples loaded from CSV and prints
//! the aggregated series.

mod input;
mod output;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use voltage_timeseries::{
    erase_redundant_group_timesteps, Aggregator, DataFilter, DataFunction, EngineConfig,
    LocalDateTime, LocalTimePool, TimeSeriesGeneratorOptions, TimeSeriesGroup, TimestepCache,
};

/// Filter field read from the `quality` column
const QUALITY_FIELD: &str = "quality";

#[derive(Parser)]
#[command(name = "tsagg")]
#[command(about = "Time-series aggregation over CSV samples")]
#[command(long_about = "Time-series aggregation over CSV samples

Commands:
  aggregate   Aggregate samples with a function-call expression
  parse       Show how a function-call expression is interpreted
  timesteps   Generate output timesteps

Examples:
  tsagg aggregate -i samples.csv -f 'mean_t(temperature:1h)'
  tsagg aggregate -i samples.csv -f 'max_t(mean_a(temperature:3h))' --step 60
  tsagg aggregate -i samples.csv -f 'nanmean_a(temperature)' --filter 'le 5,ge 90'
  tsagg parse 'max_t(nanmean_a[0:40](temperature:3h))'
  tsagg timesteps --start 2024-01-01T00:00:00Z --end 2024-01-02T00:00:00Z --step 180")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "TSAGG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate samples with a function-call expression
    Aggregate {
        /// CSV file with `time,value[,lon,lat][,quality]` columns
        #[arg(short, long)]
        input: PathBuf,

        /// Function-call expression, e.g. `mean_t(temperature:1h)`
        #[arg(short, long)]
        function: String,

        /// Data filter rules for the quality column, e.g. `le 5,ge 90`
        #[arg(long)]
        filter: Option<String>,

        /// UTC offset of the output times
        #[arg(long, default_value = "+00:00")]
        zone: String,

        /// Keep only timesteps on this grid (minutes from local midnight)
        #[arg(long)]
        step: Option<u32>,
    },

    /// Show how a function-call expression is interpreted
    Parse {
        /// Function-call expression
        expression: String,
    },

    /// Generate output timesteps
    Timesteps {
        /// First time (RFC 3339)
        #[arg(long)]
        start: String,

        /// Last time (RFC 3339)
        #[arg(long)]
        end: String,

        /// Step in minutes
        #[arg(long, default_value_t = 60)]
        step: u32,

        /// UTC offset of the generated times
        #[arg(long, default_value = "+00:00")]
        zone: String,

        /// Stop after this many timesteps
        #[arg(long)]
        count: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load(cli.config.as_deref()).context("Invalid configuration")?;

    match cli.command {
        Commands::Aggregate {
            input,
            function,
            filter,
            zone,
            step,
        } => aggregate_command(&config, &input, &function, filter.as_deref(), &zone, step),
        Commands::Parse { expression } => parse_command(&config, &expression),
        Commands::Timesteps {
            start,
            end,
            step,
            zone,
            count,
        } => timesteps_command(&config, &start, &end, step, &zone, count),
    }
}

fn aggregate_command(
    config: &EngineConfig,
    input: &Path,
    function: &str,
    filter: Option<&str>,
    zone_label: &str,
    step: Option<u32>,
) -> Result<()> {
    let zone = parse_zone(zone_label)?;
    let call = config.parser()?.parse(function)?;

    let mut pool = LocalTimePool::new();
    let mut samples = input::load_samples(input, &mut pool, zone, zone_label)?;

    if let Some(rules) = filter {
        let mut data_filter = DataFilter::new();
        data_filter.set_data_filter(QUALITY_FIELD, rules)?;
        let masked: TimeSeriesGroup = samples
            .group
            .iter()
            .zip(&samples.flags)
            .map(|(member, flags)| {
                let mut masked = member.clone();
                masked.series = data_filter.mask_series(QUALITY_FIELD, &member.series, flags);
                masked
            })
            .collect();
        samples.group = masked;
    }

    let mut result = Aggregator::new()
        .aggregate_group(&samples.group, &call.functions)
        .with_context(|| format!("Cannot aggregate {}", call.name))?;

    if let Some(step) = step {
        let timesteps = samples.group.timestamps();
        if let (Some(first), Some(last)) = (timesteps.first(), timesteps.last()) {
            let cache = TimestepCache::new(config.timestep_cache_size);
            let opts = TimeSeriesGeneratorOptions::time_steps(first.utc(), last.utc(), step);
            let grid: Vec<LocalDateTime> = cache
                .generate(&opts, &zone, zone_label)?
                .iter()
                .map(|t| pool.intern(*t, zone_label))
                .collect();
            result = erase_redundant_group_timesteps(&result, &grid);
        }
    }

    let rows = output::write_group(std::io::stdout().lock(), &result)?;
    tracing::info!(
        parameter = %call.name,
        functions = %call.functions,
        locations = result.len(),
        rows,
        "Aggregation complete"
    );
    Ok(())
}

fn parse_command(config: &EngineConfig, expression: &str) -> Result<()> {
    let call = config.parser()?.parse(expression)?;

    println!("parameter: {}", call.name);
    println!("expression: {}", call.functions);
    describe("inner", call.functions.inner());
    describe("outer", call.functions.outer());
    Ok(())
}

fn describe(label: &str, func: &DataFunction) {
    if !func.exists() {
        println!("{}: none", label);
        return;
    }
    println!(
        "{}: {} over {:?}, nan-tolerant: {}, directional: {}, window: -{}m/+{}m",
        label,
        func.id(),
        func.domain(),
        func.is_nan_tolerant(),
        func.is_directional(),
        func.behind_minutes(),
        func.ahead_minutes(),
    );
}

fn timesteps_command(
    config: &EngineConfig,
    start: &str,
    end: &str,
    step: u32,
    zone_label: &str,
    count: Option<usize>,
) -> Result<()> {
    let zone = parse_zone(zone_label)?;
    let mut opts = TimeSeriesGeneratorOptions::time_steps(parse_time(start)?, parse_time(end)?, step);
    opts.timesteps = count;

    let cache = TimestepCache::new(config.timestep_cache_size);
    for t in cache.generate(&opts, &zone, zone_label)?.iter() {
        println!("{}", t.to_rfc3339());
    }
    Ok(())
}

fn parse_zone(text: &str) -> Result<FixedOffset> {
    text.parse::<FixedOffset>()
        .map_err(|e| anyhow!("Invalid UTC offset '{}': {}", text, e))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid time '{}'", text))
}

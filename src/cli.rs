//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::csv_store_adapter::{write_panel, CsvStoreAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::synthetic_adapter::SyntheticDataAdapter;
use crate::domain::config::{build_pipeline_config, DataSourceKind, PipelineConfig};
use crate::domain::error::CausalError;
use crate::domain::estimator::simulate_rate_change;
use crate::domain::metrics::PerformanceSummary;
use crate::domain::pipeline::{allocate, estimate, linear_effects, prepare, run_backtests, run_pipeline};
use crate::domain::sample::{generate_sample, SampleSpec};
use crate::domain::upload::load_upload;
use crate::ports::data_port::DataPort;
use crate::ports::persistence_port::PersistencePort;

#[derive(Parser, Debug)]
#[command(
    name = "causalfolio",
    about = "Causal-effect portfolio construction and backtesting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a deterministic synthetic sample
    SampleData {
        /// Last business day of the sample (YYYY-MM-DD)
        #[arg(long)]
        end_date: NaiveDate,
        #[arg(long, default_value_t = 5)]
        assets: usize,
        #[arg(long, default_value_t = 100)]
        days: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Directory to write the sample into; prints CSV to stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "v1")]
        version: String,
    },
    /// Validate an uploaded market data file
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Estimate effects and scale them by a rate change in percent
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        rate_change: f64,
    },
    /// Compute causal and mean-variance weights
    Portfolio {
        #[arg(short, long)]
        config: PathBuf,
        /// Allow negative effects to carry weight
        #[arg(long)]
        allow_short: bool,
    },
    /// Backtest both weightings without writing any output
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the full pipeline and store every intermediate panel
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Override the configured output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::SampleData {
            end_date,
            assets,
            days,
            seed,
            output,
            version,
        } => {
            let spec = SampleSpec {
                num_assets: assets,
                num_days: days,
                seed,
                ..SampleSpec::new(end_date)
            };
            run_sample_data(&spec, output.as_deref(), &version)
        }
        Command::Validate { file } => run_validate(&file),
        Command::Simulate {
            config,
            rate_change,
        } => run_simulate(&config, rate_change),
        Command::Portfolio {
            config,
            allow_short,
        } => run_portfolio(&config, allow_short),
        Command::Backtest { config } => run_backtest(&config),
        Command::Run { config, output } => run_full(&config, output),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Load, validate and build the run configuration from an INI file.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, ExitCode> {
    tracing::info!(path = %path.display(), "loading config");
    let adapter = load_config(path)?;
    build_pipeline_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Data source selected by `[data] source`.
pub fn build_data_port(config: &PipelineConfig) -> Result<Box<dyn DataPort>, CausalError> {
    match config.data.source {
        DataSourceKind::Csv => Ok(Box::new(CsvDataAdapter::new(config.data.data_dir.clone()))),
        DataSourceKind::Synthetic => {
            let synthetic = &config.data.synthetic;
            let spec = SampleSpec {
                num_assets: synthetic.assets,
                num_days: synthetic.days,
                seed: synthetic.seed,
                ..SampleSpec::new(config.data.end_date)
            };
            Ok(Box::new(SyntheticDataAdapter::new(&spec)?))
        }
    }
}

fn load_with_port(path: &Path) -> Result<(PipelineConfig, Box<dyn DataPort>), ExitCode> {
    let config = load_pipeline_config(path)?;
    let data = build_data_port(&config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    Ok((config, data))
}

fn run_sample_data(spec: &SampleSpec, output: Option<&Path>, version: &str) -> ExitCode {
    let sample = match generate_sample(spec) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    match output {
        Some(dir) => match CsvStoreAdapter::new(dir.to_path_buf()).store("sample_data", version, &sample) {
            Ok(path) => {
                println!("Wrote {} rows to {}", sample.len(), path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                (&e).into()
            }
        },
        None => match write_panel(&sample, std::io::stdout()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                (&e).into()
            }
        },
    }
}

fn run_validate(path: &Path) -> ExitCode {
    tracing::info!(path = %path.display(), "validating upload");
    let table = match load_upload(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let symbols = table.symbols();
    let (first, last) = match (table.rows.first(), table.rows.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => {
            let err = CausalError::NoData {
                series: path.display().to_string(),
            };
            eprintln!("error: {err}");
            return (&err).into();
        }
    };

    if let Err(e) = table.price_panel() {
        eprintln!("error: {e}");
        return (&e).into();
    }

    println!("Upload is valid");
    println!("  rows:    {}", table.rows.len());
    println!("  symbols: {}", symbols.join(", "));
    println!("  range:   {first} to {last}");
    ExitCode::SUCCESS
}

fn run_simulate(config_path: &Path, rate_change_pct: f64) -> ExitCode {
    let (config, data) = match load_with_port(config_path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let result = prepare(&config, data.as_ref()).and_then(|prepared| {
        let effects = estimate(&config, &prepared)?;
        let linear = linear_effects(&config, &prepared)?;
        Ok((effects, linear))
    });
    let (effects, linear) = match result {
        Ok(e) => e,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let simulated = simulate_rate_change(&effects.effects, rate_change_pct);
    println!("Impact of a {rate_change_pct}% change in {}:", config.data.treatment);
    for (((asset, effect), ols), impact) in effects
        .assets
        .iter()
        .zip(&effects.effects)
        .zip(&linear)
        .zip(&simulated)
    {
        println!("  {asset:<16} effect {effect:>12.6}  linear {ols:>12.6}  impact {impact:>12.6}");
    }
    ExitCode::SUCCESS
}

fn run_portfolio(config_path: &Path, allow_short: bool) -> ExitCode {
    let (mut config, data) = match load_with_port(config_path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    config.portfolio.allow_short |= allow_short;

    let result = prepare(&config, data.as_ref()).and_then(|prepared| {
        let effects = estimate(&config, &prepared)?;
        allocate(&config, &prepared, &effects)
    });
    let allocation = match result {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    println!("{:<16} {:>10} {:>10}", "asset", "causal", "markowitz");
    for ((asset, causal), markowitz) in allocation
        .assets
        .iter()
        .zip(&allocation.causal)
        .zip(&allocation.markowitz)
    {
        println!("{asset:<16} {causal:>10.4} {markowitz:>10.4}");
    }
    ExitCode::SUCCESS
}

fn run_backtest(config_path: &Path) -> ExitCode {
    let (config, data) = match load_with_port(config_path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let result = prepare(&config, data.as_ref()).and_then(|prepared| {
        let effects = estimate(&config, &prepared)?;
        let allocation = allocate(&config, &prepared, &effects)?;
        run_backtests(&config, &prepared, &allocation)
    });
    match result {
        Ok(report) => {
            print_summary("Causal", &report.causal_summary);
            print_summary("Markowitz", &report.markowitz_summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_full(config_path: &Path, output: Option<PathBuf>) -> ExitCode {
    let (mut config, data) = match load_with_port(config_path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    if let Some(dir) = output {
        config.output.dir = dir;
    }

    let store = CsvStoreAdapter::new(config.output.dir.clone());
    match run_pipeline(&config, data.as_ref(), Some(&store)) {
        Ok(output) => {
            if !output.prepared.differenced.is_empty() {
                println!("Differenced: {}", output.prepared.differenced.join(", "));
            }
            println!("{:<16} {:>12} {:>10} {:>10}", "asset", "effect", "causal", "markowitz");
            for (i, asset) in output.allocation.assets.iter().enumerate() {
                println!(
                    "{asset:<16} {:>12.6} {:>10.4} {:>10.4}",
                    output.effects.effects[i], output.allocation.causal[i], output.allocation.markowitz[i]
                );
            }
            print_summary("Causal", &output.backtest.causal_summary);
            print_summary("Markowitz", &output.backtest.markowitz_summary);
            println!("\nStored:");
            for path in &output.stored {
                println!("  {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn print_summary(label: &str, summary: &PerformanceSummary) {
    println!("\n{label} portfolio ({} periods)", summary.periods);
    println!("  Total return:       {:>10.4}", summary.total_return);
    println!("  Annualized return:  {:>10.4}", summary.annualized_return);
    println!("  Annualized vol:     {:>10.4}", summary.annualized_volatility);
    println!("  Sharpe ratio:       {:>10.4}", summary.sharpe_ratio);
    println!("  Sortino ratio:      {:>10.4}", summary.sortino_ratio);
    println!(
        "  Max drawdown:       {:>10.4} ({} periods)",
        summary.max_drawdown, summary.max_drawdown_duration
    );
}

//! CLI integration tests for config loading and command plumbing.
//!
//! Tests cover:
//! - Building a PipelineConfig from INI text and from files on disk
//! - Validation failures surfacing as config errors
//! - Data port selection from `[data] source`
//! - CSV directory runs through the full pipeline
//! - Upload validation of CSV files

mod common;

use causalfolio::adapters::file_config_adapter::FileConfigAdapter;
use causalfolio::cli;
use causalfolio::domain::align::Frequency;
use causalfolio::domain::config::{build_pipeline_config, DataSourceKind};
use causalfolio::domain::error::CausalError;
use causalfolio::domain::forest::Sampling;
use causalfolio::domain::pipeline::run_pipeline;
use causalfolio::domain::upload::load_upload;
use causalfolio::ports::data_port::DataPort;
use common::*;
use std::io::Write;
use std::path::PathBuf;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const FULL_INI: &str = r#"
[data]
source = csv
data_dir = /srv/market
tickers = SPY, QQQ, IWM
indicators = FEDFUNDS, CPIAUCSL, UNRATE
treatment = FEDFUNDS
start_date = 2015-01-01
end_date = 2024-12-31
frequency = M

[stationarity]
significance = 0.01

[estimator]
seed = 123
folds = 3
nuisance_trees = 50
nuisance_min_leaf = 8
trees = 200
min_leaf = 4
max_depth = 12
subsample = 0.6

[portfolio]
allow_short = yes
risk_aversion = 2.5
max_iterations = 5000
tolerance = 1e-8
risk_free_rate = 0.03

[output]
dir = /tmp/causalfolio
version = v7
"#;

mod config_loading {
    use super::*;

    #[test]
    fn builds_full_config() {
        let adapter = FileConfigAdapter::from_string(FULL_INI).unwrap();
        let config = build_pipeline_config(&adapter).unwrap();

        assert_eq!(config.data.source, DataSourceKind::Csv);
        assert_eq!(config.data.data_dir, PathBuf::from("/srv/market"));
        assert_eq!(config.data.tickers, vec!["SPY", "QQQ", "IWM"]);
        assert_eq!(config.data.indicators, vec!["FEDFUNDS", "CPIAUCSL", "UNRATE"]);
        assert_eq!(config.data.covariates(), vec!["CPIAUCSL", "UNRATE"]);
        assert_eq!(config.data.start_date, date(2015, 1, 1));
        assert_eq!(config.data.end_date, date(2024, 12, 31));
        assert_eq!(config.data.frequency, Frequency::MonthEnd);
        assert!((config.significance - 0.01).abs() < f64::EPSILON);

        assert_eq!(config.estimator.seed, 123);
        assert_eq!(config.estimator.folds, 3);
        assert_eq!(config.estimator.nuisance.n_trees, 50);
        assert_eq!(config.estimator.nuisance.tree.min_samples_leaf, 8);
        assert_eq!(config.estimator.effect.n_trees, 200);
        assert_eq!(config.estimator.effect.tree.min_samples_leaf, 4);
        assert_eq!(config.estimator.effect.tree.max_depth, Some(12));
        assert_eq!(config.estimator.effect.sampling, Sampling::Subsample(0.6));

        assert!(config.portfolio.allow_short);
        assert!((config.portfolio.markowitz.risk_aversion - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.portfolio.markowitz.max_iterations, 5000);
        assert!((config.portfolio.risk_free_rate - 0.03).abs() < f64::EPSILON);

        assert_eq!(config.output.dir, PathBuf::from("/tmp/causalfolio"));
        assert_eq!(config.output.version, "v7");
    }

    #[test]
    fn minimal_config_uses_synthetic_defaults() {
        let config = config_from("[data]\nstart_date = 2024-01-01\nend_date = 2024-06-28\n");

        assert_eq!(config.data.source, DataSourceKind::Synthetic);
        assert_eq!(
            config.data.tickers,
            vec!["asset_1", "asset_2", "asset_3", "asset_4", "asset_5"]
        );
        assert_eq!(config.data.treatment, "fed_rate");
        assert_eq!(
            config.data.covariates(),
            vec!["inflation", "gdp_growth", "unemployment"]
        );
        assert_eq!(config.data.frequency, Frequency::BusinessDay);
        assert!(!config.portfolio.allow_short);
        assert_eq!(config.output.version, "v1");
        assert_eq!(config.estimator.folds, 2);
    }

    #[test]
    fn load_pipeline_config_reads_file() {
        let file = write_temp_ini(FULL_INI);
        let config = cli::load_pipeline_config(file.path()).unwrap();
        assert_eq!(config.output.version, "v7");
    }

    #[test]
    fn load_pipeline_config_rejects_missing_file() {
        assert!(cli::load_pipeline_config(std::path::Path::new("/nonexistent/run.ini")).is_err());
    }

    #[test]
    fn missing_dates_are_config_missing() {
        let adapter = FileConfigAdapter::from_string("[data]\nsource = synthetic\n").unwrap();
        let err = build_pipeline_config(&adapter).unwrap_err();
        assert!(matches!(err, CausalError::ConfigMissing { ref key, .. } if key == "start_date"));
    }

    #[test]
    fn csv_source_requires_directory_and_lists() {
        let adapter = FileConfigAdapter::from_string(
            "[data]\nsource = csv\nstart_date = 2024-01-01\nend_date = 2024-06-28\n",
        )
        .unwrap();
        let err = build_pipeline_config(&adapter).unwrap_err();
        assert!(matches!(err, CausalError::ConfigMissing { ref key, .. } if key == "data_dir"));
    }

    #[test]
    fn treatment_outside_indicators_is_invalid() {
        let adapter = FileConfigAdapter::from_string(
            "[data]\nindicators = inflation\ntreatment = fed_rate\nstart_date = 2024-01-01\nend_date = 2024-06-28\n",
        )
        .unwrap();
        let err = build_pipeline_config(&adapter).unwrap_err();
        assert!(matches!(err, CausalError::ConfigInvalid { ref key, .. } if key == "treatment"));
    }

    #[test]
    fn unparseable_number_is_invalid() {
        let adapter = FileConfigAdapter::from_string(
            "[data]\nstart_date = 2024-01-01\nend_date = 2024-06-28\n[portfolio]\nrisk_aversion = lots\n",
        )
        .unwrap();
        let err = build_pipeline_config(&adapter).unwrap_err();
        assert!(matches!(err, CausalError::ConfigInvalid { ref key, .. } if key == "risk_aversion"));
    }
}

mod data_port_selection {
    use super::*;

    fn write_series(dir: &std::path::Path, name: &str, header: &str, dates: &[chrono::NaiveDate], values: &[f64]) {
        let mut file = std::fs::File::create(dir.join(format!("{name}.csv"))).unwrap();
        writeln!(file, "date,{header}").unwrap();
        for (d, v) in dates.iter().zip(values) {
            writeln!(file, "{},{v}", d.format("%Y-%m-%d")).unwrap();
        }
    }

    #[test]
    fn synthetic_source_serves_configured_assets() {
        let config = config_from(
            "[data]\nstart_date = 2024-01-01\nend_date = 2024-06-28\nsynthetic_assets = 2\nsynthetic_days = 40\n",
        );
        let port = cli::build_data_port(&config).unwrap();
        let prices = port
            .fetch_prices(&config.data.tickers, config.data.start_date, config.data.end_date)
            .unwrap();
        assert_eq!(prices.columns(), &["asset_1", "asset_2"]);
        assert_eq!(prices.len(), 40);
    }

    #[test]
    fn csv_directory_runs_full_pipeline() {
        let dir = tempfile::TempDir::new().unwrap();
        let market = planted_market(150, [10.0, 0.0, -10.0], 21);
        let index = market.prices.index().to_vec();
        for ticker in ["AAA", "BBB", "CCC"] {
            let values = market.prices.dense_column(ticker).unwrap();
            write_series(dir.path(), ticker, "close", &index, &values);
        }
        for name in ["fed_rate", "inflation"] {
            let values = market.indicators[name].dense_column(name).unwrap();
            write_series(dir.path(), name, "value", &index, &values);
        }

        let mut config = mock_config();
        config.data.source = DataSourceKind::Csv;
        config.data.data_dir = dir.path().to_path_buf();
        let port = cli::build_data_port(&config).unwrap();

        let from_csv = run_pipeline(&config, port.as_ref(), None).unwrap();
        let from_mock = run_pipeline(&config, &market, None).unwrap();
        assert_eq!(from_csv.effects.assets, from_mock.effects.assets);
        assert_eq!(from_csv.prepared.aligned.index(), from_mock.prepared.aligned.index());
        assert_eq!(from_csv.allocation.causal.len(), 3);
    }
}

mod upload_validation {
    use super::*;

    fn write_upload(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn valid_upload_pivots_to_prices() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_upload(
            &dir,
            "market.csv",
            "date,symbol,price,return,volume\n\
             2024-01-02,SPY,470.0,0.001,1000\n\
             2024-01-02,QQQ,400.0,0.002,900\n\
             2024-01-03,SPY,471.0,0.0021,1100\n\
             2024-01-03,QQQ,401.0,0.0025,950\n",
        );

        let table = load_upload(&path).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.symbols(), vec!["QQQ", "SPY"]);
        let prices = table.price_panel().unwrap();
        assert_eq!(prices.index(), &[date(2024, 1, 2), date(2024, 1, 3)]);
        assert_eq!(prices.dense_column("SPY").unwrap(), vec![470.0, 471.0]);
    }

    #[test]
    fn missing_columns_are_listed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_upload(&dir, "thin.csv", "date,symbol,return\n2024-01-02,SPY,0.01\n");

        let err = load_upload(&path).unwrap_err();
        match err {
            CausalError::SchemaValidation { missing } => assert_eq!(missing, vec!["price", "volume"]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn parquet_is_unsupported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_upload(&dir, "market.parquet", "PAR1");
        assert!(matches!(
            load_upload(&path),
            Err(CausalError::UnsupportedFormat { .. })
        ));
    }
}

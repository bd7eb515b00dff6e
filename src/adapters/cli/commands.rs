//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the sentinel parameter tuner.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::json_store::JsonFileStore;
use crate::application::adjuster::{AdaptiveParameterAdjuster, AdjusterError};
use crate::application::mode_switcher::ModeSwitcher;
use crate::config::{load_config, Config};
use crate::domain::mode::TradingMode;
use crate::domain::observations::ObservationTable;
use crate::domain::trade::PerformanceMetrics;
use crate::ports::trade_history::{TradeFilter, TradeHistory};

/// Model snapshot written next to the market data by default
pub const DEFAULT_MODEL_FILE: &str = "model.json";

/// Sentinel - Adaptive Trading Parameter Tuner
#[derive(Parser, Debug)]
#[command(
    name = "sentinel",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Adaptive trading parameter tuner with safety validation",
    long_about = "Sentinel learns how trading parameters correlate with performance, \
                  recommends new values, and runs every recommendation through bounds, \
                  confidence, rate-limit, correlation and fallback checks before storing it."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Learn parameter/performance correlations from observations
    Train(TrainCmd),

    /// Generate validated parameter recommendations
    Predict(PredictCmd),

    /// Adapt the model from recent closed trades
    Feedback(FeedbackCmd),

    /// Check a single parameter value against its bounds
    Validate(ValidateCmd),

    /// Show the default value of every known parameter
    Defaults(DefaultsCmd),

    /// Switch trading mode and store the mode baseline for every market
    SwitchMode(SwitchModeCmd),

    /// Show model and mode status
    Status(StatusCmd),
}

impl Command {
    fn config_path(&self) -> &Path {
        match self {
            Command::Train(cmd) => &cmd.config,
            Command::Predict(cmd) => &cmd.config,
            Command::Feedback(cmd) => &cmd.config,
            Command::Validate(cmd) => &cmd.config,
            Command::Defaults(cmd) => &cmd.config,
            Command::SwitchMode(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
        }
    }
}

/// Train on historical observations
#[derive(Parser, Debug)]
pub struct TrainCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,

    /// JSON array of observation rows (column name -> value)
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// Column holding the performance measure
    #[arg(long, value_name = "COLUMN", default_value = "performance")]
    pub target: String,

    /// Model snapshot path (defaults to model.json in the data directory)
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,
}

/// Generate recommendations
#[derive(Parser, Debug)]
pub struct PredictCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,

    /// Model snapshot path (defaults to model.json in the data directory)
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,
}

/// Learn from closed trades
#[derive(Parser, Debug)]
pub struct FeedbackCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,

    /// Performance metrics JSON; derived from the trades when omitted
    #[arg(long, value_name = "FILE")]
    pub metrics: Option<PathBuf>,

    /// Only trades on this pair
    #[arg(long, value_name = "PAIR", requires = "coin")]
    pub pair: Option<String>,

    /// Only trades on this coin
    #[arg(long, value_name = "COIN", requires = "pair")]
    pub coin: Option<String>,

    /// Days of trades to read (defaults to the mode lookback)
    #[arg(long, value_name = "DAYS")]
    pub days: Option<i64>,

    /// Model snapshot path (defaults to model.json in the data directory)
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,
}

/// Bounds check
#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Parameter name (e.g., risk_per_trade)
    #[arg(value_name = "PARAMETER")]
    pub parameter: String,

    /// Value to check
    #[arg(value_name = "VALUE", allow_negative_numbers = true)]
    pub value: f64,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,
}

/// Parameter defaults
#[derive(Parser, Debug)]
pub struct DefaultsCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,
}

/// Trading mode switch
#[derive(Parser, Debug)]
pub struct SwitchModeCmd {
    /// Requested mode (conservative, balanced, aggressive)
    #[arg(value_name = "MODE")]
    pub mode: TradingMode,

    /// Switch even when performance does not call for it
    #[arg(long)]
    pub force: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,

    /// Model snapshot path (defaults to model.json in the data directory)
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,
}

/// Status report
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sentinel.toml")]
    pub config: PathBuf,

    /// Model snapshot path (defaults to model.json in the data directory)
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = load_config(app.command.config_path())
        .with_context(|| format!("Failed to load configuration from {}", app.command.config_path().display()))?;

    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Train(cmd) => train_command(cmd, &config).await,
        Command::Predict(cmd) => predict_command(cmd, &config).await,
        Command::Feedback(cmd) => feedback_command(cmd, &config).await,
        Command::Validate(cmd) => validate_command(cmd, &config).await,
        Command::Defaults(_) => defaults_command(&config).await,
        Command::SwitchMode(cmd) => switch_mode_command(cmd, &config).await,
        Command::Status(cmd) => status_command(cmd, &config).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, configured: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}

fn model_path(config: &Config, model: Option<PathBuf>) -> PathBuf {
    model.unwrap_or_else(|| config.storage.get_data_dir().join(DEFAULT_MODEL_FILE))
}

/// Adjuster restored from the snapshot when one exists
fn open_adjuster(config: &Config, path: &Path) -> Result<AdaptiveParameterAdjuster> {
    let mut adjuster = AdaptiveParameterAdjuster::from_config(config);
    match adjuster.load_model(path) {
        Ok(()) => {}
        Err(AdjusterError::SnapshotMissing(_)) => {
            tracing::info!("No model snapshot at {}, starting from configuration", path.display());
        }
        Err(e) => return Err(e).context("Failed to load model snapshot"),
    }
    Ok(adjuster)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handle train command
async fn train_command(cmd: TrainCmd, config: &Config) -> Result<()> {
    tracing::info!("Training on {} (target: {})", cmd.data.display(), cmd.target);

    let table = ObservationTable::load_json(&cmd.data)
        .with_context(|| format!("Failed to read observations from {}", cmd.data.display()))?;

    let path = model_path(config, cmd.model);
    let mut adjuster = open_adjuster(config, &path)?;
    let now = Utc::now();
    let report = adjuster.train(&table, &cmd.target, now);

    if adjuster.is_trained() {
        adjuster.save_model(&path, now).context("Failed to save model snapshot")?;
        tracing::info!("Model snapshot written to {}", path.display());
    }

    print_json(&report)
}

/// Handle predict command
async fn predict_command(cmd: PredictCmd, config: &Config) -> Result<()> {
    let adjuster = open_adjuster(config, &model_path(config, cmd.model))?;
    print_json(&adjuster.predict(Utc::now()))
}

/// Handle feedback command
async fn feedback_command(cmd: FeedbackCmd, config: &Config) -> Result<()> {
    let now = Utc::now();
    let days = cmd.days.unwrap_or(config.mode.performance_lookback_days);
    if days <= 0 {
        bail!("--days must be positive, got {}", days);
    }

    let store = JsonFileStore::new(config.storage.get_data_dir());
    let mut filter = TradeFilter::since(now - Duration::days(days));
    if let (Some(pair), Some(coin)) = (cmd.pair, cmd.coin) {
        filter = filter.with_market(pair, coin);
    }
    let trades = store.closed_trades(filter).await.context("Failed to read trade history")?;
    tracing::info!("Read {} closed trades from the last {} days", trades.len(), days);

    let metrics = match cmd.metrics {
        Some(ref file) => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read metrics from {}", file.display()))?;
            serde_json::from_str::<PerformanceMetrics>(&content).context("Invalid metrics JSON")?
        }
        None => PerformanceMetrics::from_trades(&trades),
    };

    let path = model_path(config, cmd.model);
    let mut adjuster = open_adjuster(config, &path)?;
    let report = adjuster.update_parameters_from_trading_results(&trades, metrics, now);

    if report.status.is_success() {
        adjuster.save_model(&path, now).context("Failed to save model snapshot")?;
    }

    print_json(&report)
}

/// Handle validate command
async fn validate_command(cmd: ValidateCmd, config: &Config) -> Result<()> {
    let adjuster = AdaptiveParameterAdjuster::from_config(config);
    let check = adjuster.validate_parameter_bounds(&cmd.parameter, cmd.value);

    println!("{}: {} -> {:?}", check.parameter_name, check.value, check.status);
    println!("  {}", check.message);
    if let Some(corrected) = check.corrected_value {
        println!("  Suggested value: {}", corrected);
    }

    Ok(())
}

/// Handle defaults command
async fn defaults_command(config: &Config) -> Result<()> {
    let adjuster = AdaptiveParameterAdjuster::from_config(config);
    for (name, value) in adjuster.default_parameters() {
        println!("{:<24} {}", name, value);
    }
    Ok(())
}

/// Handle switch-mode command
async fn switch_mode_command(cmd: SwitchModeCmd, config: &Config) -> Result<()> {
    let store = Arc::new(JsonFileStore::new(config.storage.get_data_dir()));
    let adjuster = open_adjuster(config, &model_path(config, cmd.model))?;

    let mut mode_config = config.mode.clone();
    if let Some(saved) = store.saved_mode().await.context("Failed to read saved mode")? {
        mode_config.initial_mode = saved;
    }

    let mut switcher = ModeSwitcher::new(Arc::clone(&store), Arc::clone(&store), mode_config)
        .with_model_source(config.storage.model_source.clone());
    let report = switcher.switch_mode(&adjuster, cmd.mode, cmd.force, Utc::now()).await;

    if report.switched {
        store
            .save_mode(report.current_mode)
            .await
            .context("Failed to save trading mode")?;
    }

    print_json(&report)?;

    if !report.switched && !report.status.is_success() {
        bail!("{}", report.message);
    }
    Ok(())
}

/// Handle status command
async fn status_command(cmd: StatusCmd, config: &Config) -> Result<()> {
    let now = Utc::now();
    let store = Arc::new(JsonFileStore::new(config.storage.get_data_dir()));
    let adjuster = open_adjuster(config, &model_path(config, cmd.model))?;

    let mut mode_config = config.mode.clone();
    if let Some(saved) = store.saved_mode().await.context("Failed to read saved mode")? {
        mode_config.initial_mode = saved;
    }
    let switcher = ModeSwitcher::new(Arc::clone(&store), Arc::clone(&store), mode_config);
    let performance = switcher.current_performance(now).await;

    let evaluation = match adjuster.evaluate() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            tracing::debug!("Evaluation skipped: {}", e);
            None
        }
    };

    print_json(&serde_json::json!({
        "model": adjuster.model_info(),
        "evaluation": evaluation,
        "feature_importance": adjuster.feature_importance(),
        "mode": {
            "current": switcher.current_mode(),
            "optimal": TradingMode::for_score(performance.score),
            "performance_score": performance.score,
            "volatility": performance.volatility,
            "trades": performance.statistics.trade_count,
        },
        "timestamp": now,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_app_parse_train() {
        let args = vec!["sentinel", "train", "--data", "obs.json"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Train(cmd) => {
                assert_eq!(cmd.data, PathBuf::from("obs.json"));
                assert_eq!(cmd.target, "performance");
                assert!(cmd.model.is_none());
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_cli_app_parse_train_requires_data() {
        assert!(CliApp::try_parse_from(vec!["sentinel", "train"]).is_err());
    }

    #[test]
    fn test_cli_app_parse_feedback() {
        let args = vec![
            "sentinel", "feedback",
            "--pair", "BTCUSDT",
            "--coin", "BTC",
            "--days", "7",
            "--metrics", "metrics.json",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Feedback(cmd) => {
                assert_eq!(cmd.pair.as_deref(), Some("BTCUSDT"));
                assert_eq!(cmd.coin.as_deref(), Some("BTC"));
                assert_eq!(cmd.days, Some(7));
                assert_eq!(cmd.metrics, Some(PathBuf::from("metrics.json")));
            }
            _ => panic!("Expected Feedback command"),
        }
    }

    #[test]
    fn test_cli_app_parse_feedback_pair_needs_coin() {
        assert!(CliApp::try_parse_from(vec!["sentinel", "feedback", "--pair", "BTCUSDT"]).is_err());
    }

    #[test]
    fn test_cli_app_parse_validate() {
        let args = vec!["sentinel", "validate", "risk_per_trade", "-0.5"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Validate(cmd) => {
                assert_eq!(cmd.parameter, "risk_per_trade");
                assert_eq!(cmd.value, -0.5);
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_app_parse_switch_mode() {
        let args = vec!["sentinel", "switch-mode", "aggressive", "--force"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::SwitchMode(cmd) => {
                assert_eq!(cmd.mode, TradingMode::Aggressive);
                assert!(cmd.force);
            }
            _ => panic!("Expected SwitchMode command"),
        }
    }

    #[test]
    fn test_cli_app_parse_switch_mode_rejects_unknown() {
        assert!(CliApp::try_parse_from(vec!["sentinel", "switch-mode", "reckless"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let args = vec!["sentinel", "-v", "--debug", "status"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.verbose);
        assert!(app.debug);
    }

    #[test]
    fn test_default_config_path() {
        let args = vec!["sentinel", "defaults"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert_eq!(app.command.config_path(), Path::new("config/sentinel.toml"));
    }

    #[test]
    fn test_model_path_defaults_to_data_dir() {
        let config = Config::default();
        let path = model_path(&config, None);
        assert!(path.ends_with(DEFAULT_MODEL_FILE));

        let explicit = model_path(&config, Some(PathBuf::from("/tmp/m.json")));
        assert_eq!(explicit, PathBuf::from("/tmp/m.json"));
    }

    #[test]
    fn test_open_adjuster_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.adjuster.learning_state_path = dir.path().join("state.json");

        let adjuster = open_adjuster(&config, &dir.path().join("missing.json")).unwrap();
        assert!(!adjuster.is_trained());
    }

    #[tokio::test]
    async fn test_switch_mode_tags_records_with_configured_source() {
        use crate::adapters::json_store::Markets;
        use crate::ports::parameter_store::{Coin, Pair, ParameterStore};

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.adjuster.learning_state_path = dir.path().join("state.json");
        config.storage.data_dir = dir.path().to_path_buf();
        config.storage.model_source = "TunerService".to_string();

        let store = JsonFileStore::new(dir.path());
        let markets = Markets {
            pairs: vec![Pair::new("BTCUSDT")],
            coins: vec![Coin::new("BTC")],
        };
        store.set_markets(&markets).await.unwrap();

        let cmd = SwitchModeCmd {
            mode: TradingMode::Aggressive,
            force: true,
            config: PathBuf::from("unused.toml"),
            model: Some(dir.path().join("model.json")),
        };
        switch_mode_command(cmd, &config).await.unwrap();

        let records = store
            .active_parameters(&Pair::new("BTCUSDT"), &Coin::new("BTC"))
            .await
            .unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.model_source == "TunerService"));
        assert!(records.iter().all(|r| r.recommendation_id.starts_with("TS_")));
        assert_eq!(store.saved_mode().await.unwrap(), Some(TradingMode::Aggressive));
    }
}

//! Configuration management for the FX engine.
//!
//! Loads settings from an optional `config.{toml,yaml,json}` file and
//! `HFX__SECTION__KEY` environment variables. Every threshold used by the
//! scanners, admission, lifecycle and recovery stages lives here.

use crate::error::EngineError;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Terminal bridge connection
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Scan loop scheduling and capacity
    #[serde(default)]
    pub engine: EngineConfig,
    /// Quote cache and price history
    #[serde(default)]
    pub market: MarketConfig,
    /// Lot sizing and order parameters
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Per-strategy scanner thresholds
    #[serde(default)]
    pub scanners: ScannerConfig,
    /// Signal admission gates
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Per-position exit rules
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Aggregate profit lock-in and emergency liquidation
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    /// Recovery escalation ladder
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the terminal bridge (e.g. "http://127.0.0.1:8228")
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    /// API key sent as `X-API-KEY`
    #[serde(default)]
    pub api_key: String,
    /// Secret used to sign request bodies
    #[serde(default)]
    pub secret_key: String,
    /// Request timeout in seconds
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Instruments refreshed every cycle
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,
    /// Cycle interval under normal conditions
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Cycle interval when spreads are tight and prices are moving
    #[serde(default = "default_fast_interval_ms")]
    pub fast_interval_ms: u64,
    /// Cycle interval while the circuit breaker is open
    #[serde(default = "default_slow_interval_ms")]
    pub slow_interval_ms: u64,
    /// Average spread at or below which the fast interval may apply
    #[serde(default = "default_fast_max_spread_pips")]
    pub fast_max_spread_pips: Decimal,
    /// Volatility at or above which the fast interval may apply
    #[serde(default = "default_fast_min_volatility_pips")]
    pub fast_min_volatility_pips: Decimal,
    /// Open-position ceiling across all instruments
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Maximum signals admitted per cycle
    #[serde(default = "default_burst_cap")]
    pub burst_cap: usize,
    /// Maximum successful executions per cycle
    #[serde(default = "default_max_executions_per_cycle")]
    pub max_executions_per_cycle: usize,
    /// How long `stop()` waits for the loop to finish its cycle
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Consecutive failed cycles before the breaker opens
    #[serde(default = "default_max_consecutive_failed_cycles")]
    pub max_consecutive_failed_cycles: u32,
    /// Cycles the breaker stays open before probing again
    #[serde(default = "default_breaker_cooldown_cycles")]
    pub breaker_cooldown_cycles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Rolling mid-price samples kept per instrument
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Samples used for the volatility estimate
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
    /// Quotes older than this are dropped on refresh
    #[serde(default = "default_max_quote_age_secs")]
    pub max_quote_age_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Lot size for fresh entries
    #[serde(default = "default_lot")]
    pub default_lot: Decimal,
    /// Smallest lot the broker accepts
    #[serde(default = "default_min_lot")]
    pub min_lot: Decimal,
    /// Largest lot any single order may carry
    #[serde(default = "default_max_lot")]
    pub max_lot: Decimal,
    /// Lot granularity
    #[serde(default = "default_lot_step")]
    pub lot_step: Decimal,
    /// Account-currency value of one pip on one standard lot
    #[serde(default = "default_pip_value_per_lot")]
    pub pip_value_per_lot: Decimal,
    /// Allowed slippage in points
    #[serde(default = "default_deviation_points")]
    pub deviation_points: u32,
    /// Magic number stamped on every order
    #[serde(default = "default_magic")]
    pub magic: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScannerConfig {
    #[serde(default)]
    pub triangular: TriangularConfig,
    #[serde(default)]
    pub momentum: MomentumConfig,
    #[serde(default)]
    pub mean_reversion: MeanReversionConfig,
    #[serde(default)]
    pub breakout: BreakoutConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub scalping: ScalpingConfig,
}

/// Two legs sharing a currency, plus the cross they imply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriangleDef {
    pub leg_a: String,
    pub leg_b: String,
    pub cross: String,
}

impl TriangleDef {
    pub fn new(leg_a: &str, leg_b: &str, cross: &str) -> Self {
        Self {
            leg_a: leg_a.to_string(),
            leg_b: leg_b.to_string(),
            cross: cross.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangularConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_triangles")]
    pub triangles: Vec<TriangleDef>,
    /// Minimum executable divergence in cross pips
    #[serde(default = "default_min_divergence_pips")]
    pub min_divergence_pips: Decimal,
    /// Divergences above this are treated as bad data
    #[serde(default = "default_max_divergence_pips")]
    pub max_divergence_pips: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_momentum_window")]
    pub window: usize,
    #[serde(default = "default_momentum_min_strength_pips")]
    pub min_strength_pips: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanReversionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mean_reversion_window")]
    pub window: usize,
    /// Deviation threshold in standard deviations
    #[serde(default = "default_std_multiplier")]
    pub std_multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Prior samples forming the high/low range
    #[serde(default = "default_breakout_window")]
    pub window: usize,
    /// Ranges narrower than this are ignored
    #[serde(default = "default_breakout_min_range_pips")]
    pub min_range_pips: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Samples over which returns are compared
    #[serde(default = "default_correlation_window")]
    pub window: usize,
    /// Return divergence in basis points needed to trade
    #[serde(default = "default_correlation_min_divergence_bps")]
    pub min_divergence_bps: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalpingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_scalp_max_spread_pips")]
    pub max_spread_pips: Decimal,
    #[serde(default = "default_scalp_min_volatility_pips")]
    pub min_volatility_pips: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Signals below this confidence (0-100) are dropped
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Signals below this expected edge are dropped
    #[serde(default = "default_min_edge_pips")]
    pub min_edge_pips: Decimal,
    #[serde(default = "default_max_signal_age_secs")]
    pub max_signal_age_secs: i64,
    #[serde(default = "default_scalp_max_signal_age_secs")]
    pub scalp_max_signal_age_secs: i64,
    /// Minimum gap between trades on one instrument
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
    #[serde(default = "default_scalp_cooldown_secs")]
    pub scalp_cooldown_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_profit_target_usd")]
    pub profit_target_usd: Decimal,
    #[serde(default = "default_profit_target_pips")]
    pub profit_target_pips: Decimal,
    #[serde(default = "default_scalp_profit_usd")]
    pub scalp_profit_usd: Decimal,
    #[serde(default = "default_scalp_profit_pips")]
    pub scalp_profit_pips: Decimal,
    #[serde(default = "default_scalp_max_age_minutes")]
    pub scalp_max_age_minutes: i64,
    #[serde(default = "default_stop_loss_usd")]
    pub stop_loss_usd: Decimal,
    #[serde(default = "default_stop_loss_pips")]
    pub stop_loss_pips: Decimal,
    #[serde(default = "default_time_exit_hours")]
    pub time_exit_hours: i64,
    /// Loss beyond which an aged position is cut
    #[serde(default = "default_time_loss_usd")]
    pub time_loss_usd: Decimal,
    #[serde(default = "default_arb_max_age_minutes")]
    pub arb_max_age_minutes: i64,
    #[serde(default = "default_arb_profit_usd")]
    pub arb_profit_usd: Decimal,
    #[serde(default = "default_recovery_profit_usd")]
    pub recovery_profit_usd: Decimal,
    #[serde(default = "default_recovery_timeout_minutes")]
    pub recovery_timeout_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Aggregate open profit that triggers a partial lock-in
    #[serde(default = "default_lock_in_profit_usd")]
    pub lock_in_profit_usd: Decimal,
    /// Optional cap on positions closed per lock-in. Unset closes every winner.
    #[serde(default)]
    pub lock_in_max_closes: Option<usize>,
    /// Aggregate open loss that liquidates everything
    #[serde(default = "default_emergency_loss_usd")]
    pub emergency_loss_usd: Decimal,
    /// Smallest profit closed by an operator profit lock
    #[serde(default = "default_force_lock_min_profit_usd")]
    pub force_lock_min_profit_usd: Decimal,
    /// Net lots per currency above which new exposure in that direction is refused
    #[serde(default = "default_max_currency_exposure")]
    pub max_currency_exposure: Decimal,
    /// Aggregate open loss at which hedge recommendations are produced
    #[serde(default = "default_portfolio_hedge_loss_usd")]
    pub hedge_trigger_loss_usd: Decimal,
    /// Net lots per currency worth a hedge recommendation
    #[serde(default = "default_hedge_min_exposure")]
    pub hedge_min_exposure: Decimal,
}

/// Recovery methods, in the order they may be tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMethod {
    Martingale,
    Grid,
    Hedge,
    Correlation,
}

impl RecoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryMethod::Martingale => "martingale",
            RecoveryMethod::Grid => "grid",
            RecoveryMethod::Hedge => "hedge",
            RecoveryMethod::Correlation => "correlation",
        }
    }
}

impl std::fmt::Display for RecoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Escalation order; a later method takes over once the previous is exhausted
    #[serde(default = "default_ladder")]
    pub ladder: Vec<RecoveryMethod>,
    /// Anchor loss beyond which an instrument counts as underwater
    #[serde(default = "default_underwater_loss_usd")]
    pub underwater_loss_usd: Decimal,
    #[serde(default = "default_underwater_pips")]
    pub underwater_pips: Decimal,
    /// Minimum gap between escalations on one instrument
    #[serde(default = "default_escalation_cooldown_secs")]
    pub escalation_cooldown_secs: i64,
    #[serde(default)]
    pub martingale: MartingaleConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub correlation: CorrelationRecoveryConfig,
    /// Aggregate open loss that liquidates everything
    #[serde(default = "default_recovery_emergency_loss_usd")]
    pub emergency_loss_usd: Decimal,
    /// Open loss as a percentage of balance that liquidates everything
    #[serde(default = "default_emergency_drawdown_pct")]
    pub emergency_drawdown_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MartingaleConfig {
    #[serde(default = "default_martingale_trigger_pips")]
    pub trigger_pips: Decimal,
    #[serde(default = "default_martingale_multiplier")]
    pub multiplier: Decimal,
    #[serde(default = "default_martingale_max_levels")]
    pub max_levels: u32,
    #[serde(default = "default_martingale_max_lot")]
    pub max_lot: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_step_pips")]
    pub step_pips: Decimal,
    #[serde(default = "default_grid_lot_multiplier")]
    pub lot_multiplier: Decimal,
    #[serde(default = "default_grid_max_levels")]
    pub max_levels: u32,
    #[serde(default = "default_grid_max_lot")]
    pub max_lot: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    #[serde(default = "default_hedge_trigger_loss_usd")]
    pub trigger_loss_usd: Decimal,
    #[serde(default = "default_hedge_ratio")]
    pub ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecoveryConfig {
    #[serde(default = "default_corr_trigger_loss_usd")]
    pub trigger_loss_usd: Decimal,
    /// Size of the correlated hedge relative to the anchor
    #[serde(default = "default_hedge_strength")]
    pub hedge_strength: Decimal,
    /// Candidate hedge instruments per instrument, in preference order
    #[serde(default = "default_correlation_map")]
    pub pairs: HashMap<String, Vec<String>>,
    /// Pairs that move together; any other mapped pair is treated as inverse
    #[serde(default = "default_positive_pairs")]
    pub positive_pairs: Vec<(String, String)>,
}

impl CorrelationRecoveryConfig {
    /// Hedge candidates for `instrument`. Keys are matched case-insensitively
    /// since file sources lowercase map keys.
    pub fn hedges_for(&self, instrument: &str) -> &[String] {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(instrument))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_positive(&self, a: &str, b: &str) -> bool {
        self.positive_pairs
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8228".to_string()
}

fn default_bridge_timeout() -> u64 {
    10
}

fn default_instruments() -> Vec<String> {
    ["EURUSD", "GBPUSD", "EURGBP", "USDJPY", "EURJPY", "GBPJPY"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_fast_interval_ms() -> u64 {
    500
}

fn default_slow_interval_ms() -> u64 {
    5000
}

fn default_fast_max_spread_pips() -> Decimal {
    Decimal::new(15, 1) // 1.5 pips
}

fn default_fast_min_volatility_pips() -> Decimal {
    Decimal::new(2, 0)
}

fn default_max_open_positions() -> usize {
    15
}

fn default_burst_cap() -> usize {
    5
}

fn default_max_executions_per_cycle() -> usize {
    2
}

fn default_join_timeout_ms() -> u64 {
    10_000
}

fn default_max_consecutive_failed_cycles() -> u32 {
    5
}

fn default_breaker_cooldown_cycles() -> u32 {
    10
}

fn default_history_len() -> usize {
    100
}

fn default_volatility_window() -> usize {
    10
}

fn default_max_quote_age_secs() -> i64 {
    30
}

fn default_lot() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_min_lot() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_max_lot() -> Decimal {
    Decimal::ONE
}

fn default_lot_step() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_pip_value_per_lot() -> Decimal {
    Decimal::new(10, 0) // $10 per pip per standard lot
}

fn default_deviation_points() -> u32 {
    20
}

fn default_magic() -> u64 {
    234000
}

fn default_triangles() -> Vec<TriangleDef> {
    vec![
        TriangleDef::new("EURUSD", "GBPUSD", "EURGBP"),
        TriangleDef::new("EURUSD", "USDJPY", "EURJPY"),
        TriangleDef::new("GBPUSD", "USDJPY", "GBPJPY"),
    ]
}

fn default_min_divergence_pips() -> Decimal {
    Decimal::new(5, 1) // 0.5 pips
}

fn default_max_divergence_pips() -> Decimal {
    Decimal::new(50, 0)
}

fn default_momentum_window() -> usize {
    5
}

fn default_momentum_min_strength_pips() -> Decimal {
    Decimal::new(2, 0)
}

fn default_mean_reversion_window() -> usize {
    10
}

fn default_std_multiplier() -> Decimal {
    Decimal::new(15, 1) // 1.5 sigma
}

fn default_breakout_window() -> usize {
    10
}

fn default_breakout_min_range_pips() -> Decimal {
    Decimal::new(1, 0)
}

fn default_correlation_window() -> usize {
    10
}

fn default_correlation_min_divergence_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_scalp_max_spread_pips() -> Decimal {
    Decimal::new(2, 0)
}

fn default_scalp_min_volatility_pips() -> Decimal {
    Decimal::ONE
}

fn default_min_confidence() -> Decimal {
    Decimal::new(40, 0)
}

fn default_min_edge_pips() -> Decimal {
    Decimal::new(5, 1) // 0.5 pips
}

fn default_max_signal_age_secs() -> i64 {
    15
}

fn default_scalp_max_signal_age_secs() -> i64 {
    5
}

fn default_cooldown_secs() -> i64 {
    180
}

fn default_scalp_cooldown_secs() -> i64 {
    60
}

fn default_profit_target_usd() -> Decimal {
    Decimal::new(25, 0)
}

fn default_profit_target_pips() -> Decimal {
    Decimal::new(15, 0)
}

fn default_scalp_profit_usd() -> Decimal {
    Decimal::new(5, 0)
}

fn default_scalp_profit_pips() -> Decimal {
    Decimal::new(3, 0)
}

fn default_scalp_max_age_minutes() -> i64 {
    60
}

fn default_stop_loss_usd() -> Decimal {
    Decimal::new(50, 0)
}

fn default_stop_loss_pips() -> Decimal {
    Decimal::new(25, 0)
}

fn default_time_exit_hours() -> i64 {
    4
}

fn default_time_loss_usd() -> Decimal {
    Decimal::new(10, 0)
}

fn default_arb_max_age_minutes() -> i64 {
    30
}

fn default_arb_profit_usd() -> Decimal {
    Decimal::new(10, 0)
}

fn default_recovery_profit_usd() -> Decimal {
    Decimal::new(15, 0)
}

fn default_recovery_timeout_minutes() -> i64 {
    180
}

fn default_lock_in_profit_usd() -> Decimal {
    Decimal::new(200, 0)
}


fn default_emergency_loss_usd() -> Decimal {
    Decimal::new(300, 0)
}

fn default_force_lock_min_profit_usd() -> Decimal {
    Decimal::new(20, 0)
}

fn default_max_currency_exposure() -> Decimal {
    Decimal::ONE
}

fn default_portfolio_hedge_loss_usd() -> Decimal {
    Decimal::new(50, 0)
}

fn default_hedge_min_exposure() -> Decimal {
    Decimal::new(1, 1)
}

fn default_ladder() -> Vec<RecoveryMethod> {
    vec![
        RecoveryMethod::Martingale,
        RecoveryMethod::Grid,
        RecoveryMethod::Hedge,
        RecoveryMethod::Correlation,
    ]
}

fn default_underwater_loss_usd() -> Decimal {
    Decimal::new(10, 0)
}

fn default_underwater_pips() -> Decimal {
    Decimal::new(10, 0)
}

fn default_escalation_cooldown_secs() -> i64 {
    60
}

fn default_martingale_trigger_pips() -> Decimal {
    Decimal::new(20, 0)
}

fn default_martingale_multiplier() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

fn default_martingale_max_levels() -> u32 {
    3
}

fn default_martingale_max_lot() -> Decimal {
    Decimal::new(2, 0)
}

fn default_grid_step_pips() -> Decimal {
    Decimal::new(15, 0)
}

fn default_grid_lot_multiplier() -> Decimal {
    Decimal::new(12, 1) // 1.2
}

fn default_grid_max_levels() -> u32 {
    5
}

fn default_grid_max_lot() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

fn default_hedge_trigger_loss_usd() -> Decimal {
    Decimal::new(100, 0)
}

fn default_hedge_ratio() -> Decimal {
    Decimal::ONE
}

fn default_corr_trigger_loss_usd() -> Decimal {
    Decimal::new(50, 0)
}

fn default_hedge_strength() -> Decimal {
    Decimal::new(8, 1) // 0.8
}

fn default_correlation_map() -> HashMap<String, Vec<String>> {
    let entries: [(&str, [&str; 2]); 4] = [
        ("EURUSD", ["GBPUSD", "EURGBP"]),
        ("GBPUSD", ["EURUSD", "EURGBP"]),
        ("USDJPY", ["EURJPY", "GBPJPY"]),
        ("EURJPY", ["USDJPY", "GBPJPY"]),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn default_positive_pairs() -> Vec<(String, String)> {
    [("EURUSD", "GBPUSD"), ("USDJPY", "EURJPY"), ("USDCHF", "EURCHF")]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

fn default_recovery_emergency_loss_usd() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_emergency_drawdown_pct() -> Decimal {
    Decimal::new(15, 0)
}

fn check(condition: bool, message: &str) -> std::result::Result<(), EngineError> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::Configuration(message.to_string()))
    }
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("HFX"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        let engine = &self.engine;
        check(!engine.instruments.is_empty(), "engine.instruments must not be empty")?;
        check(
            engine.scan_interval_ms > 0 && engine.fast_interval_ms > 0 && engine.slow_interval_ms > 0,
            "scan intervals must be positive",
        )?;
        check(
            engine.fast_interval_ms <= engine.scan_interval_ms
                && engine.scan_interval_ms <= engine.slow_interval_ms,
            "intervals must satisfy fast <= base <= slow",
        )?;
        check(engine.max_open_positions > 0, "max_open_positions must be > 0")?;
        check(engine.burst_cap > 0, "burst_cap must be > 0")?;
        check(
            engine.max_executions_per_cycle > 0,
            "max_executions_per_cycle must be > 0",
        )?;
        check(
            engine.max_consecutive_failed_cycles > 0,
            "max_consecutive_failed_cycles must be > 0",
        )?;

        let market = &self.market;
        check(market.history_len >= 2, "market.history_len must be >= 2")?;
        check(
            market.volatility_window >= 2 && market.volatility_window <= market.history_len,
            "volatility_window must be within 2..=history_len",
        )?;
        check(market.max_quote_age_secs > 0, "max_quote_age_secs must be > 0")?;

        let sizing = &self.sizing;
        check(
            sizing.min_lot > Decimal::ZERO && sizing.min_lot <= sizing.max_lot,
            "sizing requires 0 < min_lot <= max_lot",
        )?;
        check(
            sizing.default_lot >= sizing.min_lot && sizing.default_lot <= sizing.max_lot,
            "default_lot must lie within [min_lot, max_lot]",
        )?;
        check(sizing.lot_step > Decimal::ZERO, "lot_step must be > 0")?;
        check(
            sizing.pip_value_per_lot > Decimal::ZERO,
            "pip_value_per_lot must be > 0",
        )?;

        let scanners = &self.scanners;
        check(
            scanners.triangular.min_divergence_pips > Decimal::ZERO
                && scanners.triangular.min_divergence_pips <= scanners.triangular.max_divergence_pips,
            "triangular divergence bounds must satisfy 0 < min <= max",
        )?;
        check(scanners.momentum.window >= 2, "momentum.window must be >= 2")?;
        check(
            scanners.mean_reversion.window >= 2,
            "mean_reversion.window must be >= 2",
        )?;
        check(scanners.breakout.window >= 2, "breakout.window must be >= 2")?;
        check(scanners.correlation.window >= 2, "correlation.window must be >= 2")?;
        let longest = scanners
            .momentum
            .window
            .max(scanners.mean_reversion.window)
            .max(scanners.breakout.window + 1)
            .max(scanners.correlation.window + 1);
        check(
            longest <= market.history_len,
            "scanner windows must fit inside market.history_len",
        )?;

        let admission = &self.admission;
        check(
            admission.min_confidence >= Decimal::ZERO && admission.min_confidence <= Decimal::ONE_HUNDRED,
            "min_confidence must be between 0 and 100",
        )?;
        check(
            admission.max_signal_age_secs > 0 && admission.scalp_max_signal_age_secs > 0,
            "signal ages must be positive",
        )?;
        check(
            admission.cooldown_secs >= 0 && admission.scalp_cooldown_secs >= 0,
            "cooldowns must not be negative",
        )?;

        let lifecycle = &self.lifecycle;
        check(
            lifecycle.profit_target_usd > Decimal::ZERO && lifecycle.stop_loss_usd > Decimal::ZERO,
            "profit target and stop loss must be positive",
        )?;
        check(
            lifecycle.profit_target_pips > Decimal::ZERO && lifecycle.stop_loss_pips > Decimal::ZERO,
            "pip targets must be positive",
        )?;

        let portfolio = &self.portfolio;
        check(
            portfolio.lock_in_profit_usd > Decimal::ZERO,
            "lock_in_profit_usd must be positive",
        )?;
        check(
            portfolio.emergency_loss_usd > Decimal::ZERO,
            "portfolio.emergency_loss_usd must be positive (expressed as a loss magnitude)",
        )?;
        check(
            portfolio.lock_in_max_closes != Some(0),
            "lock_in_max_closes must be > 0 when set",
        )?;
        check(
            portfolio.max_currency_exposure > Decimal::ZERO,
            "max_currency_exposure must be positive",
        )?;
        check(
            portfolio.force_lock_min_profit_usd >= Decimal::ZERO && portfolio.hedge_min_exposure >= Decimal::ZERO,
            "force_lock_min_profit_usd and hedge_min_exposure must not be negative",
        )?;

        let recovery = &self.recovery;
        if recovery.enabled {
            check(!recovery.ladder.is_empty(), "recovery.ladder must not be empty")?;
            let mut seen = Vec::new();
            for method in &recovery.ladder {
                check(!seen.contains(method), "recovery.ladder contains duplicates")?;
                seen.push(*method);
            }
            check(
                recovery.martingale.multiplier >= Decimal::ONE,
                "martingale.multiplier must be >= 1",
            )?;
            check(recovery.martingale.max_levels > 0, "martingale.max_levels must be > 0")?;
            check(recovery.grid.step_pips > Decimal::ZERO, "grid.step_pips must be > 0")?;
            check(recovery.grid.max_levels > 0, "grid.max_levels must be > 0")?;
            check(recovery.hedge.ratio > Decimal::ZERO, "hedge.ratio must be > 0")?;
            check(
                recovery.correlation.hedge_strength > Decimal::ZERO,
                "correlation.hedge_strength must be > 0",
            )?;
            check(
                recovery.emergency_drawdown_pct > Decimal::ZERO
                    && recovery.emergency_drawdown_pct <= Decimal::ONE_HUNDRED,
                "emergency_drawdown_pct must be between 0 and 100",
            )?;
        }

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            api_key: String::new(),
            secret_key: String::new(),
            timeout_secs: default_bridge_timeout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            scan_interval_ms: default_scan_interval_ms(),
            fast_interval_ms: default_fast_interval_ms(),
            slow_interval_ms: default_slow_interval_ms(),
            fast_max_spread_pips: default_fast_max_spread_pips(),
            fast_min_volatility_pips: default_fast_min_volatility_pips(),
            max_open_positions: default_max_open_positions(),
            burst_cap: default_burst_cap(),
            max_executions_per_cycle: default_max_executions_per_cycle(),
            join_timeout_ms: default_join_timeout_ms(),
            max_consecutive_failed_cycles: default_max_consecutive_failed_cycles(),
            breaker_cooldown_cycles: default_breaker_cooldown_cycles(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
            volatility_window: default_volatility_window(),
            max_quote_age_secs: default_max_quote_age_secs(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            default_lot: default_lot(),
            min_lot: default_min_lot(),
            max_lot: default_max_lot(),
            lot_step: default_lot_step(),
            pip_value_per_lot: default_pip_value_per_lot(),
            deviation_points: default_deviation_points(),
            magic: default_magic(),
        }
    }
}

impl Default for TriangularConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triangles: default_triangles(),
            min_divergence_pips: default_min_divergence_pips(),
            max_divergence_pips: default_max_divergence_pips(),
        }
    }
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_momentum_window(),
            min_strength_pips: default_momentum_min_strength_pips(),
        }
    }
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_mean_reversion_window(),
            std_multiplier: default_std_multiplier(),
        }
    }
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_breakout_window(),
            min_range_pips: default_breakout_min_range_pips(),
        }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_correlation_window(),
            min_divergence_bps: default_correlation_min_divergence_bps(),
        }
    }
}

impl Default for ScalpingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_spread_pips: default_scalp_max_spread_pips(),
            min_volatility_pips: default_scalp_min_volatility_pips(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_edge_pips: default_min_edge_pips(),
            max_signal_age_secs: default_max_signal_age_secs(),
            scalp_max_signal_age_secs: default_scalp_max_signal_age_secs(),
            cooldown_secs: default_cooldown_secs(),
            scalp_cooldown_secs: default_scalp_cooldown_secs(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            profit_target_usd: default_profit_target_usd(),
            profit_target_pips: default_profit_target_pips(),
            scalp_profit_usd: default_scalp_profit_usd(),
            scalp_profit_pips: default_scalp_profit_pips(),
            scalp_max_age_minutes: default_scalp_max_age_minutes(),
            stop_loss_usd: default_stop_loss_usd(),
            stop_loss_pips: default_stop_loss_pips(),
            time_exit_hours: default_time_exit_hours(),
            time_loss_usd: default_time_loss_usd(),
            arb_max_age_minutes: default_arb_max_age_minutes(),
            arb_profit_usd: default_arb_profit_usd(),
            recovery_profit_usd: default_recovery_profit_usd(),
            recovery_timeout_minutes: default_recovery_timeout_minutes(),
        }
    }
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            lock_in_profit_usd: default_lock_in_profit_usd(),
            lock_in_max_closes: None,
            emergency_loss_usd: default_emergency_loss_usd(),
            force_lock_min_profit_usd: default_force_lock_min_profit_usd(),
            max_currency_exposure: default_max_currency_exposure(),
            hedge_trigger_loss_usd: default_portfolio_hedge_loss_usd(),
            hedge_min_exposure: default_hedge_min_exposure(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ladder: default_ladder(),
            underwater_loss_usd: default_underwater_loss_usd(),
            underwater_pips: default_underwater_pips(),
            escalation_cooldown_secs: default_escalation_cooldown_secs(),
            martingale: MartingaleConfig::default(),
            grid: GridConfig::default(),
            hedge: HedgeConfig::default(),
            correlation: CorrelationRecoveryConfig::default(),
            emergency_loss_usd: default_recovery_emergency_loss_usd(),
            emergency_drawdown_pct: default_emergency_drawdown_pct(),
        }
    }
}

impl Default for MartingaleConfig {
    fn default() -> Self {
        Self {
            trigger_pips: default_martingale_trigger_pips(),
            multiplier: default_martingale_multiplier(),
            max_levels: default_martingale_max_levels(),
            max_lot: default_martingale_max_lot(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            step_pips: default_grid_step_pips(),
            lot_multiplier: default_grid_lot_multiplier(),
            max_levels: default_grid_max_levels(),
            max_lot: default_grid_max_lot(),
        }
    }
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            trigger_loss_usd: default_hedge_trigger_loss_usd(),
            ratio: default_hedge_ratio(),
        }
    }
}

impl Default for CorrelationRecoveryConfig {
    fn default() -> Self {
        Self {
            trigger_loss_usd: default_corr_trigger_loss_usd(),
            hedge_strength: default_hedge_strength(),
            pairs: default_correlation_map(),
            positive_pairs: default_positive_pairs(),
        }
    }
}

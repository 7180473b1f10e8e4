//! Operating configuration, layered defaults -> `.env` -> process env -> CLI.
//!
//! Mirrors this codebase's existing `Config::from_env` convention (parse with
//! `unwrap_or` defaults, `.context(...)` on anything required) but adds a
//! `clap`-derived CLI layer on top, since this is a long-running daemon
//! launched from an init script rather than a service that only reads the
//! environment.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// Hardware dialect of the connected ECR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Structured printouts with dates and per-line timestamps.
    D420,
    /// Sparser polling stream with no per-event timestamps.
    D520,
}

impl Dialect {
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "420" | "d420" => Ok(Dialect::D420),
            "520" | "d520" => Ok(Dialect::D520),
            other => anyhow::bail!("unrecognized dialect: {other} (expected d420 or d520)"),
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "ecr-aggregator")]
#[command(about = "Reconstructs hourly takings summaries from a SAM4S ECR receipt stream")]
pub struct CliArgs {
    /// ECR dialect: d420 or d520.
    #[arg(long, env = "ECR_DIALECT")]
    pub dialect: Option<String>,

    /// Business hours open (24h clock, e.g. 8).
    #[arg(long, env = "ECR_OPENING_HOUR")]
    pub opening_hour: Option<u32>,

    /// Business hours close (24h clock, e.g. 22).
    #[arg(long, env = "ECR_CLOSING_HOUR")]
    pub closing_hour: Option<u32>,

    /// Inactivity threshold (seconds) for the clock-based flush trigger.
    #[arg(long, env = "ECR_QUIET_SECONDS")]
    pub quiet_seconds: Option<u64>,

    /// Reject individual item prices at or above this amount.
    #[arg(long, env = "ECR_SINGLE_ITEM_CAP")]
    pub single_item_cap: Option<String>,

    /// Currency symbol used in normalization and key/value splitting.
    #[arg(long, env = "ECR_CURRENCY_SYMBOL")]
    pub currency_symbol: Option<String>,

    /// Persist raw chunks and skip parsing.
    #[arg(long, env = "ECR_MONITOR_MODE")]
    pub monitor_mode: bool,

    /// Duplicate log messages to a file sink.
    #[arg(long, env = "ECR_LOGGING_ENABLED")]
    pub logging_enabled: bool,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long, env = "ECR_LOG_JSON")]
    pub log_json: bool,

    /// Path to the newline-delimited PLU catalog.
    #[arg(long, env = "ECR_PLU_CATALOG")]
    pub plu_catalog: Option<PathBuf>,

    /// Path to the `shops.csv` site mapping.
    #[arg(long, env = "ECR_SHOPS")]
    pub shops: Option<PathBuf>,

    /// Directory for emitted per-day, per-site CSV summaries.
    #[arg(long, env = "ECR_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for per-hour checkpoint files.
    #[arg(long, env = "ECR_CHECKPOINT_DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Optional register suffix for multi-register sites (420-class only).
    #[arg(long, env = "ECR_REGISTER")]
    pub register: Option<String>,

    /// Hostname this register reports as, used to resolve the site id.
    /// Defaults to the `HOSTNAME` environment variable.
    #[arg(long, env = "ECR_HOSTNAME")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dialect: Dialect,
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub quiet_seconds: u64,
    pub single_item_cap: crate::money::Money,
    pub currency_symbol: char,
    pub monitor_mode: bool,
    pub logging_enabled: bool,
    pub log_json: bool,
    pub plu_catalog: PathBuf,
    pub shops: PathBuf,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub register: Option<String>,
    pub hostname: String,
}

impl Config {
    pub fn load(args: CliArgs) -> Result<Self> {
        dotenv::dotenv().ok();

        let dialect = match args.dialect {
            Some(d) => Dialect::from_str(&d)?,
            None => {
                if std::path::Path::new("config/520").exists() {
                    Dialect::D520
                } else {
                    Dialect::D420
                }
            }
        };

        let single_item_cap = args
            .single_item_cap
            .as_deref()
            .and_then(crate::money::Money::parse)
            .unwrap_or_else(|| crate::money::Money::parse("200.00").unwrap());

        let currency_symbol = args
            .currency_symbol
            .and_then(|s| s.chars().next())
            .unwrap_or('£');

        Ok(Config {
            dialect,
            opening_hour: args.opening_hour.unwrap_or(7),
            closing_hour: args.closing_hour.unwrap_or(22),
            quiet_seconds: args.quiet_seconds.unwrap_or(1200),
            single_item_cap,
            currency_symbol,
            monitor_mode: args.monitor_mode,
            logging_enabled: args.logging_enabled,
            log_json: args.log_json,
            plu_catalog: args.plu_catalog.unwrap_or_else(|| PathBuf::from("plu.txt")),
            shops: args.shops.unwrap_or_else(|| PathBuf::from("shops.csv")),
            output_dir: args.output_dir.unwrap_or_else(|| PathBuf::from("ecr_data")),
            checkpoint_dir: args.checkpoint_dir.unwrap_or_else(|| PathBuf::from(".")),
            register: args.register,
            hostname: args
                .hostname
                .or_else(|| std::env::var("HOSTNAME").ok())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        })
    }
}

use crate::feed::types::OrderKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::Path;

const ENV_FILE: &str = ".env";
const API_KEY_VAR: &str = "STOCKFIGHTER_API_KEY";
const KEYFILE_VAR: &str = "STOCKFIGHTER_KEYFILE";
const DEFAULT_KEYFILE: &str = "keyfile.dat";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub venue: VenueConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueConfig {
    pub api_base: String,
    pub ws_base: String,
    pub account: String,
    pub venue: String,
    pub symbol: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_order_poll_interval")]
    pub order_poll_interval_ms: u64,
    #[serde(default = "default_book_poll_interval")]
    pub book_poll_interval_ms: u64,
}

fn default_tick_interval() -> u64 { 1000 }
fn default_order_poll_interval() -> u64 { 1000 }
fn default_book_poll_interval() -> u64 { 500 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            order_poll_interval_ms: default_order_poll_interval(),
            book_poll_interval_ms: default_book_poll_interval(),
        }
    }
}

/// Where top-of-book samples come from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Tickertape WebSocket.
    Quotes,
    /// REST order book poll.
    OrderBook,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_source")]
    pub source: SampleSource,
    #[serde(default = "default_quote_window")]
    pub quote_window: usize,
    #[serde(default = "default_order_book_window")]
    pub order_book_window: usize,
}

fn default_source() -> SampleSource { SampleSource::Quotes }
fn default_quote_window() -> usize { 10_000 }
fn default_order_book_window() -> usize { 1000 }

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            quote_window: default_quote_window(),
            order_book_window: default_order_book_window(),
        }
    }
}

impl StatsConfig {
    /// Window size for the configured source.
    pub fn window(&self) -> usize {
        match self.source {
            SampleSource::Quotes => self.quote_window,
            SampleSource::OrderBook => self.order_book_window,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub order_qty: i64,
    pub inventory_limit: i64,
    pub tighten_band: i64,
    pub stale_after_secs: i64,
    /// Cancel a resting order once its price is this fraction away from target.
    #[serde(default)]
    pub reprice_tolerance: Option<f64>,
    #[serde(default = "default_order_kind")]
    pub order_kind: OrderKind,
    /// Size each side off the current position instead of a flat order_qty.
    #[serde(default)]
    pub skew_inventory: bool,
    /// Only quote while the buy target is below the sell target.
    #[serde(default)]
    pub require_uncrossed: bool,
}

fn default_order_kind() -> OrderKind { OrderKind::Limit }

#[derive(Debug, Deserialize, Clone)]
pub struct PaperConfig {
    #[serde(default = "default_fill_rate")]
    pub fill_rate: f64,
}

fn default_fill_rate() -> f64 { 0.5 }

impl Default for PaperConfig {
    fn default() -> Self {
        Self { fill_rate: default_fill_rate() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.order_qty <= 0 {
            anyhow::bail!("strategy.order_qty must be positive, got {}", s.order_qty);
        }
        if s.inventory_limit < s.order_qty {
            anyhow::bail!(
                "strategy.inventory_limit ({}) is below order_qty ({}), nothing could ever be placed",
                s.inventory_limit,
                s.order_qty
            );
        }
        if s.reprice_tolerance.is_some_and(|t| t <= 0.0) {
            anyhow::bail!("strategy.reprice_tolerance must be positive");
        }
        if self.stats.window() == 0 {
            anyhow::bail!("stats window must hold at least one sample");
        }
        Ok(())
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// API key from `STOCKFIGHTER_API_KEY`, else the key file, else a prompt.
    /// A prompted key is saved to .env for future runs.
    pub fn api_key() -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_VAR) {
            let key = sanitize_key(&key);
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let keyfile = std::env::var(KEYFILE_VAR)
            .map(|p| sanitize_key(&p))
            .unwrap_or_else(|_| DEFAULT_KEYFILE.to_string());
        if let Some(key) = read_keyfile(Path::new(&keyfile))? {
            println!("  API key loaded from {}", keyfile);
            return Ok(key);
        }

        let key = prompt("Stockfighter API Key")?;
        save_env_var(API_KEY_VAR, &key);
        Ok(key)
    }
}

/// First non-empty line of the key file; `None` when the file is absent.
fn read_keyfile(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(sanitize_key)
        .find(|line| !line.is_empty()))
}

fn prompt(label: &str) -> Result<String> {
    print!("  {} > ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let value = input.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} cannot be empty", label);
    }
    Ok(value)
}

/// Strip carriage returns, BOM, and other invisible chars from a key/path value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}

/// Append a KEY=VALUE line to .env and set it in the current process.
fn save_env_var(key: &str, value: &str) {
    std::env::set_var(key, value);
    let path = Path::new(ENV_FILE);
    let mut contents = std::fs::read_to_string(path).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{}={}\n", key, value));
    if let Err(e) = std::fs::write(path, contents) {
        tracing::warn!("could not save {} to {}: {}", key, ENV_FILE, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses() {
        let config = Config::load(Path::new("config.toml")).unwrap();
        assert_eq!(config.venue.symbol, "SDI");
        assert_eq!(config.strategy.order_qty, 100);
        assert_eq!(config.strategy.inventory_limit, 500);
        assert_eq!(config.strategy.order_kind, OrderKind::Limit);
        assert_eq!(config.stats.source, SampleSource::Quotes);
        assert_eq!(config.stats.window(), 10_000);
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = Config::parse(
            r#"
            [venue]
            api_base = "https://api.stockfighter.io/ob/api"
            ws_base = "wss://api.stockfighter.io/ob/api/ws"
            account = "EXB123456"
            venue = "TESTEX"
            symbol = "FOOBAR"

            [strategy]
            order_qty = 10
            inventory_limit = 50
            tighten_band = 20
            stale_after_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.tick_interval_ms, 1000);
        assert_eq!(config.stats.window(), 10_000);
        assert!(config.strategy.reprice_tolerance.is_none());
        assert!(!config.strategy.skew_inventory);
        assert!(!config.strategy.require_uncrossed);
        assert!((config.paper.fill_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quote_stream_gets_the_larger_window() {
        // Quotes arrive far more often than book polls
        let stats = StatsConfig::default();
        assert!(stats.quote_window > stats.order_book_window);

        let config = Config::load(Path::new("config.toml")).unwrap();
        assert!(config.stats.quote_window > config.stats.order_book_window);
    }

    #[test]
    fn test_order_book_source_uses_its_window() {
        let stats: StatsConfig = toml::from_str(
            r#"
            source = "order_book"
            order_book_window = 42
            "#,
        )
        .unwrap();
        assert_eq!(stats.window(), 42);
    }

    #[test]
    fn test_limit_below_order_qty_rejected() {
        let err = Config::parse(
            r#"
            [venue]
            api_base = "a"
            ws_base = "b"
            account = "c"
            venue = "d"
            symbol = "e"

            [strategy]
            order_qty = 100
            inventory_limit = 50
            tighten_band = 20
            stale_after_secs = 5
            "#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("inventory_limit"));
    }

    #[test]
    fn test_keyfile_first_nonempty_line() {
        let path = std::env::temp_dir().join(format!("sf-keyfile-{}.dat", std::process::id()));
        std::fs::write(&path, "\n  abc123\r\nignored\n").unwrap();
        assert_eq!(read_keyfile(&path).unwrap().as_deref(), Some("abc123"));
        std::fs::remove_file(&path).unwrap();
        assert!(read_keyfile(&path).unwrap().is_none());
    }
}

/// Configuration loading from TOML file.
use crate::config::Config;
use crate::error::{Result, TradingError};
use std::path::Path;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TradingError::ConfigError(format!("failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| TradingError::ConfigError(format!("failed to parse config: {}", e)))?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.symbols.is_empty() {
        return Err(TradingError::ConfigError(
            "symbols list must not be empty".to_string(),
        ));
    }

    if config.tick_interval_sec == 0 {
        return Err(TradingError::ConfigError(
            "tick_interval_sec must be > 0".to_string(),
        ));
    }

    for tier in config.strategy_tiers.values() {
        if tier.default_risk_pct <= 0.0 || tier.default_risk_pct > 100.0 {
            return Err(TradingError::ConfigError(format!(
                "invalid default_risk_pct: {}",
                tier.default_risk_pct
            )));
        }
        if tier.max_daily_loss_pct <= 0.0 {
            return Err(TradingError::ConfigError(format!(
                "invalid max_daily_loss_pct: {}",
                tier.max_daily_loss_pct
            )));
        }
    }

    let ks = &config.kill_switch;
    if ks.daily_max_loss_currency <= 0.0 || ks.weekly_max_loss_currency <= 0.0 {
        return Err(TradingError::ConfigError(
            "kill_switch loss caps must be > 0".to_string(),
        ));
    }
    if ks.weekly_max_loss_currency < ks.daily_max_loss_currency {
        return Err(TradingError::ConfigError(
            "weekly_max_loss_currency must be >= daily_max_loss_currency".to_string(),
        ));
    }
    if ks.max_weekly_trades < ks.max_daily_trades {
        return Err(TradingError::ConfigError(
            "max_weekly_trades must be >= max_daily_trades".to_string(),
        ));
    }

    if config.exit.be_trigger_r <= 0.0 {
        return Err(TradingError::ConfigError(
            "exit.be_trigger_r must be > 0".to_string(),
        ));
    }
    if config.exit.partial_pct <= 0.0 || config.exit.partial_pct >= 100.0 {
        return Err(TradingError::ConfigError(
            "exit.partial_pct must be in (0, 100)".to_string(),
        ));
    }

    if config.loss_streak.pause_after_consecutive_losses == 0 {
        return Err(TradingError::ConfigError(
            "loss_streak.pause_after_consecutive_losses must be > 0".to_string(),
        ));
    }

    for (symbol, exec) in &config.symbol_execution {
        if exec.max_spread_pips <= 0.0 {
            return Err(TradingError::ConfigError(format!(
                "max_spread_pips for {} must be > 0",
                symbol
            )));
        }
        if exec.min_cooldown_minutes < 0 {
            return Err(TradingError::ConfigError(format!(
                "min_cooldown_minutes for {} must be >= 0",
                symbol
            )));
        }
    }

    for symbol in &config.symbols {
        if !config.symbol_execution.contains_key(symbol) {
            return Err(TradingError::ConfigError(format!(
                "symbol {} is listed in symbols but has no symbol_execution entry",
                symbol
            )));
        }
    }

    let smc = &config.smc;
    if smc.htf_pivot == 0 || smc.itf_pivot == 0 || smc.ltf_pivot == 0 {
        return Err(TradingError::ConfigError("smc pivot windows must be > 0".to_string()));
    }
    if smc.min_htf_candles == 0 || smc.min_itf_candles == 0 || smc.min_ltf_candles == 0 {
        return Err(TradingError::ConfigError("smc minimum candle counts must be > 0".to_string()));
    }
    if smc.fvg_wide_min_pips <= smc.fvg_narrow_max_pips {
        return Err(TradingError::ConfigError(
            "smc.fvg_wide_min_pips must be greater than fvg_narrow_max_pips".to_string(),
        ));
    }

    for (symbol, meta) in &config.symbol_meta {
        if meta.pip_size <= 0.0 || meta.pip_value_per_lot <= 0.0 {
            return Err(TradingError::ConfigError(format!("symbol_meta for {} has invalid pip settings", symbol)));
        }
        if meta.volume_step <= 0.0 || meta.min_volume <= 0.0 || meta.max_volume < meta.min_volume {
            return Err(TradingError::ConfigError(format!("symbol_meta for {} has invalid volume bounds", symbol)));
        }
    }

    for account in &config.accounts {
        if account.symbols.is_empty() {
            return Err(TradingError::ConfigError(format!(
                "account {} has no symbols configured",
                account.account_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_toml() -> &'static str {
        r#"
symbols = ["XAUUSD"]

[broker]
base_url = "http://localhost:9001"

[guardrail]
base_url = "http://localhost:9002"

[database]
url = "postgres://localhost/smc"

[global]
max_concurrent_trades_global = 5

[symbol_execution.XAUUSD]
max_spread_pips = 5.0
min_cooldown_minutes = 0
max_concurrent_trades_per_symbol = 2
max_concurrent_trades_per_direction = 2

[kill_switch]
daily_max_loss_currency = 200.0
daily_max_loss_pct = 2.0
weekly_max_loss_currency = 600.0
weekly_max_loss_pct = 5.0
max_daily_trades = 10
max_weekly_trades = 40
max_spread_points = 3.0
max_exposure_risk_currency = 1000.0
"#
    }

    #[test]
    fn loads_minimal_valid_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}", minimal_toml()).unwrap();
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.symbols, vec!["XAUUSD".to_string()]);
        assert_eq!(cfg.tick_interval_sec, 60);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}\nbogus_key = 1\n", minimal_toml()).unwrap();
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_inverted_weekly_daily_loss_caps() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let bad = minimal_toml().replace("weekly_max_loss_currency = 600.0", "weekly_max_loss_currency = 50.0");
        write!(f, "{}", bad).unwrap();
        assert!(load_config(f.path()).is_err());
    }
}

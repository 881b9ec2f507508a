/// Client for the news guardrail HTTP service. A guardrail outage defaults
/// this crate's callers to `blocked` — trading halts until it recovers,
/// per the error-handling design's user-visible-behavior note.
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::Result;
use crate::types::StrategyTier;

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub currency: String,
    pub impact: String,
    pub event_name: String,
    pub risk_score: f64,
    pub is_critical: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanTradeNow {
    pub can_trade: bool,
    pub inside_avoid_window: bool,
    pub active_window: Option<ActiveWindow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub currency: String,
    pub event: String,
    pub risk_score: f64,
    pub critical: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsMapToday {
    pub date: String,
    pub avoid_windows: Vec<NewsWindow>,
}

pub struct GuardrailClient {
    http: Client,
    base_url: String,
}

impl GuardrailClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build guardrail http client");
        GuardrailClient { http, base_url }
    }

    pub async fn can_i_trade_now(&self, tier: StrategyTier) -> Result<CanTradeNow> {
        let resp = self
            .http
            .get(format!("{}/can-i-trade-now", self.base_url))
            .query(&[("strategy", tier.as_query_value())])
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    pub async fn news_map_today(&self) -> Result<NewsMapToday> {
        let resp = self.http.get(format!("{}/news-map/today", self.base_url)).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }
}

/// Risk-score mapping from the guardrail contract: `low` tier blocks at
/// risk_score ≥ 30; `high` tier reduces at 50-79 and blocks at ≥ 80.
pub fn guardrail_mode_for(tier: StrategyTier, risk_score: f64) -> crate::types::GuardrailMode {
    use crate::types::GuardrailMode;
    match tier {
        StrategyTier::Low => {
            if risk_score >= 30.0 {
                GuardrailMode::Blocked
            } else {
                GuardrailMode::Normal
            }
        }
        StrategyTier::High => {
            if risk_score >= 80.0 {
                GuardrailMode::Blocked
            } else if risk_score >= 50.0 {
                GuardrailMode::Reduced
            } else {
                GuardrailMode::Normal
            }
        }
    }
}

/// Folds `can_trade`/`inside_avoid_window` from a `CanTradeNow` response into
/// a mode, independent of the risk-score tiering `guardrail_mode_for` does.
/// An explicit `can_trade=false` always means `Blocked`, even if no active
/// window carried a risk score past the tier threshold.
pub fn guardrail_mode_for_response(resp: &CanTradeNow) -> crate::types::GuardrailMode {
    use crate::types::GuardrailMode;
    if !resp.can_trade {
        GuardrailMode::Blocked
    } else if resp.inside_avoid_window {
        GuardrailMode::Reduced
    } else {
        GuardrailMode::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GuardrailMode;

    #[test]
    fn low_tier_blocks_at_30() {
        assert_eq!(guardrail_mode_for(StrategyTier::Low, 30.0), GuardrailMode::Blocked);
        assert_eq!(guardrail_mode_for(StrategyTier::Low, 29.9), GuardrailMode::Normal);
    }

    #[test]
    fn high_tier_reduces_then_blocks() {
        assert_eq!(guardrail_mode_for(StrategyTier::High, 49.9), GuardrailMode::Normal);
        assert_eq!(guardrail_mode_for(StrategyTier::High, 50.0), GuardrailMode::Reduced);
        assert_eq!(guardrail_mode_for(StrategyTier::High, 80.0), GuardrailMode::Blocked);
    }

    #[test]
    fn can_trade_false_blocks_even_without_active_window() {
        let resp = CanTradeNow { can_trade: false, inside_avoid_window: false, active_window: None };
        assert_eq!(guardrail_mode_for_response(&resp), GuardrailMode::Blocked);
    }

    #[test]
    fn inside_avoid_window_reduces_when_can_trade_true() {
        let resp = CanTradeNow { can_trade: true, inside_avoid_window: true, active_window: None };
        assert_eq!(guardrail_mode_for_response(&resp), GuardrailMode::Reduced);
    }

    #[test]
    fn normal_when_can_trade_and_outside_avoid_window() {
        let resp = CanTradeNow { can_trade: true, inside_avoid_window: false, active_window: None };
        assert_eq!(guardrail_mode_for_response(&resp), GuardrailMode::Normal);
    }
}

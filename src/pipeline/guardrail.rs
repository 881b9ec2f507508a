/// Service wrapper around the news guardrail HTTP client: resolves a raw
/// `CanTradeNow` response into a `GuardrailDecision`, defaulting to
/// `blocked` on any transport error per the error-handling design's
/// user-visible-behavior note ("news-guardrail outage defaults to blocked").
use std::sync::Arc;

use tracing::warn;

use crate::broker::guardrail::{guardrail_mode_for, guardrail_mode_for_response};
use crate::broker::GuardrailClient;
use crate::types::{GuardrailDecision, GuardrailMode, StrategyTier};

pub struct Guardrail {
    client: Arc<GuardrailClient>,
}

impl Guardrail {
    pub fn new(client: Arc<GuardrailClient>) -> Self {
        Guardrail { client }
    }

    pub async fn evaluate(&self, tier: StrategyTier) -> GuardrailDecision {
        match self.client.can_i_trade_now(tier).await {
            Ok(resp) => {
                let risk_score = resp.active_window.as_ref().map(|w| w.risk_score).unwrap_or(0.0);
                let score_mode = guardrail_mode_for(tier, risk_score);
                let response_mode = guardrail_mode_for_response(&resp);
                let mode = score_mode.max(response_mode);
                let reason = resp.active_window.map(|w| w.reason);
                GuardrailDecision { mode, reason }
            }
            Err(e) => {
                warn!(error = %e, "guardrail unreachable, defaulting to blocked");
                GuardrailDecision {
                    mode: GuardrailMode::Blocked,
                    reason: Some("guardrail service unreachable".to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_reason_present_on_outage() {
        let decision = GuardrailDecision {
            mode: GuardrailMode::Blocked,
            reason: Some("guardrail service unreachable".to_string()),
        };
        assert_eq!(decision.mode, GuardrailMode::Blocked);
        assert!(decision.reason.is_some());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::StrategyRule;

/// In-memory strategy table. Strategies auto-register on first sight with
/// [`StrategyRule::defaults_for`]; operators can toggle them afterwards.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    inner: Arc<RwLock<HashMap<String, StrategyRule>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the rule for a strategy, registering defaults if it is unknown.
    /// Re-registration is idempotent: an existing rule is never overwritten,
    /// so a disabled strategy stays disabled across repeated signals.
    pub async fn ensure(&self, strategy_id: &str) -> StrategyRule {
        {
            let reg = self.inner.read().await;
            if let Some(rule) = reg.get(strategy_id) {
                return rule.clone();
            }
        }

        let mut reg = self.inner.write().await;
        let rule = reg
            .entry(strategy_id.to_string())
            .or_insert_with(|| {
                tracing::info!(strategy_id, "strategy_registered");
                StrategyRule::defaults_for(strategy_id)
            })
            .clone();
        rule
    }

    pub async fn get(&self, strategy_id: &str) -> Option<StrategyRule> {
        let reg = self.inner.read().await;
        reg.get(strategy_id).cloned()
    }

    /// Flip a strategy's enabled flag. Returns the new state, or None if the
    /// strategy was never seen.
    pub async fn toggle(&self, strategy_id: &str) -> Option<bool> {
        let mut reg = self.inner.write().await;
        let rule = reg.get_mut(strategy_id)?;
        rule.enabled = !rule.enabled;
        tracing::info!(strategy_id, enabled = rule.enabled, "strategy_toggled");
        Some(rule.enabled)
    }

    pub async fn snapshot(&self) -> Vec<StrategyRule> {
        let reg = self.inner.read().await;
        let mut rules: Vec<_> = reg.values().cloned().collect();
        rules.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        rules
    }

    pub async fn ids(&self) -> Vec<String> {
        let reg = self.inner.read().await;
        let mut ids: Vec<_> = reg.keys().cloned().collect();
        ids.sort();
        ids
    }
}

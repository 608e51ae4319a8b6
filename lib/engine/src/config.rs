//! Engine configuration.

use automation_schedule::TriggerPolicy;
use serde::Deserialize;

/// Tunables for a `ScheduleEngine`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// How a schedule's triggers combine. Defaults to `any`.
    #[serde(default)]
    pub trigger_policy: TriggerPolicy,
}

impl EngineConfig {
    /// Sets the trigger policy.
    #[must_use]
    pub fn with_trigger_policy(mut self, policy: TriggerPolicy) -> Self {
        self.trigger_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_any_policy() {
        let config: EngineConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.trigger_policy, TriggerPolicy::Any);
    }

    #[test]
    fn policy_parses_from_snake_case() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"trigger_policy": "all"}"#).expect("deserialize");
        assert_eq!(config, EngineConfig::default().with_trigger_policy(TriggerPolicy::All));
    }
}

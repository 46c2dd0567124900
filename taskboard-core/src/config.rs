/// Engine configuration shared by every front end.
use serde::{Deserialize, Serialize};

/// What to do once a mutation has been accepted by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcilePolicy {
    /// Re-fetch the board after every settle and adopt the server order.
    #[default]
    Refetch,
    /// Keep the optimistic snapshot. Only sound when the server stores the
    /// submitted position verbatim.
    TrustOptimistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Position handed out when a column is empty.
    #[serde(default = "default_position")]
    pub default_position: f64,
    /// Distance kept from the first/last task on prepend/append, and the
    /// spacing used when a column is compacted.
    #[serde(default = "default_gap")]
    pub gap: f64,
    /// Smallest distance allowed between adjacent positions before the
    /// column is compacted.
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    #[serde(default)]
    pub reconcile: ReconcilePolicy,
    /// Extra attempts for transient persistence failures.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_position() -> f64 {
    1000.0
}

fn default_gap() -> f64 {
    1000.0
}

fn default_min_gap() -> f64 {
    1e-6
}

fn default_transient_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    250
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_position: default_position(),
            gap: default_gap(),
            min_gap: default_min_gap(),
            reconcile: ReconcilePolicy::default(),
            transient_retries: default_transient_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.reconcile, ReconcilePolicy::Refetch);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"gap":64,"reconcile":"trustOptimistic"}"#).unwrap();
        assert_eq!(config.gap, 64.0);
        assert_eq!(config.default_position, 1000.0);
        assert_eq!(config.reconcile, ReconcilePolicy::TrustOptimistic);
    }
}

//! Configuration for the Decision Shadow Engine.
//!
//! Everything an operator might tune lives here: retry/backoff constants,
//! scoring weights, deadlines, temperatures. Tests override freely; nothing
//! below is hardcoded into engine logic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::shadow::ShadowConfig;

/// Configuration for a Decision Shadow Engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Query understanding configuration
    pub query: QueryConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Shadow generation rule set
    pub shadow: ShadowConfig,
    /// Composite scoring configuration
    pub scoring: ScoringConfig,
    /// Agent invocation configuration
    pub agents: AgentConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query: QueryConfig::default(),
            retrieval: RetrievalConfig::default(),
            shadow: ShadowConfig::default(),
            scoring: ScoringConfig::default(),
            agents: AgentConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// SHA-256 fingerprint of the configuration, recorded on every report
    /// so runs are auditable against the exact settings that produced them.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

/// Query understanding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Infer filters from free text with the LLM (off by default: parsing
    /// then has no network side effects)
    pub infer_filters_from_text: bool,
    /// Default number of results when the caller does not ask
    pub default_top_k: usize,
    /// Upper bound on requested result counts
    pub max_top_k: usize,
    /// Default similarity floor
    pub default_similarity_floor: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            infer_filters_from_text: false,
            default_top_k: 5,
            max_top_k: 100,
            default_similarity_floor: 0.0,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Retries after a failed store call before degrading to an empty set
    pub retry_count: usize,
    /// Base backoff delay; attempt n sleeps base * 2^n
    pub retry_base_delay_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_base_delay_ms: 200,
        }
    }
}

/// Weight of one agent in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentWeight {
    /// Relative weight
    pub weight: f64,
    /// Invert the score around `max_score` before combining (for scores
    /// where higher means worse, like risk)
    pub invert: bool,
}

/// Composite scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Upper bound of the composite scale
    pub max_score: f64,
    /// Per-agent weights, keyed by agent name
    pub weights: BTreeMap<String, AgentWeight>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(
            "risk".to_string(),
            AgentWeight {
                weight: 1.0,
                invert: true,
            },
        );
        Self {
            max_score: 10.0,
            weights,
        }
    }
}

/// Agent invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum concurrent in-flight LLM calls per run
    pub max_concurrent_llm_calls: usize,
    /// Run-level deadline; unresolved judgments at the deadline settle as
    /// timed out
    pub run_deadline_ms: u64,
    /// Per-request LLM timeout
    pub llm_timeout_ms: u64,
    /// Temperature for the Risk agent; 0.0 keeps judgments reproducible
    /// under deterministic decoding
    pub risk_temperature: f32,
    /// Temperature for the Historian agent
    pub historian_temperature: f32,
    /// Temperature for Bias and Explainer prose
    pub narrative_temperature: f32,
    /// Historian confidence when no precedents were retrieved
    pub historian_confidence_floor: f32,
    /// Maximum precedents rendered into any single prompt
    pub max_prompt_cases: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_llm_calls: 4,
            run_deadline_ms: 60_000,
            llm_timeout_ms: 30_000,
            risk_temperature: 0.0,
            historian_temperature: 0.3,
            narrative_temperature: 0.7,
            historian_confidence_floor: 0.1,
            max_prompt_cases: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.retrieval.retry_count, 3);
        assert_eq!(config.agents.max_concurrent_llm_calls, 4);
        assert_eq!(config.agents.risk_temperature, 0.0);
        assert!(config.scoring.weights["risk"].invert);
        assert_eq!(config.shadow.rules.len(), 4);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = EngineConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.scoring.max_score, config.scoring.max_score);
        assert_eq!(parsed.shadow, config.shadow);
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let config = EngineConfig::default();
        assert_eq!(config.fingerprint(), EngineConfig::default().fingerprint());

        let mut changed = EngineConfig::default();
        changed.scoring.max_score = 100.0;
        assert_ne!(config.fingerprint(), changed.fingerprint());
    }
}

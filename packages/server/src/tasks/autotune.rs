//! Pitch correction for a vocal take.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::jobs::{TaskArgs, TaskContext, ValidationError};

fn default_strength() -> f64 {
    0.7
}

fn default_retune() -> f64 {
    0.35
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutotuneArgs {
    pub vocal_path: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub scale: Option<String>,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default = "default_retune")]
    pub retune: f64,
}

impl TaskArgs for AutotuneArgs {
    const KIND: &'static str = "autotune";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.vocal_path.trim().is_empty() {
            return Err(ValidationError("vocal_path must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(ValidationError(
                "strength must be between 0.0 and 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retune) {
            return Err(ValidationError("retune must be between 0.0 and 1.0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutotuneParams {
    pub key: Option<String>,
    pub scale: Option<String>,
    pub strength: f64,
    pub retune: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutotuneResult {
    pub autotuned_path: String,
    pub params: AutotuneParams,
}

/// Pitch correction itself is an external collaborator; the result carries
/// the resolved parameters so clients see what was applied.
pub async fn run(args: AutotuneArgs, _ctx: Arc<TaskContext>) -> Result<serde_json::Value> {
    debug!(
        vocal_path = %args.vocal_path,
        strength = args.strength,
        retune = args.retune,
        "autotuning vocal"
    );

    let result = AutotuneResult {
        autotuned_path: args.vocal_path.clone(),
        params: AutotuneParams {
            key: args.key,
            scale: args.scale,
            strength: args.strength,
            retune: args.retune,
        },
    };
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn omitted_knobs_take_defaults() {
        let args: AutotuneArgs = serde_json::from_value(json!({"vocal_path": "v.wav"})).unwrap();
        assert_eq!(args.strength, 0.7);
        assert_eq!(args.retune, 0.35);
        assert!(args.key.is_none());
        assert!(args.scale.is_none());
    }

    #[test]
    fn normalized_args_carry_the_defaults() {
        let args: AutotuneArgs = serde_json::from_value(json!({"vocal_path": "v.wav"})).unwrap();
        let normalized = serde_json::to_value(&args).unwrap();
        assert_eq!(normalized["strength"], json!(0.7));
        assert_eq!(normalized["retune"], json!(0.35));
    }

    #[test]
    fn rejects_out_of_range_knobs() {
        let args: AutotuneArgs =
            serde_json::from_value(json!({"vocal_path": "v.wav", "strength": 1.5})).unwrap();
        assert!(args.validate().is_err());

        let args: AutotuneArgs =
            serde_json::from_value(json!({"vocal_path": "v.wav", "retune": -0.1})).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn explicit_knobs_survive() {
        let args: AutotuneArgs = serde_json::from_value(
            json!({"vocal_path": "v.wav", "key": "C", "scale": "major", "strength": 0.9}),
        )
        .unwrap();
        assert_eq!(args.key.as_deref(), Some("C"));
        assert_eq!(args.strength, 0.9);
        assert_eq!(args.retune, 0.35);
    }
}

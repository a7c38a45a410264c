//! Time-stretch a vocal take onto a target tempo.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::jobs::{TaskArgs, TaskContext, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignArgs {
    pub vocal_path: String,
    pub target_bpm: f64,
}

impl TaskArgs for AlignArgs {
    const KIND: &'static str = "align";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.vocal_path.trim().is_empty() {
            return Err(ValidationError("vocal_path must not be empty".into()));
        }
        if !self.target_bpm.is_finite() || self.target_bpm <= 0.0 {
            return Err(ValidationError(
                "target_bpm must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignResult {
    pub aligned_path: String,
}

/// Stretching runs out of process; until then the take passes through
/// unchanged.
pub async fn run(args: AlignArgs, _ctx: Arc<TaskContext>) -> Result<serde_json::Value> {
    debug!(vocal_path = %args.vocal_path, target_bpm = args.target_bpm, "aligning vocal");

    let result = AlignResult {
        aligned_path: args.vocal_path,
    };
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_args() -> AlignArgs {
        AlignArgs {
            vocal_path: "v.wav".to_string(),
            target_bpm: 92.5,
        }
    }

    #[test]
    fn accepts_valid_args() {
        assert!(valid_args().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_bpm() {
        let mut args = valid_args();
        args.target_bpm = 0.0;
        assert!(args.validate().is_err());
        args.target_bpm = -4.0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_non_numeric_bpm() {
        let parsed: Result<AlignArgs, _> =
            serde_json::from_value(json!({"vocal_path": "v.wav", "target_bpm": "fast"}));
        assert!(parsed.is_err());
    }
}

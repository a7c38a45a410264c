//! Noise reduction for a vocal take.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::jobs::{TaskArgs, TaskContext, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenoiseArgs {
    pub vocal_path: String,
}

impl TaskArgs for DenoiseArgs {
    const KIND: &'static str = "denoise";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.vocal_path.trim().is_empty() {
            return Err(ValidationError("vocal_path must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiseResult {
    pub denoised_path: String,
}

/// Source separation / spectral gating is an external collaborator; the
/// take passes through unchanged until it lands.
pub async fn run(args: DenoiseArgs, _ctx: Arc<TaskContext>) -> Result<serde_json::Value> {
    debug!(vocal_path = %args.vocal_path, "denoising vocal");

    let result = DenoiseResult {
        denoised_path: args.vocal_path,
    };
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_path() {
        let args = DenoiseArgs {
            vocal_path: String::new(),
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn result_echoes_the_input_path() {
        let parsed: DenoiseArgs =
            serde_json::from_value(json!({"vocal_path": "take3.wav"})).unwrap();
        assert_eq!(parsed.vocal_path, "take3.wav");
    }
}

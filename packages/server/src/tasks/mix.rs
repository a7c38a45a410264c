//! Mixdown of a beat and a processed vocal.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::jobs::{TaskArgs, TaskContext, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MixArgs {
    pub beat_path: String,
    pub vocal_path: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

impl TaskArgs for MixArgs {
    const KIND: &'static str = "mix";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.beat_path.trim().is_empty() {
            return Err(ValidationError("beat_path must not be empty".into()));
        }
        if self.vocal_path.trim().is_empty() {
            return Err(ValidationError("vocal_path must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixResult {
    pub mix_path: String,
}

/// The mixing/mastering chain is an external collaborator; this reserves the
/// output location under the storage root.
pub async fn run(args: MixArgs, ctx: Arc<TaskContext>) -> Result<serde_json::Value> {
    debug!(beat_path = %args.beat_path, vocal_path = %args.vocal_path, "mixing down");

    let output = ctx
        .storage_dir
        .join("outputs")
        .join(format!("mix-{}.wav", Uuid::new_v4().simple()));

    let result = MixResult {
        mix_path: output.to_string_lossy().into_owned(),
    };
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn params_are_optional() {
        let args: MixArgs =
            serde_json::from_value(json!({"beat_path": "b.wav", "vocal_path": "v.wav"})).unwrap();
        assert!(args.params.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn rejects_missing_vocal_path() {
        let parsed: Result<MixArgs, _> = serde_json::from_value(json!({"beat_path": "b.wav"}));
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn mix_path_lands_under_the_storage_root() {
        let ctx = Arc::new(TaskContext {
            storage_dir: PathBuf::from("/srv/tracklab"),
        });
        let args: MixArgs =
            serde_json::from_value(json!({"beat_path": "b.wav", "vocal_path": "v.wav"})).unwrap();

        let result = run(args, ctx).await.unwrap();
        let mix_path = result["mix_path"].as_str().unwrap();
        assert!(mix_path.starts_with("/srv/tracklab/outputs/mix-"));
        assert!(mix_path.ends_with(".wav"));
    }
}

//! The audio task kinds this deployment executes.
//!
//! Each submodule owns one kind: its argument schema (shape, defaults,
//! ranges) and its handler. The handlers' signal processing is performed by
//! external collaborators; what lives here is the contract each kind
//! presents to the dispatch core.

pub mod align;
pub mod analyze;
pub mod autotune;
pub mod denoise;
pub mod mix;

use anyhow::Result;

use crate::jobs::TaskRegistry;

/// Build the registry of all task kinds.
///
/// Called once at startup by both the gateway and the worker binaries.
/// A duplicate kind is a configuration error and fails the boot.
pub fn build_registry() -> Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();

    registry.register::<analyze::AnalyzeArgs, _, _>(analyze::run)?;
    registry.register::<align::AlignArgs, _, _>(align::run)?;
    registry.register::<denoise::DenoiseArgs, _, _>(denoise::run)?;
    registry.register::<autotune::AutotuneArgs, _, _>(autotune::run)?;
    registry.register::<mix::MixArgs, _, _>(mix::run)?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_kind() {
        let registry = build_registry().unwrap();
        assert_eq!(
            registry.kinds(),
            vec!["align", "analyze", "autotune", "denoise", "mix"]
        );
    }

    #[test]
    fn every_kind_is_idempotent() {
        let registry = build_registry().unwrap();
        for kind in registry.kinds() {
            assert!(registry.lookup(kind).unwrap().idempotent(), "{kind}");
        }
    }
}

//! Fork identification: does the bound claim type carry 3D accessors?
//!
//! Evidence is gathered in a fixed order and the first conclusive source wins:
//! the external plugin's own loader, the bridge's loader, a live claim from the
//! data store, and finally a name heuristic.

use bevy::log::{debug, info};

use super::accessors::exposes_3d_accessors;
use super::CapabilityResolver;
use crate::host::{ClassRef, HostClass};

/// Where the fork verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkEvidence {
    PluginLoader,
    DirectLoad,
    LiveInstance,
    NameHeuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkVariant {
    pub supports_3d: bool,
    pub evidence: ForkEvidence,
}

impl ForkVariant {
    fn from_class(class: &dyn HostClass, evidence: ForkEvidence) -> Self {
        Self {
            supports_3d: exposes_3d_accessors(class),
            evidence,
        }
    }
}

/// Package or class names that mark a 3D-capable fork.
fn name_suggests_3d(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("3d") || lower.contains("threedimensional")
}

impl CapabilityResolver {
    pub(super) fn probe_fork_variant(&self) -> ForkVariant {
        let config = self.config();
        let plugin = self.runtime().plugin(&config.store_plugin_name);

        if let Some(plugin) = &plugin {
            if let Some(class) = first_loaded(&config.claim_class_candidates, |name| {
                plugin.loader.load_class(name)
            }) {
                return self.verdict(ForkVariant::from_class(
                    class.as_ref(),
                    ForkEvidence::PluginLoader,
                ));
            }
        }

        if let Some(class) = first_loaded(&config.claim_class_candidates, |name| {
            self.runtime().load_class(name)
        }) {
            return self.verdict(ForkVariant::from_class(
                class.as_ref(),
                ForkEvidence::DirectLoad,
            ));
        }

        if let Some(claim) = self.top_level_claims().into_iter().next() {
            return self.verdict(ForkVariant::from_class(
                claim.class().as_ref(),
                ForkEvidence::LiveInstance,
            ));
        }

        let mut names: Vec<String> = config.claim_class_candidates.clone();
        if let Some(plugin) = &plugin {
            names.push(plugin.instance.class().name().to_string());
        }
        let supports_3d = names.iter().any(|name| name_suggests_3d(name));
        self.verdict(ForkVariant {
            supports_3d,
            evidence: ForkEvidence::NameHeuristic,
        })
    }

    fn verdict(&self, variant: ForkVariant) -> ForkVariant {
        info!(
            "Claim store fork: 3D claims {} (from {:?})",
            if variant.supports_3d { "supported" } else { "not supported" },
            variant.evidence
        );
        variant
    }
}

fn first_loaded(candidates: &[String], load: impl Fn(&str) -> Option<ClassRef>) -> Option<ClassRef> {
    candidates.iter().find_map(|name| {
        let class = load(name);
        if class.is_none() {
            debug!("claim class {name} not visible");
        }
        class
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_heuristic() {
        assert!(name_suggests_3d("com.example.GriefPrevention3D.Claim"));
        assert!(name_suggests_3d("org.fork.threedimensional.Claim"));
        assert!(!name_suggests_3d("me.ryanhamshire.GriefPrevention.Claim"));
    }
}

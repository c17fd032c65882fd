//! Granting and revoking trust on claims across incompatible fork APIs.

mod strategy;

pub use strategy::{StrategyCache, TrustStrategy};

use std::fmt;

use bevy::log::{debug, info};

use crate::capability::CapabilityResolver;
use crate::claim::ClaimHandle;
use crate::config::{TrustNames, ACCESS_TRUST, BUILD_TRUST, CONTAINER_TRUST, MANAGER_TRUST};
use crate::tree::ClaimTreeWalker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustLevel {
    Build,
    Container,
    Access,
    Manager,
}

impl TrustLevel {
    pub const ALL: [TrustLevel; 4] = [
        TrustLevel::Build,
        TrustLevel::Container,
        TrustLevel::Access,
        TrustLevel::Manager,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "build" => Some(TrustLevel::Build),
            "container" | "inventory" => Some(TrustLevel::Container),
            "access" => Some(TrustLevel::Access),
            "manager" | "permission" => Some(TrustLevel::Manager),
            _ => None,
        }
    }

    pub fn names(&self) -> &'static TrustNames {
        match self {
            TrustLevel::Build => &BUILD_TRUST,
            TrustLevel::Container => &CONTAINER_TRUST,
            TrustLevel::Access => &ACCESS_TRUST,
            TrustLevel::Manager => &MANAGER_TRUST,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrustLevel::Build => "build",
            TrustLevel::Container => "container",
            TrustLevel::Access => "access",
            TrustLevel::Manager => "manager",
        })
    }
}

/// Outcome of applying one change to a claim and its descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub applied: usize,
    pub unsupported: usize,
}

impl PropagationReport {
    pub fn all_applied(&self) -> bool {
        self.unsupported == 0 && self.applied > 0
    }
}

#[derive(Clone, Copy)]
enum Change {
    Grant,
    Revoke,
}

pub struct TrustMutator<'a> {
    resolver: &'a CapabilityResolver,
    strategies: &'a StrategyCache,
}

impl<'a> TrustMutator<'a> {
    pub fn new(resolver: &'a CapabilityResolver, strategies: &'a StrategyCache) -> Self {
        Self {
            resolver,
            strategies,
        }
    }

    /// Give `target` the `level` trust on `claim`.
    ///
    /// `false` means no known shape worked for this fork; it is not transient.
    pub fn grant(&self, level: TrustLevel, target: &str, claim: &ClaimHandle) -> bool {
        self.apply(Change::Grant, level, target, claim)
    }

    pub fn revoke(&self, level: TrustLevel, target: &str, claim: &ClaimHandle) -> bool {
        self.apply(Change::Revoke, level, target, claim)
    }

    /// Drop every level `target` holds on `claim`. True if any level changed.
    pub fn revoke_all(&self, target: &str, claim: &ClaimHandle) -> bool {
        let mut any = false;
        for level in TrustLevel::ALL {
            any |= self.revoke(level, target, claim);
        }
        any
    }

    pub fn grant_tree(&self, level: TrustLevel, target: &str, claim: &ClaimHandle) -> PropagationReport {
        self.propagate(Change::Grant, level, target, claim)
    }

    pub fn revoke_tree(&self, level: TrustLevel, target: &str, claim: &ClaimHandle) -> PropagationReport {
        self.propagate(Change::Revoke, level, target, claim)
    }

    fn propagate(
        &self,
        change: Change,
        level: TrustLevel,
        target: &str,
        claim: &ClaimHandle,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        if !self.resolver.is_available() {
            return report;
        }
        let walker = ClaimTreeWalker::new(self.resolver);
        let subtree = std::iter::once(claim.clone()).chain(walker.descendants(claim));
        for node in subtree {
            if self.apply(change, level, target, &node) {
                report.applied += 1;
            } else {
                report.unsupported += 1;
            }
        }
        info!(
            "{level} trust for {target} {} on {} claim(s), {} unsupported",
            match change {
                Change::Grant => "granted",
                Change::Revoke => "revoked",
            },
            report.applied,
            report.unsupported
        );
        report
    }

    fn apply(&self, change: Change, level: TrustLevel, target: &str, claim: &ClaimHandle) -> bool {
        if !self.resolver.is_available() {
            return false;
        }
        let object = claim.object();
        let strategies = self.strategies.strategies(object, level);
        for strategy in strategies.iter() {
            let outcome = match change {
                Change::Grant => strategy.grant(object, target),
                Change::Revoke => strategy.revoke(object, target),
            };
            match outcome {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!("{strategy:?} failed for {level} on {claim:?}: {e}"),
            }
        }
        self.strategies
            .report_unsupported(&claim.accessors().class_name, level);
        false
    }
}

use std::sync::{Arc, OnceLock};

use bevy::log::info;

use crate::capability::CapabilityResolver;
use crate::claim::ClaimHandle;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::host::HostRuntime;
use crate::locator::ClaimLocator;
use crate::scheduler::RegionScheduler;
use crate::tree::ClaimTreeWalker;
use crate::trust::{StrategyCache, TrustMutator};

/// All resolved bindings and memoized probes for one host process.
///
/// Configuration is fixed at construction. Everything else is resolved on
/// first use and then frozen; [`initialize`](Self::initialize) forces the
/// resolution eagerly and may be called any number of times.
pub struct BridgeContext {
    resolver: CapabilityResolver,
    strategies: StrategyCache,
    scheduler: OnceLock<RegionScheduler>,
}

impl BridgeContext {
    pub fn new(runtime: Arc<dyn HostRuntime>, config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            resolver: CapabilityResolver::new(runtime, config),
            strategies: StrategyCache::default(),
            scheduler: OnceLock::new(),
        })
    }

    /// Probe the scheduling model and, if the claim store is present, bind it
    /// and identify its fork. Returns store availability.
    pub fn initialize(&self) -> bool {
        let model = self.scheduler().model();
        let available = self.resolver.is_available();
        if available {
            let fork = self.resolver.detect_fork_variant();
            info!(
                "Claim bridge ready: scheduler {model:?}, 3D claims {}",
                fork.supports_3d
            );
        }
        available
    }

    pub fn config(&self) -> &BridgeConfig {
        self.resolver.config()
    }

    pub fn resolver(&self) -> &CapabilityResolver {
        &self.resolver
    }

    pub fn is_available(&self) -> bool {
        self.resolver.is_available()
    }

    pub fn scheduler(&self) -> &RegionScheduler {
        self.scheduler
            .get_or_init(|| RegionScheduler::new(Arc::clone(self.resolver.runtime())))
    }

    pub fn locator(&self) -> ClaimLocator<'_> {
        ClaimLocator::new(&self.resolver)
    }

    pub fn tree(&self) -> ClaimTreeWalker<'_> {
        ClaimTreeWalker::new(&self.resolver)
    }

    pub fn trust(&self) -> TrustMutator<'_> {
        TrustMutator::new(&self.resolver, &self.strategies)
    }

    pub fn locate(&self, world: &str, x: f64, y: f64, z: f64) -> Option<ClaimHandle> {
        self.locator().locate(world, x, y, z)
    }

    pub fn find_by_id(&self, id: &str) -> Option<ClaimHandle> {
        self.tree().find_by_id(id)
    }
}

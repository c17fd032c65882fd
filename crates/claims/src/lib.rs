use std::sync::Arc;

use bevy::prelude::*;

pub mod capability;
pub mod claim;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod locator;
pub mod prompt;
pub mod scheduler;
pub mod teleport;
pub mod tree;
pub mod trust;

#[cfg(any(test, feature = "bench"))]
pub mod test_harness;

#[cfg(test)]
mod integration_tests;

pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use error::{BridgeError, SchedulerError};

use host::HostRuntime;
use prompt::{SignPrompts, SignSubmitted};

/// The shared bridge context, available to every system.
#[derive(Resource, Clone)]
pub struct Bridge(pub Arc<BridgeContext>);

/// Wires the claim bridge into an app: context resource, sign prompts, and
/// the startup probe.
pub struct ClaimBridgePlugin {
    pub runtime: Arc<dyn HostRuntime>,
    pub config: BridgeConfig,
}

impl ClaimBridgePlugin {
    pub fn new(runtime: Arc<dyn HostRuntime>) -> Self {
        Self {
            runtime,
            config: BridgeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }
}

impl Plugin for ClaimBridgePlugin {
    fn build(&self, app: &mut App) {
        let context = match BridgeContext::new(Arc::clone(&self.runtime), self.config.clone()) {
            Ok(context) => context,
            Err(e) => {
                error!("Claim bridge disabled: {e}");
                return;
            }
        };
        app.insert_resource(Bridge(Arc::new(context)))
            .init_resource::<SignPrompts>()
            .add_event::<SignSubmitted>()
            .add_systems(Startup, initialize_bridge)
            .add_systems(Update, apply_sign_submissions);
    }
}

fn initialize_bridge(bridge: Res<Bridge>) {
    if !bridge.0.initialize() {
        warn!("Claim store not available at startup; will retry on first use");
    }
}

fn apply_sign_submissions(
    mut submissions: EventReader<SignSubmitted>,
    prompts: Res<SignPrompts>,
    bridge: Res<Bridge>,
) {
    for submission in submissions.read() {
        prompts
            .0
            .submit(&bridge.0, &submission.player_id, &submission.lines);
    }
}

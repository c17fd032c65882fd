//! # TestHost: headless harness for the claim bridge
//!
//! Wraps a `bevy::app::App` running [`ClaimBridgePlugin`] against a fake
//! server and a fake claim plugin. Builder methods shape the fake host before
//! startup; `tick()` advances both the app and the host schedulers by one game
//! tick.

mod fake;
mod schedulers;
mod store;
mod world;

pub use fake::{FakeClass, FakeLoader};
pub use schedulers::{current_owner, Owner, SchedulerProfile};
pub use store::{
    ClaimSpec, FakeClaim, FakeDataStore, FakeStore, ForkProfile, InstanceExposure, Member, Shape,
    TrustShape,
};
pub use world::{FakePlayer, FakeRuntime, FakeServer, FakeWorld, DEFAULT_SURFACE_Y};

use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use crate::config::{BridgeConfig, MILLIS_PER_TICK};
use crate::context::BridgeContext;
use crate::host::{HostRuntime, Location, ObjectRef, PluginHandle};
use crate::prompt::{PromptRegistry, SignPrompts, SignSubmitted};
use crate::{Bridge, ClaimBridgePlugin};

/// Drives the fake host's schedulers from the app's fixed timestep.
#[derive(Resource, Clone)]
struct HostClock(Arc<FakeServer>);

fn advance_host(clock: Res<HostClock>) {
    clock.0.tick();
}

/// Shorthand for a location in the default world.
pub fn at(x: f64, y: f64, z: f64) -> Location {
    Location::new("world", x, y, z)
}

/// A headless app plus a fake host.
///
/// Nothing probes the host until the first `tick()` or `bridge()` call, so
/// builder methods can shape the store first.
pub struct TestHost {
    app: App,
    runtime: Arc<FakeRuntime>,
    plugin_loader: Arc<FakeLoader>,
    store: Option<FakeStore>,
    config: BridgeConfig,
    started: bool,
}

impl TestHost {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// A classic single-threaded server running the given fork.
    pub fn new(fork: ForkProfile) -> Self {
        Self::build(Some(fork), SchedulerProfile::Classic)
    }

    /// A region-partitioned server running the given fork.
    pub fn partitioned(fork: ForkProfile) -> Self {
        Self::build(Some(fork), SchedulerProfile::Partitioned)
    }

    pub fn with_model(fork: ForkProfile, scheduler: SchedulerProfile) -> Self {
        Self::build(Some(fork), scheduler)
    }

    /// A server with no claim plugin installed.
    pub fn without_store(scheduler: SchedulerProfile) -> Self {
        Self::build(None, scheduler)
    }

    fn build(fork: Option<ForkProfile>, scheduler: SchedulerProfile) -> Self {
        let server = Arc::new(FakeServer::new(scheduler));
        let runtime = Arc::new(FakeRuntime::new(Arc::clone(&server)));
        let plugin_loader = FakeLoader::new("GriefPrevention");
        let store =
            fork.map(|fork| FakeStore::install(fork, &plugin_loader, &runtime.bridge_loader));

        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        let tick = Duration::from_millis(MILLIS_PER_TICK);
        app.insert_resource(TimeUpdateStrategy::ManualDuration(tick));
        app.insert_resource(Time::<Fixed>::from_duration(tick));
        app.insert_resource(HostClock(server));
        app.add_systems(FixedUpdate, advance_host);

        let host = Self {
            app,
            runtime,
            plugin_loader,
            store,
            config: BridgeConfig::default(),
            started: false,
        };
        host.load_store();
        host
    }

    // -----------------------------------------------------------------------
    // Host setup (builder pattern: consumes and returns Self)
    // -----------------------------------------------------------------------

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a top-level claim (and its subtree) to the fake store.
    pub fn with_claim(self, spec: ClaimSpec) -> Self {
        self.add_claim(&spec);
        self
    }

    pub fn with_claims(self, specs: impl IntoIterator<Item = ClaimSpec>) -> Self {
        for spec in specs {
            self.add_claim(&spec);
        }
        self
    }

    /// Register the claim plugin as present but disabled.
    pub fn with_store_disabled(self) -> Self {
        if let Some(mut plugin) = self.store_handle() {
            plugin.enabled = false;
            self.runtime.set_store_plugin(Some(plugin));
        }
        self
    }

    // -----------------------------------------------------------------------
    // Runtime changes
    // -----------------------------------------------------------------------

    fn store_handle(&self) -> Option<PluginHandle> {
        let store = self.store.as_ref()?;
        let instance: ObjectRef = store.plugin.clone();
        Some(PluginHandle {
            name: "GriefPrevention".to_string(),
            enabled: true,
            instance,
            loader: self.plugin_loader.clone(),
        })
    }

    /// Make the claim plugin visible to the bridge (the default).
    pub fn load_store(&self) {
        self.runtime.set_store_plugin(self.store_handle());
    }

    pub fn unload_store(&self) {
        self.runtime.set_store_plugin(None);
    }

    /// Add a claim at any time; returns the live fake.
    pub fn add_claim(&self, spec: &ClaimSpec) -> Arc<FakeClaim> {
        self.data_store().add(spec)
    }

    pub fn spawn_player(&self, id: &str, loc: Location) -> Arc<FakePlayer> {
        self.server().spawn_player(id, loc)
    }

    /// Deliver a sign submission event, as the host's sign editor would.
    pub fn submit_sign(&mut self, player_id: &str, lines: &[&str]) {
        self.ensure_started();
        self.app.world_mut().send_event(SignSubmitted {
            player_id: player_id.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        });
    }

    // -----------------------------------------------------------------------
    // Simulation
    // -----------------------------------------------------------------------

    /// Install the bridge plugin and run startup, once.
    pub fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let runtime: Arc<dyn HostRuntime> = self.runtime.clone();
        self.app
            .add_plugins(ClaimBridgePlugin::new(runtime).with_config(self.config.clone()));
        self.app.update();
    }

    /// Run N game ticks. Each `app.update()` advances time by exactly one
    /// fixed step, which ticks every host scheduler once.
    pub fn tick(&mut self, n: u32) {
        self.ensure_started();
        for _ in 0..n {
            self.app.update();
        }
    }

    /// Wait for async tasks spawned so far.
    pub fn join_async(&self) {
        self.server().join_async();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn bridge(&mut self) -> Arc<BridgeContext> {
        self.ensure_started();
        Arc::clone(&self.app.world().resource::<Bridge>().0)
    }

    /// The bridge resource, absent when the plugin refused to start.
    pub fn try_bridge(&mut self) -> Option<Arc<BridgeContext>> {
        self.ensure_started();
        self.app
            .world()
            .get_resource::<Bridge>()
            .map(|b| Arc::clone(&b.0))
    }

    pub fn prompts(&mut self) -> Arc<PromptRegistry> {
        self.ensure_started();
        Arc::clone(&self.app.world().resource::<SignPrompts>().0)
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    pub fn runtime(&self) -> &Arc<FakeRuntime> {
        &self.runtime
    }

    pub fn server(&self) -> &Arc<FakeServer> {
        &self.runtime.server
    }

    pub fn world(&self) -> Arc<FakeWorld> {
        self.server()
            .world("world")
            .expect("default world always exists")
    }

    pub fn store(&self) -> &FakeStore {
        self.store.as_ref().expect("host was built with a claim store")
    }

    pub fn data_store(&self) -> &Arc<FakeDataStore> {
        &self.store().data_store
    }

    pub fn claim(&self, id: i64) -> Arc<FakeClaim> {
        self.data_store()
            .find(id)
            .unwrap_or_else(|| panic!("no claim {id} in the fake store"))
    }

    pub fn plugin_loader(&self) -> &Arc<FakeLoader> {
        &self.plugin_loader
    }

    pub fn bridge_loader(&self) -> &Arc<FakeLoader> {
        &self.runtime.bridge_loader
    }

    /// Host calls made from a thread that does not own their target.
    pub fn affinity_violations(&self) -> Vec<String> {
        self.server().affinity.violations()
    }
}

/// A player as the bridge sees it.
pub fn player_ref(player: &Arc<FakePlayer>) -> ObjectRef {
    player.clone()
}

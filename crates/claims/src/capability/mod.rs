//! Locating and binding the external claim store.
//!
//! Resolution never fails hard: every missing class, field or method is a
//! signal to try the next candidate. When all candidates are exhausted the
//! store is reported unavailable and claim features switch off.

mod accessors;
mod diagnostics;
mod fork;
#[cfg(test)]
mod tests;

pub use accessors::{
    exposes_3d_accessors, height_pair, AccessorCache, ClaimAccessors, ContainsShape, Getter,
};
pub use diagnostics::RateLimitedDiagnostic;
pub use fork::{ForkEvidence, ForkVariant};

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bevy::log::{debug, info, warn};

use crate::claim::ClaimHandle;
use crate::config::{BridgeConfig, CLAIMS_FIELDS, CLAIMS_METHODS, DATA_STORE_FIELD, STORE_INSTANCE_FIELD};
use crate::host::{ClassRef, HostRuntime, ObjectRef, Value};
use crate::locator::ClaimAtShape;

/// How the store instance was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSource {
    /// Public static `instance` field on a candidate class.
    StaticField { class: String },
    /// Non-public static `instance` field on a candidate class.
    DeclaredField { class: String },
    /// The running plugin object itself.
    PluginInstance,
}

/// The frozen binding to the external store.
pub struct StoreBinding {
    pub store: ObjectRef,
    pub source: StoreSource,
    pub data_store: ObjectRef,
    /// Native point lookup on the data store, if a known arity exists.
    pub claim_at: Option<ClaimAtShape>,
    /// Candidate top-level claim getters on the data store, in priority order.
    pub claims: Vec<Getter>,
}

impl StoreBinding {
    fn probe(store: ObjectRef, source: StoreSource, data_store: ObjectRef) -> Self {
        let class = data_store.class();
        let claim_at = ClaimAtShape::resolve(class.as_ref());
        let claims = Getter::resolve_all(class.as_ref(), CLAIMS_METHODS, CLAIMS_FIELDS);
        info!(
            "Bound claim store via {:?}; data store {} (native lookup: {:?}, claim getters: {})",
            source,
            class.name(),
            claim_at,
            claims.len()
        );
        Self {
            store,
            source,
            data_store,
            claim_at,
            claims,
        }
    }
}

/// Which piece of the binding is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPiece {
    Plugin,
    StoreInstance,
    DataStore,
}

impl fmt::Display for MissingPiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingPiece::Plugin => f.write_str("plugin not loaded"),
            MissingPiece::StoreInstance => f.write_str("store instance not found"),
            MissingPiece::DataStore => f.write_str("data store not found"),
        }
    }
}

/// Discovers and caches the binding to the external claim store.
pub struct CapabilityResolver {
    runtime: Arc<dyn HostRuntime>,
    config: BridgeConfig,
    binding: OnceLock<StoreBinding>,
    fork: OnceLock<ForkVariant>,
    accessors: Arc<AccessorCache>,
    unavailable: RateLimitedDiagnostic,
}

impl CapabilityResolver {
    pub fn new(runtime: Arc<dyn HostRuntime>, config: BridgeConfig) -> Self {
        let interval = Duration::from_secs(config.diagnostic_interval_secs);
        Self {
            runtime,
            config,
            binding: OnceLock::new(),
            fork: OnceLock::new(),
            accessors: Arc::new(AccessorCache::default()),
            unavailable: RateLimitedDiagnostic::new(interval),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn HostRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn accessor_cache(&self) -> &Arc<AccessorCache> {
        &self.accessors
    }

    /// Diagnostics emitted so far for an unavailable store.
    pub fn unavailable_reports(&self) -> u64 {
        self.unavailable.emitted()
    }

    fn trace_miss(&self, what: &str) {
        if self.config.debug {
            debug!("claim store probe: {what}");
        }
    }

    fn store_classes(&self) -> Vec<ClassRef> {
        let plugin = self.runtime.plugin(&self.config.store_plugin_name);
        self.config
            .store_class_candidates
            .iter()
            .filter_map(|name| {
                let class = self
                    .runtime
                    .load_class(name)
                    .or_else(|| plugin.as_ref().and_then(|p| p.loader.load_class(name)));
                if class.is_none() {
                    self.trace_miss(&format!("class {name} absent"));
                }
                class
            })
            .collect()
    }

    fn read_instance_field(&self, class: &ClassRef, public: bool) -> Option<ObjectRef> {
        let field = class.find_field(STORE_INSTANCE_FIELD)?;
        if !field.is_static || field.is_public != public {
            return None;
        }
        match class.get_static(STORE_INSTANCE_FIELD) {
            Ok(Value::Object(o)) => Some(o),
            Ok(other) => {
                self.trace_miss(&format!("{}.{STORE_INSTANCE_FIELD} = {other:?}", class.name()));
                None
            }
            Err(e) => {
                self.trace_miss(&e.to_string());
                None
            }
        }
    }

    /// Find the store's main instance.
    ///
    /// Order: public static accessor on each candidate class, then the same
    /// field as a declared (non-public) member, then the running plugin object.
    pub fn resolve_store_instance(&self) -> Option<(ObjectRef, StoreSource)> {
        let classes = self.store_classes();
        for class in &classes {
            if let Some(store) = self.read_instance_field(class, true) {
                return Some((
                    store,
                    StoreSource::StaticField {
                        class: class.name().to_string(),
                    },
                ));
            }
        }
        for class in &classes {
            if let Some(store) = self.read_instance_field(class, false) {
                return Some((
                    store,
                    StoreSource::DeclaredField {
                        class: class.name().to_string(),
                    },
                ));
            }
        }
        match self.runtime.plugin(&self.config.store_plugin_name) {
            Some(plugin) => Some((plugin.instance, StoreSource::PluginInstance)),
            None => {
                self.trace_miss("no running store plugin");
                None
            }
        }
    }

    /// Read the data store handle off the store instance.
    pub fn resolve_data_store(&self, store: &ObjectRef) -> Option<ObjectRef> {
        match store.get(DATA_STORE_FIELD) {
            Ok(Value::Object(o)) => Some(o),
            Ok(_) => {
                self.trace_miss("data store field is null");
                None
            }
            Err(e) => {
                self.trace_miss(&e.to_string());
                None
            }
        }
    }

    fn try_bind(&self) -> Result<&StoreBinding, MissingPiece> {
        if let Some(binding) = self.binding.get() {
            return Ok(binding);
        }
        let (store, source) = self
            .resolve_store_instance()
            .ok_or(MissingPiece::StoreInstance)?;
        let data_store = self
            .resolve_data_store(&store)
            .ok_or(MissingPiece::DataStore)?;
        Ok(self
            .binding
            .get_or_init(|| StoreBinding::probe(store, source, data_store)))
    }

    /// The binding, resolving it on first success. Failed attempts are not
    /// cached, so a store that finishes loading later is still picked up.
    pub fn binding(&self) -> Option<&StoreBinding> {
        self.try_bind().ok()
    }

    fn missing_piece(&self) -> Option<MissingPiece> {
        let loaded = self
            .runtime
            .plugin(&self.config.store_plugin_name)
            .is_some_and(|p| p.enabled);
        if !loaded {
            return Some(MissingPiece::Plugin);
        }
        self.try_bind().err()
    }

    /// True only if the plugin is loaded and both store handles resolved.
    /// Failures log at most once per diagnostic interval.
    pub fn is_available(&self) -> bool {
        match self.missing_piece() {
            None => true,
            Some(missing) => {
                if self.unavailable.should_emit(Instant::now()) {
                    warn!(
                        "Claim store '{}' unavailable ({missing}); claim features disabled",
                        self.config.store_plugin_name
                    );
                }
                false
            }
        }
    }

    /// The binding, gated on availability.
    pub fn available_binding(&self) -> Option<&StoreBinding> {
        if self.is_available() {
            self.binding()
        } else {
            None
        }
    }

    /// Whether the bound claim type is a 3D-capable fork. Probed once, then
    /// memoized for the lifetime of this resolver.
    pub fn detect_fork_variant(&self) -> ForkVariant {
        *self.fork.get_or_init(|| self.probe_fork_variant())
    }

    /// Top-level claims from the data store, whatever collection shape the
    /// fork returns.
    pub fn top_level_claims(&self) -> Vec<ObjectRef> {
        let Some(binding) = self.binding() else {
            return Vec::new();
        };
        for getter in &binding.claims {
            match getter.read(&binding.data_store) {
                Ok(value) => {
                    if let Some(items) = value.into_sequence() {
                        return items.into_iter().filter_map(Value::into_object).collect();
                    }
                    self.trace_miss(&format!("{} returned no collection", getter.name()));
                }
                Err(e) => self.trace_miss(&e.to_string()),
            }
        }
        Vec::new()
    }

    pub fn handle(&self, claim: ObjectRef) -> ClaimHandle {
        self.accessors.handle(claim)
    }
}

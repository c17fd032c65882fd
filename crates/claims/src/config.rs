use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const STORE_PLUGIN_NAME: &str = "GriefPrevention";

/// Fully-qualified names of the store's main class. Forks disagree on package casing.
pub const STORE_CLASS_CANDIDATES: &[&str] = &[
    "me.ryanhamshire.GriefPrevention.GriefPrevention",
    "me.ryanhamshire.griefprevention.GriefPrevention",
    "me.ryanhamshire.GriefPrevention.GriefPreventionPlugin",
];

pub const CLAIM_CLASS_CANDIDATES: &[&str] = &[
    "me.ryanhamshire.GriefPrevention.Claim",
    "me.ryanhamshire.griefprevention.Claim",
    "me.ryanhamshire.GriefPrevention.claim.Claim",
];

pub const STORE_INSTANCE_FIELD: &str = "instance";
pub const DATA_STORE_FIELD: &str = "dataStore";

pub const CLAIM_AT_METHOD: &str = "getClaimAt";
pub const CLAIMS_METHODS: &[&str] = &["getClaims", "getAllClaims"];
pub const CLAIMS_FIELDS: &[&str] = &["claims"];

pub const CLAIM_ID_METHODS: &[&str] = &["getID", "getId", "getClaimId"];
pub const CLAIM_ID_FIELDS: &[&str] = &["id"];
pub const OWNER_METHODS: &[&str] = &["getOwnerID", "getOwnerId", "getOwnerUUID"];
pub const OWNER_FIELDS: &[&str] = &["ownerID", "ownerId"];
pub const LESSER_CORNER_METHODS: &[&str] = &["getLesserBoundaryCorner"];
pub const LESSER_CORNER_FIELDS: &[&str] = &["lesserBoundaryCorner"];
pub const GREATER_CORNER_METHODS: &[&str] = &["getGreaterBoundaryCorner"];
pub const GREATER_CORNER_FIELDS: &[&str] = &["greaterBoundaryCorner"];
pub const PARENT_METHODS: &[&str] = &["getParent"];
pub const PARENT_FIELDS: &[&str] = &["parent"];

/// Older generations call them subdivisions or subclaims, newer ones children.
pub const CHILDREN_METHODS: &[&str] = &[
    "getChildren",
    "getSubclaims",
    "getSubClaims",
    "getSubdivisions",
];
pub const CHILDREN_FIELDS: &[&str] = &["children", "subclaims", "subClaims", "subdivisions"];

/// Paired vertical-bound accessors that only 3D-capable forks expose.
pub const HEIGHT_METHOD_PAIRS: &[(&str, &str)] = &[
    ("getMinY", "getMaxY"),
    ("getMinHeight", "getMaxHeight"),
    ("getLowerY", "getUpperY"),
    ("getMinimumY", "getMaximumY"),
];
pub const IS_3D_METHODS: &[&str] = &["is3D", "isThreeDimensional"];
pub const CONTAINS_METHOD: &str = "contains";

/// Name of the permission enum, looked up next to the claim class.
pub const PERMISSION_ENUM_SIMPLE_NAME: &str = "ClaimPermission";
pub const SET_PERMISSION_METHOD: &str = "setPermission";
pub const DROP_PERMISSION_METHOD: &str = "dropPermission";

/// Per trust level: direct add methods, direct remove methods, collection
/// getter methods, collection fields, collection setters, permission constant.
pub struct TrustNames {
    pub add: &'static [&'static str],
    pub remove: &'static [&'static str],
    pub getters: &'static [&'static str],
    pub fields: &'static [&'static str],
    pub setters: &'static [&'static str],
    pub permission: &'static str,
}

pub const BUILD_TRUST: TrustNames = TrustNames {
    add: &["addBuildTrust", "trustBuild"],
    remove: &["removeBuildTrust", "untrustBuild"],
    getters: &["getBuilders"],
    fields: &["builders"],
    setters: &["setBuilders"],
    permission: "Build",
};

pub const CONTAINER_TRUST: TrustNames = TrustNames {
    add: &["addContainerTrust", "trustContainer"],
    remove: &["removeContainerTrust", "untrustContainer"],
    getters: &["getContainers"],
    fields: &["containers"],
    setters: &["setContainers"],
    permission: "Inventory",
};

pub const ACCESS_TRUST: TrustNames = TrustNames {
    add: &["addAccessTrust", "trustAccess"],
    remove: &["removeAccessTrust", "untrustAccess"],
    getters: &["getAccessors"],
    fields: &["accessors"],
    setters: &["setAccessors"],
    permission: "Access",
};

pub const MANAGER_TRUST: TrustNames = TrustNames {
    add: &["addManager", "addManagerTrust"],
    remove: &["removeManager", "removeManagerTrust"],
    getters: &["getManagers"],
    fields: &["managers"],
    setters: &["setManagers"],
    permission: "Manage",
};

pub const WORLD_LOOKUP_METHOD: &str = "getWorld";
pub const WORLD_MIN_HEIGHT_METHOD: &str = "getMinHeight";
pub const WORLD_MAX_HEIGHT_METHOD: &str = "getMaxHeight";

pub const HIGHEST_BLOCK_METHOD: &str = "getHighestBlockYAt";
pub const TELEPORT_METHODS: &[&str] = &["teleportAsync", "teleport"];
pub const ENTITY_LOCATION_METHOD: &str = "getLocation";
pub const ENTITY_UNIQUE_ID_METHOD: &str = "getUniqueId";

/// Sign prompt block operations on a world object.
pub const GET_BLOCK_METHOD: &str = "getBlockState";
pub const SET_BLOCK_METHOD: &str = "setBlockState";
pub const SET_SIGN_LINES_METHOD: &str = "setSignLines";
pub const OPEN_SIGN_METHOD: &str = "openSign";
pub const SIGN_BLOCK: &str = "oak_sign";
/// Prompt signs are placed this many blocks below the player.
pub const PROMPT_SIGN_DEPTH: f64 = 4.0;

/// Entry point whose presence on the server marks the partitioned model.
pub const PARTITIONED_PROBE_METHOD: &str = "getGlobalRegionScheduler";

pub const CLASSIC_SCHEDULER_METHOD: &str = "getScheduler";
pub const GLOBAL_SCHEDULER_METHOD: &str = "getGlobalRegionScheduler";
pub const REGION_SCHEDULER_METHOD: &str = "getRegionScheduler";
pub const ASYNC_SCHEDULER_METHOD: &str = "getAsyncScheduler";
/// Per-entity scheduler accessor, called on the entity itself.
pub const ENTITY_SCHEDULER_METHOD: &str = "getScheduler";
pub const TASK_CANCEL_METHOD: &str = "cancel";
pub const TIME_UNIT_CLASS: &str = "java.util.concurrent.TimeUnit";
pub const TIME_UNIT_MILLIS: &str = "MILLISECONDS";

pub const TICKS_PER_SECOND: u64 = 20;
pub const MILLIS_PER_TICK: u64 = 1000 / TICKS_PER_SECOND;

/// Runtime knobs for the bridge. Every field has a default, so an override
/// document only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub store_plugin_name: String,
    pub store_class_candidates: Vec<String>,
    pub claim_class_candidates: Vec<String>,
    /// Minimum spacing between "store unavailable" diagnostics.
    pub diagnostic_interval_secs: u64,
    /// How long a sign prompt waits for the player before reverting.
    pub prompt_timeout_ticks: u64,
    /// World height bounds used when the host cannot report them.
    pub world_min_y: i64,
    pub world_max_y: i64,
    /// A claim spanning at least `world height - slack` blocks counts as 2D.
    pub full_height_slack: i64,
    /// Track visited claims during tree walks and skip repeats.
    pub cycle_guard: bool,
    /// Log every candidate miss during capability probing.
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            store_plugin_name: STORE_PLUGIN_NAME.to_string(),
            store_class_candidates: STORE_CLASS_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            claim_class_candidates: CLAIM_CLASS_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            diagnostic_interval_secs: 30,
            prompt_timeout_ticks: 60 * TICKS_PER_SECOND,
            world_min_y: -64,
            world_max_y: 320,
            full_height_slack: 2,
            cycle_guard: true,
            debug: false,
        }
    }
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BridgeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.world_max_y <= self.world_min_y {
            return Err(BridgeError::InvalidConfig(format!(
                "world_max_y ({}) must be above world_min_y ({})",
                self.world_max_y, self.world_min_y
            )));
        }
        if self.store_plugin_name.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "store_plugin_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.diagnostic_interval_secs, 30);
        assert_eq!(config.prompt_timeout_ticks, 1200);
        assert_eq!(config.store_class_candidates.len(), STORE_CLASS_CANDIDATES.len());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BridgeConfig::from_json_str(r#"{ "debug": true, "world_max_y": 256 }"#)
            .expect("valid override");
        assert!(config.debug);
        assert_eq!(config.world_max_y, 256);
        assert_eq!(config.world_min_y, -64);
        assert_eq!(config.store_plugin_name, STORE_PLUGIN_NAME);
    }

    #[test]
    fn test_inverted_world_bounds_rejected() {
        let err = BridgeConfig::from_json_str(r#"{ "world_min_y": 10, "world_max_y": 0 }"#)
            .expect_err("inverted bounds");
        assert!(format!("{err}").contains("world_max_y"), "got: {err}");
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = BridgeConfig::from_json_str("{ not json").expect_err("malformed");
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
    }
}

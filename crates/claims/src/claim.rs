use std::fmt;
use std::sync::Arc;

use bevy::log::debug;

use crate::capability::{AccessorCache, ClaimAccessors, Getter};
use crate::host::{object_key, same_object, Location, ObjectRef, Value};

/// Two corner points normalized to min/max per axis, in block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimCorners {
    pub min_x: i64,
    pub min_y: i64,
    pub min_z: i64,
    pub max_x: i64,
    pub max_y: i64,
    pub max_z: i64,
}

impl ClaimCorners {
    pub fn new(a: (i64, i64, i64), b: (i64, i64, i64)) -> Self {
        Self {
            min_x: a.0.min(b.0),
            min_y: a.1.min(b.1),
            min_z: a.2.min(b.2),
            max_x: a.0.max(b.0),
            max_y: a.1.max(b.1),
            max_z: a.2.max(b.2),
        }
    }

    pub fn from_locations(a: &Location, b: &Location) -> Self {
        Self::new(
            (a.block_x(), a.block_y(), a.block_z()),
            (b.block_x(), b.block_y(), b.block_z()),
        )
    }

    /// Horizontal footprint test; height is ignored.
    pub fn contains_footprint(&self, x: i64, z: i64) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }

    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        self.contains_footprint(x, z) && self.contains_y(y)
    }

    pub fn contains_y(&self, y: i64) -> bool {
        y >= self.min_y && y <= self.max_y
    }

    /// Footprint area in blocks (corners are inclusive).
    pub fn area(&self) -> i64 {
        (self.max_x - self.min_x + 1) * (self.max_z - self.min_z + 1)
    }

    pub fn vertical_extent(&self) -> i64 {
        self.max_y - self.min_y
    }

    /// Horizontal centre of the footprint, in block-space coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) as f64 / 2.0 + 0.5,
            (self.min_z + self.max_z) as f64 / 2.0 + 0.5,
        )
    }
}

/// An opaque reference to a claim owned by the external store.
///
/// Attributes are read on demand through the accessors resolved for the
/// claim's class; a missing accessor reads as `None`.
#[derive(Clone)]
pub struct ClaimHandle {
    object: ObjectRef,
    accessors: Arc<ClaimAccessors>,
    cache: Arc<AccessorCache>,
}

impl ClaimHandle {
    pub(crate) fn new(
        object: ObjectRef,
        accessors: Arc<ClaimAccessors>,
        cache: Arc<AccessorCache>,
    ) -> Self {
        Self {
            object,
            accessors,
            cache,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn accessors(&self) -> &ClaimAccessors {
        &self.accessors
    }

    pub(crate) fn cache(&self) -> &Arc<AccessorCache> {
        &self.cache
    }

    /// Identity key, stable for the lifetime of the host object.
    pub fn key(&self) -> usize {
        object_key(&self.object)
    }

    pub fn same_claim(&self, other: &ClaimHandle) -> bool {
        same_object(&self.object, &other.object)
    }

    pub(crate) fn read(&self, getter: Option<&Getter>) -> Option<Value> {
        let getter = getter?;
        match getter.read(&self.object) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                debug!("claim {}: {} unreadable: {e}", self.accessors.class_name, getter.name());
                None
            }
        }
    }

    pub fn id(&self) -> Option<String> {
        self.read(self.accessors.id.as_ref())?.to_identity_string()
    }

    /// Owner identity; `None` marks an administrative claim.
    pub fn owner(&self) -> Option<String> {
        self.read(self.accessors.owner.as_ref())?.to_identity_string()
    }

    pub fn is_admin(&self) -> bool {
        self.owner().is_none()
    }

    fn corner(&self, getter: Option<&Getter>) -> Option<Location> {
        match self.read(getter)? {
            Value::Location(loc) => Some(loc),
            _ => None,
        }
    }

    pub fn corners(&self) -> Option<ClaimCorners> {
        let lesser = self.corner(self.accessors.lesser.as_ref())?;
        let greater = self.corner(self.accessors.greater.as_ref())?;
        Some(ClaimCorners::from_locations(&lesser, &greater))
    }

    pub fn world(&self) -> Option<String> {
        self.corner(self.accessors.lesser.as_ref())
            .map(|loc| loc.world)
    }

    pub fn area(&self) -> Option<i64> {
        self.corners().map(|c| c.area())
    }

    /// Inclusive vertical bounds, from dedicated height accessors when the
    /// fork has them, else from the corners.
    pub fn vertical_range(&self) -> Option<(i64, i64)> {
        if let Some((lo, hi)) = &self.accessors.heights {
            let lo = self.object.call(lo, &[]).ok().and_then(|v| v.as_int());
            let hi = self.object.call(hi, &[]).ok().and_then(|v| v.as_int());
            if let (Some(lo), Some(hi)) = (lo, hi) {
                return Some((lo.min(hi), lo.max(hi)));
            }
        }
        self.corners().map(|c| (c.min_y, c.max_y))
    }

    /// The enclosing claim, or `None` for top-level claims (including forks
    /// that report a top-level claim as its own parent).
    pub fn parent(&self) -> Option<ClaimHandle> {
        let parent = self
            .read(self.accessors.parent.as_ref())?
            .into_object()?;
        if same_object(&parent, &self.object) {
            return None;
        }
        Some(self.cache.handle(parent))
    }

    pub fn is_subdivision(&self) -> bool {
        self.parent().is_some()
    }

    /// The fork's own 3D flag, when it has one.
    pub fn explicit_3d(&self) -> Option<bool> {
        let name = self.accessors.is_3d.as_ref()?;
        self.object.call(name, &[]).ok().and_then(|v| v.as_bool())
    }

    /// Whether this claim is a 3D volume rather than a full-height column.
    ///
    /// Only forks with 3D support have 3D claims. A claim counts as 3D when its
    /// vertical extent is below `full_height_threshold`.
    pub fn is_3d(&self, fork_supports_3d: bool, full_height_threshold: i64) -> bool {
        if !fork_supports_3d {
            return false;
        }
        if let Some(explicit) = self.explicit_3d() {
            return explicit;
        }
        self.vertical_range()
            .is_some_and(|(lo, hi)| hi - lo < full_height_threshold)
    }

    /// Point containment through the fork's predicate, falling back to corners.
    /// `None` when neither is available.
    pub fn contains(&self, loc: &Location, ignore_height: bool) -> Option<bool> {
        if let Some(shape) = self.accessors.contains {
            match shape.invoke(&self.object, loc, ignore_height) {
                Ok(inside) => return Some(inside),
                Err(e) => debug!("claim {}: contains failed: {e}", self.accessors.class_name),
            }
        }
        let lesser = self.corner(self.accessors.lesser.as_ref())?;
        if lesser.world != loc.world {
            return Some(false);
        }
        let corners = self.corners()?;
        Some(if ignore_height {
            corners.contains_footprint(loc.block_x(), loc.block_z())
        } else {
            corners.contains(loc.block_x(), loc.block_y(), loc.block_z())
        })
    }
}

impl fmt::Debug for ClaimHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimHandle")
            .field("class", &self.accessors.class_name)
            .field("id", &self.id())
            .finish()
    }
}

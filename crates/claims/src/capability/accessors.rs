use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::claim::ClaimHandle;
use crate::config::{
    CHILDREN_FIELDS, CHILDREN_METHODS, CLAIM_ID_FIELDS, CLAIM_ID_METHODS, CONTAINS_METHOD,
    GREATER_CORNER_FIELDS, GREATER_CORNER_METHODS, HEIGHT_METHOD_PAIRS, IS_3D_METHODS,
    LESSER_CORNER_FIELDS, LESSER_CORNER_METHODS, OWNER_FIELDS, OWNER_METHODS, PARENT_FIELDS,
    PARENT_METHODS,
};
use crate::host::{HostClass, HostError, Location, ObjectRef, ParamKind, Value};

/// A zero-argument read resolved against a host class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Getter {
    Method(String),
    Field(String),
}

impl Getter {
    pub fn read(&self, target: &ObjectRef) -> Result<Value, HostError> {
        match self {
            Getter::Method(name) => target.call(name, &[]),
            Getter::Field(name) => target.get(name),
        }
    }

    /// First matching zero-argument instance method, else first matching field.
    pub fn resolve(class: &dyn HostClass, methods: &[&str], fields: &[&str]) -> Option<Getter> {
        Self::resolve_all(class, methods, fields).into_iter().next()
    }

    /// Every present candidate, methods before fields, each in priority order.
    pub fn resolve_all(class: &dyn HostClass, methods: &[&str], fields: &[&str]) -> Vec<Getter> {
        let mut found = Vec::new();
        for name in methods {
            if class
                .methods()
                .iter()
                .any(|m| m.name == *name && m.params.is_empty() && !m.is_static)
            {
                found.push(Getter::Method(name.to_string()));
            }
        }
        for name in fields {
            if class
                .find_field(name)
                .is_some_and(|f| !f.is_static)
            {
                found.push(Getter::Field(name.to_string()));
            }
        }
        found
    }

    pub fn name(&self) -> &str {
        match self {
            Getter::Method(name) | Getter::Field(name) => name,
        }
    }
}

/// Shapes of the per-claim "contains point" predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsShape {
    /// `contains(Location, ignoreHeight, excludeSubdivisions)`
    WithSubdivisionFlag,
    /// `contains(Location, ignoreHeight)`
    HeightOnly,
}

impl ContainsShape {
    fn resolve(class: &dyn HostClass) -> Option<Self> {
        let with_flag = [ParamKind::Location, ParamKind::Bool, ParamKind::Bool];
        let height_only = [ParamKind::Location, ParamKind::Bool];
        if class.find_method(CONTAINS_METHOD, &with_flag).is_some() {
            Some(ContainsShape::WithSubdivisionFlag)
        } else if class.find_method(CONTAINS_METHOD, &height_only).is_some() {
            Some(ContainsShape::HeightOnly)
        } else {
            None
        }
    }

    pub fn invoke(
        &self,
        claim: &ObjectRef,
        loc: &Location,
        ignore_height: bool,
    ) -> Result<bool, HostError> {
        let args = match self {
            ContainsShape::WithSubdivisionFlag => {
                vec![Value::Location(loc.clone()), ignore_height.into(), false.into()]
            }
            ContainsShape::HeightOnly => vec![Value::Location(loc.clone()), ignore_height.into()],
        };
        let result = claim.call(CONTAINS_METHOD, &args)?;
        result.as_bool().ok_or_else(|| {
            HostError::IllegalArgument(format!("{CONTAINS_METHOD} returned {result:?}"))
        })
    }
}

/// Per-claim-class accessors, resolved once per class name.
#[derive(Debug, Clone)]
pub struct ClaimAccessors {
    pub class_name: String,
    pub id: Option<Getter>,
    pub owner: Option<Getter>,
    pub lesser: Option<Getter>,
    pub greater: Option<Getter>,
    pub parent: Option<Getter>,
    pub children: Vec<Getter>,
    pub heights: Option<(String, String)>,
    pub is_3d: Option<String>,
    pub contains: Option<ContainsShape>,
}

impl ClaimAccessors {
    pub fn resolve(class: &dyn HostClass) -> Self {
        Self {
            class_name: class.name().to_string(),
            id: Getter::resolve(class, CLAIM_ID_METHODS, CLAIM_ID_FIELDS),
            owner: Getter::resolve(class, OWNER_METHODS, OWNER_FIELDS),
            lesser: Getter::resolve(class, LESSER_CORNER_METHODS, LESSER_CORNER_FIELDS),
            greater: Getter::resolve(class, GREATER_CORNER_METHODS, GREATER_CORNER_FIELDS),
            parent: Getter::resolve(class, PARENT_METHODS, PARENT_FIELDS),
            children: Getter::resolve_all(class, CHILDREN_METHODS, CHILDREN_FIELDS),
            heights: height_pair(class).map(|(lo, hi)| (lo.to_string(), hi.to_string())),
            is_3d: IS_3D_METHODS
                .iter()
                .find(|name| class.find_method(name, &[]).is_some())
                .map(|name| name.to_string()),
            contains: ContainsShape::resolve(class),
        }
    }
}

/// The first min/max height accessor pair the class exposes in full.
pub fn height_pair(class: &dyn HostClass) -> Option<(&'static str, &'static str)> {
    HEIGHT_METHOD_PAIRS.iter().copied().find(|(lo, hi)| {
        class.find_method(lo, &[]).is_some() && class.find_method(hi, &[]).is_some()
    })
}

/// True if the class carries any accessor only 3D-capable forks define.
pub fn exposes_3d_accessors(class: &dyn HostClass) -> bool {
    height_pair(class).is_some()
        || IS_3D_METHODS
            .iter()
            .any(|name| class.find_method(name, &[]).is_some())
}

/// Claim accessors keyed by claim class name.
#[derive(Default)]
pub struct AccessorCache {
    by_class: RwLock<HashMap<String, Arc<ClaimAccessors>>>,
}

impl AccessorCache {
    pub fn accessors_for(&self, claim: &ObjectRef) -> Arc<ClaimAccessors> {
        let class = claim.class();
        if let Some(found) = self
            .by_class
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class.name())
        {
            return Arc::clone(found);
        }
        let resolved = Arc::new(ClaimAccessors::resolve(class.as_ref()));
        let mut by_class = self.by_class.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            by_class
                .entry(class.name().to_string())
                .or_insert(resolved),
        )
    }

    /// Wrap a host claim object in a handle bound to this cache.
    pub fn handle(self: &Arc<Self>, claim: ObjectRef) -> ClaimHandle {
        let accessors = self.accessors_for(&claim);
        ClaimHandle::new(claim, accessors, Arc::clone(self))
    }

    pub fn cached_classes(&self) -> usize {
        self.by_class
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

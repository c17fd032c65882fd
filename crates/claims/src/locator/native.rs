use crate::config::CLAIM_AT_METHOD;
use crate::host::{HostClass, HostError, Location, ObjectRef, ParamKind, Value};

/// Known arities of the data store's native point lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAtShape {
    /// `(Location, ignoreHeight)`
    Basic,
    /// `(Location, ignoreHeight, Player | PlayerData)`; the extra argument is
    /// a cache hint and is passed as null.
    WithPlayer(ParamKind),
    /// `(Location, ignoreHeight, ignoreSubclaims, cachedClaim)`
    WithSubclaimCache,
}

impl ClaimAtShape {
    /// Most specific public signature wins.
    pub fn resolve(class: &dyn HostClass) -> Option<Self> {
        let preference = [
            ClaimAtShape::WithSubclaimCache,
            ClaimAtShape::WithPlayer(ParamKind::Player),
            ClaimAtShape::WithPlayer(ParamKind::PlayerData),
            ClaimAtShape::Basic,
        ];
        preference.into_iter().find(|shape| {
            class
                .find_method(CLAIM_AT_METHOD, &shape.params())
                .is_some_and(|m| m.is_public && !m.is_static)
        })
    }

    pub fn params(&self) -> Vec<ParamKind> {
        match self {
            ClaimAtShape::Basic => vec![ParamKind::Location, ParamKind::Bool],
            ClaimAtShape::WithPlayer(kind) => vec![ParamKind::Location, ParamKind::Bool, *kind],
            ClaimAtShape::WithSubclaimCache => vec![
                ParamKind::Location,
                ParamKind::Bool,
                ParamKind::Bool,
                ParamKind::Claim,
            ],
        }
    }

    pub fn args(&self, loc: &Location, ignore_height: bool) -> Vec<Value> {
        let mut args = vec![Value::Location(loc.clone()), Value::Bool(ignore_height)];
        match self {
            ClaimAtShape::Basic => {}
            ClaimAtShape::WithPlayer(_) => args.push(Value::Null),
            ClaimAtShape::WithSubclaimCache => {
                args.push(Value::Bool(false));
                args.push(Value::Null);
            }
        }
        args
    }

    pub fn lookup(
        &self,
        data_store: &ObjectRef,
        loc: &Location,
        ignore_height: bool,
    ) -> Result<Option<ObjectRef>, HostError> {
        let found = data_store.call(CLAIM_AT_METHOD, &self.args(loc, ignore_height))?;
        Ok(found.into_object())
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use bevy::log::{debug, warn};

use super::TrustLevel;
use crate::capability::Getter;
use crate::config::{DROP_PERMISSION_METHOD, PERMISSION_ENUM_SIMPLE_NAME, SET_PERMISSION_METHOD};
use crate::host::{ClassRef, EnumConstant, HostClass, HostError, ObjectRef, ParamKind, Value};

/// One way of changing a trust level on a claim class.
#[derive(Clone)]
pub enum TrustStrategy {
    /// `add(target)` / `remove(target)` methods named after the level.
    Direct {
        add: Option<String>,
        remove: Option<String>,
    },
    /// Read the level's collection, copy it, change it, write it back.
    Collection { getter: Getter, setter: String },
    /// `setPermission(target, <enum constant>)` / `dropPermission(target)`,
    /// with the enum resolved through the claim's own loader.
    Permission {
        constant: Option<EnumConstant>,
        drop: bool,
    },
}

impl std::fmt::Debug for TrustStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustStrategy::Direct { add, remove } => {
                write!(f, "Direct({add:?}, {remove:?})")
            }
            TrustStrategy::Collection { getter, setter } => {
                write!(f, "Collection({}, {setter})", getter.name())
            }
            TrustStrategy::Permission { constant, drop } => {
                write!(f, "Permission({constant:?}, drop: {drop})")
            }
        }
    }
}

fn single_arg_method(class: &dyn HostClass, candidates: &[&str], kind: ParamKind) -> Option<String> {
    candidates
        .iter()
        .find(|name| class.find_method(name, &[kind]).is_some_and(|m| !m.is_static))
        .map(|name| name.to_string())
}

/// Load the permission enum next to the claim class, through the loader that
/// defined the claim. A class of the same name from any other loader is not
/// assignable to the claim's parameter type.
fn permission_enum(class: &dyn HostClass) -> Option<ClassRef> {
    let loader = class.loader()?;
    let package = class.package();
    let name = if package.is_empty() {
        PERMISSION_ENUM_SIMPLE_NAME.to_string()
    } else {
        format!("{package}.{PERMISSION_ENUM_SIMPLE_NAME}")
    };
    loader.load_class(&name)
}

/// The fork's own constant for a permission level. Forks that dropped a level
/// have no such constant.
fn permission_constant(enum_class: &ClassRef, name: &str) -> Option<EnumConstant> {
    match enum_class.get_static(name) {
        Ok(Value::Enum(constant)) => Some(constant),
        Ok(other) => {
            debug!("{}.{name} is not an enum constant: {other:?}", enum_class.name());
            None
        }
        Err(e) => {
            debug!("{}.{name} unavailable: {e}", enum_class.name());
            None
        }
    }
}

impl TrustStrategy {
    /// Every strategy the class supports for `level`, in priority order.
    pub fn resolve(class: &dyn HostClass, level: TrustLevel) -> Vec<TrustStrategy> {
        let names = level.names();
        let mut found = Vec::new();

        let add = single_arg_method(class, names.add, ParamKind::Str);
        let remove = single_arg_method(class, names.remove, ParamKind::Str);
        if add.is_some() || remove.is_some() {
            found.push(TrustStrategy::Direct { add, remove });
        }

        let getter = Getter::resolve(class, names.getters, names.fields);
        let setter = single_arg_method(class, names.setters, ParamKind::Collection);
        if let (Some(getter), Some(setter)) = (getter, setter) {
            found.push(TrustStrategy::Collection { getter, setter });
        }

        let constant = class
            .find_method(SET_PERMISSION_METHOD, &[ParamKind::Str, ParamKind::Enum])
            .and_then(|_| permission_enum(class))
            .and_then(|enum_class| permission_constant(&enum_class, names.permission));
        let drop = class
            .find_method(DROP_PERMISSION_METHOD, &[ParamKind::Str])
            .is_some();
        if constant.is_some() || drop {
            found.push(TrustStrategy::Permission { constant, drop });
        }
        found
    }

    /// `Ok(false)` when this strategy has no grant half.
    pub fn grant(&self, claim: &ObjectRef, target: &str) -> Result<bool, HostError> {
        match self {
            TrustStrategy::Direct { add: Some(add), .. } => {
                claim.call(add, &[Value::str(target)])?;
                Ok(true)
            }
            TrustStrategy::Collection { getter, setter } => {
                let mut members = read_members(getter, claim)?;
                if !members.iter().any(|m| m == target) {
                    members.push(target.to_string());
                }
                write_members(claim, setter, members)?;
                Ok(true)
            }
            TrustStrategy::Permission {
                constant: Some(constant),
                ..
            } => {
                claim.call(
                    SET_PERMISSION_METHOD,
                    &[Value::str(target), Value::Enum(constant.clone())],
                )?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// `Ok(false)` when this strategy has no revoke half.
    pub fn revoke(&self, claim: &ObjectRef, target: &str) -> Result<bool, HostError> {
        match self {
            TrustStrategy::Direct {
                remove: Some(remove),
                ..
            } => {
                claim.call(remove, &[Value::str(target)])?;
                Ok(true)
            }
            TrustStrategy::Collection { getter, setter } => {
                let mut members = read_members(getter, claim)?;
                members.retain(|m| m != target);
                write_members(claim, setter, members)?;
                Ok(true)
            }
            TrustStrategy::Permission { drop: true, .. } => {
                claim.call(DROP_PERMISSION_METHOD, &[Value::str(target)])?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn read_members(getter: &Getter, claim: &ObjectRef) -> Result<Vec<String>, HostError> {
    let current = getter.read(claim)?;
    if current.is_null() {
        return Ok(Vec::new());
    }
    let items = current.into_sequence().ok_or_else(|| {
        HostError::IllegalArgument(format!("{} is not a collection", getter.name()))
    })?;
    Ok(items.iter().filter_map(Value::to_identity_string).collect())
}

fn write_members(claim: &ObjectRef, setter: &str, members: Vec<String>) -> Result<(), HostError> {
    let list = Value::List(members.into_iter().map(Value::Str).collect());
    claim.call(setter, &[list])?;
    Ok(())
}

/// Strategies per (claim class, level), resolved on first use.
#[derive(Default)]
pub struct StrategyCache {
    by_class: RwLock<HashMap<(String, TrustLevel), Arc<Vec<TrustStrategy>>>>,
    reported: RwLock<HashSet<(String, TrustLevel)>>,
}

impl StrategyCache {
    pub fn strategies(&self, claim: &ObjectRef, level: TrustLevel) -> Arc<Vec<TrustStrategy>> {
        let class = claim.class();
        let key = (class.name().to_string(), level);
        if let Some(found) = self
            .by_class
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(found);
        }
        let resolved = Arc::new(TrustStrategy::resolve(class.as_ref(), level));
        debug!("trust strategies for {} {level}: {resolved:?}", key.0);
        let mut by_class = self.by_class.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(by_class.entry(key).or_insert(resolved))
    }

    /// Warn once per class and level that a trust change is impossible.
    pub fn report_unsupported(&self, class: &str, level: TrustLevel) {
        let first = self
            .reported
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((class.to_string(), level));
        if first {
            warn!("{level} trust cannot be changed on {class}: no known mutation shape");
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.by_class
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

//! Submit-method shapes and the per-class cache of resolved shapes.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::Timing;
use crate::host::{Callback, EnumConstant, HostClass, Location, ObjectRef, ParamKind, Value};

/// One positional argument of a submit method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Plugin,
    Location,
    World,
    ChunkX,
    ChunkZ,
    Task,
    /// Runs instead of the task when the entity is gone.
    Retired,
    Delay,
    Period,
    TimeUnit,
}

impl Arg {
    fn kind(self) -> ParamKind {
        match self {
            Arg::Plugin => ParamKind::Plugin,
            Arg::Location => ParamKind::Location,
            Arg::World => ParamKind::World,
            Arg::ChunkX | Arg::ChunkZ | Arg::Delay | Arg::Period => ParamKind::Int,
            Arg::Task | Arg::Retired => ParamKind::Callback,
            Arg::TimeUnit => ParamKind::Enum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitShape {
    pub method: &'static str,
    pub args: &'static [Arg],
}

impl SubmitShape {
    pub const fn new(method: &'static str, args: &'static [Arg]) -> Self {
        Self { method, args }
    }

    pub fn params(&self) -> Vec<ParamKind> {
        self.args.iter().map(|a| a.kind()).collect()
    }

    pub fn needs(&self, arg: Arg) -> bool {
        self.args.contains(&arg)
    }

    fn present_on(&self, class: &dyn HostClass) -> bool {
        class
            .find_method(self.method, &self.params())
            .is_some_and(|m| !m.is_static)
    }
}

/// Which submit table a shape came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Global,
    Region,
    Entity,
    Async,
}

impl Target {
    pub fn label(self) -> &'static str {
        match self {
            Target::Global => "global",
            Target::Region => "location",
            Target::Entity => "entity",
            Target::Async => "async",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingKind {
    Now,
    Delayed,
    Repeating,
}

/// Everything a submit call might need, materialized on demand per shape.
pub struct SubmitArgs<'a> {
    pub plugin: &'a ObjectRef,
    pub task: Callback,
    pub retired: Option<Callback>,
    pub location: Option<&'a Location>,
    pub world: Option<ObjectRef>,
    pub timing: Timing,
    pub time_unit: Option<EnumConstant>,
}

impl SubmitArgs<'_> {
    /// Values for `shape`, or `None` if a required piece is missing.
    pub fn values(&self, shape: &SubmitShape, to_units: impl Fn(u64) -> u64) -> Option<Vec<Value>> {
        let (delay, period) = match self.timing {
            Timing::Now => (0, 0),
            Timing::Delayed { ticks } => (ticks, 0),
            Timing::Repeating { delay, period } => (delay, period),
        };
        let as_int = |v: u64| Value::Int(i64::try_from(to_units(v)).unwrap_or(i64::MAX));
        shape
            .args
            .iter()
            .map(|arg| {
                Some(match arg {
                    Arg::Plugin => Value::Object(self.plugin.clone()),
                    Arg::Location => Value::Location(self.location?.clone()),
                    Arg::World => Value::Object(self.world.clone()?),
                    Arg::ChunkX => Value::Int(self.location?.block_x() >> 4),
                    Arg::ChunkZ => Value::Int(self.location?.block_z() >> 4),
                    Arg::Task => Value::Callback(self.task.clone()),
                    Arg::Retired => Value::Callback(self.retired.clone()?),
                    Arg::Delay => as_int(delay),
                    Arg::Period => as_int(period),
                    Arg::TimeUnit => Value::Enum(self.time_unit.clone()?),
                })
            })
            .collect()
    }
}

/// Resolved shapes keyed by scheduler class, target and timing.
#[derive(Default)]
pub struct ShapeCache {
    resolved: RwLock<HashMap<(String, Target, TimingKind), Option<SubmitShape>>>,
}

impl ShapeCache {
    pub fn resolve(
        &self,
        class: &dyn HostClass,
        target: Target,
        timing: TimingKind,
        table: &[SubmitShape],
    ) -> Option<SubmitShape> {
        let key = (class.name().to_string(), target, timing);
        if let Some(found) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return *found;
        }
        let shape = table.iter().copied().find(|s| s.present_on(class));
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, shape);
        shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_follow_arg_kinds() {
        const SHAPE: SubmitShape = SubmitShape::new(
            "run",
            &[Arg::Plugin, Arg::World, Arg::ChunkX, Arg::ChunkZ, Arg::Task],
        );
        assert_eq!(
            SHAPE.params(),
            vec![
                ParamKind::Plugin,
                ParamKind::World,
                ParamKind::Int,
                ParamKind::Int,
                ParamKind::Callback
            ]
        );
        assert!(SHAPE.needs(Arg::World));
        assert!(!SHAPE.needs(Arg::Location));
    }
}

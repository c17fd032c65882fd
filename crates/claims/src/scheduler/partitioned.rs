//! Region-partitioned model: separate schedulers for the global region, for
//! each region by location, for each entity, and for async work.
//!
//! A target whose scheduler exposes none of the known shapes is an error.
//! Nothing here falls back to another thread.

use std::sync::{Arc, OnceLock};

use bevy::log::debug;

use super::shape::{Arg, ShapeCache, SubmitArgs, SubmitShape, Target, TimingKind};
use super::{scheduler_object, Affinity, SchedulerAdapter, SchedulerModel, Timing};
use crate::config::{
    ASYNC_SCHEDULER_METHOD, ENTITY_SCHEDULER_METHOD, GLOBAL_SCHEDULER_METHOD, MILLIS_PER_TICK,
    REGION_SCHEDULER_METHOD, TIME_UNIT_CLASS, TIME_UNIT_MILLIS,
};
use crate::error::SchedulerError;
use crate::host::{Callback, EnumConstant, HostRuntime, ObjectRef, Value};

use Arg::{ChunkX, ChunkZ, Delay, Period, Plugin, Retired, Task, TimeUnit, World};

const GLOBAL_NOW: &[SubmitShape] = &[SubmitShape::new("run", &[Plugin, Task])];
const GLOBAL_DELAYED: &[SubmitShape] = &[SubmitShape::new("runDelayed", &[Plugin, Task, Delay])];
const GLOBAL_REPEATING: &[SubmitShape] = &[SubmitShape::new(
    "runAtFixedRate",
    &[Plugin, Task, Delay, Period],
)];

const REGION_NOW: &[SubmitShape] = &[
    SubmitShape::new("run", &[Plugin, Arg::Location, Task]),
    SubmitShape::new("run", &[Plugin, World, ChunkX, ChunkZ, Task]),
];
const REGION_DELAYED: &[SubmitShape] = &[
    SubmitShape::new("runDelayed", &[Plugin, Arg::Location, Task, Delay]),
    SubmitShape::new("runDelayed", &[Plugin, World, ChunkX, ChunkZ, Task, Delay]),
];
const REGION_REPEATING: &[SubmitShape] = &[
    SubmitShape::new("runAtFixedRate", &[Plugin, Arg::Location, Task, Delay, Period]),
    SubmitShape::new(
        "runAtFixedRate",
        &[Plugin, World, ChunkX, ChunkZ, Task, Delay, Period],
    ),
];

const ENTITY_NOW: &[SubmitShape] = &[
    SubmitShape::new("run", &[Plugin, Task, Retired]),
    SubmitShape::new("execute", &[Plugin, Task, Retired, Delay]),
];
const ENTITY_DELAYED: &[SubmitShape] = &[
    SubmitShape::new("runDelayed", &[Plugin, Task, Retired, Delay]),
    SubmitShape::new("execute", &[Plugin, Task, Retired, Delay]),
];
const ENTITY_REPEATING: &[SubmitShape] = &[SubmitShape::new(
    "runAtFixedRate",
    &[Plugin, Task, Retired, Delay, Period],
)];

const ASYNC_NOW: &[SubmitShape] = &[SubmitShape::new("runNow", &[Plugin, Task])];
const ASYNC_DELAYED: &[SubmitShape] = &[SubmitShape::new(
    "runDelayed",
    &[Plugin, Task, Delay, TimeUnit],
)];
const ASYNC_REPEATING: &[SubmitShape] = &[SubmitShape::new(
    "runAtFixedRate",
    &[Plugin, Task, Delay, Period, TimeUnit],
)];

fn table(target: Target, timing: TimingKind) -> &'static [SubmitShape] {
    match (target, timing) {
        (Target::Global, TimingKind::Now) => GLOBAL_NOW,
        (Target::Global, TimingKind::Delayed) => GLOBAL_DELAYED,
        (Target::Global, TimingKind::Repeating) => GLOBAL_REPEATING,
        (Target::Region, TimingKind::Now) => REGION_NOW,
        (Target::Region, TimingKind::Delayed) => REGION_DELAYED,
        (Target::Region, TimingKind::Repeating) => REGION_REPEATING,
        (Target::Entity, TimingKind::Now) => ENTITY_NOW,
        (Target::Entity, TimingKind::Delayed) => ENTITY_DELAYED,
        (Target::Entity, TimingKind::Repeating) => ENTITY_REPEATING,
        (Target::Async, TimingKind::Now) => ASYNC_NOW,
        (Target::Async, TimingKind::Delayed) => ASYNC_DELAYED,
        (Target::Async, TimingKind::Repeating) => ASYNC_REPEATING,
    }
}

pub struct PartitionedAdapter {
    runtime: Arc<dyn HostRuntime>,
    global: OnceLock<ObjectRef>,
    region: OnceLock<ObjectRef>,
    async_scheduler: OnceLock<ObjectRef>,
    time_unit: OnceLock<Option<EnumConstant>>,
    shapes: ShapeCache,
}

impl PartitionedAdapter {
    pub fn new(runtime: Arc<dyn HostRuntime>) -> Self {
        Self {
            runtime,
            global: OnceLock::new(),
            region: OnceLock::new(),
            async_scheduler: OnceLock::new(),
            time_unit: OnceLock::new(),
            shapes: ShapeCache::default(),
        }
    }

    fn server_scheduler<'s>(
        &self,
        slot: &'s OnceLock<ObjectRef>,
        method: &str,
        target: Target,
    ) -> Result<&'s ObjectRef, SchedulerError> {
        if let Some(found) = slot.get() {
            return Ok(found);
        }
        let found = scheduler_object(&self.runtime.server(), method, target)?;
        Ok(slot.get_or_init(|| found))
    }

    fn time_unit(&self) -> Option<EnumConstant> {
        self.time_unit
            .get_or_init(|| {
                self.runtime
                    .load_class(TIME_UNIT_CLASS)
                    .map(|class| EnumConstant {
                        class,
                        name: TIME_UNIT_MILLIS.to_string(),
                    })
            })
            .clone()
    }
}

impl SchedulerAdapter for PartitionedAdapter {
    fn model(&self) -> SchedulerModel {
        SchedulerModel::Partitioned
    }

    fn submit(&self, affinity: &Affinity, timing: Timing, task: Callback) -> Result<Value, SchedulerError> {
        let (target, scheduler) = match affinity {
            Affinity::Global => (
                Target::Global,
                self.server_scheduler(&self.global, GLOBAL_SCHEDULER_METHOD, Target::Global)?
                    .clone(),
            ),
            Affinity::Location(_) => (
                Target::Region,
                self.server_scheduler(&self.region, REGION_SCHEDULER_METHOD, Target::Region)?
                    .clone(),
            ),
            Affinity::Entity(entity) => (
                Target::Entity,
                scheduler_object(entity, ENTITY_SCHEDULER_METHOD, Target::Entity)?,
            ),
            Affinity::Async => (
                Target::Async,
                self.server_scheduler(&self.async_scheduler, ASYNC_SCHEDULER_METHOD, Target::Async)?
                    .clone(),
            ),
        };

        let class = scheduler.class();
        let no_method = || SchedulerError::NoCompatibleMethod {
            target: target.label(),
            class: class.name().to_string(),
        };
        let shape = self
            .shapes
            .resolve(class.as_ref(), target, timing.kind(), table(target, timing.kind()))
            .ok_or_else(no_method)?;

        let location = match affinity {
            Affinity::Location(loc) => Some(loc),
            _ => None,
        };
        let world = match location {
            Some(loc) if shape.needs(World) => {
                Some(self.runtime.world(&loc.world).ok_or_else(|| {
                    SchedulerError::SchedulerUnavailable {
                        target: target.label(),
                        reason: format!("world {} not loaded", loc.world),
                    }
                })?)
            }
            _ => None,
        };
        let retired = (target == Target::Entity).then(|| {
            Callback::new(|| debug!("entity retired before its scheduled task ran"))
        });
        let time_unit = if shape.needs(TimeUnit) {
            Some(self.time_unit().ok_or_else(no_method)?)
        } else {
            None
        };

        let plugin = self.runtime.own_plugin();
        let args = SubmitArgs {
            plugin: &plugin,
            task,
            retired,
            location,
            world,
            timing,
            time_unit,
        };
        let values = match target {
            Target::Async => args.values(&shape, |ticks| ticks.saturating_mul(MILLIS_PER_TICK)),
            // Region schedulers reject delays below one tick.
            _ => args.values(&shape, |ticks| ticks.max(1)),
        }
        .ok_or_else(no_method)?;
        Ok(scheduler.call(shape.method, &values)?)
    }
}

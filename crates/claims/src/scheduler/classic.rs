//! Single game-thread model: every affine request runs on the one tick thread.

use std::sync::{Arc, OnceLock};

use super::shape::{Arg, ShapeCache, SubmitArgs, SubmitShape, Target, TimingKind};
use super::{scheduler_object, Affinity, SchedulerAdapter, SchedulerModel, Timing};
use crate::config::CLASSIC_SCHEDULER_METHOD;
use crate::error::SchedulerError;
use crate::host::{Callback, HostRuntime, ObjectRef, Value};

const SYNC_NOW: &[SubmitShape] = &[SubmitShape::new("runTask", &[Arg::Plugin, Arg::Task])];
const SYNC_DELAYED: &[SubmitShape] = &[SubmitShape::new(
    "runTaskLater",
    &[Arg::Plugin, Arg::Task, Arg::Delay],
)];
const SYNC_REPEATING: &[SubmitShape] = &[SubmitShape::new(
    "runTaskTimer",
    &[Arg::Plugin, Arg::Task, Arg::Delay, Arg::Period],
)];
const ASYNC_NOW: &[SubmitShape] = &[SubmitShape::new(
    "runTaskAsynchronously",
    &[Arg::Plugin, Arg::Task],
)];
const ASYNC_DELAYED: &[SubmitShape] = &[SubmitShape::new(
    "runTaskLaterAsynchronously",
    &[Arg::Plugin, Arg::Task, Arg::Delay],
)];
const ASYNC_REPEATING: &[SubmitShape] = &[SubmitShape::new(
    "runTaskTimerAsynchronously",
    &[Arg::Plugin, Arg::Task, Arg::Delay, Arg::Period],
)];

pub struct ClassicAdapter {
    runtime: Arc<dyn HostRuntime>,
    scheduler: OnceLock<ObjectRef>,
    shapes: ShapeCache,
}

impl ClassicAdapter {
    pub fn new(runtime: Arc<dyn HostRuntime>) -> Self {
        Self {
            runtime,
            scheduler: OnceLock::new(),
            shapes: ShapeCache::default(),
        }
    }

    fn scheduler(&self) -> Result<&ObjectRef, SchedulerError> {
        if let Some(found) = self.scheduler.get() {
            return Ok(found);
        }
        let found = scheduler_object(&self.runtime.server(), CLASSIC_SCHEDULER_METHOD, Target::Global)?;
        Ok(self.scheduler.get_or_init(|| found))
    }
}

impl SchedulerAdapter for ClassicAdapter {
    fn model(&self) -> SchedulerModel {
        SchedulerModel::Classic
    }

    fn submit(&self, affinity: &Affinity, timing: Timing, task: Callback) -> Result<Value, SchedulerError> {
        // Entity and location work collapses onto the game thread.
        let target = match affinity {
            Affinity::Async => Target::Async,
            _ => Target::Global,
        };
        let table = match (target, timing.kind()) {
            (Target::Async, TimingKind::Now) => ASYNC_NOW,
            (Target::Async, TimingKind::Delayed) => ASYNC_DELAYED,
            (Target::Async, TimingKind::Repeating) => ASYNC_REPEATING,
            (_, TimingKind::Now) => SYNC_NOW,
            (_, TimingKind::Delayed) => SYNC_DELAYED,
            (_, TimingKind::Repeating) => SYNC_REPEATING,
        };
        let scheduler = self.scheduler()?;
        let class = scheduler.class();
        let no_method = || SchedulerError::NoCompatibleMethod {
            target: target.label(),
            class: class.name().to_string(),
        };
        let shape = self
            .shapes
            .resolve(class.as_ref(), target, timing.kind(), table)
            .ok_or_else(no_method)?;
        let plugin = self.runtime.own_plugin();
        let args = SubmitArgs {
            plugin: &plugin,
            task,
            retired: None,
            location: None,
            world: None,
            timing,
            time_unit: None,
        };
        let values = args.values(&shape, |ticks| ticks).ok_or_else(no_method)?;
        Ok(scheduler.call(shape.method, &values)?)
    }
}

//! Thread-affine task submission over both host concurrency models.
//!
//! Under the classic model one thread owns the whole world, so entity and
//! location affinity collapse onto it. Under the partitioned model each region
//! runs on its own thread; work that touches a region must be submitted to that
//! region's scheduler, and a failure to do so is returned to the caller rather
//! than run anywhere else.

mod classic;
mod partitioned;
mod shape;

pub use shape::{Target, TimingKind};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bevy::log::{debug, error, info};

use crate::config::{PARTITIONED_PROBE_METHOD, TASK_CANCEL_METHOD};
use crate::error::SchedulerError;
use crate::host::{Callback, HostRuntime, Location, ObjectRef, Value};
use classic::ClassicAdapter;
use partitioned::PartitionedAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerModel {
    /// One cooperative game thread.
    Classic,
    /// Independently threaded world regions.
    Partitioned,
}

impl SchedulerModel {
    pub fn probe(server: &ObjectRef) -> Self {
        if server.class().has_method(PARTITIONED_PROBE_METHOD) {
            SchedulerModel::Partitioned
        } else {
            SchedulerModel::Classic
        }
    }
}

/// Which thread a task must run on.
#[derive(Clone)]
pub enum Affinity {
    Global,
    /// Whichever thread owns the entity's region when the task runs.
    Entity(ObjectRef),
    /// The thread owning the region that contains this point.
    Location(Location),
    /// No region; must not touch world state.
    Async,
}

impl fmt::Debug for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affinity::Global => f.write_str("Global"),
            Affinity::Entity(e) => write!(f, "Entity({})", e.class().name()),
            Affinity::Location(l) => write!(f, "Location({l})"),
            Affinity::Async => f.write_str("Async"),
        }
    }
}

/// When a task runs, in game ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Now,
    Delayed { ticks: u64 },
    Repeating { delay: u64, period: u64 },
}

impl Timing {
    pub fn kind(&self) -> TimingKind {
        match self {
            Timing::Now => TimingKind::Now,
            Timing::Delayed { .. } => TimingKind::Delayed,
            Timing::Repeating { .. } => TimingKind::Repeating,
        }
    }
}

/// A submitted task.
///
/// Cancelling is best effort: a run already dequeued by the host may still
/// happen once after [`cancel`](Self::cancel) returns.
#[derive(Clone)]
pub struct TaskHandle {
    host_task: Option<ObjectRef>,
    scheduled: bool,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn from_host(returned: Value, cancelled: Arc<AtomicBool>) -> Self {
        let scheduled = !matches!(returned, Value::Null | Value::Bool(false));
        Self {
            host_task: returned.into_object(),
            scheduled,
            cancelled,
        }
    }

    /// False when the host declined the task, e.g. for an entity that is gone.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = &self.host_task {
            if let Err(e) = task.call(TASK_CANCEL_METHOD, &[]) {
                debug!("host task cancel failed: {e}");
            }
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("scheduled", &self.scheduled)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// One concurrency model's way of submitting work.
pub(crate) trait SchedulerAdapter: Send + Sync {
    fn model(&self) -> SchedulerModel;

    /// Hand `task` to the host. Returns whatever the host returned.
    fn submit(&self, affinity: &Affinity, timing: Timing, task: Callback) -> Result<Value, SchedulerError>;
}

/// Fetch a scheduler object through a zero-argument accessor on `owner`.
pub(crate) fn scheduler_object(
    owner: &ObjectRef,
    method: &str,
    target: Target,
) -> Result<ObjectRef, SchedulerError> {
    match owner.call(method, &[]) {
        Ok(Value::Object(scheduler)) => Ok(scheduler),
        Ok(other) => Err(SchedulerError::SchedulerUnavailable {
            target: target.label(),
            reason: format!("{method} returned {other:?}"),
        }),
        Err(e) => Err(SchedulerError::SchedulerUnavailable {
            target: target.label(),
            reason: e.to_string(),
        }),
    }
}

/// The scheduling facade. The model is probed once at construction.
pub struct RegionScheduler {
    adapter: Box<dyn SchedulerAdapter>,
}

impl RegionScheduler {
    pub fn new(runtime: Arc<dyn HostRuntime>) -> Self {
        let model = SchedulerModel::probe(&runtime.server());
        info!("Host scheduling model: {model:?}");
        let adapter: Box<dyn SchedulerAdapter> = match model {
            SchedulerModel::Classic => Box::new(ClassicAdapter::new(runtime)),
            SchedulerModel::Partitioned => Box::new(PartitionedAdapter::new(runtime)),
        };
        Self { adapter }
    }

    pub fn model(&self) -> SchedulerModel {
        self.adapter.model()
    }

    pub fn schedule(
        &self,
        affinity: Affinity,
        timing: Timing,
        task: Callback,
    ) -> Result<TaskHandle, SchedulerError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let guarded = Callback::new(move || {
            if !flag.load(Ordering::Acquire) {
                task.run();
            }
        });
        match self.adapter.submit(&affinity, timing, guarded) {
            Ok(returned) => Ok(TaskHandle::from_host(returned, cancelled)),
            Err(e) => {
                if e.is_affinity_violation() {
                    error!("{:?} task for {affinity:?} not scheduled: {e}", timing.kind());
                }
                Err(e)
            }
        }
    }

    fn once(
        &self,
        affinity: Affinity,
        timing: Timing,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(affinity, timing, Callback::once(task))
    }

    pub fn run_global(&self, task: impl FnOnce() + Send + 'static) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Global, Timing::Now, task)
    }

    pub fn run_global_later(
        &self,
        ticks: u64,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Global, Timing::Delayed { ticks }, task)
    }

    pub fn run_at_entity(
        &self,
        entity: &ObjectRef,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Entity(entity.clone()), Timing::Now, task)
    }

    pub fn run_at_entity_later(
        &self,
        entity: &ObjectRef,
        ticks: u64,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Entity(entity.clone()), Timing::Delayed { ticks }, task)
    }

    pub fn run_at_location(
        &self,
        loc: &Location,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Location(loc.clone()), Timing::Now, task)
    }

    pub fn run_at_location_later(
        &self,
        loc: &Location,
        ticks: u64,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Location(loc.clone()), Timing::Delayed { ticks }, task)
    }

    pub fn run_async(&self, task: impl FnOnce() + Send + 'static) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Async, Timing::Now, task)
    }

    pub fn run_async_later(
        &self,
        ticks: u64,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.once(Affinity::Async, Timing::Delayed { ticks }, task)
    }

    pub fn run_repeating(
        &self,
        affinity: Affinity,
        delay: u64,
        period: u64,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(affinity, Timing::Repeating { delay, period }, Callback::new(task))
    }
}

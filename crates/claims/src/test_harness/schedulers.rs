//! Fake host schedulers.
//!
//! The classic model runs every task on the thread that ticks the host. The
//! partitioned model gives each region (and the global region) its own worker
//! thread fed over a channel; a tick is a barrier across all workers. Every
//! task runs with a thread-local owner marker so world objects can check that
//! they are touched from the right thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::fake::{int_arg, FakeClass};
use crate::config::MILLIS_PER_TICK;
use crate::host::{
    Callback, ClassRef, HostError, HostObject, Location, MethodSig, ObjectRef,
    ParamKind, Value,
};

/// Regions are 8x8 chunks.
pub const REGION_SHIFT: u32 = 7;

/// Which thread is running the current code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    GameThread,
    Global,
    Region { world: String, x: i64, z: i64 },
    Async,
}

impl Owner {
    pub fn region_of(loc: &Location) -> Owner {
        Owner::Region {
            world: loc.world.clone(),
            x: loc.block_x() >> REGION_SHIFT,
            z: loc.block_z() >> REGION_SHIFT,
        }
    }

    fn region_of_chunk(world: &str, chunk_x: i64, chunk_z: i64) -> Owner {
        Owner::Region {
            world: world.to_string(),
            x: chunk_x >> (REGION_SHIFT - 4),
            z: chunk_z >> (REGION_SHIFT - 4),
        }
    }
}

thread_local! {
    static CURRENT_OWNER: RefCell<Option<Owner>> = const { RefCell::new(None) };
}

pub fn current_owner() -> Option<Owner> {
    CURRENT_OWNER.with(|owner| owner.borrow().clone())
}

fn run_as(owner: &Owner, task: &Callback) {
    let previous = CURRENT_OWNER.with(|current| current.replace(Some(owner.clone())));
    task.run();
    CURRENT_OWNER.with(|current| *current.borrow_mut() = previous);
}

/// The scheduling model the fake server presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerProfile {
    Classic,
    /// Region scheduler takes a location.
    Partitioned,
    /// Region scheduler takes a world and chunk coordinates.
    PartitionedChunkApi,
    /// Region scheduler object exists but has no submit methods.
    PartitionedMissingRegionMethods,
}

impl SchedulerProfile {
    pub fn is_partitioned(self) -> bool {
        self != SchedulerProfile::Classic
    }

    /// The owner expected for work touching `loc`.
    pub fn owner_of(self, loc: &Location) -> Owner {
        if self.is_partitioned() {
            Owner::region_of(loc)
        } else {
            Owner::GameThread
        }
    }
}

// ---------------------------------------------------------------------------
// Tick queues
// ---------------------------------------------------------------------------

pub struct Job {
    delay: u64,
    period: Option<u64>,
    task: Callback,
    cancelled: Arc<AtomicBool>,
}

impl Job {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct TickQueue {
    now: u64,
    pending: Vec<(u64, Job)>,
}

impl TickQueue {
    fn push(&mut self, job: Job) {
        let due = self.now.saturating_add(job.delay.max(1));
        self.pending.push((due, job));
    }

    /// Advance one tick and hand back the jobs now due, in submission order.
    fn advance(&mut self) -> Vec<Job> {
        self.now += 1;
        let now = self.now;
        let (due, rest): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|(at, _)| *at <= now);
        self.pending = rest;
        due.into_iter().map(|(_, job)| job).collect()
    }

    fn requeue(&mut self, job: Job) {
        if let Some(period) = job.period {
            if !job.is_cancelled() {
                self.push(Job {
                    delay: period,
                    ..job
                });
            }
        }
    }
}

/// The classic single game thread.
#[derive(Default)]
pub struct GameLoop {
    queue: Mutex<TickQueue>,
}

impl GameLoop {
    fn submit(&self, job: Job) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push(job);
    }

    pub fn tick(&self) {
        let due = self.queue.lock().unwrap_or_else(PoisonError::into_inner).advance();
        for job in due {
            if job.is_cancelled() {
                continue;
            }
            run_as(&Owner::GameThread, &job.task);
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .requeue(job);
        }
    }
}

/// Async work: each run gets a fresh thread.
#[derive(Default)]
pub struct AsyncPool {
    timers: Mutex<TickQueue>,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncPool {
    fn spawn(&self, task: Callback) {
        let handle = thread::spawn(move || run_as(&Owner::Async, &task));
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn submit(&self, job: Job) {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner).push(job);
    }

    pub fn tick(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for job in timers.advance() {
            if job.is_cancelled() {
                continue;
            }
            self.spawn(job.task.clone());
            timers.requeue(job);
        }
    }

    /// Wait for every async run started so far.
    pub fn join(&self) {
        let handles: Vec<_> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Region workers
// ---------------------------------------------------------------------------

enum WorkerMsg {
    Submit(Job),
    Tick(Sender<()>),
    Stop,
}

struct Worker {
    inbox: Sender<WorkerMsg>,
    handle: Option<JoinHandle<()>>,
}

fn worker_loop(owner: Owner, inbox: Receiver<WorkerMsg>) {
    let mut queue = TickQueue::default();
    for msg in inbox.iter() {
        match msg {
            WorkerMsg::Submit(job) => queue.push(job),
            WorkerMsg::Tick(done) => {
                for job in queue.advance() {
                    if job.is_cancelled() {
                        continue;
                    }
                    run_as(&owner, &job.task);
                    queue.requeue(job);
                }
                let _ = done.send(());
            }
            WorkerMsg::Stop => break,
        }
    }
}

/// One worker thread per region, started on first use.
#[derive(Default)]
pub struct RegionPool {
    workers: Mutex<HashMap<Owner, Worker>>,
}

impl RegionPool {
    fn submit(&self, owner: Owner, job: Job) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let worker = workers.entry(owner.clone()).or_insert_with(|| {
            let (tx, rx) = unbounded();
            let handle = thread::spawn(move || worker_loop(owner, rx));
            Worker {
                inbox: tx,
                handle: Some(handle),
            }
        });
        let _ = worker.inbox.send(WorkerMsg::Submit(job));
    }

    /// Tick every worker and wait for all of them to finish the tick.
    pub fn tick(&self) {
        let inboxes: Vec<Sender<WorkerMsg>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|w| w.inbox.clone())
            .collect();
        let (done_tx, done_rx) = unbounded();
        let mut waiting = 0;
        for inbox in inboxes {
            if inbox.send(WorkerMsg::Tick(done_tx.clone())).is_ok() {
                waiting += 1;
            }
        }
        for _ in 0..waiting {
            if done_rx.recv().is_err() {
                break;
            }
        }
    }

    pub fn region_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|owner| matches!(owner, Owner::Region { .. }))
            .count()
    }
}

impl Drop for RegionPool {
    fn drop(&mut self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.values() {
            let _ = worker.inbox.send(WorkerMsg::Stop);
        }
        for worker in workers.values_mut() {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler objects
// ---------------------------------------------------------------------------

/// Returned from every submit; cancelling stops future runs.
pub struct FakeTask {
    class: ClassRef,
    cancelled: Arc<AtomicBool>,
}

impl FakeTask {
    fn value(cancelled: &Arc<AtomicBool>) -> Value {
        let task: ObjectRef = Arc::new(FakeTask {
            class: FakeClass::new("io.papermc.paper.threadedregions.scheduler.ScheduledTask")
                .method(MethodSig::public("cancel", &[]))
                .build(),
            cancelled: Arc::clone(cancelled),
        });
        Value::Object(task)
    }
}

impl HostObject for FakeTask {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, HostError> {
        match method {
            "cancel" => {
                self.cancelled.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            }
            _ => Err(HostError::no_such_method(self.class.name(), method)),
        }
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

fn task_arg(args: &[Value]) -> Result<Callback, HostError> {
    args.iter()
        .find_map(|v| match v {
            Value::Callback(c) => Some(c.clone()),
            _ => None,
        })
        .ok_or_else(|| HostError::IllegalArgument("no task argument".to_string()))
}

/// Trailing integer arguments: delay, then period.
fn timing_args(args: &[Value], class: &str, method: &str, count: usize) -> Result<Vec<u64>, HostError> {
    let ints: Vec<usize> = args
        .iter()
        .enumerate()
        .filter(|(_, v)| matches!(v, Value::Int(_)))
        .map(|(i, _)| i)
        .collect();
    let start = ints.len().saturating_sub(count);
    ints[start..]
        .iter()
        .map(|&i| {
            let v = int_arg(args, i, class, method)?;
            u64::try_from(v).map_err(|_| HostError::IllegalArgument(format!("{method}: negative delay {v}")))
        })
        .collect()
}

fn job(task: Callback, delay: u64, period: Option<u64>) -> (Job, Arc<AtomicBool>) {
    let cancelled = Arc::new(AtomicBool::new(false));
    let job = Job {
        delay,
        period,
        task,
        cancelled: Arc::clone(&cancelled),
    };
    (job, cancelled)
}

/// Where a submitted job goes.
pub enum Sink {
    Game(Arc<GameLoop>),
    Region(Arc<RegionPool>, Owner),
    Async(Arc<AsyncPool>),
}

impl Sink {
    fn accept(&self, task: Callback, delay: u64, period: Option<u64>) -> Value {
        let immediate = delay == 0 && period.is_none();
        let (job, cancelled) = job(task, delay, period);
        match self {
            Sink::Game(game) => game.submit(job),
            Sink::Region(pool, owner) => pool.submit(owner.clone(), job),
            Sink::Async(pool) if immediate => pool.spawn(job.task),
            Sink::Async(pool) => pool.submit(job),
        }
        FakeTask::value(&cancelled)
    }
}

/// The classic server scheduler.
pub struct ClassicScheduler {
    class: ClassRef,
    game: Arc<GameLoop>,
    async_pool: Arc<AsyncPool>,
}

impl ClassicScheduler {
    pub fn new(game: Arc<GameLoop>, async_pool: Arc<AsyncPool>) -> Self {
        use ParamKind::{Callback as Task, Int, Plugin};
        let class = FakeClass::new("org.bukkit.craftbukkit.scheduler.CraftScheduler")
            .methods([
                MethodSig::public("runTask", &[Plugin, Task]),
                MethodSig::public("runTaskLater", &[Plugin, Task, Int]),
                MethodSig::public("runTaskTimer", &[Plugin, Task, Int, Int]),
                MethodSig::public("runTaskAsynchronously", &[Plugin, Task]),
                MethodSig::public("runTaskLaterAsynchronously", &[Plugin, Task, Int]),
                MethodSig::public("runTaskTimerAsynchronously", &[Plugin, Task, Int, Int]),
            ])
            .build();
        Self {
            class,
            game,
            async_pool,
        }
    }
}

impl HostObject for ClassicScheduler {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        let class = self.class.name();
        let sink = if method.ends_with("Asynchronously") {
            Sink::Async(Arc::clone(&self.async_pool))
        } else {
            Sink::Game(Arc::clone(&self.game))
        };
        let task = task_arg(args)?;
        match method.trim_end_matches("Asynchronously") {
            "runTask" => Ok(sink.accept(task, 0, None)),
            "runTaskLater" => {
                let t = timing_args(args, class, method, 1)?;
                Ok(sink.accept(task, t[0], None))
            }
            "runTaskTimer" => {
                let t = timing_args(args, class, method, 2)?;
                Ok(sink.accept(task, t[0], Some(t[1])))
            }
            _ => Err(HostError::no_such_method(class, method)),
        }
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// Which routing a partitioned scheduler object applies.
pub enum Routing {
    Global(Arc<RegionPool>),
    Region(Arc<RegionPool>),
    Async(Arc<AsyncPool>),
}

/// Global, region and async schedulers of the partitioned model.
pub struct PartitionedScheduler {
    class: ClassRef,
    routing: Routing,
}

impl PartitionedScheduler {
    pub fn global(pool: Arc<RegionPool>) -> Self {
        use ParamKind::{Callback as Task, Int, Plugin};
        let class = FakeClass::new("io.papermc.paper.threadedregions.scheduler.FoliaGlobalRegionScheduler")
            .methods([
                MethodSig::public("run", &[Plugin, Task]),
                MethodSig::public("runDelayed", &[Plugin, Task, Int]),
                MethodSig::public("runAtFixedRate", &[Plugin, Task, Int, Int]),
            ])
            .build();
        Self {
            class,
            routing: Routing::Global(pool),
        }
    }

    pub fn region(pool: Arc<RegionPool>, profile: SchedulerProfile) -> Self {
        use ParamKind::{Callback as Task, Int, Location as Loc, Plugin, World};
        let class = FakeClass::new("io.papermc.paper.threadedregions.scheduler.FoliaRegionScheduler");
        let class = match profile {
            SchedulerProfile::PartitionedChunkApi => class.methods([
                MethodSig::public("run", &[Plugin, World, Int, Int, Task]),
                MethodSig::public("runDelayed", &[Plugin, World, Int, Int, Task, Int]),
                MethodSig::public("runAtFixedRate", &[Plugin, World, Int, Int, Task, Int, Int]),
            ]),
            SchedulerProfile::PartitionedMissingRegionMethods => class,
            _ => class.methods([
                MethodSig::public("run", &[Plugin, Loc, Task]),
                MethodSig::public("runDelayed", &[Plugin, Loc, Task, Int]),
                MethodSig::public("runAtFixedRate", &[Plugin, Loc, Task, Int, Int]),
            ]),
        };
        Self {
            class: class.build(),
            routing: Routing::Region(pool),
        }
    }

    pub fn asynchronous(pool: Arc<AsyncPool>) -> Self {
        use ParamKind::{Callback as Task, Enum, Int, Plugin};
        let class = FakeClass::new("io.papermc.paper.threadedregions.scheduler.FoliaAsyncScheduler")
            .methods([
                MethodSig::public("runNow", &[Plugin, Task]),
                MethodSig::public("runDelayed", &[Plugin, Task, Int, Enum]),
                MethodSig::public("runAtFixedRate", &[Plugin, Task, Int, Int, Enum]),
            ])
            .build();
        Self {
            class,
            routing: Routing::Async(pool),
        }
    }

    fn region_owner(&self, args: &[Value]) -> Result<Owner, HostError> {
        if let Some(loc) = args.iter().find_map(Value::as_location) {
            return Ok(Owner::region_of(loc));
        }
        // The plugin argument is an object too; only the world answers getName.
        let world = args
            .iter()
            .filter_map(Value::as_object)
            .find_map(|o| o.call("getName", &[]).ok()?.as_str().map(str::to_string))
            .ok_or_else(|| HostError::IllegalArgument("region submit without a place".into()))?;
        let class = self.class.name();
        let ints: Vec<i64> = args.iter().filter_map(Value::as_int).collect();
        match ints.as_slice() {
            [cx, cz, ..] => Ok(Owner::region_of_chunk(&world, *cx, *cz)),
            _ => Err(HostError::IllegalArgument(format!("{class}: missing chunk coordinates"))),
        }
    }

    /// Async delays arrive in milliseconds with a unit constant.
    fn async_ticks(&self, args: &[Value], method: &str, count: usize) -> Result<Vec<u64>, HostError> {
        let unit = args.iter().find_map(|v| match v {
            Value::Enum(e) => Some(e.name.as_str()),
            _ => None,
        });
        if unit != Some("MILLISECONDS") {
            return Err(HostError::IllegalArgument(format!("{method}: unsupported unit {unit:?}")));
        }
        Ok(timing_args(args, self.class.name(), method, count)?
            .into_iter()
            .map(|ms| ms / MILLIS_PER_TICK)
            .collect())
    }
}

impl HostObject for PartitionedScheduler {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        let class = self.class.name();
        if !self.class.has_method(method) {
            return Err(HostError::no_such_method(class, method));
        }
        let task = task_arg(args)?;
        let sink = match &self.routing {
            Routing::Global(pool) => Sink::Region(Arc::clone(pool), Owner::Global),
            Routing::Region(pool) => Sink::Region(Arc::clone(pool), self.region_owner(args)?),
            Routing::Async(pool) => Sink::Async(Arc::clone(pool)),
        };
        let is_async = matches!(self.routing, Routing::Async(_));
        match method {
            "run" | "runNow" => Ok(sink.accept(task, 0, None)),
            "runDelayed" => {
                let t = if is_async {
                    self.async_ticks(args, method, 1)?
                } else {
                    timing_args(args, class, method, 1)?
                };
                if !is_async && t[0] == 0 {
                    return Err(HostError::IllegalArgument("delay must be at least one tick".into()));
                }
                Ok(sink.accept(task, t[0], None))
            }
            "runAtFixedRate" => {
                let t = if is_async {
                    self.async_ticks(args, method, 2)?
                } else {
                    timing_args(args, class, method, 2)?
                };
                if !is_async && t[0] == 0 {
                    return Err(HostError::IllegalArgument("delay must be at least one tick".into()));
                }
                Ok(sink.accept(task, t[0], Some(t[1])))
            }
            _ => Err(HostError::no_such_method(class, method)),
        }
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// A per-entity scheduler. Tasks go to the region the entity stands in when
/// they are submitted; a removed entity declines them.
pub struct EntityScheduler {
    class: ClassRef,
    pool: Arc<RegionPool>,
    locate: Box<dyn Fn() -> Option<Location> + Send + Sync>,
}

impl EntityScheduler {
    pub fn new(pool: Arc<RegionPool>, locate: impl Fn() -> Option<Location> + Send + Sync + 'static) -> Self {
        use ParamKind::{Callback as Task, Int, Plugin};
        let class = FakeClass::new("io.papermc.paper.threadedregions.EntityScheduler")
            .methods([
                MethodSig::public("run", &[Plugin, Task, Task]),
                MethodSig::public("execute", &[Plugin, Task, Task, Int]),
                MethodSig::public("runDelayed", &[Plugin, Task, Task, Int]),
                MethodSig::public("runAtFixedRate", &[Plugin, Task, Task, Int, Int]),
            ])
            .build();
        Self {
            class,
            pool,
            locate: Box::new(locate),
        }
    }
}

impl HostObject for EntityScheduler {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        let class = self.class.name();
        if !self.class.has_method(method) {
            return Err(HostError::no_such_method(class, method));
        }
        let Some(at) = (self.locate)() else {
            return Ok(Value::Null);
        };
        let sink = Sink::Region(Arc::clone(&self.pool), Owner::region_of(&at));
        let task = task_arg(args)?;
        match method {
            "run" => Ok(sink.accept(task, 0, None)),
            "execute" | "runDelayed" => {
                let t = timing_args(args, class, method, 1)?;
                Ok(sink.accept(task, t[0], None))
            }
            "runAtFixedRate" => {
                let t = timing_args(args, class, method, 2)?;
                Ok(sink.accept(task, t[0], Some(t[1])))
            }
            _ => Err(HostError::no_such_method(class, method)),
        }
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

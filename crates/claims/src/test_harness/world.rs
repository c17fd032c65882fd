//! Fake server, worlds and players. World and entity methods record a
//! violation whenever they run on a thread that does not own them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::fake::{int_arg, str_arg, FakeClass, FakeLoader};
use super::schedulers::{
    current_owner, AsyncPool, ClassicScheduler, EntityScheduler, GameLoop, Owner,
    PartitionedScheduler, RegionPool, SchedulerProfile,
};
use crate::config::TIME_UNIT_CLASS;
use crate::host::{
    ClassLoader, ClassRef, HostError, HostObject, HostRuntime, Location, LoaderRef,
    MethodSig, ObjectRef, ParamKind, PluginHandle, Value,
};

pub const DEFAULT_SURFACE_Y: i64 = 64;

/// Thread-affinity violations seen by world and entity objects.
#[derive(Default)]
pub struct AffinityLog {
    violations: Mutex<Vec<String>>,
}

impl AffinityLog {
    fn expect(&self, expected: Owner, what: &str) {
        let actual = current_owner();
        if actual.as_ref() != Some(&expected) {
            self.violations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format!("{what}: ran on {actual:?}, owned by {expected:?}"));
        }
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn location_arg<'a>(args: &'a [Value], method: &str) -> Result<&'a Location, HostError> {
    args.first()
        .and_then(Value::as_location)
        .ok_or_else(|| HostError::IllegalArgument(format!("{method}: expected a location")))
}

type BlockPos = (i64, i64, i64);

fn block_pos(loc: &Location) -> BlockPos {
    (loc.block_x(), loc.block_y(), loc.block_z())
}

pub struct FakeWorld {
    class: ClassRef,
    pub name: String,
    min_y: i64,
    max_y: i64,
    profile: SchedulerProfile,
    affinity: Arc<AffinityLog>,
    surface: Mutex<HashMap<(i64, i64), i64>>,
    blocks: Mutex<HashMap<BlockPos, String>>,
    signs: Mutex<HashMap<BlockPos, Vec<String>>>,
}

impl FakeWorld {
    fn new(name: &str, profile: SchedulerProfile, affinity: Arc<AffinityLog>) -> Self {
        use ParamKind::{Collection, Int, Location as Loc, Str};
        let class = FakeClass::new("org.bukkit.craftbukkit.CraftWorld")
            .methods([
                MethodSig::public("getName", &[]),
                MethodSig::public("getMinHeight", &[]),
                MethodSig::public("getMaxHeight", &[]),
                MethodSig::public("getHighestBlockYAt", &[Int, Int]),
                MethodSig::public("getBlockState", &[Loc]),
                MethodSig::public("setBlockState", &[Loc, Str]),
                MethodSig::public("setSignLines", &[Loc, Collection]),
            ])
            .build();
        Self {
            class,
            name: name.to_string(),
            min_y: -64,
            max_y: 320,
            profile,
            affinity,
            surface: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            signs: Mutex::new(HashMap::new()),
        }
    }

    fn surface_at(&self, x: i64, z: i64) -> i64 {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(x, z))
            .copied()
            .unwrap_or(DEFAULT_SURFACE_Y)
    }

    pub fn set_surface(&self, x: i64, z: i64, y: i64) {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((x, z), y);
    }

    /// Block name at a position; unset blocks are terrain.
    pub fn block_at(&self, x: i64, y: i64, z: i64) -> String {
        if let Some(block) = self
            .blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(x, y, z))
        {
            return block.clone();
        }
        if y <= self.surface_at(x, z) {
            "stone".to_string()
        } else {
            "air".to_string()
        }
    }

    pub fn sign_lines(&self, x: i64, y: i64, z: i64) -> Option<Vec<String>> {
        self.signs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(x, y, z))
            .cloned()
    }

    fn guard(&self, at: &Location, what: &str) {
        self.affinity.expect(self.profile.owner_of(at), what);
    }
}

impl HostObject for FakeWorld {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        let class = self.class.name();
        match method {
            "getName" => Ok(Value::str(self.name.as_str())),
            "getMinHeight" => Ok(Value::Int(self.min_y)),
            "getMaxHeight" => Ok(Value::Int(self.max_y)),
            "getHighestBlockYAt" => {
                let x = int_arg(args, 0, class, method)?;
                let z = int_arg(args, 1, class, method)?;
                let at = Location::new(self.name.as_str(), x as f64, 0.0, z as f64);
                self.guard(&at, method);
                Ok(Value::Int(self.surface_at(x, z)))
            }
            "getBlockState" => {
                let at = location_arg(args, method)?;
                self.guard(at, method);
                let (x, y, z) = block_pos(at);
                Ok(Value::Str(self.block_at(x, y, z)))
            }
            "setBlockState" => {
                let at = location_arg(args, method)?;
                self.guard(at, method);
                let block = str_arg(args, 1, class, method)?;
                let pos = block_pos(at);
                if block != "oak_sign" {
                    self.signs
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&pos);
                }
                self.blocks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(pos, block);
                Ok(Value::Null)
            }
            "setSignLines" => {
                let at = location_arg(args, method)?;
                self.guard(at, method);
                let lines = args
                    .get(1)
                    .cloned()
                    .and_then(Value::into_sequence)
                    .ok_or_else(|| HostError::IllegalArgument(format!("{method}: expected lines")))?;
                let lines = lines.iter().filter_map(|l| l.as_str().map(str::to_string)).collect();
                self.signs
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(block_pos(at), lines);
                Ok(Value::Null)
            }
            _ => Err(HostError::no_such_method(class, method)),
        }
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

pub struct FakePlayer {
    class: ClassRef,
    pub id: String,
    location: Mutex<Location>,
    removed: AtomicBool,
    opened: Mutex<Vec<Location>>,
    profile: SchedulerProfile,
    affinity: Arc<AffinityLog>,
    scheduler: Option<ObjectRef>,
}

impl FakePlayer {
    fn spawn(
        id: &str,
        at: Location,
        profile: SchedulerProfile,
        affinity: Arc<AffinityLog>,
        pool: &Arc<RegionPool>,
    ) -> Arc<FakePlayer> {
        let teleport = if profile.is_partitioned() {
            "teleportAsync"
        } else {
            "teleport"
        };
        let mut class = FakeClass::new("org.bukkit.craftbukkit.entity.CraftPlayer").methods([
            MethodSig::public("getUniqueId", &[]),
            MethodSig::public("getLocation", &[]),
            MethodSig::public(teleport, &[ParamKind::Location]),
            MethodSig::public("openSign", &[ParamKind::Location]),
        ]);
        if profile.is_partitioned() {
            class = class.method(MethodSig::public("getScheduler", &[]));
        }
        let class: ClassRef = class.build();
        Arc::new_cyclic(|me: &Weak<FakePlayer>| {
            let scheduler = profile.is_partitioned().then(|| {
                let me = me.clone();
                let entity: ObjectRef = Arc::new(EntityScheduler::new(Arc::clone(pool), move || {
                    let player = me.upgrade()?;
                    (!player.is_removed()).then(|| player.location())
                }));
                entity
            });
            FakePlayer {
                class,
                id: id.to_string(),
                location: Mutex::new(at),
                removed: AtomicBool::new(false),
                opened: Mutex::new(Vec::new()),
                profile,
                affinity,
                scheduler,
            }
        })
    }

    pub fn location(&self) -> Location {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Locations of sign editors opened for this player.
    pub fn opened_signs(&self) -> Vec<Location> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn guard(&self, what: &str) {
        self.affinity
            .expect(self.profile.owner_of(&self.location()), what);
    }
}

impl HostObject for FakePlayer {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        if !self.class.has_method(method) {
            return Err(HostError::no_such_method(self.class.name(), method));
        }
        match method {
            "getUniqueId" => Ok(Value::str(self.id.as_str())),
            "getLocation" => Ok(Value::Location(self.location())),
            "getScheduler" => Ok(self.scheduler.clone().map_or(Value::Null, Value::Object)),
            "teleport" | "teleportAsync" => {
                let dest = location_arg(args, method)?.clone();
                self.guard(method);
                *self.location.lock().unwrap_or_else(PoisonError::into_inner) = dest;
                Ok(Value::Bool(true))
            }
            "openSign" => {
                if self.is_removed() {
                    return Err(HostError::Invocation(format!("{} is offline", self.id)));
                }
                let at = location_arg(args, method)?.clone();
                self.guard(method);
                self.opened
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(at);
                Ok(Value::Null)
            }
            _ => Err(HostError::no_such_method(self.class.name(), method)),
        }
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// The server object: worlds plus whichever schedulers its model offers.
pub struct FakeServer {
    class: ClassRef,
    pub profile: SchedulerProfile,
    pub affinity: Arc<AffinityLog>,
    worlds: Mutex<HashMap<String, Arc<FakeWorld>>>,
    game: Arc<GameLoop>,
    regions: Arc<RegionPool>,
    async_pool: Arc<AsyncPool>,
    schedulers: HashMap<&'static str, ObjectRef>,
}

impl FakeServer {
    pub fn new(profile: SchedulerProfile) -> Self {
        let game = Arc::new(GameLoop::default());
        let regions = Arc::new(RegionPool::default());
        let async_pool = Arc::new(AsyncPool::default());
        let mut schedulers: HashMap<&'static str, ObjectRef> = HashMap::new();
        if profile.is_partitioned() {
            schedulers.insert(
                "getGlobalRegionScheduler",
                Arc::new(PartitionedScheduler::global(Arc::clone(&regions))),
            );
            schedulers.insert(
                "getRegionScheduler",
                Arc::new(PartitionedScheduler::region(Arc::clone(&regions), profile)),
            );
            schedulers.insert(
                "getAsyncScheduler",
                Arc::new(PartitionedScheduler::asynchronous(Arc::clone(&async_pool))),
            );
        } else {
            schedulers.insert(
                "getScheduler",
                Arc::new(ClassicScheduler::new(Arc::clone(&game), Arc::clone(&async_pool))),
            );
        }
        let mut class = FakeClass::new("org.bukkit.craftbukkit.CraftServer")
            .method(MethodSig::public("getWorld", &[ParamKind::Str]));
        for name in schedulers.keys() {
            class = class.method(MethodSig::public(name, &[]));
        }
        let server = Self {
            class: class.build(),
            profile,
            affinity: Arc::new(AffinityLog::default()),
            worlds: Mutex::new(HashMap::new()),
            game,
            regions,
            async_pool,
            schedulers,
        };
        server.add_world("world");
        server
    }

    pub fn add_world(&self, name: &str) -> Arc<FakeWorld> {
        let world = Arc::new(FakeWorld::new(name, self.profile, Arc::clone(&self.affinity)));
        self.worlds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&world));
        world
    }

    pub fn world(&self, name: &str) -> Option<Arc<FakeWorld>> {
        self.worlds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn spawn_player(&self, id: &str, at: Location) -> Arc<FakePlayer> {
        FakePlayer::spawn(id, at, self.profile, Arc::clone(&self.affinity), &self.regions)
    }

    /// Advance every scheduler by one tick.
    pub fn tick(&self) {
        if self.profile.is_partitioned() {
            self.regions.tick();
        } else {
            self.game.tick();
        }
        self.async_pool.tick();
    }

    pub fn join_async(&self) {
        self.async_pool.join();
    }

    pub fn region_threads(&self) -> usize {
        self.regions.region_count()
    }
}

impl HostObject for FakeServer {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        if method == "getWorld" {
            let name = str_arg(args, 0, self.class.name(), method)?;
            return Ok(self.world(&name).map_or(Value::Null, |w| Value::Object(w)));
        }
        self.schedulers
            .get(method)
            .map(|s| Value::Object(Arc::clone(s)))
            .ok_or_else(|| HostError::no_such_method(self.class.name(), method))
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// This bridge's own plugin object; only identity matters.
struct OwnPlugin {
    class: ClassRef,
}

impl HostObject for OwnPlugin {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::no_such_method(self.class.name(), method))
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// The host runtime handed to the bridge.
pub struct FakeRuntime {
    pub server: Arc<FakeServer>,
    pub bridge_loader: Arc<FakeLoader>,
    store_plugin: Mutex<Option<PluginHandle>>,
    own_plugin: ObjectRef,
    plugin_lookups: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(server: Arc<FakeServer>) -> Self {
        let bridge_loader = FakeLoader::new("bridge");
        let loader: LoaderRef = bridge_loader.clone();
        bridge_loader.define(FakeClass::new(TIME_UNIT_CLASS).loaded_by(&loader).build());
        let own_plugin: ObjectRef = Arc::new(OwnPlugin {
            class: FakeClass::new("dev.claimbridge.BridgePlugin")
                .loaded_by(&loader)
                .build(),
        });
        Self {
            server,
            bridge_loader,
            store_plugin: Mutex::new(None),
            own_plugin,
            plugin_lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_store_plugin(&self, plugin: Option<PluginHandle>) {
        *self.store_plugin.lock().unwrap_or_else(PoisonError::into_inner) = plugin;
    }

    pub fn plugin_lookups(&self) -> usize {
        self.plugin_lookups.load(Ordering::SeqCst)
    }
}

impl HostRuntime for FakeRuntime {
    fn plugin(&self, name: &str) -> Option<PluginHandle> {
        self.plugin_lookups.fetch_add(1, Ordering::SeqCst);
        self.store_plugin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|p| p.name == name)
    }

    fn load_class(&self, name: &str) -> Option<ClassRef> {
        self.bridge_loader.load_class(name)
    }

    fn server(&self) -> ObjectRef {
        self.server.clone()
    }

    fn own_plugin(&self) -> ObjectRef {
        Arc::clone(&self.own_plugin)
    }
}

//! A fake claim plugin whose API shape is chosen per fork profile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::fake::{bool_arg, str_arg, FakeClass, FakeLoader};
use crate::capability::ContainsShape;
use crate::claim::ClaimCorners;
use crate::host::{
    ClassLoader, ClassRef, EnumConstant, FieldSig, HostError, HostObject, Location, LoaderRef,
    MethodSig, ObjectRef, ParamKind, Value,
};
use crate::locator::ClaimAtShape;
use crate::trust::TrustLevel;

/// A zero-argument accessor exposed either as a method or as a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Method(&'static str),
    Field(&'static str),
}

impl Member {
    pub fn name(&self) -> &'static str {
        match self {
            Member::Method(n) | Member::Field(n) => n,
        }
    }
}

/// How a collection comes back from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    List,
    Array,
    Map,
}

/// Where the store's main instance can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceExposure {
    PublicStatic,
    DeclaredStatic,
    PluginOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustShape {
    Direct,
    Collection,
    Permission,
    Unsupported,
}

/// The API surface of one fork of the claim plugin.
#[derive(Debug, Clone)]
pub struct ForkProfile {
    pub store_class: &'static str,
    pub claim_class: &'static str,
    /// The bridge's own loader can see the plugin's classes.
    pub visible_to_bridge: bool,
    pub instance: InstanceExposure,
    pub claim_at: Option<ClaimAtShape>,
    /// Further `getClaimAt` overloads exposed next to `claim_at`.
    pub claim_at_overloads: &'static [ClaimAtShape],
    pub claims: Member,
    pub claims_shape: Shape,
    pub id: Member,
    pub owner: Member,
    pub lesser: Member,
    pub greater: Member,
    pub parent: Member,
    /// Top-level claims report themselves as parent.
    pub parent_is_self: bool,
    pub children: Member,
    pub children_shape: Shape,
    pub heights: Option<(&'static str, &'static str)>,
    pub explicit_3d: Option<&'static str>,
    pub contains: Option<ContainsShape>,
    pub trust: TrustShape,
    /// Constants defined on the permission enum.
    pub permission_constants: &'static [&'static str],
}

impl ForkProfile {
    /// The long-standing upstream shape.
    pub fn legacy() -> Self {
        Self {
            store_class: "me.ryanhamshire.GriefPrevention.GriefPrevention",
            claim_class: "me.ryanhamshire.GriefPrevention.Claim",
            visible_to_bridge: true,
            instance: InstanceExposure::PublicStatic,
            claim_at: Some(ClaimAtShape::Basic),
            claim_at_overloads: &[],
            claims: Member::Method("getClaims"),
            claims_shape: Shape::List,
            id: Member::Method("getID"),
            owner: Member::Method("getOwnerID"),
            lesser: Member::Method("getLesserBoundaryCorner"),
            greater: Member::Method("getGreaterBoundaryCorner"),
            parent: Member::Field("parent"),
            parent_is_self: false,
            children: Member::Field("children"),
            children_shape: Shape::List,
            heights: None,
            explicit_3d: None,
            contains: Some(ContainsShape::HeightOnly),
            trust: TrustShape::Direct,
            permission_constants: &["Build", "Inventory", "Access", "Manage"],
        }
    }

    /// Lower-case package, hidden instance, permission enum for trust.
    pub fn modern() -> Self {
        Self {
            store_class: "me.ryanhamshire.griefprevention.GriefPrevention",
            claim_class: "me.ryanhamshire.griefprevention.Claim",
            visible_to_bridge: false,
            instance: InstanceExposure::DeclaredStatic,
            claim_at: Some(ClaimAtShape::WithPlayer(ParamKind::PlayerData)),
            claims: Member::Method("getAllClaims"),
            claims_shape: Shape::Array,
            id: Member::Method("getId"),
            owner: Member::Method("getOwnerId"),
            parent: Member::Method("getParent"),
            children: Member::Method("getChildren"),
            contains: Some(ContainsShape::WithSubdivisionFlag),
            trust: TrustShape::Permission,
            ..Self::legacy()
        }
    }

    /// Vertically bounded claims, unbounded nesting, claim class outside the
    /// usual names.
    pub fn three_d() -> Self {
        Self {
            store_class: "me.ryanhamshire.GriefPrevention.GriefPrevention",
            claim_class: "me.ryanhamshire.GriefPrevention.claims.VolumeClaim",
            visible_to_bridge: false,
            instance: InstanceExposure::PluginOnly,
            claim_at: Some(ClaimAtShape::WithSubclaimCache),
            claims: Member::Field("claims"),
            claims_shape: Shape::Map,
            id: Member::Field("id"),
            owner: Member::Field("ownerID"),
            parent: Member::Method("getParent"),
            parent_is_self: true,
            children: Member::Method("getSubclaims"),
            children_shape: Shape::Array,
            heights: Some(("getMinY", "getMaxY")),
            contains: Some(ContainsShape::WithSubdivisionFlag),
            trust: TrustShape::Collection,
            ..Self::legacy()
        }
    }

    /// No native lookup, no predicate, no trust mutation.
    pub fn bare() -> Self {
        Self {
            claim_at: None,
            children: Member::Method("getSubdivisions"),
            contains: None,
            trust: TrustShape::Unsupported,
            ..Self::legacy()
        }
    }

    fn package(&self) -> &'static str {
        match self.claim_class.rfind('.') {
            Some(idx) => &self.claim_class[..idx],
            None => "",
        }
    }

    pub fn permission_enum(&self) -> String {
        format!("{}.ClaimPermission", self.package())
    }
}

fn member_sig(member: Member) -> (Option<MethodSig>, Option<FieldSig>) {
    match member {
        Member::Method(name) => (Some(MethodSig::public(name, &[])), None),
        Member::Field(name) => (None, Some(FieldSig::public(name))),
    }
}

fn claim_class(profile: &ForkProfile, loader: &LoaderRef) -> ClassRef {
    let mut class = FakeClass::new(profile.claim_class).loaded_by(loader);
    for member in [
        profile.id,
        profile.owner,
        profile.lesser,
        profile.greater,
        profile.parent,
        profile.children,
    ] {
        let (method, field) = member_sig(member);
        if let Some(method) = method {
            class = class.method(method);
        }
        if let Some(field) = field {
            class = class.field(field);
        }
    }
    if let Some((lo, hi)) = profile.heights {
        class = class
            .method(MethodSig::public(lo, &[]))
            .method(MethodSig::public(hi, &[]));
    }
    if let Some(name) = profile.explicit_3d {
        class = class.method(MethodSig::public(name, &[]));
    }
    match profile.contains {
        Some(ContainsShape::HeightOnly) => {
            class = class.method(MethodSig::public(
                "contains",
                &[ParamKind::Location, ParamKind::Bool],
            ));
        }
        Some(ContainsShape::WithSubdivisionFlag) => {
            class = class.method(MethodSig::public(
                "contains",
                &[ParamKind::Location, ParamKind::Bool, ParamKind::Bool],
            ));
        }
        None => {}
    }
    for level in TrustLevel::ALL {
        let names = level.names();
        match profile.trust {
            TrustShape::Direct => {
                class = class
                    .method(MethodSig::public(names.add[0], &[ParamKind::Str]))
                    .method(MethodSig::public(names.remove[0], &[ParamKind::Str]));
            }
            TrustShape::Collection => {
                class = class
                    .method(MethodSig::public(names.getters[0], &[]))
                    .method(MethodSig::public(names.setters[0], &[ParamKind::Collection]));
            }
            TrustShape::Permission | TrustShape::Unsupported => {}
        }
    }
    if profile.trust == TrustShape::Permission {
        class = class
            .method(MethodSig::public(
                "setPermission",
                &[ParamKind::Str, ParamKind::Enum],
            ))
            .method(MethodSig::public("dropPermission", &[ParamKind::Str]));
    }
    class.build()
}

/// Declarative claim tree used to populate the fake store.
#[derive(Debug, Clone)]
pub struct ClaimSpec {
    pub id: i64,
    pub owner: Option<String>,
    pub world: String,
    pub lesser: (i64, i64, i64),
    pub greater: (i64, i64, i64),
    pub children: Vec<ClaimSpec>,
}

impl ClaimSpec {
    pub fn new(id: i64, lesser: (i64, i64, i64), greater: (i64, i64, i64)) -> Self {
        Self {
            id,
            owner: Some(format!("owner-{id}")),
            world: "world".to_string(),
            lesser,
            greater,
            children: Vec::new(),
        }
    }

    /// Full-height column over the default world.
    pub fn column(id: i64, x1: i64, z1: i64, x2: i64, z2: i64) -> Self {
        Self::new(id, (x1, -64, z1), (x2, 320, z2))
    }

    pub fn admin(mut self) -> Self {
        self.owner = None;
        self
    }

    pub fn in_world(mut self, world: &str) -> Self {
        self.world = world.to_string();
        self
    }

    pub fn child(mut self, child: ClaimSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A live claim object.
pub struct FakeClaim {
    class: ClassRef,
    profile: Arc<ForkProfile>,
    permission_loader: String,
    me: Weak<FakeClaim>,
    parent: Option<Weak<FakeClaim>>,
    pub id: i64,
    owner: Option<String>,
    world: String,
    corners: ClaimCorners,
    children: Mutex<Vec<Arc<FakeClaim>>>,
    trust: Mutex<HashMap<TrustLevel, Vec<String>>>,
}

impl FakeClaim {
    fn build(
        spec: &ClaimSpec,
        parent: Option<&Arc<FakeClaim>>,
        class: &ClassRef,
        profile: &Arc<ForkProfile>,
        permission_loader: &str,
    ) -> Arc<FakeClaim> {
        let claim = Arc::new_cyclic(|me| FakeClaim {
            class: Arc::clone(class),
            profile: Arc::clone(profile),
            permission_loader: permission_loader.to_string(),
            me: me.clone(),
            parent: parent.map(Arc::downgrade),
            id: spec.id,
            owner: spec.owner.clone(),
            world: spec.world.clone(),
            corners: ClaimCorners::new(spec.lesser, spec.greater),
            children: Mutex::new(Vec::new()),
            trust: Mutex::new(HashMap::new()),
        });
        let children: Vec<Arc<FakeClaim>> = spec
            .children
            .iter()
            .map(|child| FakeClaim::build(child, Some(&claim), class, profile, permission_loader))
            .collect();
        *claim.children.lock().unwrap_or_else(PoisonError::into_inner) = children;
        claim
    }

    fn object(claim: &Arc<FakeClaim>) -> Value {
        let object: ObjectRef = claim.clone();
        Value::Object(object)
    }

    fn corner(&self, greater: bool) -> Value {
        let c = &self.corners;
        let (x, y, z) = if greater {
            (c.max_x, c.max_y, c.max_z)
        } else {
            (c.min_x, c.min_y, c.min_z)
        };
        Value::Location(Location::new(self.world.as_str(), x as f64, y as f64, z as f64))
    }

    fn children_value(&self) -> Value {
        let items: Vec<Value> = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(FakeClaim::object)
            .collect();
        shaped(items, self.profile.children_shape)
    }

    fn parent_value(&self) -> Value {
        match self.parent.as_ref().and_then(Weak::upgrade) {
            Some(parent) => FakeClaim::object(&parent),
            None if self.profile.parent_is_self => {
                self.me.upgrade().map_or(Value::Null, |me| FakeClaim::object(&me))
            }
            None => Value::Null,
        }
    }

    fn member_value(&self, name: &str) -> Option<Value> {
        let p = &self.profile;
        if p.id.name() == name {
            return Some(Value::Int(self.id));
        }
        if p.owner.name() == name {
            return Some(self.owner.clone().map_or(Value::Null, Value::Str));
        }
        if p.lesser.name() == name {
            return Some(self.corner(false));
        }
        if p.greater.name() == name {
            return Some(self.corner(true));
        }
        if p.parent.name() == name {
            return Some(self.parent_value());
        }
        if p.children.name() == name {
            return Some(self.children_value());
        }
        None
    }

    /// Point test used by the contains predicate and by native lookup.
    pub fn holds(&self, loc: &Location, ignore_height: bool) -> bool {
        if loc.world != self.world {
            return false;
        }
        if ignore_height {
            self.corners.contains_footprint(loc.block_x(), loc.block_z())
        } else {
            self.corners
                .contains(loc.block_x(), loc.block_y(), loc.block_z())
        }
    }

    pub fn children(&self) -> Vec<Arc<FakeClaim>> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach an existing claim as an extra child. Lets tests build shapes
    /// the store itself never produces, such as a hierarchy with a loop.
    pub fn adopt(&self, child: &Arc<FakeClaim>) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(child));
    }

    /// Current members of a trust level.
    pub fn trusted(&self, level: TrustLevel) -> Vec<String> {
        self.trust
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&level)
            .cloned()
            .unwrap_or_default()
    }

    fn add_trust(&self, level: TrustLevel, target: String) {
        let mut trust = self.trust.lock().unwrap_or_else(PoisonError::into_inner);
        let members = trust.entry(level).or_default();
        if !members.contains(&target) {
            members.push(target);
        }
    }

    fn remove_trust(&self, level: TrustLevel, target: &str) {
        let mut trust = self.trust.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(members) = trust.get_mut(&level) {
            members.retain(|m| m != target);
        }
    }

    fn trust_call(&self, method: &str, args: &[Value]) -> Option<Result<Value, HostError>> {
        let class = self.class.name();
        for level in TrustLevel::ALL {
            let names = level.names();
            let result = if names.add.contains(&method) {
                str_arg(args, 0, class, method).map(|t| self.add_trust(level, t))
            } else if names.remove.contains(&method) {
                str_arg(args, 0, class, method).map(|t| self.remove_trust(level, &t))
            } else if names.getters.contains(&method) {
                let members = self.trusted(level).into_iter().map(Value::Str).collect();
                return Some(Ok(Value::List(members)));
            } else if names.setters.contains(&method) {
                let members = args.first().cloned().and_then(Value::into_sequence);
                let Some(members) = members else {
                    return Some(Err(HostError::IllegalArgument(format!(
                        "{class}.{method}: expected a collection"
                    ))));
                };
                let members = members.iter().filter_map(Value::to_identity_string).collect();
                self.trust
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(level, members);
                Ok(())
            } else {
                continue;
            };
            return Some(result.map(|()| Value::Null));
        }
        match method {
            "setPermission" => Some(self.set_permission(args)),
            "dropPermission" => Some(str_arg(args, 0, class, method).map(|target| {
                for level in TrustLevel::ALL {
                    self.remove_trust(level, &target);
                }
                Value::Null
            })),
            _ => None,
        }
    }

    fn set_permission(&self, args: &[Value]) -> Result<Value, HostError> {
        let class = self.class.name();
        let target = str_arg(args, 0, class, "setPermission")?;
        let Some(Value::Enum(constant)) = args.get(1) else {
            return Err(HostError::IllegalArgument("setPermission: expected enum".to_string()));
        };
        let defined_by = constant.class.loader().map(|l| l.id().to_string());
        if defined_by.as_deref() != Some(self.permission_loader.as_str()) {
            return Err(HostError::IllegalArgument(format!(
                "{constant:?} is not assignable to this claim's ClaimPermission"
            )));
        }
        let level = TrustLevel::ALL
            .into_iter()
            .find(|level| level.names().permission == constant.name)
            .ok_or_else(|| HostError::IllegalArgument(format!("unknown permission {constant:?}")))?;
        self.add_trust(level, target);
        Ok(Value::Null)
    }
}

impl HostObject for FakeClaim {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        let class = self.class.name();
        if !self.class.has_method(method) {
            return Err(HostError::no_such_method(class, method));
        }
        if let Some(value) = self.member_value(method) {
            return Ok(value);
        }
        if let Some((lo, hi)) = self.profile.heights {
            if method == lo {
                return Ok(Value::Int(self.corners.min_y));
            }
            if method == hi {
                return Ok(Value::Int(self.corners.max_y));
            }
        }
        if Some(method) == self.profile.explicit_3d {
            return Ok(Value::Bool(self.corners.vertical_extent() < 380));
        }
        if method == "contains" {
            let Some(Value::Location(loc)) = args.first() else {
                return Err(HostError::IllegalArgument("contains: expected location".into()));
            };
            let ignore_height = bool_arg(args, 1, class, method)?;
            return Ok(Value::Bool(self.holds(loc, ignore_height)));
        }
        self.trust_call(method, args)
            .unwrap_or_else(|| Err(HostError::no_such_method(class, method)))
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        if self.class.find_field(field).is_none() {
            return Err(HostError::no_such_field(self.class.name(), field));
        }
        self.member_value(field)
            .ok_or_else(|| HostError::no_such_field(self.class.name(), field))
    }
}

fn shaped(items: Vec<Value>, shape: Shape) -> Value {
    match shape {
        Shape::List => Value::List(items),
        Shape::Array => Value::Array(items),
        Shape::Map => Value::Map(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v))
                .collect(),
        ),
    }
}

/// The store's data store: owns top-level claims and answers lookups.
pub struct FakeDataStore {
    class: ClassRef,
    claim_class: ClassRef,
    profile: Arc<ForkProfile>,
    permission_loader: String,
    claims: Mutex<Vec<Arc<FakeClaim>>>,
    claims_reads: AtomicUsize,
    native_calls: AtomicUsize,
    native_arities: Mutex<Vec<usize>>,
}

impl FakeDataStore {
    pub fn add(&self, spec: &ClaimSpec) -> Arc<FakeClaim> {
        let claim = FakeClaim::build(
            spec,
            None,
            &self.claim_class,
            &self.profile,
            &self.permission_loader,
        );
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&claim));
        claim
    }

    pub fn top_level(&self) -> Vec<Arc<FakeClaim>> {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Depth-first search over every claim, for test assertions.
    pub fn find(&self, id: i64) -> Option<Arc<FakeClaim>> {
        let mut stack = self.top_level();
        while let Some(claim) = stack.pop() {
            if claim.id == id {
                return Some(claim);
            }
            stack.extend(claim.children());
        }
        None
    }

    /// Argument count of every native lookup, in call order.
    pub fn native_arities(&self) -> Vec<usize> {
        self.native_arities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn native_calls(&self) -> usize {
        self.native_calls.load(Ordering::SeqCst)
    }

    pub fn claims_reads(&self) -> usize {
        self.claims_reads.load(Ordering::SeqCst)
    }

    fn claims_value(&self) -> Value {
        self.claims_reads.fetch_add(1, Ordering::SeqCst);
        let items = self.top_level().iter().map(FakeClaim::object).collect();
        shaped(items, self.profile.claims_shape)
    }

    fn claim_at(&self, args: &[Value]) -> Result<Value, HostError> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        self.native_arities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.len());
        let class = self.class.name();
        let Some(Value::Location(loc)) = args.first() else {
            return Err(HostError::IllegalArgument("getClaimAt: expected location".into()));
        };
        let ignore_height = bool_arg(args, 1, class, "getClaimAt")?;
        // Lookups descend into subdivisions unless told to ignore them.
        let descend = match args.len() {
            4 => !bool_arg(args, 2, class, "getClaimAt")?,
            _ => true,
        };
        let Some(mut found) = self
            .top_level()
            .into_iter()
            .find(|claim| claim.holds(loc, ignore_height))
        else {
            return Ok(Value::Null);
        };
        while descend {
            match found
                .children()
                .into_iter()
                .find(|child| child.holds(loc, ignore_height))
            {
                Some(child) => found = child,
                None => break,
            }
        }
        Ok(FakeClaim::object(&found))
    }
}

impl HostObject for FakeDataStore {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
        if !self.class.has_method(method) {
            return Err(HostError::no_such_method(self.class.name(), method));
        }
        if method == "getClaimAt" {
            return self.claim_at(args);
        }
        if matches!(self.profile.claims, Member::Method(name) if name == method) {
            return Ok(self.claims_value());
        }
        Err(HostError::no_such_method(self.class.name(), method))
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        if matches!(self.profile.claims, Member::Field(name) if name == field) {
            return Ok(self.claims_value());
        }
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// The plugin's main object; carries the data store.
pub struct FakeStorePlugin {
    class: ClassRef,
    data_store: Arc<FakeDataStore>,
}

impl HostObject for FakeStorePlugin {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::no_such_method(self.class.name(), method))
    }

    fn get(&self, field: &str) -> Result<Value, HostError> {
        if field == "dataStore" {
            let store: ObjectRef = self.data_store.clone();
            return Ok(Value::Object(store));
        }
        Err(HostError::no_such_field(self.class.name(), field))
    }
}

/// Everything the fake plugin defines, wired to its loaders.
pub struct FakeStore {
    pub profile: Arc<ForkProfile>,
    pub plugin: Arc<FakeStorePlugin>,
    pub data_store: Arc<FakeDataStore>,
}

impl FakeStore {
    pub fn install(profile: ForkProfile, plugin_loader: &Arc<FakeLoader>, bridge_loader: &Arc<FakeLoader>) -> Self {
        let profile = Arc::new(profile);
        let loader: LoaderRef = plugin_loader.clone();

        let claim_class = claim_class(&profile, &loader);
        let permission_enum = FakeClass::new(profile.permission_enum())
            .loaded_by(&loader)
            .build();
        for name in profile.permission_constants {
            let class: ClassRef = permission_enum.clone();
            let constant = EnumConstant {
                class,
                name: name.to_string(),
            };
            permission_enum.set_static(name, Value::Enum(constant));
        }

        let mut data_class = FakeClass::new(format!("{}.DataStore", profile.package())).loaded_by(&loader);
        match profile.claims {
            Member::Method(name) => data_class = data_class.method(MethodSig::public(name, &[])),
            Member::Field(name) => data_class = data_class.field(FieldSig::public(name)),
        }
        for shape in profile.claim_at.iter().chain(profile.claim_at_overloads) {
            data_class = data_class.method(MethodSig::public("getClaimAt", &shape.params()));
        }
        let data_store = Arc::new(FakeDataStore {
            class: data_class.build(),
            claim_class: claim_class.clone(),
            profile: Arc::clone(&profile),
            permission_loader: plugin_loader.id().to_string(),
            claims: Mutex::new(Vec::new()),
            claims_reads: AtomicUsize::new(0),
            native_calls: AtomicUsize::new(0),
            native_arities: Mutex::new(Vec::new()),
        });

        let store_class = FakeClass::new(profile.store_class)
            .loaded_by(&loader)
            .field(FieldSig::public("dataStore"));
        let store_class = match profile.instance {
            InstanceExposure::PublicStatic => store_class.field(FieldSig::public("instance").with_static()),
            InstanceExposure::DeclaredStatic => store_class.field(FieldSig::declared("instance").with_static()),
            InstanceExposure::PluginOnly => store_class,
        }
        .build();
        let plugin = Arc::new(FakeStorePlugin {
            class: store_class.clone(),
            data_store: Arc::clone(&data_store),
        });
        if profile.instance != InstanceExposure::PluginOnly {
            let instance: ObjectRef = plugin.clone();
            store_class.set_static("instance", Value::Object(instance));
        }

        let store_class: ClassRef = store_class;
        let permission_enum: ClassRef = permission_enum;
        for class in [&store_class, &claim_class, &permission_enum] {
            plugin_loader.define(Arc::clone(class));
            if profile.visible_to_bridge {
                bridge_loader.define(Arc::clone(class));
            }
        }
        // Outside the plugin, the enum name resolves to an unrelated copy.
        if !profile.visible_to_bridge {
            let bridge: LoaderRef = bridge_loader.clone();
            bridge_loader.define(FakeClass::new(profile.permission_enum()).loaded_by(&bridge).build());
        }

        Self {
            profile,
            plugin,
            data_store,
        }
    }
}

//! Generic building blocks for fake host classes and loaders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::host::{
    ClassLoader, ClassRef, FieldSig, HostClass, HostError, LoaderRef, MethodSig, Value,
};

/// A class with a fixed member list and optional static fields.
pub struct FakeClass {
    name: String,
    loader: Option<LoaderRef>,
    methods: Vec<MethodSig>,
    fields: Vec<FieldSig>,
    statics: Mutex<HashMap<String, Value>>,
}

impl FakeClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loader: None,
            methods: Vec::new(),
            fields: Vec::new(),
            statics: Mutex::new(HashMap::new()),
        }
    }

    pub fn loaded_by(mut self, loader: &LoaderRef) -> Self {
        self.loader = Some(Arc::clone(loader));
        self
    }

    pub fn method(mut self, sig: MethodSig) -> Self {
        self.methods.push(sig);
        self
    }

    pub fn methods(mut self, sigs: impl IntoIterator<Item = MethodSig>) -> Self {
        self.methods.extend(sigs);
        self
    }

    pub fn field(mut self, sig: FieldSig) -> Self {
        self.fields.push(sig);
        self
    }

    pub fn set_static(&self, field: &str, value: Value) {
        self.statics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field.to_string(), value);
    }

    pub fn build(self) -> Arc<FakeClass> {
        Arc::new(self)
    }
}

impl HostClass for FakeClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn loader(&self) -> Option<LoaderRef> {
        self.loader.clone()
    }

    fn methods(&self) -> &[MethodSig] {
        &self.methods
    }

    fn fields(&self) -> &[FieldSig] {
        &self.fields
    }

    fn call_static(&self, method: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::no_such_method(&self.name, method))
    }

    fn get_static(&self, field: &str) -> Result<Value, HostError> {
        self.statics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field)
            .cloned()
            .ok_or_else(|| HostError::no_such_field(&self.name, field))
    }
}

/// A loader over a mutable class table that counts lookups.
pub struct FakeLoader {
    id: String,
    classes: Mutex<HashMap<String, ClassRef>>,
    lookups: AtomicUsize,
}

impl FakeLoader {
    pub fn new(id: &str) -> Arc<FakeLoader> {
        Arc::new(Self {
            id: id.to_string(),
            classes: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn define(&self, class: ClassRef) {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.name().to_string(), class);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ClassLoader for FakeLoader {
    fn id(&self) -> &str {
        &self.id
    }

    fn load_class(&self, name: &str) -> Option<ClassRef> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Argument helpers for fake method bodies.
pub fn arg<'a>(args: &'a [Value], idx: usize, class: &str, method: &str) -> Result<&'a Value, HostError> {
    args.get(idx).ok_or_else(|| {
        HostError::IllegalArgument(format!("{class}.{method}: missing argument {idx}"))
    })
}

pub fn str_arg(args: &[Value], idx: usize, class: &str, method: &str) -> Result<String, HostError> {
    arg(args, idx, class, method)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| HostError::IllegalArgument(format!("{class}.{method}: argument {idx} is not a string")))
}

pub fn bool_arg(args: &[Value], idx: usize, class: &str, method: &str) -> Result<bool, HostError> {
    arg(args, idx, class, method)?
        .as_bool()
        .ok_or_else(|| HostError::IllegalArgument(format!("{class}.{method}: argument {idx} is not a bool")))
}

pub fn int_arg(args: &[Value], idx: usize, class: &str, method: &str) -> Result<i64, HostError> {
    arg(args, idx, class, method)?
        .as_int()
        .ok_or_else(|| HostError::IllegalArgument(format!("{class}.{method}: argument {idx} is not an int")))
}

use std::fmt;
use std::sync::Arc;

use super::value::Value;

pub type ObjectRef = Arc<dyn HostObject>;
pub type ClassRef = Arc<dyn HostClass>;
pub type LoaderRef = Arc<dyn ClassLoader>;

/// Coarse parameter types used to match host method signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Bool,
    Int,
    Str,
    Location,
    World,
    Player,
    PlayerData,
    Claim,
    Enum,
    Plugin,
    Callback,
    Collection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<ParamKind>,
    pub is_static: bool,
    pub is_public: bool,
}

impl MethodSig {
    pub fn public(name: &str, params: &[ParamKind]) -> Self {
        Self {
            name: name.to_string(),
            params: params.to_vec(),
            is_static: false,
            is_public: true,
        }
    }

    pub fn public_static(name: &str, params: &[ParamKind]) -> Self {
        Self {
            is_static: true,
            ..Self::public(name, params)
        }
    }

    pub fn matches(&self, name: &str, params: &[ParamKind]) -> bool {
        self.name == name && self.params == params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSig {
    pub name: String,
    pub is_static: bool,
    pub is_public: bool,
}

impl FieldSig {
    pub fn public(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_static: false,
            is_public: true,
        }
    }

    pub fn declared(name: &str) -> Self {
        Self {
            is_public: false,
            ..Self::public(name)
        }
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// A type descriptor exported by the host runtime.
pub trait HostClass: Send + Sync {
    fn name(&self) -> &str;

    /// The loader that defined this class, if the host exposes it.
    fn loader(&self) -> Option<LoaderRef>;

    fn methods(&self) -> &[MethodSig];

    fn fields(&self) -> &[FieldSig];

    fn call_static(&self, method: &str, args: &[Value]) -> Result<Value, HostError>;

    /// Read a static field. Non-public fields are readable, mirroring an
    /// accessibility override on the host side.
    fn get_static(&self, field: &str) -> Result<Value, HostError>;

    fn has_method(&self, name: &str) -> bool {
        self.methods().iter().any(|m| m.name == name)
    }

    fn find_method(&self, name: &str, params: &[ParamKind]) -> Option<&MethodSig> {
        self.methods().iter().find(|m| m.matches(name, params))
    }

    fn find_field(&self, name: &str) -> Option<&FieldSig> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Package portion of the fully-qualified class name.
    fn package(&self) -> &str {
        match self.name().rfind('.') {
            Some(idx) => &self.name()[..idx],
            None => "",
        }
    }
}

/// An instance owned by the host runtime.
pub trait HostObject: Send + Sync {
    fn class(&self) -> ClassRef;

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError>;

    /// Read an instance field, public or declared.
    fn get(&self, field: &str) -> Result<Value, HostError>;
}

pub trait ClassLoader: Send + Sync {
    fn id(&self) -> &str;

    fn load_class(&self, name: &str) -> Option<ClassRef>;
}

/// Identity comparison for host objects (data pointer, ignoring vtables).
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    object_key(a) == object_key(b)
}

/// Identity key of a host object. Only meaningful while the object is alive:
/// a freed allocation may be handed to another object. Hosts that wrap the
/// same foreign object anew on every read yield a different key each time.
pub fn object_key(o: &ObjectRef) -> usize {
    Arc::as_ptr(o) as *const () as usize
}

/// Failures reported by the host boundary.
///
/// From the bridge's point of view every variant is a capability miss: the
/// caller moves on to the next candidate shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    NoSuchMethod { class: String, method: String },
    NoSuchField { class: String, field: String },
    IllegalArgument(String),
    /// The host-side body ran and failed.
    Invocation(String),
}

impl HostError {
    pub fn no_such_method(class: &str, method: &str) -> Self {
        HostError::NoSuchMethod {
            class: class.to_string(),
            method: method.to_string(),
        }
    }

    pub fn no_such_field(class: &str, field: &str) -> Self {
        HostError::NoSuchField {
            class: class.to_string(),
            field: field.to_string(),
        }
    }

    pub fn is_missing_member(&self) -> bool {
        matches!(
            self,
            HostError::NoSuchMethod { .. } | HostError::NoSuchField { .. }
        )
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::NoSuchMethod { class, method } => {
                write!(f, "no method {method} on {class}")
            }
            HostError::NoSuchField { class, field } => write!(f, "no field {field} on {class}"),
            HostError::IllegalArgument(msg) => write!(f, "illegal argument: {msg}"),
            HostError::Invocation(msg) => write!(f, "host invocation failed: {msg}"),
        }
    }
}

impl std::error::Error for HostError {}

//! The host boundary: everything this crate knows about the game server and
//! the external claim plugin arrives through these types.

mod object;
mod runtime;
mod value;

pub use object::{
    object_key, same_object, ClassLoader, ClassRef, FieldSig, HostClass, HostError, HostObject,
    LoaderRef, MethodSig, ObjectRef, ParamKind,
};
pub use runtime::{HostRuntime, PluginHandle};
pub use value::{Callback, EnumConstant, Location, Value};

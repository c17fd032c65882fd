use super::object::{ClassRef, LoaderRef, ObjectRef};
use super::value::Value;
use crate::config::WORLD_LOOKUP_METHOD;

/// A plugin registered with the host server.
#[derive(Clone)]
pub struct PluginHandle {
    pub name: String,
    pub enabled: bool,
    /// The running plugin instance (the host's main plugin object).
    pub instance: ObjectRef,
    /// The loader that defined the plugin's own classes.
    pub loader: LoaderRef,
}

/// Entry point to the host server as seen from this bridge.
pub trait HostRuntime: Send + Sync {
    /// Look up a loaded plugin by name.
    fn plugin(&self, name: &str) -> Option<PluginHandle>;

    /// Load a class through the bridge's own loader. Classes that live only in
    /// another plugin's loader are usually invisible here.
    fn load_class(&self, name: &str) -> Option<ClassRef>;

    /// The host server object.
    fn server(&self) -> ObjectRef;

    /// The plugin instance that owns tasks scheduled by this bridge.
    fn own_plugin(&self) -> ObjectRef;

    /// A loaded world by name.
    fn world(&self, name: &str) -> Option<ObjectRef> {
        self.server()
            .call(WORLD_LOOKUP_METHOD, &[Value::str(name)])
            .ok()?
            .into_object()
    }
}

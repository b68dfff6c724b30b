pub mod capability;
pub mod config;
pub mod poll;
pub mod registry;
pub mod types;

pub use capability::{classify, Capability, EffectClass, CAPABILITY_REGISTRY_VERSION};
pub use registry::{FunctionCallRegistry, RegistryError};
pub use types::{Arguments, CallId, CallStatus, FunctionCall, Message, Role};

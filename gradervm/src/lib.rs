pub mod contract;
pub mod loader;
pub mod runtime;
pub mod value;

#[cfg(test)]
mod testing;

pub use contract::{instantiate, Contract, InstantiationError};
pub use loader::{
    registry::{ClassRegistry, RegistryError},
    resolver::{BootstrapResolver, ClassResolver, ResolutionStep},
    ClassNotFound, LoadError,
};
pub use runtime::{
    class::{LoadedType, LoaderId},
    instance::{Instance, InvocationError, MethodHandle},
    ErrorKind, ExecutionError,
};
pub use value::Value;

mod command;
mod container;
mod registry;
pub mod traits;

pub use command::CommandResult;
pub use container::{
    ContainerRecord, ContainerState, InspectRecord, ServiceAddressSet, StateKind,
};
pub use registry::{HealthInstance, RegistryCheck, RegistryKeyValue};
pub use traits::{ComposeRuntime, ServiceRegistry};

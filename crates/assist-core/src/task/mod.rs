//! Task descriptors, their JSON definitions, and the descriptor store.

pub mod definition;
pub mod descriptor;
pub mod store;

pub use definition::{OneOrMany, TaskDefinition};
pub use descriptor::{Action, TaskDescriptor, UnknownAction};
pub use store::TaskStore;

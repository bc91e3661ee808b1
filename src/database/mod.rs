pub mod models;
pub mod once_map;
pub mod registry;
pub mod schema;

pub use registry::{ConnectionRegistry, RegistryError};

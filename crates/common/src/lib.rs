pub mod error;
pub mod types;

pub use error::{MeshError, MeshResult};
pub use types::{EntityType, ServiceInfo};

pub mod constants;
pub mod error;
pub mod events;
pub mod types;

pub use error::{MeshError, MeshResult};
pub use events::MeshEvent;
pub use types::*;

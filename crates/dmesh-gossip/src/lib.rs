pub mod config;
pub mod message;
pub mod service;

pub use config::GossipConfig;
pub use message::GossipMessage;
pub use service::{known_versions, GossipService};

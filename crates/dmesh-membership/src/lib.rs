pub mod config;
pub mod heartbeat;
pub mod peer_table;
pub mod sweeper;

pub use config::MembershipConfig;
pub use heartbeat::spawn_heartbeat_ticker;
pub use peer_table::PeerTable;
pub use sweeper::spawn_sweeper;

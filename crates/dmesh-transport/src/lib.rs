pub mod auth;
pub mod client;
pub mod envelope;
pub mod handler;
pub mod server;
pub mod types;

pub use client::MeshClient;
pub use handler::MeshHandler;
pub use server::{build_router, serve};

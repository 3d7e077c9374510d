pub mod analyzer;
pub mod decomposer;
pub mod router;

pub use analyzer::TaskAnalyzer;
pub use decomposer::TaskDecomposer;
pub use router::{DelegateeRouter, RoutingDecision};

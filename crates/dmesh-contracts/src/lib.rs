pub mod persistence;
pub mod store;

pub use persistence::{load_contracts, save_contracts};
pub use store::ContractStore;

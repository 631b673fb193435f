pub mod migrate;
pub mod resolve;

//! Data layer
//!
//! - `register` - Inventory register backing identifier exchange
//! - `store` - In-memory segment storage
//! - `topics` - In-process topics feeding the downstream pipelines

pub mod register;
pub mod store;
pub mod topics;

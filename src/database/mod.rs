pub mod repo;
pub mod schema;

pub use repo::{RawMessageRecord, Warehouse};

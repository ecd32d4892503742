pub mod batch;

pub use batch::{BatchRepository, InMemoryBatchRepository};

pub mod batch;

pub use batch::{Batch, Category, FreshnessStatus, NewBatch, StorageClass, WriteOffReason};

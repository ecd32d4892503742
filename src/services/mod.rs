// Classification
pub mod freshness;
pub mod urgency;

// Estimation
pub mod spoilage;

// Ordering and allocation
pub mod fifo_ordering;
pub mod picking;

// Reporting
pub mod compliance;
pub mod dashboard;

// Scheduled work
pub mod freshness_sweep;

// Orchestration
pub mod inventory;

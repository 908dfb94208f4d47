//! Long-lived background workers (one per subject consumer / projection).

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};

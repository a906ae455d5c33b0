//! Queue module: the asynchronous audit queue and its retry policy.

mod audit_queue;
mod retry;

pub use audit_queue::AsynchronousAuditQueue;
pub use retry::RetryPolicy;

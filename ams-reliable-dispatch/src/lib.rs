mod ack_id;
pub use ack_id::AckId;
mod ack_deadline;
mod ack_deadline_test;
pub use ack_deadline::{AckDeadlineManager, ExpiredLease, SweepExpired};
mod offset_tracker;
pub use offset_tracker::{OffsetTracker, Offsets, SeekOutcome};
mod dispatch;
pub use dispatch::DeliveryScheduler;
mod retention;
pub use retention::{RetentionEnforcer, RetentionReport};
mod subscription;
pub use subscription::{DeliveryMode, SubMetrics, Subscription, SubscriptionOptions};
mod topic;
pub use topic::{Topic, TopicOptions};
mod engine;
pub use engine::{AckReport, DispatchEngine, SeekTarget};

pub mod config;
pub mod error_message;
mod errors;
pub use errors::{DispatchError, Result};

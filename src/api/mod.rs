pub mod client;
pub mod logs;
pub mod models;
pub mod resource_id;
pub mod retry;

pub use client::{ArmClient, MANAGEMENT_ENDPOINT};
pub use logs::{LogsQueryClient, LogsQueryOptions, LogsQueryResult, LogsQueryTarget, LogsTable};
pub use models::{LocationRecord, ResourceGroupData, ResourceGroupResource, SubscriptionRecord, WaitUntil};
pub use resource_id::{ResourceIdentifier, SUBSCRIPTION_PREFIX};
pub use retry::{RetryConfig, RetryPolicy};

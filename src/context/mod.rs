//! Per-invocation context: environment defaults, subscription, resource group, tags, location

pub mod env;
pub mod location;
pub mod resource_group;
pub mod subscription;
pub mod tags;

pub use env::EnvDefaults;
pub use location::{Location, require_location};
pub use resource_group::require_resource_group;
pub use subscription::{
    SubscriptionContext, SubscriptionReference, SubscriptionSource, require_subscription_id,
    resolve_subscription,
};
pub use tags::{Tag, TagParseError, append_tags_to, tags_to_map};

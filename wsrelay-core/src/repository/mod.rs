pub mod store;
pub mod subscription;

pub use store::{
    Item, MemorySubscriptionStore, QueryPage, RedisSubscriptionStore, SubscriptionStore,
};
pub use subscription::{Clock, SubscriptionRegistry, DEFAULT_BACKOFF_CEILING};

pub mod cache;
pub mod config;
pub mod domain;
pub mod schema;
pub mod store;

pub use cache::{CacheError, Pending, PhoneCache, Subscription, SubscriptionId};
pub use domain::{CollectionState, Phone, PhoneDraft, PhoneId};
pub use store::{PhoneStore, RemoteError};

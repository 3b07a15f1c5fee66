pub mod baseline;
pub mod defs;
pub mod empty;

pub use baseline::{FixedLocale, LogNotifier};
pub use defs::{DeliveryError, LocaleResolver, Notifier, SearchCapability, SearchHit, SubscriberId};
pub use empty::EmptySearch;

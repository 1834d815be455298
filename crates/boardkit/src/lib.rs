pub mod cache;
pub mod config;
pub mod context;
pub mod controller;
pub mod filter;
pub mod logging;
pub mod merger;
pub mod notifications;
pub mod optimistic;
pub mod orders;
pub mod pagination;
pub mod preferences;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod view;

pub use config::ControllerConfig;
pub use context::{SessionContext, SessionTarget};
pub use controller::{ControllerHandle, ListController, ViewSnapshot};
pub use filter::{FilterEngine, FilterMode, FilterOptions};
pub use notifications::{Notification, NotificationSink, Severity};
pub use view::{Renderer, ViewModel};

// Re-export the record and wire vocabulary for downstream crates
pub use boardkit_core::{
    ApiError, ChangeEvent, ChangeFeed, ChangeOperation, PageParams, PageResult, PageSource,
    Predicate, Record, RecordMutations, Row, Searchable, Subscription, Value, ViewKind,
};

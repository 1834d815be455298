pub mod predicate;
pub mod record;
pub mod traits;

pub use predicate::{predicate_fn, FieldContains, FieldEquals, FnPredicate, Predicate};
pub use record::DynamicRecord;
pub use traits::{
    ChangeFeed, MaybeSendSync, PageSource, Record, RecordMutations, Searchable, Subscription,
};

// Re-export the wire vocabulary so downstream crates need a single import path
pub use boardkit_api::{
    ApiError, ChangeEvent, ChangeOperation, PageAddress, PageParams, PageResult, Pagination,
    QueryKey, Row, Value, ViewKind,
};

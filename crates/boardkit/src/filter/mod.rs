//! Filter and search engine

pub mod debounce;
pub mod engine;
pub mod search;

pub use debounce::Debouncer;
pub use engine::{FilterEngine, FilterMode, FilterOptions, Matcher};
pub use search::{SEARCH_KEY, SearchIndex, date_representations, normalize};

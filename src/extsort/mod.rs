pub mod config;
pub mod engine;
pub mod error;
mod merge;
pub mod order;
mod output;
pub mod reduce;
mod spill;
mod split;


pub use self::config::*;
pub use self::engine::*;
pub use self::error::SortError;
pub use self::order::*;
pub use self::output::RecordEditor;
pub use self::reduce::*;
pub use self::split::RecordFilter;

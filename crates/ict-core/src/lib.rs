pub mod error;
pub mod pattern;
pub mod snapshot;
pub mod types;

pub use error::*;
pub use pattern::*;
pub use types::*;

pub mod error;
pub mod types;
pub mod value;

pub use error::{LineLocation, NarrativeError};
pub use types::*;
pub use value::*;

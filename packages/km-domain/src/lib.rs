pub mod query;
pub mod record;
pub mod text;
pub mod time_serde;
pub mod vector;

mod error;

pub use error::{Error, Result};
pub use record::Record;

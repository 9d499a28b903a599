pub mod enums;
pub mod error;
pub mod status;

pub use enums::*;
pub use error::{check, CapsError};
pub use status::ErrorTable;

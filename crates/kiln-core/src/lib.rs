pub mod error;
pub mod model;

pub use error::KilnError;
pub use model::*;

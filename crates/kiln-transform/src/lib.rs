pub mod cover;
pub mod decide;
pub mod error;
pub mod materialize;
pub mod tags;

pub use cover::CoverDedupSet;
pub use decide::{decide, needs_transcode, Action, DecisionInput};
pub use error::TransformError;
pub use materialize::materialize_track;

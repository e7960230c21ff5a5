//! Core types shared by every stage.

mod outcome;
mod status;

pub use outcome::StageOutcome;
pub use status::{StageName, StageStatus};

//! Map rendering stage.

mod stager;

pub use stager::{render_command, ArtifactStager};

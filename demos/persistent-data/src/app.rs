use phaseline_core::{Pipeline, PipelineBuilder, StartupError};

use crate::handlers::PersistentDataExt;

/// Build the demo pipeline.
///
/// Any error here is a startup failure: the process must refuse to start
/// rather than run with the extension half-wired.
pub fn build_pipeline() -> Result<Pipeline, StartupError> {
    let mut builder = PipelineBuilder::new();
    builder.install::<PersistentDataExt>()?;
    Ok(builder.build())
}

//! Pipelines made of one stage: relight, enhance, face restore, style transfer

use darkroom_core::domain::image::ImageRef;

use super::{Outcome, PipelineError, Run};
use crate::stage::StageDescriptor;

pub(super) async fn run_single(
    run: &Run<'_>,
    input: &ImageRef,
    descriptor: &StageDescriptor,
    params: &[(&str, String)],
) -> Result<Outcome, PipelineError> {
    let image = run.fetch(input, "input").await?;
    let result = run
        .stage(descriptor, &[("input", image.as_path())], params)
        .await?;
    let output = run.upload(&result, descriptor.name).await?;
    Ok(Outcome::single(output))
}

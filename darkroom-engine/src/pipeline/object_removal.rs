//! Object removal: point segmentation, mask dilation, inpainting

use darkroom_core::domain::image::ImageRef;

use super::stages;
use super::{Outcome, PipelineError, Run};

pub(super) async fn remove_object(
    run: &Run<'_>,
    input: &ImageRef,
    x: u32,
    y: u32,
) -> Result<Outcome, PipelineError> {
    let image = run.fetch(input, "input").await?;

    let mask = run
        .stage(
            &stages::POINT_SEGMENT,
            &[("input", image.as_path())],
            &[("x", x.to_string()), ("y", y.to_string())],
        )
        .await?;

    let dilated = run
        .stage(
            &stages::DILATE,
            &[("input", mask.as_path())],
            &[("radius", run.coordinator.dilate_radius.to_string())],
        )
        .await?;

    let result = run
        .stage(
            &stages::INPAINT,
            &[("image", image.as_path()), ("mask", dilated.as_path())],
            &[],
        )
        .await?;

    let output = run.upload(&result, "object-removal").await?;
    Ok(Outcome::single(output))
}

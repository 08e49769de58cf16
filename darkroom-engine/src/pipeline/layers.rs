//! Layer separation: foreground cut-out plus the inpainted background

use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::intent::ModelVariant;
use darkroom_core::dto::edit::NamedImage;

use super::stages::{self, segment_model};
use super::{Outcome, PipelineError, Run};

pub(super) async fn separate_layers(
    run: &Run<'_>,
    input: &ImageRef,
    model_type: Option<ModelVariant>,
) -> Result<Outcome, PipelineError> {
    let image = run.fetch(input, "input").await?;
    let (variant, source) = run.select_variant(&image, model_type).await;

    let foreground = run
        .stage(
            &stages::SEGMENT,
            &[("input", image.as_path())],
            &[("model", segment_model(variant).to_string())],
        )
        .await?;

    // The cut-out's alpha marks the region the inpainter fills
    let background = run
        .stage(
            &stages::INPAINT,
            &[("image", image.as_path()), ("mask", foreground.as_path())],
            &[],
        )
        .await?;

    let (foreground, background) = run
        .upload_pair(
            (foreground.as_path(), "foreground"),
            (background.as_path(), "background"),
        )
        .await?;

    Ok(Outcome {
        output: foreground,
        extras: vec![NamedImage {
            name: "background".to_string(),
            image: background,
        }],
        variant: Some((variant, source)),
    })
}

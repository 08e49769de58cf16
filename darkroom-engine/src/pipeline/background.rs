//! Background replacement
//!
//! The subject is composited over the new background, segmented again on
//! the composite and the composite is harmonized under the binarized
//! subject mask so lighting and color match.

use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::intent::ModelVariant;

use super::stages::{self, segment_model};
use super::{Outcome, PipelineError, Run};

pub(super) async fn replace_background(
    run: &Run<'_>,
    input: &ImageRef,
    background: &ImageRef,
    model_type: Option<ModelVariant>,
) -> Result<Outcome, PipelineError> {
    let (subject, backdrop) = tokio::try_join!(
        run.fetch(input, "subject"),
        run.fetch(background, "background")
    )?;

    let composite = run
        .stage(
            &stages::COMPOSITE,
            &[
                ("background", backdrop.as_path()),
                ("subject", subject.as_path()),
            ],
            &[],
        )
        .await?;

    let (variant, source) = run.select_variant(&composite, model_type).await;

    let foreground = run
        .stage(
            &stages::SEGMENT,
            &[("input", composite.as_path())],
            &[("model", segment_model(variant).to_string())],
        )
        .await?;

    let mask = run
        .stage(&stages::BINARIZE, &[("input", foreground.as_path())], &[])
        .await?;

    let result = run
        .stage(
            &stages::HARMONIZE,
            &[("composite", composite.as_path()), ("mask", mask.as_path())],
            &[],
        )
        .await?;

    let output = run.upload(&result, "background-replace").await?;

    Ok(Outcome {
        output,
        extras: Vec::new(),
        variant: Some((variant, source)),
    })
}

//! Pipeline coordination
//!
//! A pipeline turns one [`Intent`] into an ordered series of stages:
//! fetch the input from the external store, thread the staged artifacts
//! from stage to stage, and upload the final result. All local files of a
//! run live in one [`ArtifactScope`], which is released on every exit path
//! and cleans up on drop if the run is abandoned.

mod background;
mod layers;
mod object_removal;
mod single;
pub mod stages;

use anyhow::Context;
use async_trait::async_trait;
use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::intent::{Intent, ModelVariant};
use darkroom_core::dto::edit::{EditResult, NamedImage, VariantSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactScope, ArtifactStore};
use crate::classifier::{self, ClassifierAdapter, HttpClassifier, UnconfiguredClassifier};
use crate::config::EngineConfig;
use crate::registry::UnitRegistry;
use crate::runtime::{CliRuntime, UnitRuntime};
use crate::stage::{StageDescriptor, StageError, StageExecutor};
use crate::store::{ExternalStore, LocalStore, StoreError};

/// Store folder for pipeline outputs
const OUTPUT_FOLDER: &str = "edits";

/// Pipeline failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline '{pipeline}' failed at stage '{stage}': {cause}")]
    StageFailed {
        pipeline: &'static str,
        stage: &'static str,
        #[source]
        cause: StageError,
    },

    #[error("Pipeline '{pipeline}' failed at stage '{stage}': {cause}")]
    Store {
        pipeline: &'static str,
        stage: &'static str,
        #[source]
        cause: StoreError,
    },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl PipelineError {
    /// Name of the stage that failed, if any
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::StageFailed { stage, .. } | PipelineError::Store { stage, .. } => {
                Some(*stage)
            }
            PipelineError::InvalidParameters(_) => None,
        }
    }
}

/// Runs edits against images
#[async_trait]
pub trait EditEngine: Send + Sync {
    /// Runs the pipeline for `intent` on `input`
    async fn run(&self, input: &ImageRef, intent: &Intent) -> Result<EditResult, PipelineError>;

    /// Downloads an image and returns its bytes
    async fn load_image(&self, image: &ImageRef) -> Result<Vec<u8>, PipelineError>;
}

/// Name of the pipeline serving an intent
pub fn pipeline_name(intent: &Intent) -> &'static str {
    match intent {
        Intent::RemoveBackground { .. } => "layer-separation",
        Intent::ObjectRemoval { .. } => "object-removal",
        Intent::BackgroundReplace { .. } => "background-replace",
        Intent::Relight { .. } => "relight",
        Intent::Enhance { .. } => "enhance",
        Intent::FaceRestore { .. } => "face-restore",
        Intent::StyleTransfer { .. } => "style-transfer",
    }
}

/// Runs the named pipelines
pub struct PipelineCoordinator {
    executor: StageExecutor,
    staging: ArtifactStore,
    store: Arc<dyn ExternalStore>,
    classifier: Arc<dyn ClassifierAdapter>,
    classifier_timeout: Duration,
    dilate_radius: u32,
}

impl PipelineCoordinator {
    pub fn new(
        executor: StageExecutor,
        staging: ArtifactStore,
        store: Arc<dyn ExternalStore>,
        classifier: Arc<dyn ClassifierAdapter>,
    ) -> Self {
        let defaults = EngineConfig::default();
        Self {
            executor,
            staging,
            store,
            classifier,
            classifier_timeout: defaults.classifier_timeout,
            dilate_radius: defaults.dilate_radius,
        }
    }

    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    pub fn with_dilate_radius(mut self, radius: u32) -> Self {
        self.dilate_radius = radius;
        self
    }

    /// Wires the production components described by `config`
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let mut registry = UnitRegistry::with_defaults();
        if let Some(path) = &config.units_file {
            registry.apply_overrides_file(path)?;
            info!("Applied unit overrides from {}", path.display());
        }

        let runtime: Arc<dyn UnitRuntime> = Arc::new(CliRuntime::new(config.runtime.clone()));
        let executor = StageExecutor::new(
            runtime,
            Arc::new(registry),
            config.stage_timeout,
            config.unit_work_dir.clone(),
        );

        let staging = ArtifactStore::new(config.staging_dir.clone()).with_context(|| {
            format!(
                "Failed to create staging directory {}",
                config.staging_dir.display()
            )
        })?;

        let store = LocalStore::new(config.store_dir.clone(), config.store_url.clone())
            .with_context(|| {
                format!(
                    "Failed to create store directory {}",
                    config.store_dir.display()
                )
            })?;

        let classifier: Arc<dyn ClassifierAdapter> = match &config.classifier_url {
            Some(url) => {
                info!("Using classifier at {}", url);
                Arc::new(HttpClassifier::new(
                    url.clone(),
                    config.classifier_api_key.clone(),
                ))
            }
            None => {
                warn!("No classifier configured, segmentation falls back to the general model");
                Arc::new(UnconfiguredClassifier)
            }
        };

        Ok(Self::new(executor, staging, Arc::new(store), classifier)
            .with_classifier_timeout(config.classifier_timeout)
            .with_dilate_radius(config.dilate_radius))
    }

    pub fn classifier(&self) -> Arc<dyn ClassifierAdapter> {
        Arc::clone(&self.classifier)
    }

    pub fn store(&self) -> Arc<dyn ExternalStore> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> &UnitRegistry {
        self.executor.registry()
    }

    async fn dispatch(
        &self,
        run: &Run<'_>,
        input: &ImageRef,
        intent: &Intent,
    ) -> Result<Outcome, PipelineError> {
        match intent {
            Intent::RemoveBackground { model_type } => {
                layers::separate_layers(run, input, *model_type).await
            }
            Intent::ObjectRemoval { x, y } => object_removal::remove_object(run, input, *x, *y).await,
            Intent::BackgroundReplace {
                background,
                model_type,
            } => background::replace_background(run, input, background, *model_type).await,
            Intent::Relight {
                brightness,
                direction,
            } => {
                single::run_single(
                    run,
                    input,
                    &stages::RELIGHT,
                    &[
                        ("brightness", format!("{:.2}", brightness)),
                        ("direction", direction.as_str().to_string()),
                    ],
                )
                .await
            }
            Intent::Enhance { mode } => {
                single::run_single(
                    run,
                    input,
                    &stages::RESTORE,
                    &[("mode", mode.as_str().to_string())],
                )
                .await
            }
            Intent::FaceRestore { fidelity } => {
                single::run_single(
                    run,
                    input,
                    &stages::FACE_RESTORE,
                    &[("fidelity", format!("{:.2}", fidelity))],
                )
                .await
            }
            Intent::StyleTransfer { style } => {
                single::run_single(
                    run,
                    input,
                    &stages::STYLE_TRANSFER,
                    &[("style", style.clone())],
                )
                .await
            }
        }
    }
}

#[async_trait]
impl EditEngine for PipelineCoordinator {
    async fn run(&self, input: &ImageRef, intent: &Intent) -> Result<EditResult, PipelineError> {
        intent
            .validate()
            .map_err(|e| PipelineError::InvalidParameters(e.to_string()))?;

        let started = Instant::now();
        let run = Run {
            coordinator: self,
            scope: self.staging.scope(Uuid::new_v4()),
            pipeline: pipeline_name(intent),
        };

        info!(
            "Starting pipeline '{}' for request {} on image {}",
            run.pipeline,
            run.scope.request_id(),
            input.id
        );

        let outcome = self.dispatch(&run, input, intent).await;
        let released = run.scope.release().await;
        debug!(
            "Request {} released {} staged artifact(s)",
            run.scope.request_id(),
            released
        );

        let outcome = outcome.inspect_err(|e| {
            warn!("Request {} failed: {}", run.scope.request_id(), e);
        })?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Pipeline '{}' for request {} finished in {} ms",
            run.pipeline,
            run.scope.request_id(),
            elapsed_ms
        );

        Ok(EditResult {
            pipeline: run.pipeline.to_string(),
            operation_type: intent.operation_type(),
            parameters: intent.parameters(),
            input_image: input.clone(),
            output_image: outcome.output,
            extra_images: outcome.extras,
            model_variant: outcome.variant.map(|(variant, _)| variant),
            variant_source: outcome.variant.map(|(_, source)| source),
            elapsed_ms,
        })
    }

    async fn load_image(&self, image: &ImageRef) -> Result<Vec<u8>, PipelineError> {
        let run = Run {
            coordinator: self,
            scope: self.staging.scope(Uuid::new_v4()),
            pipeline: "load",
        };

        let bytes = match run.fetch(image, "load").await {
            Ok(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| run.store_error("fetch", e.into())),
            Err(e) => Err(e),
        };
        run.scope.release().await;
        bytes
    }
}

/// What a pipeline produced before it is turned into an [`EditResult`]
struct Outcome {
    output: ImageRef,
    extras: Vec<NamedImage>,
    variant: Option<(ModelVariant, VariantSource)>,
}

impl Outcome {
    fn single(output: ImageRef) -> Self {
        Self {
            output,
            extras: Vec::new(),
            variant: None,
        }
    }
}

/// Per-request state shared by the stages of one run
struct Run<'a> {
    coordinator: &'a PipelineCoordinator,
    scope: ArtifactScope,
    pipeline: &'static str,
}

impl Run<'_> {
    /// Downloads an image into the run's scope
    async fn fetch(&self, image: &ImageRef, label: &str) -> Result<PathBuf, PipelineError> {
        let path = self.scope.reserve(label, extension_of(&image.url));
        let bytes = self
            .coordinator
            .store
            .fetch(&image.url, &path)
            .await
            .map_err(|cause| self.store_error("fetch", cause))?;
        debug!("Fetched {} ({} bytes) as {}", image.url, bytes, label);
        Ok(path)
    }

    async fn stage(
        &self,
        descriptor: &StageDescriptor,
        inputs: &[(&str, &Path)],
        params: &[(&str, String)],
    ) -> Result<PathBuf, PipelineError> {
        self.coordinator
            .executor
            .run_stage(&self.scope, descriptor, inputs, params)
            .await
            .map_err(|cause| PipelineError::StageFailed {
                pipeline: self.pipeline,
                stage: descriptor.name,
                cause,
            })
    }

    /// Uploads a staged file as `<request>-<suffix>`
    async fn upload(&self, local: &Path, suffix: &str) -> Result<ImageRef, PipelineError> {
        let desired_id = format!("{}-{}", self.scope.request_id(), suffix);
        self.coordinator
            .store
            .upload(local, OUTPUT_FOLDER, &desired_id)
            .await
            .map(|stored| stored.image_ref())
            .map_err(|cause| self.store_error("upload", cause))
    }

    /// Uploads two files concurrently; a half-finished pair is rolled back
    async fn upload_pair(
        &self,
        first: (&Path, &str),
        second: (&Path, &str),
    ) -> Result<(ImageRef, ImageRef), PipelineError> {
        let (a, b) = tokio::join!(
            self.upload(first.0, first.1),
            self.upload(second.0, second.1)
        );

        match (a, b) {
            (Ok(a), Ok(b)) => Ok((a, b)),
            (Ok(uploaded), Err(e)) | (Err(e), Ok(uploaded)) => {
                if let Err(delete) = self.coordinator.store.delete(&uploaded.id).await {
                    warn!("Failed to roll back upload {}: {}", uploaded.id, delete);
                }
                Err(e)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    /// Picks the segmentation model for a staged image
    async fn select_variant(
        &self,
        image: &Path,
        explicit: Option<ModelVariant>,
    ) -> (ModelVariant, VariantSource) {
        let bytes = match explicit {
            Some(_) => Vec::new(),
            None => match tokio::fs::read(image).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read {} for classification: {}", image.display(), e);
                    return (ModelVariant::General, VariantSource::Fallback);
                }
            },
        };

        classifier::select_variant(
            self.coordinator.classifier.as_ref(),
            &bytes,
            classifier::mime_for(image),
            explicit,
            self.coordinator.classifier_timeout,
        )
        .await
    }

    fn store_error(&self, stage: &'static str, cause: StoreError) -> PipelineError {
        PipelineError::Store {
            pipeline: self.pipeline,
            stage,
            cause,
        }
    }
}

/// Staged file extension for an image URL
fn extension_of(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "jpg",
        Some("webp") => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, FakeClassifier, FakeRuntime};
    use darkroom_core::domain::intent::{EnhanceMode, LightDirection};
    use darkroom_core::domain::operation::OperationType;

    struct Harness {
        dir: tempfile::TempDir,
        runtime: Arc<FakeRuntime>,
        classifier: Arc<FakeClassifier>,
        store: Arc<LocalStore>,
        coordinator: PipelineCoordinator,
        input: ImageRef,
    }

    impl Harness {
        async fn new(classifier: FakeClassifier) -> Self {
            Self::with_timeout(classifier, Duration::from_secs(5)).await
        }

        async fn with_timeout(classifier: FakeClassifier, timeout: Duration) -> Self {
            Self::build(classifier, timeout, |store| store).await
        }

        /// Builds a harness whose coordinator sees the store through `wrap`
        async fn build(
            classifier: FakeClassifier,
            timeout: Duration,
            wrap: impl FnOnce(Arc<LocalStore>) -> Arc<dyn ExternalStore>,
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let runtime = Arc::new(FakeRuntime::new());
            let classifier = Arc::new(classifier);
            let store =
                Arc::new(LocalStore::new(dir.path().join("store"), "http://images.test").unwrap());

            let executor = StageExecutor::new(
                runtime.clone(),
                Arc::new(UnitRegistry::with_defaults()),
                timeout,
                "/tmp",
            );
            let staging = ArtifactStore::new(dir.path().join("staging")).unwrap();
            let coordinator =
                PipelineCoordinator::new(executor, staging, wrap(store.clone()), classifier.clone())
                    .with_classifier_timeout(Duration::from_millis(100));

            let source = dir.path().join("photo.png");
            std::fs::write(&source, b"\x89PNG\r\n\x1a\nphoto").unwrap();
            let input = store
                .upload(&source, "uploads", "photo")
                .await
                .unwrap()
                .image_ref();

            Self {
                dir,
                runtime,
                classifier,
                store,
                coordinator,
                input,
            }
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("staging"))
                .unwrap()
                .count()
        }

        fn stored_outputs(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("store").join(OUTPUT_FOLDER))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }

        fn exec_calls(&self, unit: &str) -> Vec<String> {
            let prefix = format!("exec {} ", unit);
            self.runtime
                .calls()
                .into_iter()
                .filter(|c| c.starts_with(&prefix) && !c.starts_with(&format!("{}rm ", prefix)))
                .collect()
        }

        fn assert_units_clean(&self) {
            for spec in self.coordinator.registry().specs() {
                assert!(
                    self.runtime.unit_files(&spec.name).is_empty(),
                    "unit {} kept files",
                    spec.name
                );
            }
        }
    }

    #[tokio::test]
    async fn test_layer_separation_uploads_both_layers() {
        let h = Harness::new(FakeClassifier::labelling("human")).await;

        let result = h
            .coordinator
            .run(&h.input, &Intent::RemoveBackground { model_type: None })
            .await
            .unwrap();

        assert_eq!(result.pipeline, "layer-separation");
        assert_eq!(result.operation_type, OperationType::RemoveBackground);
        assert_eq!(result.input_image, h.input);
        assert_eq!(result.model_variant, Some(ModelVariant::Human));
        assert_eq!(result.variant_source, Some(VariantSource::Classifier));
        assert_eq!(result.extra_images.len(), 1);
        assert_eq!(result.extra_images[0].name, "background");
        assert!(result.output_image.url.ends_with("-foreground.png"));

        assert!(h.exec_calls("darkroom-rembg")[0].contains("-m u2net_human_seg"));
        assert_eq!(h.exec_calls("darkroom-lama").len(), 1);
        assert_eq!(h.stored_outputs(), 2);
        assert_eq!(h.staged_files(), 0);
        h.assert_units_clean();

        let fetched = h.dir.path().join("check.png");
        h.store.fetch(&result.output_image.url, &fetched).await.unwrap();
    }

    /// Store whose uploads fail for ids ending in `suffix`
    struct RejectingStore {
        inner: Arc<LocalStore>,
        suffix: &'static str,
    }

    #[async_trait]
    impl ExternalStore for RejectingStore {
        async fn upload(
            &self,
            local: &Path,
            folder: &str,
            desired_id: &str,
        ) -> Result<crate::store::StoredImage, StoreError> {
            if desired_id.ends_with(self.suffix) {
                return Err(StoreError::NotFound(desired_id.to_string()));
            }
            self.inner.upload(local, folder, desired_id).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }

        async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StoreError> {
            self.inner.fetch(url, dest).await
        }
    }

    #[tokio::test]
    async fn test_failed_layer_upload_rolls_back_the_other_layer() {
        let h = Harness::build(FakeClassifier::labelling("human"), Duration::from_secs(5), |store| {
            Arc::new(RejectingStore {
                inner: store,
                suffix: "-background",
            })
        })
        .await;

        let err = h
            .coordinator
            .run(&h.input, &Intent::RemoveBackground { model_type: None })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Store {
                stage: "upload",
                ..
            }
        ));
        assert_eq!(h.stored_outputs(), 0);
        assert_eq!(h.staged_files(), 0);
        h.assert_units_clean();
    }

    #[tokio::test]
    async fn test_failing_classifier_falls_back_to_general_model() {
        let h = Harness::new(FakeClassifier::failing()).await;

        let result = h
            .coordinator
            .run(&h.input, &Intent::RemoveBackground { model_type: None })
            .await
            .unwrap();

        assert_eq!(result.model_variant, Some(ModelVariant::General));
        assert_eq!(result.variant_source, Some(VariantSource::Fallback));
        assert!(h.exec_calls("darkroom-rembg")[0].contains("-m isnet-general-use"));
    }

    #[tokio::test]
    async fn test_explicit_model_type_skips_classifier() {
        let h = Harness::new(FakeClassifier::labelling("object")).await;

        let result = h
            .coordinator
            .run(
                &h.input,
                &Intent::RemoveBackground {
                    model_type: Some(ModelVariant::Human),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.variant_source, Some(VariantSource::Explicit));
        assert_eq!(result.model_variant, Some(ModelVariant::Human));
        assert_eq!(h.classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_object_removal_runs_stages_in_order() {
        let h = Harness::new(FakeClassifier::failing()).await;

        let result = h
            .coordinator
            .run(&h.input, &Intent::ObjectRemoval { x: 120, y: 45 })
            .await
            .unwrap();

        assert_eq!(result.operation_type, OperationType::ObjectRemoval);
        assert!(result.model_variant.is_none());
        assert!(h.exec_calls("darkroom-sam")[0].contains("--x 120 --y 45"));
        assert!(h.exec_calls("darkroom-magick")[0].contains("Disk:15"));
        assert_eq!(h.exec_calls("darkroom-lama").len(), 1);
        assert_eq!(h.classifier.calls(), 0);
        assert_eq!(h.stored_outputs(), 1);
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_object_removal_failure_at_each_stage_cleans_up() {
        for (unit, stage, downstream) in [
            ("darkroom-sam", "point-segment", Some("darkroom-magick")),
            ("darkroom-magick", "dilate", Some("darkroom-lama")),
            ("darkroom-lama", "inpaint", None),
        ] {
            let h = Harness::new(FakeClassifier::failing()).await;
            h.runtime.set_behavior(unit, Behavior::Fail(1));

            let err = h
                .coordinator
                .run(&h.input, &Intent::ObjectRemoval { x: 1, y: 1 })
                .await
                .unwrap_err();

            match err {
                PipelineError::StageFailed {
                    pipeline,
                    stage: failed,
                    cause: StageError::ExecutionFailed { exit_code: 1, .. },
                } => {
                    assert_eq!(pipeline, "object-removal");
                    assert_eq!(failed, stage);
                }
                other => panic!("unexpected error for {}: {}", stage, other),
            }

            if let Some(downstream) = downstream {
                assert!(h.exec_calls(downstream).is_empty(), "{} ran after failure", downstream);
            }
            assert_eq!(h.staged_files(), 0, "staged files left after {} failed", stage);
            assert_eq!(h.stored_outputs(), 0);
            h.assert_units_clean();
        }
    }

    #[tokio::test]
    async fn test_background_replace_harmonizes_composite() {
        let h = Harness::new(FakeClassifier::labelling("human")).await;

        let backdrop_file = h.dir.path().join("beach.png");
        std::fs::write(&backdrop_file, b"\x89PNG\r\n\x1a\nbeach").unwrap();
        let backdrop = h
            .store
            .upload(&backdrop_file, "uploads", "beach")
            .await
            .unwrap()
            .image_ref();

        let result = h
            .coordinator
            .run(
                &h.input,
                &Intent::BackgroundReplace {
                    background: backdrop.clone(),
                    model_type: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.pipeline, "background-replace");
        assert_eq!(result.variant_source, Some(VariantSource::Classifier));
        assert_eq!(
            result.parameters.get("background_url").and_then(|v| v.as_str()),
            Some(backdrop.url.as_str())
        );

        let magick = h.exec_calls("darkroom-magick");
        assert_eq!(magick.len(), 2);
        assert!(magick[0].contains("-composite"));
        assert!(magick[1].contains("-alpha extract"));
        assert_eq!(h.exec_calls("darkroom-harmonizer").len(), 1);
        assert_eq!(h.stored_outputs(), 1);
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_background_replace_failure_cleans_up() {
        let h = Harness::new(FakeClassifier::labelling("object")).await;
        h.runtime.set_behavior("darkroom-harmonizer", Behavior::Empty);

        let err = h
            .coordinator
            .run(
                &h.input,
                &Intent::BackgroundReplace {
                    background: h.input.clone(),
                    model_type: None,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("harmonize"));
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                cause: StageError::EmptyOutput,
                ..
            }
        ));
        assert_eq!(h.staged_files(), 0);
        assert_eq!(h.stored_outputs(), 0);
    }

    #[tokio::test]
    async fn test_missing_input_is_fetch_failure() {
        let h = Harness::new(FakeClassifier::failing()).await;
        let missing = ImageRef::new("uploads/gone", "http://images.test/uploads/gone.png");

        let err = h
            .coordinator
            .run(&missing, &Intent::Enhance { mode: EnhanceMode::Denoise })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Store {
                stage: "fetch",
                cause: StoreError::NotFound(_),
                ..
            }
        ));
        assert!(h.runtime.calls().is_empty());
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_single_stage_pipelines_render_parameters() {
        let h = Harness::new(FakeClassifier::failing()).await;

        let relit = h
            .coordinator
            .run(
                &h.input,
                &Intent::Relight {
                    brightness: 1.5,
                    direction: LightDirection::Left,
                },
            )
            .await
            .unwrap();
        assert_eq!(relit.operation_type, OperationType::Relight);
        assert!(h.exec_calls("darkroom-relight")[0].contains("--brightness 1.50 --direction left"));

        h.coordinator
            .run(&relit.output_image, &Intent::Enhance { mode: EnhanceMode::Deblur })
            .await
            .unwrap();
        assert!(h.exec_calls("darkroom-nafnet")[0].contains("--task deblur"));

        h.coordinator
            .run(&h.input, &Intent::FaceRestore { fidelity: 0.5 })
            .await
            .unwrap();
        assert!(h.exec_calls("darkroom-codeformer")[0].contains("--fidelity 0.50"));
        assert_eq!(
            h.runtime
                .count_calls("exec darkroom-codeformer rm -rf /tmp/codeformer-results"),
            1
        );

        h.coordinator
            .run(
                &h.input,
                &Intent::StyleTransfer {
                    style: "mosaic".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(h.exec_calls("darkroom-style")[0].contains("--style mosaic"));

        assert_eq!(h.stored_outputs(), 4);
        assert_eq!(h.staged_files(), 0);
        h.assert_units_clean();
    }

    #[tokio::test]
    async fn test_invalid_parameters_run_nothing() {
        let h = Harness::new(FakeClassifier::failing()).await;

        let err = h
            .coordinator
            .run(
                &h.input,
                &Intent::StyleTransfer {
                    style: "sepia".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidParameters(_)));
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stage_timeout_aborts_pipeline() {
        let h = Harness::with_timeout(FakeClassifier::failing(), Duration::from_millis(50)).await;
        h.runtime.set_behavior("darkroom-rembg", Behavior::Hang);

        let err = h
            .coordinator
            .run(&h.input, &Intent::RemoveBackground { model_type: None })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::StageFailed {
                stage: "segment",
                cause: StageError::Timeout { .. },
                ..
            }
        ));
        assert!(h.exec_calls("darkroom-lama").is_empty());
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_run_removes_staged_files() {
        let h = Harness::new(FakeClassifier::failing()).await;
        h.runtime.set_behavior("darkroom-lama", Behavior::Hang);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            h.coordinator
                .run(&h.input, &Intent::RemoveBackground { model_type: None }),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(h.staged_files(), 0);
        assert_eq!(h.stored_outputs(), 0);
    }

    #[tokio::test]
    async fn test_load_image_returns_bytes_and_cleans_up() {
        let h = Harness::new(FakeClassifier::failing()).await;

        let bytes = h.coordinator.load_image(&h.input).await.unwrap();
        assert_eq!(bytes, b"\x89PNG\r\n\x1a\nphoto");
        assert_eq!(h.staged_files(), 0);
    }

    #[test]
    fn test_extension_of_url() {
        assert_eq!(extension_of("http://x/a/photo.JPG?size=2"), "jpg");
        assert_eq!(extension_of("http://x/a/photo.webp"), "webp");
        assert_eq!(extension_of("http://x/a/photo"), "png");
    }
}

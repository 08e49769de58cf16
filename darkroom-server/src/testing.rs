//! Test doubles for the edit engine and the classifier

use async_trait::async_trait;
use darkroom_core::domain::image::ImageRef;
use darkroom_core::domain::intent::Intent;
use darkroom_core::dto::edit::{EditResult, QualityReport};
use darkroom_engine::classifier::{
    Classification, ClassifierAdapter, ClassifierError, IntentRoute,
};
use darkroom_engine::pipeline::pipeline_name;
use darkroom_engine::{EditEngine, PipelineError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type FailureHook = Box<dyn Fn() -> PipelineError + Send + Sync>;

pub fn image(name: &str) -> ImageRef {
    ImageRef::new(
        format!("edits/{}", name),
        format!("http://images.test/edits/{}.png", name),
    )
}

/// Engine that returns a fresh output image per run without touching containers
#[derive(Default)]
pub struct StubEngine {
    runs: AtomicUsize,
    failure: Mutex<Option<FailureHook>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, hook: impl Fn() -> PipelineError + Send + Sync + 'static) {
        *self.failure.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl EditEngine for StubEngine {
    async fn run(&self, input: &ImageRef, intent: &Intent) -> Result<EditResult, PipelineError> {
        if let Some(hook) = self.failure.lock().unwrap().as_ref() {
            return Err(hook());
        }

        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(EditResult {
            pipeline: pipeline_name(intent).to_string(),
            operation_type: intent.operation_type(),
            parameters: intent.parameters(),
            input_image: input.clone(),
            output_image: image(&format!("out-{}", n)),
            extra_images: Vec::new(),
            model_variant: None,
            variant_source: None,
            elapsed_ms: 1,
        })
    }

    async fn load_image(&self, _image: &ImageRef) -> Result<Vec<u8>, PipelineError> {
        Ok(b"image-bytes".to_vec())
    }
}

/// Classifier with canned answers; every unset call fails with a transport error
#[derive(Default)]
pub struct StubClassifier {
    route: Option<Result<IntentRoute, ClassifierError>>,
    quality: Option<Vec<String>>,
}

impl StubClassifier {
    pub fn routing(route: Result<IntentRoute, ClassifierError>) -> Self {
        Self {
            route: Some(route),
            quality: None,
        }
    }

    pub fn with_quality(needed: Vec<&str>) -> Self {
        Self {
            route: None,
            quality: Some(needed.into_iter().map(str::to_string).collect()),
        }
    }
}

fn unreachable_classifier() -> ClassifierError {
    ClassifierError::Transport("classifier not stubbed".to_string())
}

#[async_trait]
impl ClassifierAdapter for StubClassifier {
    async fn classify(&self, _image: &[u8], _mime: &str) -> Result<Classification, ClassifierError> {
        Err(unreachable_classifier())
    }

    async fn analyze_quality(&self, _image: &[u8]) -> Result<QualityReport, ClassifierError> {
        match &self.quality {
            Some(needed) => Ok(QualityReport {
                needed_enhancements: needed.clone(),
                severity: HashMap::new(),
                degraded: false,
            }),
            None => Err(unreachable_classifier()),
        }
    }

    async fn route_intent(
        &self,
        _image: Option<&[u8]>,
        _prompt: &str,
    ) -> Result<IntentRoute, ClassifierError> {
        self.route.clone().unwrap_or_else(|| Err(unreachable_classifier()))
    }
}

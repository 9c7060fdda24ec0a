//! Backends: the stateful, loaded side of a capsule.
//!
//! Every backend answers three capabilities: `process_frame` (one frame plus
//! the detections the capsule's input declaration selected), `batch_predict`
//! (raw inference over many inputs) and `close`. The set of implementations
//! is closed, so they are variants of one enum rather than trait objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vcap_batch::BatchProcessor;
use vcap_core::{BoundingBox, DetectionNode, Frame, OptionValues, Point};

use crate::capsules::color_classifier::ClassifierBackend;
use crate::capsules::face_detector::DetectorBackend;
use crate::capsules::fake_box::FakeBoxBackend;
use crate::error::BackendError;

/// One result of the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_name: String,
    pub confidence: f64,
    /// Polygon in frame pixels. Empty for whole-input classification.
    #[serde(default)]
    pub coords: Vec<Point>,
}

impl RawDetection {
    pub fn new(class_name: impl Into<String>, confidence: f64, coords: Vec<Point>) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            coords,
        }
    }

    /// A class label without a location.
    pub fn label(class_name: impl Into<String>, confidence: f64) -> Self {
        Self::new(class_name, confidence, Vec::new())
    }
}

/// What the engine is asked to look at: a whole frame, or a region of it.
#[derive(Debug, Clone)]
pub struct PredictInput {
    pub frame: Frame,
    pub region: Option<BoundingBox>,
}

impl PredictInput {
    pub fn frame(frame: Frame) -> Self {
        Self {
            frame,
            region: None,
        }
    }

    pub fn region(frame: Frame, region: BoundingBox) -> Self {
        Self {
            frame,
            region: Some(region),
        }
    }
}

/// The opaque inference engine.
///
/// Called from the blocking pool with a whole batch; returns one list of
/// detections per input, in input order.
pub trait Predictor: Send + Sync + 'static {
    fn predict(&self, inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String>;
}

/// Adapts a [`Predictor`] to the batch scheduler.
pub struct PredictorProcessor {
    predictor: Arc<dyn Predictor>,
}

impl PredictorProcessor {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }
}

impl BatchProcessor for PredictorProcessor {
    type Input = PredictInput;
    type Output = Vec<RawDetection>;

    fn process_batch(&self, inputs: Vec<PredictInput>) -> Result<Vec<Vec<RawDetection>>, String> {
        self.predictor.predict(&inputs)
    }
}

/// Detections a capsule receives for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendInput {
    /// Input size NONE
    None,
    /// Input size SINGLE: the driving detection
    Single(DetectionNode),
    /// Input size ALL: every matching detection
    All(Vec<DetectionNode>),
}

/// Result of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendOutput {
    /// New detections
    pub detections: Vec<DetectionNode>,
    /// Attributes to set on the driving detection (SINGLE input only)
    pub attributes: BTreeMap<String, String>,
    /// Extra data to set on the driving detection (SINGLE input only)
    pub extra_data: BTreeMap<String, serde_json::Value>,
}

impl BackendOutput {
    pub fn detections(detections: Vec<DetectionNode>) -> Self {
        Self {
            detections,
            ..Default::default()
        }
    }

    pub fn has_enrichment(&self) -> bool {
        !self.attributes.is_empty() || !self.extra_data.is_empty()
    }
}

pub enum Backend {
    FakeBox(FakeBoxBackend),
    Detector(DetectorBackend),
    Classifier(ClassifierBackend),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FakeBox(_) => "fake_box",
            Self::Detector(_) => "detector",
            Self::Classifier(_) => "classifier",
        }
    }

    pub async fn process_frame(
        &self,
        frame: &Frame,
        input: BackendInput,
        options: &OptionValues,
    ) -> Result<BackendOutput, BackendError> {
        match self {
            Self::FakeBox(b) => b.process_frame(frame, input),
            Self::Detector(b) => b.process_frame(frame, input, options).await,
            Self::Classifier(b) => b.process_frame(frame, input).await,
        }
    }

    pub async fn batch_predict(
        &self,
        inputs: Vec<PredictInput>,
    ) -> Result<Vec<Vec<RawDetection>>, BackendError> {
        match self {
            Self::FakeBox(b) => b.batch_predict(inputs),
            Self::Detector(b) => b.batch_predict(inputs).await,
            Self::Classifier(b) => b.batch_predict(inputs).await,
        }
    }

    /// Release the backend. Later calls fail with `Closed`.
    pub async fn close(&self) {
        match self {
            Self::FakeBox(b) => b.close(),
            Self::Detector(b) => b.close().await,
            Self::Classifier(b) => b.close().await,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Backend").field(&self.kind()).finish()
    }
}

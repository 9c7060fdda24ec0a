//! Face detector, and the generic detector backend behind it.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;
use vcap_batch::{BatchConfig, BatchScheduler};
use vcap_core::{Capsule, DetectionNode, Frame, NodeDescription, OptionSpec, OptionValues, Size};

use crate::backend::{BackendInput, BackendOutput, PredictInput, Predictor, PredictorProcessor, RawDetection};
use crate::capsules::{predict_all, spawn_scheduler};
use crate::error::BackendError;

pub const NAME: &str = "face_detector";
pub const DETECTION: &str = "face";
pub const CONFIDENCE: &str = "detection_confidence";
pub const THRESHOLD: &str = "threshold";

pub fn capsule() -> Capsule {
    Capsule::new(
        NAME,
        1,
        NodeDescription::none(),
        NodeDescription::new(Size::All)
            .detections([DETECTION])
            .extra_data([CONFIDENCE]),
    )
    .with_description("Finds faces in the whole frame")
    .with_option(
        THRESHOLD,
        OptionSpec::float("Minimum confidence for a face to be kept", 0.5, 0.0, 1.0),
    )
}

/// Runs a predictor over the whole frame, or over the box of one driving
/// detection, and keeps confident detections of the configured classes.
/// Returned coordinates are in frame pixels either way.
pub struct DetectorBackend {
    class_names: Vec<String>,
    scheduler: BatchScheduler<PredictorProcessor>,
}

impl DetectorBackend {
    /// Start the backend's batch scheduler. Needs a tokio runtime.
    pub fn load(predictor: Arc<dyn Predictor>, config: BatchConfig) -> Result<Self, BackendError> {
        Self::with_classes(NAME, [DETECTION], predictor, config)
    }

    pub fn with_classes<I, S>(
        name: &str,
        class_names: I,
        predictor: Arc<dyn Predictor>,
        config: BatchConfig,
    ) -> Result<Self, BackendError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            class_names: class_names.into_iter().map(Into::into).collect(),
            scheduler: spawn_scheduler(name, predictor, config)?,
        })
    }

    pub(crate) async fn process_frame(
        &self,
        frame: &Frame,
        input: BackendInput,
        options: &OptionValues,
    ) -> Result<BackendOutput, BackendError> {
        let request = match input {
            BackendInput::None => PredictInput::frame(frame.clone()),
            BackendInput::Single(driver) => PredictInput::region(frame.clone(), driver.bbox()),
            BackendInput::All(_) => {
                return Err(BackendError::InvalidInput(format!(
                    "{} looks at the whole frame or inside one detection",
                    self.scheduler.name()
                )))
            }
        };
        let threshold = options.float(THRESHOLD).unwrap_or(0.5);

        let mut predictions = self.batch_predict(vec![request]).await?;
        let raw = predictions.pop().unwrap_or_default();
        let total = raw.len();

        let detections: Vec<DetectionNode> = raw
            .into_iter()
            .filter(|d| self.class_names.contains(&d.class_name) && d.confidence >= threshold)
            .map(|d| {
                DetectionNode::new(d.class_name, d.coords).with_extra(CONFIDENCE, json!(d.confidence))
            })
            .collect();

        debug!(
            backend = %self.scheduler.name(),
            kept = detections.len(),
            total,
            threshold,
            "Filtered predictions"
        );
        Ok(BackendOutput::detections(detections))
    }

    pub(crate) async fn batch_predict(
        &self,
        inputs: Vec<PredictInput>,
    ) -> Result<Vec<Vec<RawDetection>>, BackendError> {
        predict_all(&self.scheduler, inputs).await
    }

    pub(crate) async fn close(&self) {
        self.scheduler.shutdown().await;
    }
}

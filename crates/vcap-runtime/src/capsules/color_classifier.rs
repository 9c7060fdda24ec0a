//! Vehicle colour classifier: labels each vehicle from a crop of its box.
//!
//! Only unlocated predictions (labels) count as classes; located ones are
//! detections and are ignored.

use std::sync::Arc;

use serde_json::json;
use vcap_batch::{BatchConfig, BatchScheduler};
use vcap_core::{Capsule, Frame, NodeDescription, Size};

use crate::backend::{BackendInput, BackendOutput, PredictInput, Predictor, PredictorProcessor, RawDetection};
use crate::capsules::{predict_all, spawn_scheduler};
use crate::error::BackendError;

pub const NAME: &str = "classifier_vehicle_color";
pub const DETECTION: &str = "vehicle";
pub const ATTRIBUTE: &str = "color";
pub const CONFIDENCE: &str = "color_confidence";

pub fn capsule() -> Capsule {
    Capsule::new(
        NAME,
        1,
        NodeDescription::new(Size::Single).detections([DETECTION]),
        NodeDescription::new(Size::Single)
            .detections([DETECTION])
            .attributes([ATTRIBUTE])
            .extra_data([CONFIDENCE]),
    )
    .with_description("Classifies the colour of each vehicle")
}

pub struct ClassifierBackend {
    scheduler: BatchScheduler<PredictorProcessor>,
}

impl ClassifierBackend {
    /// Start the backend's batch scheduler. Needs a tokio runtime.
    pub fn load(predictor: Arc<dyn Predictor>, config: BatchConfig) -> Result<Self, BackendError> {
        Ok(Self {
            scheduler: spawn_scheduler(NAME, predictor, config)?,
        })
    }

    pub(crate) async fn process_frame(
        &self,
        frame: &Frame,
        input: BackendInput,
    ) -> Result<BackendOutput, BackendError> {
        let BackendInput::Single(vehicle) = input else {
            return Err(BackendError::InvalidInput(format!(
                "{} classifies one detection at a time",
                NAME
            )));
        };

        let crop = PredictInput::region(frame.clone(), vehicle.bbox());
        let labels = self
            .batch_predict(vec![crop])
            .await?
            .pop()
            .unwrap_or_default();

        let best = labels
            .into_iter()
            .filter(|l| l.coords.is_empty() && l.confidence.is_finite())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .ok_or_else(|| BackendError::Inference("classifier returned no labels".to_string()))?;

        let mut out = BackendOutput::default();
        out.attributes.insert(ATTRIBUTE.to_string(), best.class_name);
        out.extra_data.insert(CONFIDENCE.to_string(), json!(best.confidence));
        Ok(out)
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

#[cfg(test)]
mod tests {
    use super::*;
    use vcap_core::{rect_to_coords, DetectionNode};

    /// Wide crops are red, narrow ones blue.
    struct ByWidth;

    impl Predictor for ByWidth {
        fn predict(&self, inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String> {
            Ok(inputs
                .iter()
                .map(|input| match input.region {
                    Some(r) if r.width > 50.0 => {
                        vec![RawDetection::label("red", 0.8), RawDetection::label("blue", 0.1)]
                    }
                    Some(_) => vec![RawDetection::label("blue", 0.7)],
                    None => Vec::new(),
                })
                .collect())
        }
    }

    #[test]
    fn test_capsule_is_valid() {
        assert!(capsule().validate().is_ok());
    }

    #[tokio::test]
    async fn test_best_label_becomes_attribute() {
        let backend = ClassifierBackend::load(Arc::new(ByWidth), BatchConfig::default()).unwrap();
        let wide = DetectionNode::new(DETECTION, rect_to_coords([0.0, 0.0, 100.0, 40.0]));

        let out = backend
            .process_frame(&Frame::blank(200, 200), BackendInput::Single(wide))
            .await
            .unwrap();
        assert!(out.detections.is_empty());
        assert_eq!(out.attributes[ATTRIBUTE], "red");
        assert_eq!(out.extra_data[CONFIDENCE], json!(0.8));

        backend.close().await;
    }

    #[tokio::test]
    async fn test_rejects_frame_level_input() {
        let backend = ClassifierBackend::load(Arc::new(ByWidth), BatchConfig::default()).unwrap();
        let err = backend
            .process_frame(&Frame::blank(8, 8), BackendInput::None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
        backend.close().await;
    }
}

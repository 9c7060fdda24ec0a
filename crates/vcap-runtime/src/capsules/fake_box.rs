//! A detector that always finds the same box. Useful for wiring checks.

use std::sync::atomic::{AtomicBool, Ordering};

use vcap_core::{rect_to_coords, Capsule, DetectionNode, Frame, NodeDescription, Size};

use crate::backend::{BackendInput, BackendOutput, PredictInput, RawDetection};
use crate::error::BackendError;

pub const NAME: &str = "detector_bounding_box_fake";
pub const DETECTION: &str = "fake_box";
const RECT: [f64; 4] = [10.0, 10.0, 100.0, 100.0];

pub fn capsule() -> Capsule {
    Capsule::new(
        NAME,
        1,
        NodeDescription::none(),
        NodeDescription::new(Size::All).detections([DETECTION]),
    )
    .with_description("Returns one fixed bounding box for every frame")
}

#[derive(Debug, Default)]
pub struct FakeBoxBackend {
    closed: AtomicBool,
}

impl FakeBoxBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed(NAME.to_string()));
        }
        Ok(())
    }

    pub(crate) fn process_frame(
        &self,
        _frame: &Frame,
        input: BackendInput,
    ) -> Result<BackendOutput, BackendError> {
        self.check_open()?;
        if input != BackendInput::None {
            return Err(BackendError::InvalidInput(format!(
                "{} takes no input detections",
                NAME
            )));
        }
        Ok(BackendOutput::detections(vec![DetectionNode::new(
            DETECTION,
            rect_to_coords(RECT),
        )]))
    }

    pub(crate) fn batch_predict(
        &self,
        inputs: Vec<PredictInput>,
    ) -> Result<Vec<Vec<RawDetection>>, BackendError> {
        self.check_open()?;
        Ok(inputs
            .iter()
            .map(|_| vec![RawDetection::new(DETECTION, 1.0, rect_to_coords(RECT))])
            .collect())
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcap_core::Point;

    #[test]
    fn test_capsule_is_valid() {
        assert!(capsule().validate().is_ok());
    }

    #[test]
    fn test_returns_fixed_box() {
        let backend = FakeBoxBackend::new();
        let out = backend
            .process_frame(&Frame::blank(640, 480), BackendInput::None)
            .unwrap();
        assert_eq!(out.detections.len(), 1);
        assert_eq!(
            out.detections[0].coords,
            vec![
                Point::new(10.0, 10.0),
                Point::new(100.0, 10.0),
                Point::new(100.0, 100.0),
                Point::new(10.0, 100.0),
            ]
        );
    }

    #[test]
    fn test_closed_backend_refuses_work() {
        let backend = FakeBoxBackend::new();
        backend.close();
        assert_eq!(
            backend.process_frame(&Frame::blank(1, 1), BackendInput::None),
            Err(BackendError::Closed(NAME.to_string()))
        );
    }
}

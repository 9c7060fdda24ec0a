//! A predictor that replays configured detections instead of running a model.

use tracing::debug;
use vcap_core::BoundingBox;
use vcap_runtime::{PredictInput, Predictor, RawDetection};

/// Reports the same scripted detections for every frame.
///
/// Whole-frame requests get every located detection. Region requests get
/// the located detections whose centre falls inside the region, plus every
/// unlocated label (used by classifiers).
pub struct ScriptedPredictor {
    device: String,
    script: Vec<RawDetection>,
}

impl ScriptedPredictor {
    pub fn new(device: impl Into<String>, script: Vec<RawDetection>) -> Self {
        Self {
            device: device.into(),
            script,
        }
    }

    fn answer(&self, input: &PredictInput) -> Vec<RawDetection> {
        match input.region {
            None => self
                .script
                .iter()
                .filter(|d| !d.coords.is_empty())
                .cloned()
                .collect(),
            Some(region) => self
                .script
                .iter()
                .filter(|d| d.coords.is_empty() || centre_in(&d.coords, &region))
                .cloned()
                .collect(),
        }
    }
}

fn centre_in(coords: &[vcap_core::Point], region: &BoundingBox) -> bool {
    match BoundingBox::from_coords(coords) {
        Some(b) => {
            let c = b.center();
            c.x >= region.x
                && c.x <= region.x + region.width
                && c.y >= region.y
                && c.y <= region.y + region.height
        }
        None => false,
    }
}

impl Predictor for ScriptedPredictor {
    fn predict(&self, inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String> {
        debug!(device = %self.device, batch = inputs.len(), "Scripted predict");
        Ok(inputs.iter().map(|i| self.answer(i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcap_core::{rect_to_coords, Frame};

    fn script() -> ScriptedPredictor {
        ScriptedPredictor::new(
            "CPU",
            vec![
                RawDetection::new("vehicle", 0.9, rect_to_coords([0.0, 0.0, 100.0, 50.0])),
                RawDetection::new("vehicle", 0.8, rect_to_coords([300.0, 0.0, 400.0, 50.0])),
                RawDetection::label("red", 0.7),
            ],
        )
    }

    #[test]
    fn test_whole_frame_gets_located_detections() {
        let out = script()
            .predict(&[PredictInput::frame(Frame::blank(640, 480))])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
    }

    #[test]
    fn test_region_gets_labels_and_contained_detections() {
        let region = BoundingBox::new(0.0, 0.0, 200.0, 100.0);
        let out = script()
            .predict(&[PredictInput::region(Frame::blank(640, 480), region)])
            .unwrap();
        let names: Vec<&str> = out[0].iter().map(|d| d.class_name.as_str()).collect();
        assert_eq!(names, vec!["vehicle", "red"]);
    }
}

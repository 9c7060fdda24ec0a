//! Reference capsules shipped with the runtime.

pub mod color_classifier;
pub mod face_detector;
pub mod fake_box;

use std::sync::Arc;

use tracing::info;
use vcap_batch::{BatchConfig, BatchScheduler};

use crate::backend::{Backend, PredictInput, Predictor, PredictorProcessor, RawDetection};
use crate::error::{BackendError, RegistryError};
use crate::registry::CapsuleRegistry;

/// Register the fake box detector, the face detector and the vehicle colour
/// classifier, the latter two driven by `predictor`.
pub async fn register_reference_capsules(
    registry: &CapsuleRegistry,
    predictor: Arc<dyn Predictor>,
    config: &BatchConfig,
) -> Result<(), RegistryError> {
    registry
        .register(fake_box::capsule(), Backend::FakeBox(fake_box::FakeBoxBackend::new()))
        .await?;
    registry
        .register(
            face_detector::capsule(),
            Backend::Detector(
                face_detector::DetectorBackend::load(predictor.clone(), config.clone())
                    .map_err(|source| RegistryError::Load {
                        capsule: face_detector::NAME.to_string(),
                        source,
                    })?,
            ),
        )
        .await?;
    registry
        .register(
            color_classifier::capsule(),
            Backend::Classifier(
                color_classifier::ClassifierBackend::load(predictor, config.clone()).map_err(
                    |source| RegistryError::Load {
                        capsule: color_classifier::NAME.to_string(),
                        source,
                    },
                )?,
            ),
        )
        .await?;
    info!("Registered {} reference capsules", registry.len());
    Ok(())
}

/// Submit every input before waiting on any, so they can share a batch.
pub(crate) async fn predict_all(
    scheduler: &BatchScheduler<PredictorProcessor>,
    inputs: Vec<PredictInput>,
) -> Result<Vec<Vec<RawDetection>>, BackendError> {
    let handles = inputs
        .into_iter()
        .map(|input| scheduler.submit(input))
        .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.wait().await?);
    }
    Ok(results)
}

pub(crate) fn spawn_scheduler(
    name: &str,
    predictor: Arc<dyn Predictor>,
    config: BatchConfig,
) -> Result<BatchScheduler<PredictorProcessor>, BackendError> {
    Ok(BatchScheduler::spawn(
        name,
        PredictorProcessor::new(predictor),
        config,
    )?)
}

//! Registration, versioned replacement and teardown

use std::sync::Arc;

use vcap_batch::BatchConfig;
use vcap_core::{Capsule, ContractError, Frame, NodeDescription, Size};
use vcap_runtime::capsules::fake_box::{self, FakeBoxBackend};
use vcap_runtime::{
    register_reference_capsules, Backend, BackendError, BackendInput, CapsuleRegistry,
    PredictInput, Predictor, RawDetection, RegistryError,
};

struct Nothing;

impl Predictor for Nothing {
    fn predict(&self, inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String> {
        Ok(vec![Vec::new(); inputs.len()])
    }
}

fn fake(version: u32) -> Capsule {
    let mut capsule = fake_box::capsule();
    capsule.version = version;
    capsule
}

fn fake_backend() -> Backend {
    Backend::FakeBox(FakeBoxBackend::new())
}

#[tokio::test]
async fn test_register_and_query() {
    let registry = CapsuleRegistry::new();
    assert!(registry.is_empty());

    registry.register(fake(1), fake_backend()).await.unwrap();
    assert!(registry.contains(fake_box::NAME));
    assert_eq!(registry.get(fake_box::NAME).unwrap().capsule.version, 1);
    assert_eq!(registry.capsules(), vec![fake(1)]);
    assert!(registry.get("missing").is_none());
}

#[tokio::test]
async fn test_same_or_lower_version_is_refused() {
    let registry = CapsuleRegistry::new();
    registry.register(fake(2), fake_backend()).await.unwrap();

    for version in [1, 2] {
        assert_eq!(
            registry.register(fake(version), fake_backend()).await,
            Err(RegistryError::VersionNotNewer {
                name: fake_box::NAME.to_string(),
                loaded: 2,
                offered: version,
            })
        );
    }
    assert_eq!(registry.get(fake_box::NAME).unwrap().capsule.version, 2);
}

#[tokio::test]
async fn test_higher_version_replaces_and_closes_old_backend() {
    let registry = CapsuleRegistry::new();
    registry.register(fake(1), fake_backend()).await.unwrap();
    let old = registry.get(fake_box::NAME).unwrap().backend;

    registry.register(fake(3), fake_backend()).await.unwrap();
    assert_eq!(registry.get(fake_box::NAME).unwrap().capsule.version, 3);

    let frame = Frame::blank(32, 32);
    let options = Default::default();
    assert_eq!(
        old.process_frame(&frame, BackendInput::None, &options).await,
        Err(BackendError::Closed(fake_box::NAME.to_string()))
    );
    let current = registry.get(fake_box::NAME).unwrap().backend;
    assert!(current
        .process_frame(&frame, BackendInput::None, &options)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_invalid_contract_is_refused() {
    let registry = CapsuleRegistry::new();
    let bad = Capsule::new(
        "bad",
        1,
        NodeDescription::new(Size::All),
        NodeDescription::new(Size::All).detections(["thing"]),
    );
    assert_eq!(
        registry.register(bad, fake_backend()).await,
        Err(RegistryError::Contract(ContractError::InputWithoutDetections(
            "bad".to_string()
        )))
    );
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_unregister_and_close() {
    let registry = CapsuleRegistry::new();
    register_reference_capsules(&registry, Arc::new(Nothing), &BatchConfig::default())
        .await
        .unwrap();
    assert_eq!(registry.len(), 3);

    registry.unregister(fake_box::NAME).await.unwrap();
    assert_eq!(
        registry.unregister(fake_box::NAME).await,
        Err(RegistryError::NotFound(fake_box::NAME.to_string()))
    );

    let detector = registry.get("face_detector").unwrap().backend;
    registry.close().await;
    assert!(registry.is_empty());

    let err = detector
        .batch_predict(vec![PredictInput::frame(Frame::blank(4, 4))])
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::Batch(vcap_batch::BatchError::Closed));
}

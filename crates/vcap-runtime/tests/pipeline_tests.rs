//! Composition and per-frame execution against a scripted scene

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use vcap_batch::{BatchConfig, BatchError};
use vcap_core::{
    rect_to_coords, Capsule, Frame, NodeDescription, NodeId, OptionError, OptionSpec, OptionValue,
    Size,
};
use vcap_runtime::capsules::{color_classifier, face_detector::DetectorBackend, fake_box};
use vcap_runtime::{
    Backend, BackendError, CapsuleRegistry, CompositionError, OptionOverrides, PipelineError,
    Pipeline, PredictInput, Predictor, RawDetection,
};

/// Two people and two vehicles in the frame. Looking inside a tall box finds
/// a face; looking inside a flat box yields colour labels by width.
#[derive(Default)]
struct Scene {
    calls: AtomicUsize,
}

impl Predictor for Scene {
    fn predict(&self, inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs
            .iter()
            .map(|input| match input.region {
                None => vec![
                    RawDetection::new("person", 0.9, rect_to_coords([0.0, 0.0, 100.0, 200.0])),
                    RawDetection::new("person", 0.8, rect_to_coords([200.0, 0.0, 300.0, 200.0])),
                    RawDetection::new("vehicle", 0.95, rect_to_coords([400.0, 0.0, 520.0, 60.0])),
                    RawDetection::new("vehicle", 0.9, rect_to_coords([600.0, 0.0, 640.0, 60.0])),
                ],
                Some(r) if r.height > 100.0 => vec![RawDetection::new(
                    "face",
                    0.99,
                    rect_to_coords([r.x + 10.0, r.y + 10.0, r.x + 40.0, r.y + 40.0]),
                )],
                Some(r) if r.width > 50.0 => {
                    vec![RawDetection::label("red", 0.8), RawDetection::label("blue", 0.2)]
                }
                Some(_) => vec![RawDetection::label("blue", 0.6)],
            })
            .collect())
    }
}

struct Broken;

impl Predictor for Broken {
    fn predict(&self, _inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String> {
        Err("device lost".to_string())
    }
}

fn detector_capsule(name: &str, input: NodeDescription, class: &str) -> Capsule {
    Capsule::new(
        name,
        1,
        input,
        NodeDescription::new(Size::All)
            .detections([class])
            .extra_data(["detection_confidence"]),
    )
    .with_option("threshold", OptionSpec::float("Minimum confidence", 0.5, 0.0, 1.0))
}

async fn scene_registry(predictor: Arc<dyn Predictor>) -> CapsuleRegistry {
    let registry = CapsuleRegistry::new();
    let config = BatchConfig::default();

    let detectors = [
        ("person_detector", NodeDescription::none(), "person"),
        ("vehicle_detector", NodeDescription::none(), "vehicle"),
        (
            "face_in_person",
            NodeDescription::new(Size::Single).detections(["person"]),
            "face",
        ),
    ];
    for (name, input, class) in detectors {
        let backend =
            DetectorBackend::with_classes(name, [class], predictor.clone(), config.clone()).unwrap();
        registry
            .register(detector_capsule(name, input, class), Backend::Detector(backend))
            .await
            .unwrap();
    }

    let classifier =
        color_classifier::ClassifierBackend::load(predictor.clone(), config.clone()).unwrap();
    registry
        .register(color_classifier::capsule(), Backend::Classifier(classifier))
        .await
        .unwrap();
    registry
        .register(fake_box::capsule(), Backend::FakeBox(fake_box::FakeBoxBackend::new()))
        .await
        .unwrap();
    registry
}

const ALL: [&str; 4] = [
    "face_in_person",
    "classifier_vehicle_color",
    "vehicle_detector",
    "person_detector",
];

#[tokio::test]
async fn test_order_is_independent_of_request_order() {
    let registry = scene_registry(Arc::new(Scene::default())).await;

    let forward = Pipeline::build(&registry, ALL, &OptionOverrides::new()).unwrap();
    let mut reversed_names = ALL;
    reversed_names.reverse();
    let reversed = Pipeline::build(&registry, reversed_names, &OptionOverrides::new()).unwrap();

    let expected = vec![
        "person_detector",
        "face_in_person",
        "vehicle_detector",
        "classifier_vehicle_color",
    ];
    assert_eq!(forward.order(), expected);
    assert_eq!(reversed.order(), expected);

    let frame = Frame::blank(640, 480);
    assert_eq!(
        forward.run(&frame).await.unwrap(),
        reversed.run(&frame).await.unwrap()
    );
    registry.close().await;
}

#[tokio::test]
async fn test_single_input_fans_out_with_lineage() {
    let registry = scene_registry(Arc::new(Scene::default())).await;
    let pipeline = Pipeline::build(&registry, ALL, &OptionOverrides::new()).unwrap();

    let set = pipeline.run(&Frame::blank(640, 480)).await.unwrap();
    let names: Vec<&str> = set.nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["person", "person", "face", "face", "vehicle", "vehicle"]);

    // one face per person, each parented to the person it was found in
    assert_eq!(set.get(NodeId(2)).unwrap().parent, Some(NodeId(0)));
    assert_eq!(set.get(NodeId(3)).unwrap().parent, Some(NodeId(1)));
    assert_eq!(set.children(NodeId(0)), vec![NodeId(2)]);
    assert_eq!(set.lineage(NodeId(3)), vec![NodeId(1)]);
    assert_eq!(
        set.get(NodeId(2)).unwrap().producer.as_deref(),
        Some("face_in_person")
    );

    // the classifier enriches the vehicles in place
    let wide = set.get(NodeId(4)).unwrap();
    let narrow = set.get(NodeId(5)).unwrap();
    assert_eq!(wide.attributes["color"], "red");
    assert_eq!(wide.extra_data["color_confidence"], json!(0.8));
    assert_eq!(narrow.attributes["color"], "blue");
    assert_eq!(wide.parent, None);
    registry.close().await;
}

#[tokio::test]
async fn test_option_override_changes_threshold() {
    let registry = scene_registry(Arc::new(Scene::default())).await;
    let overrides: OptionOverrides = [(
        "person_detector".to_string(),
        [("threshold".to_string(), OptionValue::Float(0.85))]
            .into_iter()
            .collect(),
    )]
    .into_iter()
    .collect();

    let pipeline = Pipeline::build(&registry, ["person_detector"], &overrides).unwrap();
    assert_eq!(
        pipeline.options("person_detector").unwrap().float("threshold"),
        Some(0.85)
    );
    let set = pipeline.run(&Frame::blank(640, 480)).await.unwrap();
    assert_eq!(set.len(), 1);
    registry.close().await;
}

#[tokio::test]
async fn test_out_of_bounds_option_is_rejected_not_clamped() {
    let registry = scene_registry(Arc::new(Scene::default())).await;
    let mut overrides = OptionOverrides::new();
    overrides.insert(
        "person_detector".to_string(),
        BTreeMap::from([("threshold".to_string(), OptionValue::Float(1.5))]),
    );

    let err = Pipeline::build(&registry, ["person_detector"], &overrides).err();
    assert!(matches!(
        err,
        Some(CompositionError::Option {
            source: OptionError::OutOfBounds { .. },
            ..
        })
    ));
    registry.close().await;
}

#[tokio::test]
async fn test_unsatisfiable_sets_process_no_frames() {
    let scene = Arc::new(Scene::default());
    let registry = scene_registry(scene.clone()).await;

    let err = vcap_runtime::run(
        &registry,
        &Frame::blank(640, 480),
        ["classifier_vehicle_color", "face_in_person"],
        &OptionOverrides::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Composition(CompositionError::UnsatisfiedDependency { .. })
    ));
    assert_eq!(scene.calls.load(Ordering::SeqCst), 0);
    registry.close().await;
}

#[tokio::test]
async fn test_unknown_and_duplicate_capsules() {
    let registry = scene_registry(Arc::new(Scene::default())).await;
    let none = OptionOverrides::new();

    assert_eq!(
        Pipeline::build(&registry, ["nope"], &none).err(),
        Some(CompositionError::UnknownCapsule("nope".to_string()))
    );
    assert_eq!(
        Pipeline::build(&registry, ["person_detector", "person_detector"], &none).err(),
        Some(CompositionError::DuplicateCapsule("person_detector".to_string()))
    );

    // overrides for a capsule that is not part of the request
    let mut stray = OptionOverrides::new();
    stray.insert("vehicle_detector".to_string(), BTreeMap::new());
    assert_eq!(
        Pipeline::build(&registry, ["person_detector"], &stray).err(),
        Some(CompositionError::UnknownCapsule("vehicle_detector".to_string()))
    );
    registry.close().await;
}

#[tokio::test]
async fn test_backend_failure_names_the_capsule() {
    let registry = scene_registry(Arc::new(Broken)).await;

    let err = vcap_runtime::run(
        &registry,
        &Frame::blank(64, 64),
        ["person_detector"],
        &OptionOverrides::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        PipelineError::Backend {
            capsule: "person_detector".to_string(),
            source: BackendError::Batch(BatchError::Backend("device lost".to_string())),
        }
    );
    registry.close().await;
}

#[tokio::test]
async fn test_fake_box_pipeline() {
    let registry = scene_registry(Arc::new(Scene::default())).await;
    let set = vcap_runtime::run(
        &registry,
        &Frame::blank(640, 480),
        [fake_box::NAME],
        &OptionOverrides::new(),
    )
    .await
    .unwrap();

    assert_eq!(set.len(), 1);
    let node = set.get(NodeId(0)).unwrap();
    assert_eq!(node.name, fake_box::DETECTION);
    assert_eq!(node.coords, rect_to_coords([10.0, 10.0, 100.0, 100.0]));
    registry.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_frames_share_batches() {
    let scene = Arc::new(Scene::default());
    let registry = scene_registry(scene.clone()).await;
    let pipeline = Arc::new(
        Pipeline::build(&registry, ["person_detector"], &OptionOverrides::new()).unwrap(),
    );

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pipeline = pipeline.clone();
        tasks.push(tokio::spawn(async move {
            pipeline.run(&Frame::blank(640, 480)).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().len(), 2);
    }
    // 16 frames, at most 8 per batch
    assert!(scene.calls.load(Ordering::SeqCst) >= 2);
    assert!(scene.calls.load(Ordering::SeqCst) <= 16);
    registry.close().await;
}

/// Records the size of every batch the backend receives.
#[derive(Default)]
struct BatchLog {
    scene: Scene,
    sizes: parking_lot::Mutex<Vec<usize>>,
}

impl Predictor for BatchLog {
    fn predict(&self, inputs: &[PredictInput]) -> Result<Vec<Vec<RawDetection>>, String> {
        self.sizes.lock().push(inputs.len());
        self.scene.predict(inputs)
    }
}

#[tokio::test]
async fn test_single_fan_out_shares_one_batch() {
    let log = Arc::new(BatchLog::default());
    let config = BatchConfig {
        max_batch_size: 8,
        max_wait_ms: 200,
        ..BatchConfig::default()
    };
    let registry = CapsuleRegistry::new();
    let detector = DetectorBackend::with_classes(
        "vehicle_detector",
        ["vehicle"],
        log.clone(),
        config.clone(),
    )
    .unwrap();
    registry
        .register(
            detector_capsule("vehicle_detector", NodeDescription::none(), "vehicle"),
            Backend::Detector(detector),
        )
        .await
        .unwrap();
    let classifier = color_classifier::ClassifierBackend::load(log.clone(), config).unwrap();
    registry
        .register(color_classifier::capsule(), Backend::Classifier(classifier))
        .await
        .unwrap();

    let set = vcap_runtime::run(
        &registry,
        &Frame::blank(640, 480),
        ["vehicle_detector", "classifier_vehicle_color"],
        &OptionOverrides::new(),
    )
    .await
    .unwrap();

    // one whole-frame request, then both vehicle crops together
    assert_eq!(*log.sizes.lock(), vec![1, 2]);
    assert_eq!(set.get(NodeId(0)).unwrap().attributes["color"], "red");
    assert_eq!(set.get(NodeId(1)).unwrap().attributes["color"], "blue");
    registry.close().await;
}

#[tokio::test]
async fn test_undeclared_enrichment_is_rejected() {
    let registry = scene_registry(Arc::new(Scene::default())).await;

    // same backend, but the declaration leaves out color_confidence
    let narrow = Capsule::new(
        "color_only",
        1,
        NodeDescription::new(Size::Single).detections(["vehicle"]),
        NodeDescription::new(Size::Single)
            .detections(["vehicle"])
            .attributes(["color"]),
    );
    let backend =
        color_classifier::ClassifierBackend::load(Arc::new(Scene::default()), BatchConfig::default())
            .unwrap();
    registry
        .register(narrow, Backend::Classifier(backend))
        .await
        .unwrap();

    let err = vcap_runtime::run(
        &registry,
        &Frame::blank(640, 480),
        ["vehicle_detector", "color_only"],
        &OptionOverrides::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Backend {
            ref capsule,
            source: BackendError::InvalidOutput(ref msg),
        } if capsule == "color_only" && msg.contains("color_confidence")
    ));
    registry.close().await;
}

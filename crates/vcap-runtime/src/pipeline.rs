//! Pipeline composer.
//!
//! Building a [`Pipeline`] resolves the requested capsules against the
//! registry, validates their options and fixes one execution order: a
//! capsule runs after every requested capsule that provides data it
//! requires. Capsules with no ordering constraint between them run in name
//! order, so the result never depends on the order they were requested in.
//!
//! Running a pipeline feeds each capsule the detections produced so far,
//! filtered to its declared input:
//!
//! | input size | invocations                                   |
//! |------------|-----------------------------------------------|
//! | `NONE`     | one, without detections                       |
//! | `SINGLE`   | one per matching detection, which becomes the parent of the outputs |
//! | `ALL`      | one with every matching detection, skipped when there are none |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};
use vcap_core::{Capsule, DataTag, DetectionSet, Frame, NodeId, OptionValue, OptionValues, Size};

use crate::backend::{Backend, BackendInput, BackendOutput};
use crate::error::{BackendError, CompositionError, PipelineError, Result};
use crate::registry::CapsuleRegistry;

/// Option overrides keyed by capsule name, then option name.
pub type OptionOverrides = BTreeMap<String, BTreeMap<String, OptionValue>>;

struct Stage {
    capsule: Capsule,
    backend: Arc<Backend>,
    options: OptionValues,
}

/// An ordered, validated set of capsules ready to process frames.
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn build<I, S>(
        registry: &CapsuleRegistry,
        capsules: I,
        overrides: &OptionOverrides,
    ) -> std::result::Result<Self, CompositionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested: BTreeMap<String, Stage> = BTreeMap::new();
        for name in capsules {
            let name = name.as_ref();
            let loaded = registry
                .get(name)
                .ok_or_else(|| CompositionError::UnknownCapsule(name.to_string()))?;
            if requested.contains_key(name) {
                return Err(CompositionError::DuplicateCapsule(name.to_string()));
            }
            requested.insert(
                name.to_string(),
                Stage {
                    capsule: loaded.capsule,
                    backend: loaded.backend,
                    options: OptionValues::new(),
                },
            );
        }

        if let Some(target) = overrides.keys().find(|k| !requested.contains_key(*k)) {
            return Err(CompositionError::UnknownCapsule(target.clone()));
        }
        let empty = BTreeMap::new();
        for (name, stage) in requested.iter_mut() {
            stage.options = stage
                .capsule
                .resolve_options(overrides.get(name).unwrap_or(&empty))
                .map_err(|source| CompositionError::Option {
                    capsule: name.clone(),
                    source,
                })?;
        }

        let declarations: Vec<&Capsule> = requested.values().map(|s| &s.capsule).collect();
        let order = execution_order(&declarations)?;

        let stages: Vec<Stage> = order
            .iter()
            .filter_map(|name| requested.remove(name))
            .collect();
        info!("Pipeline order: {}", order.join(" -> "));
        Ok(Self { stages })
    }

    /// Capsule names in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.capsule.name.as_str()).collect()
    }

    pub fn options(&self, capsule: &str) -> Option<&OptionValues> {
        self.stages
            .iter()
            .find(|s| s.capsule.name == capsule)
            .map(|s| &s.options)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Process one frame through every capsule in order.
    pub async fn run(&self, frame: &Frame) -> Result<DetectionSet> {
        let mut set = DetectionSet::new();
        for stage in &self.stages {
            run_stage(stage, frame, &mut set)
                .await
                .map_err(|source| PipelineError::Backend {
                    capsule: stage.capsule.name.clone(),
                    source,
                })?;
        }
        Ok(set)
    }
}

/// Build a pipeline for `capsules` and run it on one frame.
pub async fn run<I, S>(
    registry: &CapsuleRegistry,
    frame: &Frame,
    capsules: I,
    overrides: &OptionOverrides,
) -> Result<DetectionSet>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Pipeline::build(registry, capsules, overrides)?
        .run(frame)
        .await
}

async fn run_stage(
    stage: &Stage,
    frame: &Frame,
    set: &mut DetectionSet,
) -> std::result::Result<(), BackendError> {
    let input_type = &stage.capsule.input_type;
    let matching: Vec<NodeId> = set
        .iter()
        .filter(|(_, node)| input_type.describes(node))
        .map(|(id, _)| id)
        .collect();

    match input_type.size {
        Size::None => {
            let out = stage
                .backend
                .process_frame(frame, BackendInput::None, &stage.options)
                .await?;
            append(stage, set, None, out)?;
        }
        Size::Single => {
            let drivers = matching
                .iter()
                .map(|&id| {
                    set.get(id)
                        .cloned()
                        .map(|node| (id, node))
                        .ok_or_else(|| BackendError::InvalidInput(format!("missing detection {}", id)))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Start every invocation before awaiting any so they share batches
            let outputs = try_join_all(drivers.into_iter().map(|(id, driver)| async move {
                let out = stage
                    .backend
                    .process_frame(frame, BackendInput::Single(driver), &stage.options)
                    .await?;
                Ok::<_, BackendError>((id, out))
            }))
            .await?;

            for (id, out) in outputs {
                append(stage, set, Some(id), out)?;
            }
        }
        Size::All => {
            if matching.is_empty() {
                debug!(capsule = %stage.capsule.name, "No matching detections, skipped");
                return Ok(());
            }
            let nodes = matching
                .iter()
                .filter_map(|&id| set.get(id).cloned())
                .collect();
            let out = stage
                .backend
                .process_frame(frame, BackendInput::All(nodes), &stage.options)
                .await?;
            append(stage, set, None, out)?;
        }
    }
    Ok(())
}

/// Add a backend's output to the frame's set, tagged with its producer.
fn append(
    stage: &Stage,
    set: &mut DetectionSet,
    driver: Option<NodeId>,
    out: BackendOutput,
) -> std::result::Result<(), BackendError> {
    let output_type = &stage.capsule.output_type;
    let declared = &output_type.detections;

    if let Some(key) = out
        .attributes
        .keys()
        .find(|k| !output_type.attributes.contains(*k))
    {
        return Err(BackendError::InvalidOutput(format!(
            "undeclared attribute '{}'",
            key
        )));
    }
    if let Some(key) = out
        .extra_data
        .keys()
        .find(|k| !output_type.extra_data.contains(*k))
    {
        return Err(BackendError::InvalidOutput(format!(
            "undeclared extra data '{}'",
            key
        )));
    }

    if out.has_enrichment() {
        let id = driver.ok_or_else(|| {
            BackendError::InvalidOutput(
                "attributes or extra data returned without a driving detection".to_string(),
            )
        })?;
        if let Some(node) = set.get_mut(id) {
            node.attributes.extend(out.attributes);
            node.extra_data.extend(out.extra_data);
        }
    }

    for mut node in out.detections {
        node.validate()
            .map_err(|e| BackendError::InvalidOutput(e.to_string()))?;
        if !declared.contains(&node.name) {
            return Err(BackendError::InvalidOutput(format!(
                "undeclared detection type '{}'",
                node.name
            )));
        }
        node.producer = Some(stage.capsule.name.clone());
        match driver {
            Some(parent) => {
                set.push_child(parent, node)
                    .map_err(|e| BackendError::InvalidOutput(e.to_string()))?;
            }
            None => {
                set.push(node);
            }
        }
    }
    Ok(())
}

/// Topological order over provided and required data tags, ties broken by
/// capsule name.
pub fn execution_order(capsules: &[&Capsule]) -> std::result::Result<Vec<String>, CompositionError> {
    let provides: BTreeMap<&str, BTreeSet<DataTag>> = capsules
        .iter()
        .map(|c| (c.name.as_str(), c.provides()))
        .collect();

    // producer -> consumers, and the number of producers each consumer waits on
    let mut consumers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut waiting: BTreeMap<&str, usize> = capsules.iter().map(|c| (c.name.as_str(), 0)).collect();

    for capsule in capsules {
        let mut producers = BTreeSet::new();
        for tag in capsule.requires() {
            let found: Vec<&str> = provides
                .iter()
                .filter(|(name, tags)| **name != capsule.name && tags.contains(&tag))
                .map(|(name, _)| *name)
                .collect();
            if found.is_empty() {
                return Err(CompositionError::UnsatisfiedDependency {
                    capsules: vec![capsule.name.clone()],
                    detail: format!("no requested capsule provides {}", tag),
                });
            }
            producers.extend(found);
        }
        for &producer in &producers {
            consumers.entry(producer).or_default().insert(capsule.name.as_str());
        }
        waiting.insert(capsule.name.as_str(), producers.len());
    }

    let mut ready: BTreeSet<&str> = waiting
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(capsules.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.to_string());
        for &consumer in consumers.get(next).into_iter().flatten() {
            if let Some(n) = waiting.get_mut(consumer) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(consumer);
                }
            }
        }
    }

    if order.len() < capsules.len() {
        let stuck = waiting
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        return Err(CompositionError::UnsatisfiedDependency {
            capsules: stuck,
            detail: "dependency cycle".to_string(),
        });
    }
    Ok(order)
}

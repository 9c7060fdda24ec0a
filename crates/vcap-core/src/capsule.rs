//! Capsule declarations.
//!
//! A [`Capsule`] is pure metadata: a unique name, a version, the typed IO
//! contract and the option declarations. The loadable, stateful counterpart
//! (the backend) lives in `vcap-runtime`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ContractError, OptionError};
use crate::node::{tags, DataTag, NodeDescription, Size};
use crate::options::{resolve_options, OptionSpec, OptionValue, OptionValues};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: u32,
    pub input_type: NodeDescription,
    pub output_type: NodeDescription,
    #[serde(default)]
    pub options: BTreeMap<String, OptionSpec>,
}

impl Capsule {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        input_type: NodeDescription,
        output_type: NodeDescription,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version,
            input_type,
            output_type,
            options: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, spec: OptionSpec) -> Self {
        self.options.insert(name.into(), spec);
        self
    }

    /// Check the declaration against the typed IO contract.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.name.trim().is_empty() {
            return Err(ContractError::EmptyName);
        }
        if self.version == 0 {
            return Err(ContractError::InvalidVersion(self.name.clone()));
        }

        match self.input_type.size {
            Size::None if !self.input_type.is_empty() => {
                return Err(ContractError::NoneInputWithTags(self.name.clone()))
            }
            Size::Single | Size::All if self.input_type.detections.is_empty() => {
                return Err(ContractError::InputWithoutDetections(self.name.clone()))
            }
            _ => {}
        }

        match self.output_type.size {
            Size::None if !self.output_type.is_empty() => {
                return Err(ContractError::NoneOutputWithTags(self.name.clone()))
            }
            Size::Single if self.input_type.size != Size::Single => {
                return Err(ContractError::SingleOutputNeedsSingleInput(
                    self.name.clone(),
                ))
            }
            _ => {}
        }

        for (name, spec) in &self.options {
            spec.check_declaration(name)
                .map_err(|source| ContractError::Option {
                    capsule: self.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Data that must exist before this capsule can run.
    pub fn requires(&self) -> BTreeSet<DataTag> {
        tags(&self.input_type)
    }

    /// Data this capsule adds to the frame.
    ///
    /// Tags that also appear on the input side are enrichments of data that
    /// already exists, so they are not counted as provided.
    pub fn provides(&self) -> BTreeSet<DataTag> {
        let required = self.requires();
        tags(&self.output_type)
            .into_iter()
            .filter(|t| !required.contains(t))
            .collect()
    }

    /// Defaults merged with caller overrides, validated against the declarations.
    pub fn resolve_options(
        &self,
        overrides: &BTreeMap<String, OptionValue>,
    ) -> Result<OptionValues, OptionError> {
        resolve_options(&self.options, overrides)
    }
}

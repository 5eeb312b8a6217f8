//! Adaptor stack configuration
//!
//! A stack is described as a list of `{ "name": ..., "params": {...} }`
//! records, applied bottom-up on top of the base manager:
//!
//! ```json
//! [
//!   {"name": "neighbour_list", "params": {"cutoff": 3.0, "list_type": "half"}},
//!   {"name": "strict", "params": {"cutoff": 3.0, "max_order": 3}}
//! ]
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::managers::ManagerError;

/// Default number of periodic image layers a neighbour list may generate
pub const DEFAULT_MAX_IMAGE_LAYERS: u32 = 4;

/// Pair storage convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighbourListType {
    /// Every pair stored once, (i, j) with key(i) < key(j)
    Half,
    /// Every pair stored from both sides
    #[default]
    Full,
}

impl NeighbourListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeighbourListType::Half => "half",
            NeighbourListType::Full => "full",
        }
    }
}

impl fmt::Display for NeighbourListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NeighbourListType {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "half" => Ok(NeighbourListType::Half),
            "full" => Ok(NeighbourListType::Full),
            other => Err(ManagerError::Configuration(format!(
                "unknown neighbour list type '{}', expected 'half' or 'full'",
                other
            ))),
        }
    }
}

fn default_max_image_layers() -> u32 {
    DEFAULT_MAX_IMAGE_LAYERS
}

fn default_max_order() -> usize {
    2
}

/// Parameters of the neighbour-list adaptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighbourListParams {
    pub cutoff: f64,
    /// Extra search distance; enables topology reuse for small displacements
    #[serde(default)]
    pub skin: f64,
    /// Promote ghost atoms to centers with their own neighbours
    #[serde(default)]
    pub consider_ghost_neighbours: bool,
    #[serde(default)]
    pub list_type: NeighbourListType,
    /// Upper bound on periodic image layers along any axis
    #[serde(default = "default_max_image_layers")]
    pub max_image_layers: u32,
}

impl NeighbourListParams {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            skin: 0.0,
            consider_ghost_neighbours: false,
            list_type: NeighbourListType::default(),
            max_image_layers: DEFAULT_MAX_IMAGE_LAYERS,
        }
    }

    pub fn with_skin(mut self, skin: f64) -> Self {
        self.skin = skin;
        self
    }

    pub fn with_list_type(mut self, list_type: NeighbourListType) -> Self {
        self.list_type = list_type;
        self
    }

    pub fn with_ghost_neighbours(mut self, consider: bool) -> Self {
        self.consider_ghost_neighbours = consider;
        self
    }

    pub fn with_max_image_layers(mut self, layers: u32) -> Self {
        self.max_image_layers = layers;
        self
    }

    /// `cutoff + skin`
    pub fn interaction_radius(&self) -> f64 {
        self.cutoff + self.skin
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(ManagerError::Configuration(format!(
                "neighbour list cutoff must be positive and finite, got {}",
                self.cutoff
            )));
        }
        if !(self.skin.is_finite() && self.skin >= 0.0) {
            return Err(ManagerError::Configuration(format!(
                "neighbour list skin must be non-negative and finite, got {}",
                self.skin
            )));
        }
        if self.max_image_layers == 0 {
            return Err(ManagerError::Configuration(
                "max_image_layers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the strict-cutoff adaptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrictParams {
    pub cutoff: f64,
    /// 2 keeps pairs, 3 also builds triplets
    #[serde(default = "default_max_order")]
    pub max_order: usize,
}

impl StrictParams {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            max_order: default_max_order(),
        }
    }

    pub fn with_triplets(mut self) -> Self {
        self.max_order = 3;
        self
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(ManagerError::Configuration(format!(
                "strict cutoff must be positive and finite, got {}",
                self.cutoff
            )));
        }
        if !(2..=3).contains(&self.max_order) {
            return Err(ManagerError::Configuration(format!(
                "strict max_order must be 2 or 3, got {}",
                self.max_order
            )));
        }
        Ok(())
    }
}

/// One layer of the adaptor stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "snake_case")]
pub enum AdaptorConfig {
    NeighbourList(NeighbourListParams),
    Strict(StrictParams),
}

impl AdaptorConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AdaptorConfig::NeighbourList(_) => "neighbour_list",
            AdaptorConfig::Strict(_) => "strict",
        }
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        match self {
            AdaptorConfig::NeighbourList(params) => params.validate(),
            AdaptorConfig::Strict(params) => params.validate(),
        }
    }

    /// Parse and validate a single adaptor record
    pub fn from_json(json: &str) -> Result<Self, ManagerError> {
        let config: AdaptorConfig = serde_json::from_str(json).map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse and validate a JSON array of adaptor records
pub fn parse_adaptor_stack(json: &str) -> Result<Vec<AdaptorConfig>, ManagerError> {
    let configs: Vec<AdaptorConfig> = serde_json::from_str(json).map_err(config_error)?;
    for config in &configs {
        config.validate()?;
    }
    Ok(configs)
}

fn config_error(err: serde_json::Error) -> ManagerError {
    ManagerError::Configuration(err.to_string())
}

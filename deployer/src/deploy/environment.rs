//! Pipeline stages and the environment adjacency table

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// An ordered deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Dev,
    Test,
    Live,
}

impl PipelineStage {
    /// All stages in promotion order
    pub const ALL: [PipelineStage; 3] = [PipelineStage::Dev, PipelineStage::Test, PipelineStage::Live];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Dev => "dev",
            PipelineStage::Test => "test",
            PipelineStage::Live => "live",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| {
                DeployError::InvalidEnvironment(format!(
                    "Website with {} environment is not correct.",
                    s
                ))
            })
    }
}

/// Each non-initial stage and the stage it is promoted from.
///
/// Adding or removing a stage only touches this table and `PipelineStage`.
const ADJACENCY: &[(PipelineStage, PipelineStage)] = &[
    (PipelineStage::Test, PipelineStage::Dev),
    (PipelineStage::Live, PipelineStage::Test),
];

/// Look up the predecessor of a stage
pub fn predecessor(stage: PipelineStage) -> Result<PipelineStage, DeployError> {
    ADJACENCY
        .iter()
        .find(|(target, _)| *target == stage)
        .map(|(_, source)| *source)
        .ok_or_else(|| {
            DeployError::InvalidEnvironment(format!(
                "The {} environment has no environment to deploy from.",
                stage
            ))
        })
}

/// Resolve the environment code must come from to reach `name`
pub fn previous_environment(name: &str) -> Result<PipelineStage, DeployError> {
    predecessor(name.parse()?)
}

/// A (site, environment) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentRef {
    pub site: String,
    pub stage: PipelineStage,
}

impl EnvironmentRef {
    pub fn new(site: impl Into<String>, stage: PipelineStage) -> Self {
        Self {
            site: site.into(),
            stage,
        }
    }

    /// The same site at another stage
    pub fn with_stage(&self, stage: PipelineStage) -> Self {
        Self::new(self.site.clone(), stage)
    }
}

impl fmt::Display for EnvironmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.site, self.stage)
    }
}

impl FromStr for EnvironmentRef {
    type Err = DeployError;

    /// Parse `<site>.<env>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (site, env) = s.rsplit_once('.').ok_or_else(|| {
            DeployError::InvalidEnvironment(format!(
                "Expected <site>.<env>, got '{}'",
                s
            ))
        })?;
        if site.is_empty() {
            return Err(DeployError::InvalidEnvironment(format!(
                "Missing site name in '{}'",
                s
            )));
        }
        Ok(Self::new(site, env.parse()?))
    }
}

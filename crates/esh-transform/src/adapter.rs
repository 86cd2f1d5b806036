//! The adapter seam between the canonical model and a framework schema.

use esh_core::HarmonyConfig;
use esh_model::EnergySystem;
use serde::{Deserialize, Serialize};

use crate::deviation::Deviation;
use crate::error::TransformResult;
use crate::framework::Framework;
use crate::shared::prune::PrunedTopology;

/// What to do with connectors in frameworks without a native link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorPolicy {
    /// Express the connector as two one-way conversions.
    #[default]
    Synthesize,
    /// Fail with `UnsupportedComponent`.
    Reject,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Prune for frameworks that cannot handle never-used chains.
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    pub connector_policy: ConnectorPolicy,
    pub prune: PrunePolicy,
}

/// A native model together with what the transformation changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transformation<N> {
    pub framework: Framework,
    pub native: N,
    pub deviations: Vec<Deviation>,
    pub pruned: PrunedTopology,
}

impl<N> Transformation<N> {
    /// True when no construct had to be re-expressed.
    pub fn is_exact(&self) -> bool {
        self.deviations.is_empty()
    }

    pub fn deviations_at<'a>(&'a self, uid: &'a str) -> impl Iterator<Item = &'a Deviation> {
        self.deviations.iter().filter(move |d| d.uid == uid)
    }
}

/// Forward transformation of a canonical model into one framework.
///
/// Adapters are stateless and only borrow the model. Everything that could
/// not be expressed exactly is either reported as a deviation or fails the
/// whole transformation.
pub trait Adapter: Send + Sync {
    type Input: Clone + Send + Sync + Serialize;

    fn framework(&self) -> Framework;

    fn transform(
        &self,
        system: &EnergySystem,
        options: &AdapterOptions,
        config: &HarmonyConfig,
    ) -> TransformResult<Transformation<Self::Input>>;
}

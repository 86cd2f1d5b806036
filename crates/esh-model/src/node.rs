//! Node kinds of the canonical model.

use std::collections::BTreeMap;

use esh_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::params::{Bounds, Directional, Efficiency, Expansion, ParamError, Profile, SocPolicy};
use crate::params::{efficiency, fraction};
use crate::uid::Uid;

/// A node to be added to a [`SystemBuilder`](crate::SystemBuilder).
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub uid: Uid,
    pub kind: NodeKind,
}

impl Component {
    pub fn new(uid: impl Into<Uid>, kind: NodeKind) -> Self {
        Self {
            uid: uid.into(),
            kind,
        }
    }

    pub fn bus(uid: impl Into<Uid>) -> Self {
        Self::new(uid, NodeKind::Bus)
    }

    pub fn source(uid: impl Into<Uid>) -> Self {
        Self::new(uid, NodeKind::Source(EndpointParams::default()))
    }

    pub fn sink(uid: impl Into<Uid>) -> Self {
        Self::new(uid, NodeKind::Sink(EndpointParams::default()))
    }

    /// Attach an absolute per-timestep profile (sources and sinks only).
    pub fn with_profile(mut self, profile: Profile) -> Self {
        if let NodeKind::Source(p) | NodeKind::Sink(p) = &mut self.kind {
            p.profile = Some(profile);
        }
        self
    }

    pub fn transformer(uid: impl Into<Uid>, factors: ConversionFactors) -> Self {
        Self::new(uid, NodeKind::Transformer(TransformerParams { factors }))
    }

    pub fn chp(uid: impl Into<Uid>, params: ChpParams) -> Self {
        Self::new(uid, NodeKind::Chp(params))
    }

    pub fn storage(uid: impl Into<Uid>, params: StorageParams) -> Self {
        Self::new(uid, NodeKind::Storage(params))
    }

    pub fn connector(uid: impl Into<Uid>, params: ConnectorParams) -> Self {
        Self::new(uid, NodeKind::Connector(params))
    }
}

/// A node of a built energy system.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub uid: Uid,
    pub kind: NodeKind,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.uid.name
    }

    pub fn is_bus(&self) -> bool {
        matches!(self.kind, NodeKind::Bus)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Bus,
    Source(EndpointParams),
    Sink(EndpointParams),
    Transformer(TransformerParams),
    Chp(ChpParams),
    Storage(StorageParams),
    Connector(ConnectorParams),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Bus => "bus",
            NodeKind::Source(_) => "source",
            NodeKind::Sink(_) => "sink",
            NodeKind::Transformer(_) => "transformer",
            NodeKind::Chp(_) => "chp",
            NodeKind::Storage(_) => "storage",
            NodeKind::Connector(_) => "connector",
        }
    }
}

/// Parameters of a source or sink.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl EndpointParams {
    pub fn is_fixed(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_fixed)
    }
}

/// Conversion factor per attached bus, keyed by bus name.
///
/// A transformer running at activity `a` moves `factor[x] * a` on the flow
/// to or from bus `x`.
pub type ConversionFactors = BTreeMap<String, Efficiency>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformerParams {
    pub factors: ConversionFactors,
}

impl TransformerParams {
    pub fn factor(&self, bus: &str) -> Option<&Efficiency> {
        self.factors.get(bus)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChpOutput {
    pub bus: String,
    pub efficiency: f64,
}

/// Combined heat and power unit: one fuel input, two coupled outputs with
/// constant efficiencies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChpParams {
    pub input: String,
    pub outputs: [ChpOutput; 2],
}

impl ChpParams {
    pub fn new(
        input: impl Into<String>,
        primary: (impl Into<String>, f64),
        secondary: (impl Into<String>, f64),
    ) -> Result<Self, ParamError> {
        Ok(Self {
            input: input.into(),
            outputs: [
                ChpOutput {
                    bus: primary.0.into(),
                    efficiency: efficiency(primary.1)?,
                },
                ChpOutput {
                    bus: secondary.0.into(),
                    efficiency: efficiency(secondary.1)?,
                },
            ],
        })
    }

    pub fn primary(&self) -> &ChpOutput {
        &self.outputs[0]
    }

    pub fn secondary(&self) -> &ChpOutput {
        &self.outputs[1]
    }

    /// Fixed ratio primary output / secondary output.
    pub fn output_ratio(&self) -> f64 {
        self.outputs[0].efficiency / self.outputs[1].efficiency
    }

    pub fn total_efficiency(&self) -> f64 {
        self.outputs[0].efficiency + self.outputs[1].efficiency
    }

    pub fn efficiency_of(&self, bus: &str) -> Option<f64> {
        self.outputs
            .iter()
            .find(|o| o.bus == bus)
            .map(|o| o.efficiency)
    }
}

/// Storage attached to a single bus.
///
/// Capacity is an energy quantity (MWh). `initial_soc` is a fraction of the
/// installed capacity and `loss_rate` the fraction of content lost per
/// timestep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageParams {
    pub bus: String,
    pub capacity: Bounds,
    pub initial_soc: f64,
    pub soc_policy: SocPolicy,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
    pub loss_rate: f64,
    pub expansion: Option<Expansion>,
}

impl StorageParams {
    pub fn new(bus: impl Into<String>, capacity: Bounds) -> Self {
        Self {
            bus: bus.into(),
            capacity,
            initial_soc: 0.0,
            soc_policy: SocPolicy::Free,
            charge_efficiency: 1.0,
            discharge_efficiency: 1.0,
            loss_rate: 0.0,
            expansion: None,
        }
    }

    pub fn initial_soc(mut self, fraction: f64) -> Self {
        self.initial_soc = fraction;
        self
    }

    pub fn soc_policy(mut self, policy: SocPolicy) -> Self {
        self.soc_policy = policy;
        self
    }

    pub fn efficiencies(mut self, charge: f64, discharge: f64) -> Self {
        self.charge_efficiency = charge;
        self.discharge_efficiency = discharge;
        self
    }

    pub fn loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn expansion(mut self, expansion: Expansion) -> Self {
        self.expansion = Some(expansion);
        self
    }

    pub fn round_trip_efficiency(&self) -> f64 {
        self.charge_efficiency * self.discharge_efficiency
    }

    pub(crate) fn check(&self) -> Result<(), ParamError> {
        fraction("initial_soc", self.initial_soc)?;
        fraction("loss_rate", self.loss_rate)?;
        efficiency(self.charge_efficiency)?;
        efficiency(self.discharge_efficiency)?;
        fraction("charge efficiency", self.charge_efficiency)?;
        fraction("discharge efficiency", self.discharge_efficiency)?;
        Ok(())
    }
}

/// Bidirectional lossy link between two buses.
///
/// `forward` moves energy from `bus_a` to `bus_b`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectorParams {
    pub bus_a: String,
    pub bus_b: String,
    pub efficiency: Directional<f64>,
}

impl ConnectorParams {
    pub fn new(
        bus_a: impl Into<String>,
        bus_b: impl Into<String>,
        efficiency: Directional<f64>,
    ) -> Self {
        Self {
            bus_a: bus_a.into(),
            bus_b: bus_b.into(),
            efficiency,
        }
    }

    pub(crate) fn check(&self) -> Result<(), ParamError> {
        efficiency(self.efficiency.forward)?;
        efficiency(self.efficiency.backward)?;
        fraction("forward efficiency", self.efficiency.forward)?;
        fraction("backward efficiency", self.efficiency.backward)?;
        Ok(())
    }
}

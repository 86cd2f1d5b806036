//! Directed flows between nodes.

use core::fmt;
use core::str::FromStr;

use esh_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

use crate::params::{Bounds, Expansion};

/// A directed flow of a built system.
///
/// There is at most one flow per ordered pair of nodes. `costs` and
/// `emissions` are specific values per MWh moved.
#[derive(Clone, Debug, PartialEq)]
pub struct Flow {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub carrier: Option<String>,
    pub bounds: Bounds,
    pub costs: f64,
    pub emissions: f64,
    pub expansion: Option<Expansion>,
}

impl Flow {
    pub fn is_expandable(&self) -> bool {
        self.expansion.is_some()
    }

    /// Capacity present before any expansion.
    pub fn original_capacity(&self) -> f64 {
        self.bounds.max()
    }
}

/// Flow description used while building, endpoints referenced by name.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowSpec {
    pub from: String,
    pub to: String,
    pub carrier: Option<String>,
    pub bounds: Bounds,
    pub costs: f64,
    pub emissions: f64,
    pub expansion: Option<Expansion>,
}

impl FlowSpec {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            carrier: None,
            bounds: Bounds::unbounded(),
            costs: 0.0,
            emissions: 0.0,
            expansion: None,
        }
    }

    pub fn carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn costs(mut self, costs: f64) -> Self {
        self.costs = costs;
        self
    }

    pub fn emissions(mut self, emissions: f64) -> Self {
        self.emissions = emissions;
        self
    }

    pub fn expansion(mut self, expansion: Expansion) -> Self {
        self.expansion = Some(expansion);
        self
    }

    pub fn label(&self) -> EdgeLabel {
        EdgeLabel::new(&self.from, &self.to)
    }
}

const SEPARATOR: &str = "->";

/// Name-based key of a flow, written `from->to`.
///
/// Used as key of per-edge result maps; node names may not contain the
/// separator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EdgeLabel {
    pub from: String,
    pub to: String,
}

impl EdgeLabel {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.from, self.to)
    }
}

impl FromStr for EdgeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(SEPARATOR) {
            Some((from, to)) if !from.is_empty() && !to.is_empty() => Ok(EdgeLabel::new(from, to)),
            _ => Err(format!("'{s}' is not an edge label of the form from{SEPARATOR}to")),
        }
    }
}

impl TryFrom<String> for EdgeLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EdgeLabel> for String {
    fn from(label: EdgeLabel) -> Self {
        label.to_string()
    }
}

pub(crate) fn valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(SEPARATOR)
}

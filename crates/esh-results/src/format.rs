//! Presentation attributes derived from the model and its results.
//!
//! `Formatier` styles nodes from the canonical model alone; `Hybridier`
//! scales the styled graph by a normalized result. Neither draws anything.

use std::collections::BTreeMap;

use esh_model::{EdgeLabel, EnergySystem, Node, NodeKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Circle,
    Triangle,
    InvertedTriangle,
    Box,
    Octagon,
    Cylinder,
    Diamond,
}

impl Shape {
    pub fn of(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Bus => Shape::Circle,
            NodeKind::Source(_) => Shape::Triangle,
            NodeKind::Sink(_) => Shape::InvertedTriangle,
            NodeKind::Transformer(_) => Shape::Box,
            NodeKind::Chp(_) => Shape::Octagon,
            NodeKind::Storage(_) => Shape::Cylinder,
            NodeKind::Connector(_) => Shape::Diamond,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeStyle {
    pub name: String,
    pub label: String,
    pub color: Rgb,
    pub shape: Shape,
    pub legend_group: String,
}

const FALLBACK: [Rgb; 6] = [
    Rgb(0x8c, 0x56, 0x4b),
    Rgb(0x94, 0x67, 0xbd),
    Rgb(0x17, 0xbe, 0xcf),
    Rgb(0xbc, 0xbd, 0x22),
    Rgb(0x7f, 0x7f, 0x7f),
    Rgb(0xe3, 0x77, 0xc2),
];

/// Node styling by carrier (or sector) and variant.
#[derive(Clone, Debug)]
pub struct Formatier {
    palette: BTreeMap<String, Rgb>,
}

impl Default for Formatier {
    fn default() -> Self {
        let palette = [
            ("electricity", Rgb(0xff, 0xbf, 0x00)),
            ("power", Rgb(0xff, 0xbf, 0x00)),
            ("gas", Rgb(0x1f, 0x77, 0xb4)),
            ("heat", Rgb(0xd6, 0x27, 0x28)),
            ("hydrogen", Rgb(0x2c, 0xa0, 0x2c)),
            ("coal", Rgb(0x3a, 0x3a, 0x3a)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { palette }
    }
}

impl Formatier {
    pub fn with_color(mut self, carrier: &str, color: Rgb) -> Self {
        self.palette.insert(carrier.to_lowercase(), color);
        self
    }

    /// Carrier or sector a node is colored by.
    ///
    /// Falls back to the carrier of an attached flow, then to the node
    /// variant.
    pub fn category(system: &EnergySystem, node: &Node) -> String {
        if let Some(c) = node.uid.carrier.as_ref().or(node.uid.sector.as_ref()) {
            return c.to_lowercase();
        }
        system
            .outflows(node.id)
            .chain(system.inflows(node.id))
            .find_map(|f| f.carrier.as_ref())
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| node.kind.name().to_string())
    }

    pub fn color(&self, category: &str) -> Rgb {
        if let Some(color) = self.palette.get(category) {
            return *color;
        }
        // stable across runs
        let sum: usize = category.bytes().map(usize::from).sum();
        FALLBACK[sum % FALLBACK.len()]
    }

    pub fn style(&self, system: &EnergySystem, node: &Node) -> NodeStyle {
        let category = Self::category(system, node);
        let label = match &node.uid.component {
            Some(component) => format!("{} ({component})", node.name()),
            None => node.name().to_string(),
        };
        NodeStyle {
            name: node.name().to_string(),
            label,
            color: self.color(&category),
            shape: Shape::of(&node.kind),
            legend_group: node.uid.sector.clone().unwrap_or(category),
        }
    }

    pub fn format(&self, system: &EnergySystem) -> Vec<NodeStyle> {
        system.nodes().iter().map(|n| self.style(system, n)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HybridNode {
    pub style: NodeStyle,
    pub size: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HybridEdge {
    pub label: EdgeLabel,
    pub width: f64,
    pub length: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HybridGraph {
    pub nodes: Vec<HybridNode>,
    pub edges: Vec<HybridEdge>,
}

/// Scales styled nodes and edges by a result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hybridier {
    pub size: (f64, f64),
    pub width: (f64, f64),
    pub length: (f64, f64),
}

impl Default for Hybridier {
    fn default() -> Self {
        Self {
            size: (10.0, 40.0),
            width: (1.0, 8.0),
            length: (50.0, 200.0),
        }
    }
}

fn lerp((lo, hi): (f64, f64), t: f64) -> f64 {
    lo + (hi - lo) * t.clamp(0.0, 1.0)
}

fn share(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}

impl Hybridier {
    /// Node size from installed capacity, edge width from net energy flow
    /// and edge length from edge weight.
    pub fn hybridize(&self, styles: &[NodeStyle], result: &crate::NormalizedResult) -> HybridGraph {
        let capacity = |name: &str| {
            result
                .node_installed_capacity
                .get(name)
                .map_or(0.0, |c| c.total().abs())
        };
        let max_capacity = styles.iter().map(|s| capacity(&s.name)).fold(0.0, f64::max);
        let max_energy = result
            .edge_net_energy_flow
            .values()
            .map(|e| e.abs())
            .fold(0.0, f64::max);

        HybridGraph {
            nodes: styles
                .iter()
                .map(|style| HybridNode {
                    size: lerp(self.size, share(capacity(&style.name), max_capacity)),
                    style: style.clone(),
                })
                .collect(),
            edges: result
                .edge_net_energy_flow
                .iter()
                .map(|(label, energy)| HybridEdge {
                    label: label.clone(),
                    width: lerp(self.width, share(energy.abs(), max_energy)),
                    length: lerp(self.length, result.edge_weight.get(label).copied().unwrap_or(0.1)),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_model::fixtures;

    #[test]
    fn styles_follow_carrier_and_variant() {
        let system = fixtures::minimal_example().unwrap();
        let styles = Formatier::default().format(&system);
        let by_name = |n: &str| styles.iter().find(|s| s.name == n).unwrap();

        assert_eq!(by_name("Powerline").shape, Shape::Circle);
        assert_eq!(by_name("Battery").shape, Shape::Cylinder);
        assert_eq!(by_name("Powerline").color, by_name("Demand").color);
        assert_ne!(by_name("Pipeline").color, by_name("Powerline").color);
        assert_eq!(by_name("Gas Station").legend_group, "gas");
        // no carrier anywhere on the generator's identity, inherits the first outflow's
        assert_eq!(by_name("Generator").legend_group, "electricity");
    }

    #[test]
    fn unknown_carriers_get_a_stable_color() {
        let f = Formatier::default();
        assert_eq!(f.color("biomethane"), f.color("biomethane"));
        let custom = f.with_color("Biomethane", Rgb(1, 2, 3));
        assert_eq!(custom.color("biomethane").hex(), "#010203");
    }
}

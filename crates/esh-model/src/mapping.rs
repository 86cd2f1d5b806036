//! Construction from external, parsed mappings.
//!
//! A mapping is any parsed document (YAML, JSON, spreadsheet export) handed
//! over as a `serde_json::Value`. Category keys and per-component parameter
//! keys are resolved through the configured alias table before the value is
//! read into the typed [`SystemMapping`].

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use esh_core::{AliasTable, HarmonyConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::flow::FlowSpec;
use crate::node::{ChpParams, Component, ConnectorParams, EndpointParams, NodeKind};
use crate::node::{StorageParams, TransformerParams};
use crate::params::{Bounds, Directional, Efficiency, Expansion, Profile, SocPolicy};
use crate::system::{EnergySystem, GlobalConstraints};
use crate::timeframe::Timeframe;
use crate::uid::Uid;
use crate::SystemBuilder;

/// Something that can produce a parsed mapping.
pub trait MappingSource {
    fn mapping(&self) -> ModelResult<Value>;
}

impl MappingSource for Value {
    fn mapping(&self) -> ModelResult<Value> {
        Ok(self.clone())
    }
}

/// Timeframe given as explicit timestamps or as a uniform range.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeframeDef {
    Explicit(Vec<NaiveDateTime>),
    Range {
        start: NaiveDateTime,
        periods: usize,
        #[serde(default = "one_hour")]
        freq_hours: f64,
    },
}

fn one_hour() -> f64 {
    1.0
}

fn unit_efficiency() -> f64 {
    1.0
}

/// Flow parameters of a single flow.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowDef {
    #[serde(default)]
    pub flow_rates: Bounds,
    #[serde(default)]
    pub flow_costs: f64,
    #[serde(default)]
    pub flow_emissions: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<Expansion>,
}

impl FlowDef {
    fn flow_spec(&self, from: &str, to: &str, carrier: Option<&String>) -> FlowSpec {
        let mut flow = FlowSpec::new(from, to)
            .bounds(self.flow_rates)
            .costs(self.flow_costs)
            .emissions(self.flow_emissions);
        flow.carrier = carrier.cloned();
        flow.expansion = self.expansion;
        flow
    }
}

/// Flow parameters keyed by the attached bus.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowMaps {
    #[serde(default)]
    pub flow_rates: BTreeMap<String, Bounds>,
    #[serde(default)]
    pub flow_costs: BTreeMap<String, f64>,
    #[serde(default)]
    pub flow_emissions: BTreeMap<String, f64>,
    #[serde(default)]
    pub expansion: BTreeMap<String, Expansion>,
}

impl FlowMaps {
    fn flow_spec(&self, from: &str, to: &str, bus: &str, carrier: Option<&String>) -> FlowSpec {
        let def = FlowDef {
            flow_rates: self.flow_rates.get(bus).copied().unwrap_or_default(),
            flow_costs: self.flow_costs.get(bus).copied().unwrap_or_default(),
            flow_emissions: self.flow_emissions.get(bus).copied().unwrap_or_default(),
            expansion: self.expansion.get(bus).copied(),
        };
        def.flow_spec(from, to, carrier)
    }

    fn buses(&self) -> impl Iterator<Item = &String> {
        self.flow_rates
            .keys()
            .chain(self.flow_costs.keys())
            .chain(self.flow_emissions.keys())
            .chain(self.expansion.keys())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusDef {
    #[serde(flatten)]
    pub uid: Uid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceDef {
    #[serde(flatten)]
    pub uid: Uid,
    pub output: String,
    #[serde(flatten)]
    pub flow: FlowDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<Profile>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SinkDef {
    #[serde(flatten)]
    pub uid: Uid,
    pub input: String,
    #[serde(flatten)]
    pub flow: FlowDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<Profile>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformerDef {
    #[serde(flatten)]
    pub uid: Uid,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Factors per bus; inputs without an entry default to 1.
    #[serde(default)]
    pub efficiencies: BTreeMap<String, Efficiency>,
    #[serde(flatten)]
    pub flows: FlowMaps,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChpDef {
    #[serde(flatten)]
    pub uid: Uid,
    pub input: String,
    pub outputs: Vec<String>,
    pub efficiencies: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub flows: FlowMaps,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageEfficiencies {
    #[serde(default = "unit_efficiency")]
    pub charge: f64,
    #[serde(default = "unit_efficiency")]
    pub discharge: f64,
}

impl Default for StorageEfficiencies {
    fn default() -> Self {
        Self {
            charge: 1.0,
            discharge: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageDef {
    #[serde(flatten)]
    pub uid: Uid,
    pub bus: String,
    pub capacity: Bounds,
    #[serde(default)]
    pub initial_soc: f64,
    #[serde(default)]
    pub soc_policy: SocPolicy,
    #[serde(default)]
    pub efficiencies: StorageEfficiencies,
    #[serde(default)]
    pub loss_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<Expansion>,
    #[serde(default)]
    pub charge: FlowDef,
    #[serde(default)]
    pub discharge: FlowDef,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectorDef {
    #[serde(flatten)]
    pub uid: Uid,
    pub bus_a: String,
    pub bus_b: String,
    #[serde(default = "lossless")]
    pub efficiencies: Directional<f64>,
    #[serde(default)]
    pub flow_rates: Option<Directional<Bounds>>,
    #[serde(default)]
    pub flow_costs: Option<Directional<f64>>,
}

fn lossless() -> Directional<f64> {
    Directional::symmetric(1.0)
}

/// Typed view of an external mapping after alias resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemMapping {
    #[serde(default = "default_uid")]
    pub uid: String,
    pub timeframe: TimeframeDef,
    #[serde(default)]
    pub busses: Vec<BusDef>,
    #[serde(default)]
    pub sources: Vec<SourceDef>,
    #[serde(default)]
    pub sinks: Vec<SinkDef>,
    #[serde(default)]
    pub transformers: Vec<TransformerDef>,
    #[serde(default)]
    pub chps: Vec<ChpDef>,
    #[serde(default)]
    pub storages: Vec<StorageDef>,
    #[serde(default)]
    pub connectors: Vec<ConnectorDef>,
    #[serde(default)]
    pub global_constraints: GlobalConstraints,
}

fn default_uid() -> String {
    "energy_system".into()
}

/// Nested objects whose keys are parameter names rather than bus names.
const PARAMETER_OBJECTS: &[&str] = &["charge", "discharge"];

/// Resolve category keys and per-entry parameter keys through `aliases`.
///
/// Keys of maps indexed by bus name are left untouched.
pub fn resolve_aliases(value: Value, aliases: &AliasTable) -> Value {
    let Value::Object(top) = value else {
        return value;
    };
    let resolved = top
        .into_iter()
        .map(|(key, value)| {
            let key = aliases.resolve(&key);
            let value = match value {
                Value::Array(entries) if key != "timeframe" => Value::Array(
                    entries
                        .into_iter()
                        .map(|entry| resolve_entry(entry, aliases))
                        .collect(),
                ),
                other => other,
            };
            (key, value)
        })
        .collect::<Map<_, _>>();
    Value::Object(resolved)
}

fn resolve_entry(entry: Value, aliases: &AliasTable) -> Value {
    let Value::Object(fields) = entry else {
        return entry;
    };
    let resolved = fields
        .into_iter()
        .map(|(key, value)| {
            let key = aliases.resolve(&key);
            let value = if PARAMETER_OBJECTS.contains(&key.as_str()) {
                resolve_entry(value, aliases)
            } else {
                value
            };
            (key, value)
        })
        .collect::<Map<_, _>>();
    Value::Object(resolved)
}

impl SystemMapping {
    pub fn from_value(value: Value, config: &HarmonyConfig) -> ModelResult<Self> {
        let resolved = resolve_aliases(value, &config.aliases);
        Ok(serde_json::from_value(resolved)?)
    }

    pub fn into_system(self) -> ModelResult<EnergySystem> {
        let timeframe = match self.timeframe {
            TimeframeDef::Explicit(steps) => Timeframe::new(steps)?,
            TimeframeDef::Range {
                start,
                periods,
                freq_hours,
            } => Timeframe::uniform(start, periods, freq_hours)?,
        };
        let mut builder = SystemBuilder::new(self.uid, timeframe);
        let mut flows = Vec::new();

        for bus in self.busses {
            builder.add_node(Component::bus(bus.uid))?;
        }

        for source in self.sources {
            let name = source.uid.name.clone();
            flows.push(
                source
                    .flow
                    .flow_spec(&name, &source.output, source.uid.carrier.as_ref()),
            );
            let kind = NodeKind::Source(EndpointParams {
                profile: source.timeseries,
            });
            builder.add_node(Component::new(source.uid, kind))?;
        }

        for sink in self.sinks {
            let name = sink.uid.name.clone();
            flows.push(
                sink.flow
                    .flow_spec(&sink.input, &name, sink.uid.carrier.as_ref()),
            );
            let kind = NodeKind::Sink(EndpointParams {
                profile: sink.timeseries,
            });
            builder.add_node(Component::new(sink.uid, kind))?;
        }

        for transformer in self.transformers {
            let name = transformer.uid.name.clone();
            let attached: Vec<&String> = transformer
                .inputs
                .iter()
                .chain(&transformer.outputs)
                .collect();
            if let Some(stray) = transformer
                .flows
                .buses()
                .chain(transformer.efficiencies.keys())
                .find(|bus| !attached.contains(bus))
            {
                return Err(ModelError::schema(
                    &name,
                    format!("parameter given for unattached bus '{stray}'"),
                ));
            }
            let mut factors = transformer.efficiencies.clone();
            for input in &transformer.inputs {
                factors
                    .entry(input.clone())
                    .or_insert(Efficiency::Constant(1.0));
            }
            for input in &transformer.inputs {
                flows.push(transformer.flows.flow_spec(input, &name, input, None));
            }
            for output in &transformer.outputs {
                flows.push(transformer.flows.flow_spec(&name, output, output, None));
            }
            let kind = NodeKind::Transformer(TransformerParams { factors });
            builder.add_node(Component::new(transformer.uid, kind))?;
        }

        for chp in self.chps {
            let name = chp.uid.name.clone();
            let [primary, secondary] = chp.outputs.as_slice() else {
                return Err(ModelError::schema(&name, "a chp needs exactly two outputs"));
            };
            let eff = |bus: &String| {
                chp.efficiencies.get(bus).copied().ok_or_else(|| {
                    ModelError::schema(&name, format!("missing efficiency for output '{bus}'"))
                })
            };
            let params = ChpParams::new(
                chp.input.clone(),
                (primary.clone(), eff(primary)?),
                (secondary.clone(), eff(secondary)?),
            )
            .map_err(|e| ModelError::param(&name, e))?;
            flows.push(chp.flows.flow_spec(&chp.input, &name, &chp.input, None));
            for output in [primary, secondary] {
                flows.push(chp.flows.flow_spec(&name, output, output, None));
            }
            builder.add_node(Component::chp(chp.uid, params))?;
        }

        for storage in self.storages {
            let name = storage.uid.name.clone();
            let mut params = StorageParams::new(storage.bus.clone(), storage.capacity)
                .initial_soc(storage.initial_soc)
                .soc_policy(storage.soc_policy)
                .efficiencies(storage.efficiencies.charge, storage.efficiencies.discharge)
                .loss_rate(storage.loss_rate);
            params.expansion = storage.expansion;
            flows.push(storage.charge.flow_spec(&storage.bus, &name, None));
            flows.push(storage.discharge.flow_spec(&name, &storage.bus, None));
            builder.add_node(Component::storage(storage.uid, params))?;
        }

        for connector in self.connectors {
            let name = connector.uid.name.clone();
            let rates = connector
                .flow_rates
                .unwrap_or_else(|| Directional::symmetric(Bounds::unbounded()));
            let costs = connector
                .flow_costs
                .unwrap_or_else(|| Directional::symmetric(0.0));
            let (a, b) = (&connector.bus_a, &connector.bus_b);
            flows.push(FlowSpec::new(a, &name).bounds(rates.forward).costs(costs.forward));
            flows.push(FlowSpec::new(&name, b).bounds(rates.forward));
            flows.push(FlowSpec::new(b, &name).bounds(rates.backward).costs(costs.backward));
            flows.push(FlowSpec::new(&name, a).bounds(rates.backward));
            let params = ConnectorParams::new(a.clone(), b.clone(), connector.efficiencies);
            builder.add_node(Component::connector(connector.uid, params))?;
        }

        for flow in flows {
            builder.connect(flow)?;
        }
        builder.global_constraints(self.global_constraints);
        builder.build()
    }
}

impl EnergySystem {
    /// Build a system from a parsed external mapping.
    pub fn from_external(
        source: &dyn MappingSource,
        config: &HarmonyConfig,
    ) -> ModelResult<EnergySystem> {
        let value = source.mapping()?;
        SystemMapping::from_value(value, config)?.into_system()
    }
}

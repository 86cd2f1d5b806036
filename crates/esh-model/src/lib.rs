//! Canonical energy system model.
//!
//! Provides:
//! - Parameter types validated on construction (`Bounds`, `Efficiency`, ...)
//! - Nodes (`Bus`, `Source`, `Sink`, `Transformer`, `Chp`, `Storage`, `Connector`)
//! - `SystemBuilder` for incremental construction and validation
//! - `EnergySystem`, the immutable graph adapters read from
//! - Construction from external mappings with alias resolution

pub mod builder;
pub mod error;
pub mod fixtures;
pub mod flow;
pub mod mapping;
pub mod node;
pub mod params;
pub mod system;
pub mod timeframe;
pub mod uid;

mod validate;

pub use builder::SystemBuilder;
pub use error::{ModelError, ModelResult};
pub use flow::{EdgeLabel, Flow, FlowSpec};
pub use mapping::{MappingSource, SystemMapping};
pub use node::{
    ChpOutput, ChpParams, Component, ConnectorParams, ConversionFactors, EndpointParams, Node,
    NodeKind, StorageParams, TransformerParams,
};
pub use params::{Bounds, Directional, Efficiency, Expansion, ParamError, Profile, SocPolicy};
pub use system::{EnergySystem, GlobalConstraints};
pub use timeframe::Timeframe;
pub use uid::Uid;

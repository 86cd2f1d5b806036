//! esh-transform: forward transformation of the canonical model.
//!
//! Contains:
//! - the `Adapter` seam and its options
//! - deviations reported when a construct is re-expressed
//! - shared strategies (bounds, capacity, relocation, synthesis, pruning)
//! - the native schemas and adapters of oemof, PyPSA, FINE and Calliope

pub mod adapter;
pub mod calliope;
pub mod deviation;
pub mod error;
pub mod fine;
pub mod framework;
pub mod oemof;
pub mod pypsa;
pub mod shared;

pub use adapter::{Adapter, AdapterOptions, ConnectorPolicy, PrunePolicy, Transformation};
pub use calliope::{CalliopeAdapter, CalliopeModel};
pub use deviation::{Deviation, DeviationCause};
pub use error::{TransformError, TransformResult};
pub use fine::{FineAdapter, FineModel};
pub use framework::Framework;
pub use oemof::{OemofAdapter, OemofEnergySystem};
pub use pypsa::{PypsaAdapter, PypsaNetwork};
pub use shared::prune::{PrunedTopology, prune_redundant_chains};

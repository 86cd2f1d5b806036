//! esh-results: native results back into one uniform schema.
//!
//! Contains:
//! - the normalized result schema and its conservation check
//! - one resultier per framework
//! - cross-framework comparison with deviation attribution
//! - presentation attributes (formatier, hybridier)
//! - content-addressed run storage

pub mod calliope;
pub mod compare;
pub mod error;
pub mod fine;
pub mod format;
pub mod hash;
pub mod normalized;
pub mod oemof;
pub mod pypsa;
mod readout;
pub mod resultier;
pub mod store;

pub use calliope::{CalliopeResultier, CalliopeResults};
pub use compare::{COMPARED_KEYS, Comparison, Disagreement, compare};
pub use error::{NormalizeError, NormalizeResult, ResultsError, ResultsResult};
pub use fine::{FineResultier, FineResults};
pub use format::{Formatier, HybridGraph, Hybridier, NodeStyle, Rgb, Shape};
pub use hash::compute_run_id;
pub use normalized::{Capacity, ConservationViolation, GlobalResults, LoadTable, NormalizedResult};
pub use oemof::{OemofResultier, OemofResults};
pub use pypsa::{PypsaResultier, PypsaSolution};
pub use readout::edge_weight;
pub use resultier::{NativeResult, Resultier};
pub use store::{RunId, RunManifest, RunStore};

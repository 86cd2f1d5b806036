//! Conversion capacity stated on a single reference flow.
//!
//! Frameworks that give a conversion one capacity variable need every
//! attached flow limit expressed in units of the reference flow. With
//! `flow(x) = ratio(x) * flow(ref)`, a limit `cap(x)` becomes
//! `cap(x) / ratio(x)` and the tightest one wins.

use esh_core::EdgeId;
use esh_model::EnergySystem;

use crate::error::{TransformError, TransformResult};
use crate::framework::Framework;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceExpansion {
    /// Investment per unit of reference capacity.
    pub costs: f64,
    pub max_capacity: f64,
    pub original: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceCapacity {
    /// `None` when no attached flow is bounded.
    pub nominal: Option<f64>,
    /// Lower limit as a fraction of `nominal`.
    pub min_fraction: f64,
    pub expansion: Option<ReferenceExpansion>,
    /// The expandable member, if any.
    pub expandable_edge: Option<EdgeId>,
}

/// Combine the limits of `members` (edge, ratio to the reference flow).
pub fn reference_capacity(
    system: &EnergySystem,
    uid: &str,
    members: &[(EdgeId, f64)],
    framework: Framework,
) -> TransformResult<ReferenceCapacity> {
    let flows: Vec<_> = members
        .iter()
        .filter_map(|(edge, ratio)| system.flow(*edge).map(|f| (f, *ratio)))
        .collect();

    let expandable: Vec<_> = flows.iter().filter(|(f, _)| f.is_expandable()).collect();
    if expandable.len() > 1 {
        return Err(TransformError::unsupported(
            uid,
            "several expandable flows on one conversion",
            framework,
        ));
    }

    let minimum = flows
        .iter()
        .map(|(f, ratio)| f.bounds.min() / ratio)
        .fold(0.0, f64::max);

    let (nominal, expansion, expandable_edge) = match expandable.first() {
        Some((flow, ratio)) => {
            if flows
                .iter()
                .any(|(f, _)| f.id != flow.id && f.bounds.is_bounded())
            {
                return Err(TransformError::unsupported(
                    uid,
                    "bounded and expandable flows on one conversion",
                    framework,
                ));
            }
            let original = flow.original_capacity() / ratio;
            let expansion = flow.expansion.map(|x| ReferenceExpansion {
                costs: x.costs() * ratio,
                max_capacity: x.max_capacity() / ratio,
                original,
            });
            (Some(original), expansion, Some(flow.id))
        }
        None => {
            let nominal = flows
                .iter()
                .filter(|(f, _)| f.bounds.is_bounded())
                .map(|(f, ratio)| f.bounds.max() / ratio)
                .reduce(f64::min);
            (nominal, None, None)
        }
    };

    let min_fraction = match nominal {
        Some(n) if n > 0.0 => minimum / n,
        Some(_) => 0.0,
        None if minimum > 0.0 => {
            return Err(TransformError::mismatch(
                uid,
                "a positive minimum without a finite capacity cannot be stated relative to a nominal value",
            ));
        }
        None => 0.0,
    };

    Ok(ReferenceCapacity {
        nominal,
        min_fraction,
        expansion,
        expandable_edge,
    })
}

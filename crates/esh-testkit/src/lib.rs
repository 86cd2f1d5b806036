//! Scripted native results for tests.
//!
//! A `Dispatch` states the operation of a canonical system. Each native
//! schema implements `Script`, which writes that operation out the way the
//! framework would report it, including native cost accounting. Scenarios
//! pair the reference systems with their optimal dispatch.

pub mod dispatch;
pub mod harness;
pub mod scenario;
pub mod script;

pub use dispatch::Dispatch;
pub use harness::{HarnessError, HarnessResult, evaluate, evaluate_all};
pub use scenario::{Scenario, WIND_BREAK_EVEN};
pub use script::{Script, scripted};

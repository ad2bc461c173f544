//! Exact age and FIB occupancy integrals over simulation traces.
//!
//! A run makes two sequential passes: the delivery trace fixes the time
//! windows and the per-node age accumulators, then the optional allocation
//! trace is replayed round by round to reconstruct FIB occupancy.

pub mod clock;
pub mod collector;
pub mod control;
pub mod decimal;
pub mod delivery;
pub mod error;
pub mod fib;
pub mod measure;
pub mod node;
pub mod progress;
pub mod record;
pub mod report;
pub mod run;
pub mod sawtooth;

pub type NodeId = u64;
/// 0-based line position of a control packet in the delivery trace.
pub type Sequence = u64;
pub type Timestamp = i64;

pub use crate::clock::{FinishedClock, GlobalClock, Window};
pub use crate::collector::{OccupancyPoint, OutputCollector, SeriesWriter};
pub use crate::control::{ControlLifecycleTable, ControlSummary, FirstEntryQueue};
pub use crate::decimal::Fixed;
pub use crate::delivery::{DeliveryPass, PassStats};
pub use crate::error::{ArithmeticError, CalcError, LineError, TraceError};
pub use crate::fib::{FibOccupancyEngine, FibTotals};
pub use crate::node::{NodeRecord, NodeRegistry, NodeRow};
pub use crate::record::{AllocEvent, DeliveryRecord, LineHead, MalformedLine};
pub use crate::report::ReportAssembler;
pub use crate::run::{RunConfig, RunSummary, run};
pub use crate::sawtooth::{AgeSummary, Sawtooth};

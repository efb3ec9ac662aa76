//! Network traffic meter

pub mod engine;
pub mod format;
pub mod meter;
pub mod sampler;
pub mod visibility;

pub use engine::{BurstWindow, EngineState, RateSamplingEngine, Readout};
pub use format::{TrafficFormatter, TrafficUnit, UnitLabels};
pub use meter::{resolve_placement, MeterSlot, MeterView, TrafficMeter};
pub use sampler::{
    ByteCounters, CounterProvider, GlobalCounters, InterfaceCounters, SampleSource, ThroughputSample,
};
pub use visibility::{should_run, MeterVisibilitySignals, Transition, VisibilityStateMachine};

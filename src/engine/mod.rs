//! Engine configuration and lifecycle supervision (components A/B).

pub mod spec;
pub mod supervisor;

pub use spec::EngineSpec;
pub use supervisor::{EngineSupervisor, GtpTimeouts};

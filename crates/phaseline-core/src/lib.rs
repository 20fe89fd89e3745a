//! Phased request-pipeline primitives with indexed per-request variable slots.

pub mod context;
pub mod error;
pub mod http;
pub mod logging;
pub mod phase;
pub mod pipeline;
pub mod response;
pub mod vars;

pub use context::RequestContext;
pub use error::{PhaseError, StartupError};
pub use phase::{handler_fn, BoxPhaseHandler, Phase, PhaseHandler, Verdict};
pub use pipeline::{Extension, Pipeline, PipelineBuilder, RequestOutcome};
pub use vars::{Lookup, SlotTable, VariableIndex, VariableRegistry, VariableTable};

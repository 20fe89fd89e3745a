use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::PhaseError;
use crate::http::StatusCode;

/// Named, ordered stages of request processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Early phase, before the request is answered.
    Access,
    /// Late phase, after the outcome is decided. Runs for every request.
    Log,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Access => "access",
            Phase::Log => "log",
        }
    }
}

/// Signal a phase handler returns to the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No decision; the next handler in the phase runs.
    Declined,
    /// The phase is satisfied; its remaining handlers are skipped.
    Allow,
    /// Deny the request with the given status.
    Reject(StatusCode),
}

pub type BoxPhaseHandler = Arc<dyn PhaseHandler>;

/// One handler registered into a phase's ordered handler list.
#[async_trait(?Send)]
pub trait PhaseHandler: Send + Sync + 'static {
    async fn invoke(&self, ctx: &mut RequestContext) -> Result<Verdict, PhaseError>;

    /// Diagnostic name used in dispatch logging.
    fn name(&self) -> &'static str {
        "handler"
    }
}

pub struct FnPhaseHandler<F>
where
    F: Send + Sync + 'static,
{
    f: F,
}

#[async_trait(?Send)]
impl<F> PhaseHandler for FnPhaseHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<Verdict, PhaseError> + Send + Sync + 'static,
{
    async fn invoke(&self, ctx: &mut RequestContext) -> Result<Verdict, PhaseError> {
        (self.f)(ctx)
    }
}

/// Wrap a synchronous function as a phase handler.
pub fn handler_fn<F>(f: F) -> FnPhaseHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<Verdict, PhaseError> + Send + Sync + 'static,
{
    FnPhaseHandler { f }
}

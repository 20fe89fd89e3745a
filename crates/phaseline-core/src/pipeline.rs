use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{PhaseError, StartupError};
use crate::http::{Request, Response};
use crate::phase::{BoxPhaseHandler, Phase, PhaseHandler, Verdict};
use crate::response::IntoResponse;
use crate::vars::{Lookup, VariableIndex, VariableRegistry, VariableTable};

/// Implemented by extensions that wire themselves into the pipeline at
/// startup: resolve variable indices, then append phase handlers.
///
/// Any error aborts configuration; the pipeline is never built and no
/// handler runs.
pub trait Extension {
    fn install(builder: &mut PipelineBuilder) -> Result<(), StartupError>;
}

/// Startup-time pipeline configuration.
///
/// Handlers are appended per phase in registration order and the order is
/// preserved at dispatch. [`build`](Self::build) freezes everything; there
/// is no way to add handlers or variables afterwards.
pub struct PipelineBuilder {
    registry: VariableRegistry,
    access: Vec<BoxPhaseHandler>,
    log: Vec<BoxPhaseHandler>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            registry: VariableRegistry::new(),
            access: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn with_variable_capacity(capacity: usize) -> Self {
        Self {
            registry: VariableRegistry::with_capacity(capacity),
            access: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Reserve a named per-request variable slot.
    pub fn register_variable(
        &mut self,
        name: &str,
        lookup: Lookup,
    ) -> Result<VariableIndex, StartupError> {
        self.registry.register(name, lookup)
    }

    /// Index of an already-registered variable.
    pub fn resolve_variable(&self, name: &str) -> Result<VariableIndex, StartupError> {
        self.registry.resolve(name)
    }

    /// Append a handler to the end of a phase's handler list.
    pub fn on<H>(&mut self, phase: Phase, handler: H) -> &mut Self
    where
        H: PhaseHandler,
    {
        let handler: BoxPhaseHandler = Arc::new(handler);
        match phase {
            Phase::Access => self.access.push(handler),
            Phase::Log => self.log.push(handler),
        }
        self
    }

    /// Run an extension's install hook against this builder.
    pub fn install<E>(&mut self) -> Result<&mut Self, StartupError>
    where
        E: Extension,
    {
        E::install(self)?;
        Ok(self)
    }

    /// Seal the variable table and freeze the handler lists.
    pub fn build(self) -> Pipeline {
        Pipeline {
            table: Arc::new(self.registry.seal()),
            access: self.access.into(),
            log: self.log.into(),
        }
    }
}

/// Result of driving one request through every phase.
pub enum RequestOutcome {
    /// Every access handler let the request proceed.
    Proceeded(RequestContext),
    /// An access handler rejected or failed the request.
    Failed {
        context: RequestContext,
        response: Response,
    },
}

impl RequestOutcome {
    pub fn context(&self) -> &RequestContext {
        match self {
            RequestOutcome::Proceeded(context) => context,
            RequestOutcome::Failed { context, .. } => context,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            RequestOutcome::Proceeded(_) => None,
            RequestOutcome::Failed { response, .. } => Some(response),
        }
    }

    pub fn proceeded(&self) -> bool {
        matches!(self, RequestOutcome::Proceeded(_))
    }
}

/// Immutable request pipeline shared by every request after startup.
pub struct Pipeline {
    table: Arc<VariableTable>,
    access: Arc<[BoxPhaseHandler]>,
    log: Arc<[BoxPhaseHandler]>,
}

impl Pipeline {
    /// Create the per-request context for an incoming request.
    pub fn begin(&self, request: Request) -> RequestContext {
        RequestContext::new(request, Arc::clone(&self.table))
    }

    pub fn variables(&self) -> &VariableTable {
        &self.table
    }

    /// Walk the access handlers in registration order.
    ///
    /// `Declined` moves to the next handler, `Allow` ends the phase, a
    /// rejection or handler failure ends the request.
    pub async fn run_access(&self, ctx: &mut RequestContext) -> Result<(), PhaseError> {
        for handler in self.access.iter() {
            match handler.invoke(ctx).await? {
                Verdict::Declined => {
                    tracing::debug!(handler = handler.name(), "access handler declined");
                }
                Verdict::Allow => {
                    tracing::debug!(handler = handler.name(), "access phase satisfied");
                    break;
                }
                Verdict::Reject(status) => {
                    tracing::debug!(
                        handler = handler.name(),
                        status = status.as_u16(),
                        "access handler rejected request"
                    );
                    return Err(PhaseError::rejected(status));
                }
            }
        }
        Ok(())
    }

    /// Re-enter the access phase for the same request.
    ///
    /// The context keeps its slots; only the restart counter moves. This is
    /// the internal-redirect path, no new request is created.
    pub async fn redirect(&self, ctx: &mut RequestContext) -> Result<(), PhaseError> {
        ctx.mark_restart();
        self.run_access(ctx).await
    }

    /// Run every log handler. The outcome is already decided by this point,
    /// so handler failures are logged and swallowed.
    pub async fn run_log(&self, ctx: &mut RequestContext) {
        for handler in self.log.iter() {
            if let Err(err) = handler.invoke(ctx).await {
                tracing::error!(
                    handler = handler.name(),
                    error = %err,
                    "log handler failed"
                );
            }
        }
    }

    /// Drive one request through access then log, converting an access
    /// failure into the error response for that request alone.
    pub async fn run(&self, request: Request) -> RequestOutcome {
        let mut ctx = self.begin(request);
        let access = self.run_access(&mut ctx).await;
        self.run_log(&mut ctx).await;

        match access {
            Ok(()) => RequestOutcome::Proceeded(ctx),
            Err(err) => RequestOutcome::Failed {
                response: err.into_response(),
                context: ctx,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler_fn;
    use crate::http::{request_builder, Method, StatusCode};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::executor::block_on;
    use std::sync::Mutex;

    fn request(path: &str) -> Request {
        request_builder()
            .method(Method::GET)
            .uri(path)
            .body(Bytes::new())
            .expect("request")
    }

    struct Recording {
        log: Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
        verdict: Verdict,
    }

    #[async_trait(?Send)]
    impl PhaseHandler for Recording {
        async fn invoke(&self, _ctx: &mut RequestContext) -> Result<Verdict, PhaseError> {
            self.log.lock().unwrap().push(self.tag);
            Ok(self.verdict)
        }

        fn name(&self) -> &'static str {
            self.tag
        }
    }

    struct Failing;

    #[async_trait(?Send)]
    impl PhaseHandler for Failing {
        async fn invoke(&self, _ctx: &mut RequestContext) -> Result<Verdict, PhaseError> {
            Err(PhaseError::internal(anyhow::anyhow!("no memory")))
        }
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str, verdict: Verdict) -> Recording {
        Recording {
            log: Arc::clone(log),
            tag,
            verdict,
        }
    }

    #[test]
    fn access_handlers_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder
            .on(Phase::Access, recording(&calls, "first", Verdict::Declined))
            .on(Phase::Access, recording(&calls, "second", Verdict::Declined));
        let pipeline = builder.build();

        let mut ctx = pipeline.begin(request("/order"));
        block_on(pipeline.run_access(&mut ctx)).expect("access");
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn allow_skips_remaining_access_handlers() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder
            .on(Phase::Access, recording(&calls, "gate", Verdict::Allow))
            .on(Phase::Access, recording(&calls, "unreached", Verdict::Declined));
        let pipeline = builder.build();

        let mut ctx = pipeline.begin(request("/allow"));
        block_on(pipeline.run_access(&mut ctx)).expect("access");
        assert_eq!(*calls.lock().unwrap(), vec!["gate"]);
    }

    #[test]
    fn reject_ends_the_request_with_that_status() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder.on(
            Phase::Access,
            recording(&calls, "deny", Verdict::Reject(StatusCode::FORBIDDEN)),
        );
        let pipeline = builder.build();

        let mut ctx = pipeline.begin(request("/deny"));
        let err = block_on(pipeline.run_access(&mut ctx)).expect_err("rejected");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn handler_failure_becomes_request_error_response() {
        let mut builder = PipelineBuilder::new();
        builder.on(Phase::Access, Failing);
        let pipeline = builder.build();

        let outcome = block_on(pipeline.run(request("/fail")));
        assert!(!outcome.proceeded());
        let response = outcome.response().expect("error response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn log_handlers_all_run_even_after_failures() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder
            .on(Phase::Log, Failing)
            .on(Phase::Log, recording(&calls, "tail", Verdict::Declined));
        let pipeline = builder.build();

        let mut ctx = pipeline.begin(request("/log"));
        block_on(pipeline.run_log(&mut ctx));
        assert_eq!(*calls.lock().unwrap(), vec!["tail"]);
    }

    #[test]
    fn log_phase_runs_for_failed_requests_too() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder
            .on(
                Phase::Access,
                recording(&calls, "deny", Verdict::Reject(StatusCode::FORBIDDEN)),
            )
            .on(Phase::Log, recording(&calls, "log", Verdict::Declined));
        let pipeline = builder.build();

        let outcome = block_on(pipeline.run(request("/denied")));
        assert!(!outcome.proceeded());
        assert_eq!(*calls.lock().unwrap(), vec!["deny", "log"]);
    }

    #[test]
    fn redirect_reenters_access_and_counts_restarts() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder.on(Phase::Access, recording(&calls, "access", Verdict::Declined));
        let pipeline = builder.build();

        let mut ctx = pipeline.begin(request("/redirect"));
        assert!(!ctx.is_internal_redirect());
        block_on(pipeline.run_access(&mut ctx)).expect("first pass");
        block_on(pipeline.redirect(&mut ctx)).expect("redirect");
        assert_eq!(ctx.restarts(), 1);
        assert!(ctx.is_internal_redirect());
        assert_eq!(*calls.lock().unwrap(), vec!["access", "access"]);
    }

    #[test]
    fn handler_fn_adapts_plain_functions() {
        let mut builder = PipelineBuilder::new();
        let index = builder
            .register_variable("touched", Lookup::IndexedOnly)
            .expect("register");
        builder.on(
            Phase::Access,
            handler_fn(move |ctx: &mut RequestContext| {
                ctx.set_slot_once(index, true);
                Ok(Verdict::Declined)
            }),
        );
        let pipeline = builder.build();

        let outcome = block_on(pipeline.run(request("/fn")));
        assert!(outcome.proceeded());
        assert_eq!(outcome.context().slot::<bool>(index).copied(), Some(true));
    }

    struct SlotExtension;

    const EXT_VAR: &str = "ext_marker";

    impl Extension for SlotExtension {
        fn install(builder: &mut PipelineBuilder) -> Result<(), StartupError> {
            let index = builder.register_variable(EXT_VAR, Lookup::IndexedOnly)?;
            builder.on(
                Phase::Access,
                handler_fn(move |ctx: &mut RequestContext| {
                    ctx.set_slot_once(index, 11_u8);
                    Ok(Verdict::Declined)
                }),
            );
            Ok(())
        }
    }

    #[test]
    fn install_wires_variables_and_handlers() {
        let mut builder = PipelineBuilder::new();
        builder.install::<SlotExtension>().expect("install");
        assert!(builder.resolve_variable(EXT_VAR).is_ok());
        let pipeline = builder.build();

        let index = pipeline.variables().index_of(EXT_VAR).expect("index");
        let outcome = block_on(pipeline.run(request("/ext")));
        assert_eq!(outcome.context().slot::<u8>(index).copied(), Some(11));
    }

    #[test]
    fn failed_install_aborts_configuration() {
        let mut builder = PipelineBuilder::with_variable_capacity(0);
        let err = builder.install::<SlotExtension>().err().expect("table full");
        assert!(matches!(err, StartupError::TableFull { .. }));
    }

    #[test]
    fn evaluated_variable_uses_its_get_handler() {
        let mut builder = PipelineBuilder::new();
        let uri_var = builder
            .register_variable(
                "request_path",
                Lookup::Evaluated(Box::new(|ctx: &RequestContext| {
                    Some(ctx.request().uri().path().to_string())
                })),
            )
            .expect("register");
        let marker = builder
            .register_variable("marker", Lookup::IndexedOnly)
            .expect("register");
        let pipeline = builder.build();

        let mut ctx = pipeline.begin(request("/evaluated"));
        assert_eq!(ctx.evaluate(uri_var).as_deref(), Some("/evaluated"));
        // Indexed-only slots stay opaque on the generic path, set or not.
        assert_eq!(ctx.evaluate(marker), None);
        ctx.set_slot_once(marker, 5_i32);
        assert_eq!(ctx.evaluate(marker), None);
    }

    #[tokio::test]
    async fn run_drives_access_then_log() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder
            .on(Phase::Access, recording(&calls, "access", Verdict::Declined))
            .on(Phase::Log, recording(&calls, "log", Verdict::Declined));
        let pipeline = builder.build();

        let outcome = pipeline.run(request("/full")).await;
        assert!(outcome.proceeded());
        assert_eq!(*calls.lock().unwrap(), vec!["access", "log"]);
    }
}

use async_trait::async_trait;
use log::info;
use rand::Rng;

use phaseline_core::{
    Extension, Lookup, Phase, PhaseError, PhaseHandler, PipelineBuilder, RequestContext,
    StartupError, VariableIndex, Verdict,
};

/// Name of the variable slot the extension stores its record in.
pub const VARIABLE_NAME: &str = "persistent_data_var";

/// Record attached to a request on its first pass through the access phase.
#[derive(Debug)]
pub struct PersistentData {
    pub random: i64,
}

/// Slot index resolved once at startup, shared by both handlers.
#[derive(Debug, Clone, Copy)]
struct PersistentDataConf {
    index: VariableIndex,
}

struct WriteHandler {
    conf: PersistentDataConf,
}

#[async_trait(?Send)]
impl PhaseHandler for WriteHandler {
    async fn invoke(&self, ctx: &mut RequestContext) -> Result<Verdict, PhaseError> {
        let index = self.conf.index;
        if ctx.slot_is_set(index) {
            info!("internal redirect!");
        } else {
            let random = rand::thread_rng().gen::<i64>();
            info!("setting persistent random to {random}");
            ctx.set_slot_once(index, PersistentData { random });
        }
        Ok(Verdict::Declined)
    }

    fn name(&self) -> &'static str {
        "persistent-data-write"
    }
}

struct ReadHandler {
    conf: PersistentDataConf,
}

#[async_trait(?Send)]
impl PhaseHandler for ReadHandler {
    async fn invoke(&self, ctx: &mut RequestContext) -> Result<Verdict, PhaseError> {
        match ctx.slot::<PersistentData>(self.conf.index) {
            None => info!("persistent data value not set"),
            Some(pd) => info!("persistent random is {}", pd.random),
        }
        Ok(Verdict::Declined)
    }

    fn name(&self) -> &'static str {
        "persistent-data-read"
    }
}

/// Wires the persistent-data slot and its two handlers into the pipeline.
///
/// Registration failure is fatal: the error propagates out of the install
/// hook and the pipeline is never built.
pub struct PersistentDataExt;

impl Extension for PersistentDataExt {
    fn install(builder: &mut PipelineBuilder) -> Result<(), StartupError> {
        let index = builder.register_variable(VARIABLE_NAME, Lookup::IndexedOnly)?;
        let conf = PersistentDataConf { index };
        builder.on(Phase::Access, WriteHandler { conf });
        builder.on(Phase::Log, ReadHandler { conf });
        Ok(())
    }
}

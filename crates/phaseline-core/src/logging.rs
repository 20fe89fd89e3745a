use std::sync::OnceLock;

/// Initializer installed by the hosting binary, e.g. a `simple_logger` setup.
pub type LogInit = Box<dyn Fn() -> Result<(), log::SetLoggerError> + Send + Sync + 'static>;

static INIT: OnceLock<LogInit> = OnceLock::new();
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Register the process-wide logger initializer.
///
/// Returns false if one was already registered; the first registration wins.
pub fn set_initializer(init: LogInit) -> bool {
    INIT.set(init).is_ok()
}

/// Run the registered initializer, at most once per process.
///
/// Without a registered initializer this is a no-op and log macros stay
/// silent.
pub fn init_logging() {
    if let Some(init) = INIT.get() {
        let _ = INSTALLED.get_or_init(|| {
            let _ = (init)();
        });
    }
}

/// Register `init` and run it.
pub fn init_with(init: LogInit) {
    let _ = set_initializer(init);
    init_logging();
}

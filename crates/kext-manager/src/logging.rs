//! Opt-in logging bootstrap
//!
//! The manager emits `log` records on every privileged attempt and outcome.
//! Embedders that already install a logger can ignore this module; callers
//! without one can initialize a stderr logger here. Initialization happens
//! at most once per process and is idempotent.

use flexi_logger::{Logger, LoggerHandle};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();

/// Initialize a stderr logger with the given level spec (e.g. `"info"`).
///
/// Subsequent calls are no-ops regardless of level; the first spec wins.
pub fn init(level: &str) -> Result<(), String> {
    LOGGER
        .get_or_try_init(|| {
            Logger::try_with_str(level)
                .map_err(|err| format!("invalid log spec `{level}`: {err}"))?
                .log_to_stderr()
                .start()
                .map_err(|err| format!("failed to start logger: {err}"))
        })
        .map(|_| ())
}

/// Whether logging has been initialized through this module
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

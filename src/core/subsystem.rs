//! External collaborators managed by the engine (input, audio, fonts, AI...)

/// A manager the engine brings up at startup and tears down at shutdown.
///
/// `init` may run on a worker thread, so implementations use interior
/// locking. `clean` runs on the engine thread in reverse registration order.
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self) -> anyhow::Result<()>;

    fn clean(&self) -> anyhow::Result<()>;
}

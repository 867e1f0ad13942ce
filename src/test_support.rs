use tokio::sync::Mutex as AsyncMutex;

/// Serialises unit tests that set or clear `EDITRION_*`, `<TOOL>_BIN` or `PATH`.
/// All current users are sync tests and take it with `.blocking_lock()`.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

//! # Cross-platform OS signal handling.
//!
//! Provides [`wait_for_shutdown_signal`], an async helper that completes
//! when the process receives a termination signal and reports which one.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd)
//! - `SIGABRT` (abnormal termination via abort)
//!
//! **Other platforms:**
//! - Ctrl-C / Ctrl-Break via [`tokio::signal::ctrl_c`]
//!
//! The caller — the entry point — logs the signal name and cancels the
//! supervisor's token; nothing here runs in actual signal-handler
//! context, so logging from the waiting task is safe.

/// Waits for a termination signal and returns its name.
///
/// Each call creates independent signal listeners.
///
/// Returns `Err` only if signal registration itself fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigabrt = signal(SignalKind::from_raw(libc::SIGABRT))?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigabrt.recv() => "SIGABRT",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
///
/// Each call creates independent signal listeners.
///
/// Returns `Err` only if signal registration itself fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

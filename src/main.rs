//! Production entry point: construct the supervisor, wire the shutdown
//! signals into its cancel token, and block until it finishes.
//!
//! Exit codes: 0 after a clean shutdown, 1 when `prepare()` or the first
//! working-day resolution fails.

use std::process::ExitCode;

use svcvisor::{shutdown, DayLog, Supervisor};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    println!("initializing svcvisor");
    println!("press Ctrl+C to exit...");

    let log = match DayLog::open() {
        Ok(log) => log,
        Err(err) => {
            eprintln!("unable to open log file: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut supervisor = match Supervisor::prepare(log.clone()).await {
        Ok(supervisor) => supervisor,
        Err(err) => {
            eprintln!("svcvisor exited with failed prepare call: {err}");
            return ExitCode::FAILURE;
        }
    };

    let exit = supervisor.exit_handle();
    let signal_log = log.clone();
    tokio::spawn(async move {
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => {
                signal_log.info(format!("exit signal received: {signal}"));
                exit.exit();
            }
            Err(err) => signal_log.error(format!("signal registration failed: {err}")),
        }
    });

    if let Err(err) = supervisor.block().await {
        eprintln!("svcvisor exited with failed block call: {err}");
        return ExitCode::FAILURE;
    }

    log.info("svcvisor exited properly");
    println!("all is well");
    ExitCode::SUCCESS
}

//! Diagnostic companion binary: drive a single unit transition or
//! status query through the same systemd driver the supervisor uses.
//!
//! ```text
//! svcctl <start|stop|restart|status> <unit>
//! ```
//!
//! Exits 0 on success, 1 on any failure.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use svcvisor::{normalize_unit_name, SystemdDriver, UnitDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
    Start,
    Stop,
    Restart,
    Status,
}

impl Task {
    fn as_str(self) -> &'static str {
        match self {
            Task::Start => "start",
            Task::Stop => "stop",
            Task::Restart => "restart",
            Task::Status => "status",
        }
    }
}

/// One-shot unit control for diagnostics.
#[derive(Debug, Parser)]
#[command(name = "svcctl", version, about)]
struct Cli {
    /// Operation to perform.
    #[arg(value_enum)]
    task: Task,

    /// Unit name; `.service` is appended when no extension is given.
    name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let unit = normalize_unit_name(&cli.name);

    let driver = match SystemdDriver::connect().await {
        Ok(driver) => driver,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.task {
        Task::Start => driver
            .start(&unit)
            .await
            .map(|()| format!("{unit} start requested")),
        Task::Stop => driver
            .stop(&unit)
            .await
            .map(|()| format!("{unit} stop requested")),
        Task::Restart => driver
            .restart(&unit)
            .await
            .map(|()| format!("{unit} restart requested")),
        Task::Status => driver
            .status(&unit)
            .await
            .map(|state| format!("{unit} status {state}")),
    };

    match outcome {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("unable to {} {unit}: {err}", cli.task.as_str());
            ExitCode::FAILURE
        }
    }
}

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::{anyhow, Result};
use crate::config::Config;
use crate::error::SessionError;
use crate::session_handle::SessionHandle;

#[derive(Clone)]
pub struct ConsoleState {
    pub sessions: SessionHandle,
    pub config: Arc<Config>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start browsing, or stop it if running
    Browse,
    /// Register the configured service, or unregister it
    Register,
    List,
    Status,
    Threads,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browse" | "b" => Ok(Command::Browse),
            "register" | "unregister" | "r" => Ok(Command::Register),
            "list" | "ls" => Ok(Command::List),
            "status" | "s" => Ok(Command::Status),
            "threads" | "t" => Ok(Command::Threads),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(anyhow!("Unknown command: {} (try `help`)", other)),
        }
    }
}

const HELP: &str = "\
commands:
  browse     start/stop browsing
  register   register/unregister the sample service
  list       print discovered services as JSON
  status     print session state
  threads    log runtime thread usage
  quit       stop everything and exit";

/// Read commands from stdin until `quit` or cancellation.
pub async fn run(state: ConsoleState, cancel: CancellationToken) {
    let mut lines = spawn_stdin_reader();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    tracing::debug!("stdin closed, console disabled");
                    cancel.cancelled().await;
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => {
                        tracing::info!("Quit requested");
                        break;
                    }
                    Ok(command) => {
                        if let Err(e) = execute(&state, command).await {
                            tracing::error!("{:?} failed: {:#}", command, e);
                        }
                    }
                    Err(e) => tracing::warn!("{}", e),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Blocking stdin reads live on their own thread so they never hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read from stdin: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

pub async fn execute(state: &ConsoleState, command: Command) -> Result<()> {
    match command {
        Command::Browse => toggle_browse(state).await,
        Command::Register => toggle_register(state).await,
        Command::List => {
            let services = state.sessions.list().await?;
            println!("{}", serde_json::to_string_pretty(&services)?);
            Ok(())
        }
        Command::Status => {
            let status = state.sessions.status().await?;
            println!("{}", serde_json::to_string(&status)?);
            Ok(())
        }
        Command::Threads => log_threads(state).await,
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

async fn toggle_browse(state: &ConsoleState) -> Result<()> {
    if state.sessions.status().await?.browsing {
        state.sessions.stop_browsing().await?;
        tracing::info!("Browse stopped");
        return Ok(());
    }

    // Drop whatever a failed session left in the list
    state.sessions.stop_browsing().await?;

    let browse = &state.config.browse;
    match state.sessions.start_browsing(&browse.service_type, &browse.domain).await {
        Ok(()) => Ok(()),
        Err(SessionError::AlreadyActive(kind)) => {
            tracing::debug!("{} session already active", kind);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn toggle_register(state: &ConsoleState) -> Result<()> {
    if state.sessions.status().await?.registering {
        state.sessions.stop_registering().await?;
        return Ok(());
    }

    let descriptor = state.config.register.descriptor()?;
    match state.sessions.start_registering(descriptor).await {
        Ok(()) => Ok(()),
        Err(SessionError::AlreadyActive(kind)) => {
            tracing::debug!("{} session already active", kind);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Once discovery settles the process should be down to the runtime workers
/// plus the mDNS daemon thread.
async fn log_threads(state: &ConsoleState) -> Result<()> {
    let metrics = tokio::runtime::Handle::current().metrics();
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let status = state.sessions.status().await?;

    tracing::info!(
        "Runtime workers: {}, available parallelism: {}",
        metrics.num_workers(),
        parallelism
    );
    tracing::info!(
        "Sessions: browsing={}, registering={}, services={}",
        status.browsing,
        status.registering,
        status.services
    );
    Ok(())
}

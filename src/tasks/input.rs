use std::io::{self, BufRead, IsTerminal};

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::events::NavCommand;

/// Maps one line typed on the console to a command.
///
/// `n` next, `p` previous, a blank line of spaces toggles pause, `q` quits.
pub fn parse_command(line: &str) -> Option<NavCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.is_empty() && line.trim().is_empty() {
        return Some(NavCommand::TogglePause);
    }
    match line.trim().to_ascii_lowercase().as_str() {
        "n" | "next" => Some(NavCommand::Next),
        "p" | "prev" | "previous" => Some(NavCommand::Previous),
        "pause" => Some(NavCommand::TogglePause),
        "q" | "quit" => Some(NavCommand::Quit),
        _ => None,
    }
}

/// Reads commands from stdin when it is a terminal. Closing stdin (Ctrl-D)
/// cancels the pipeline.
pub fn spawn_stdin(nav: Sender<NavCommand>, cancel: CancellationToken) {
    if !io::stdin().is_terminal() {
        debug!("stdin is not a terminal; keyboard navigation disabled");
        return;
    }
    tokio::task::spawn_blocking(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("stdin watcher failed: {err}");
                    break;
                }
            };
            match parse_command(&line) {
                Some(command) => {
                    if nav.blocking_send(command).is_err() {
                        return;
                    }
                }
                None => debug!(input = %line, "unrecognised console command"),
            }
        }
        info!("stdin closed; initiating shutdown");
        cancel.cancel();
    });
}

pub fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {err}");
            return;
        }
        info!("ctrl-c received; initiating shutdown");
        cancel.cancel();
    });
}

/// SIGUSR1 skips forward, SIGUSR2 steps back.
#[cfg(unix)]
pub fn spawn_signals(nav: Sender<NavCommand>, cancel: CancellationToken) {
    for (kind, name, command) in [
        (SignalKind::user_defined1(), "SIGUSR1", NavCommand::Next),
        (SignalKind::user_defined2(), "SIGUSR2", NavCommand::Previous),
    ] {
        let nav = nav.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("failed to register {name} handler: {err}");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = stream.recv() => {
                        if received.is_none() {
                            break;
                        }
                        info!(signal = name, ?command, "signal received");
                        if nav.send(command).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[cfg(not(unix))]
pub fn spawn_signals(_nav: Sender<NavCommand>, _cancel: CancellationToken) {}

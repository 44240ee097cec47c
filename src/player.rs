use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CanvasSize, VideoConfig};
use crate::error::MediaError;
use crate::events::{PlayerEvent, PlaybackTicket};

/// Plays one video at a time and reports completion through a channel.
///
/// Every successful [`VideoEngine::play`] yields exactly one [`PlayerEvent`]
/// carrying the same ticket, unless the playback is stopped first.
pub trait VideoEngine: Send {
    fn play(&mut self, path: &Path, ticket: PlaybackTicket) -> Result<(), MediaError>;
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

struct Running {
    ticket: PlaybackTicket,
    pid: Option<u32>,
    cancel: CancellationToken,
}

/// Runs an external player process per video.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    events: Sender<PlayerEvent>,
    current: Option<Running>,
}

impl CommandEngine {
    /// `{width}` and `{height}` in the configured arguments are replaced by
    /// the video output size; the video path is appended last.
    pub fn new(cfg: &VideoConfig, canvas: CanvasSize, events: Sender<PlayerEvent>) -> Self {
        let (width, height) = cfg.output_size(canvas);
        let args = cfg
            .args
            .iter()
            .map(|arg| {
                arg.replace("{width}", &width.to_string())
                    .replace("{height}", &height.to_string())
            })
            .collect();
        Self {
            program: cfg.command.clone(),
            args,
            events,
            current: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Delivers `signal` to the running player before returning.
    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Some(pid) = self.current.as_ref().and_then(|r| r.pid) else {
            return;
        };
        let Ok(raw) = i32::try_from(pid) else {
            warn!(pid, "player pid out of range");
            return;
        };
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => debug!(pid, ?signal, "signalled player"),
            Err(err) => warn!(pid, ?signal, "failed to signal player: {err}"),
        }
    }
}

impl VideoEngine for CommandEngine {
    fn play(&mut self, path: &Path, ticket: PlaybackTicket) -> Result<(), MediaError> {
        self.stop();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|err| MediaError::EngineAttach {
            path: path.to_path_buf(),
            reason: format!("failed to spawn {}: {err}", self.program),
        })?;
        let pid = child.id();
        info!(path = %path.display(), ?pid, ticket = ticket.0, "playing video");

        let cancel = CancellationToken::new();
        let events = self.events.clone();
        let stopped = cancel.clone();
        tokio::spawn(async move {
            let event = tokio::select! {
                _ = stopped.cancelled() => {
                    child.start_kill().ok();
                    let _ = child.wait().await;
                    debug!(ticket = ticket.0, "video stopped");
                    return;
                }
                status = child.wait() => match status {
                    Ok(status) if status.success() => PlayerEvent::Finished(ticket),
                    Ok(status) => PlayerEvent::Failed {
                        ticket,
                        reason: format!("player exited with {status}"),
                    },
                    Err(err) => PlayerEvent::Failed {
                        ticket,
                        reason: err.to_string(),
                    },
                },
            };
            if events.send(event).await.is_err() {
                debug!(ticket = ticket.0, "player event receiver dropped");
            }
        });

        self.current = Some(Running {
            ticket,
            pid,
            cancel,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.current.take() {
            debug!(ticket = running.ticket.0, "stopping video");
            running.cancel.cancel();
        }
    }

    fn pause(&mut self) {
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGSTOP);
        #[cfg(not(unix))]
        warn!("pausing video is not supported on this platform");
    }

    fn resume(&mut self) {
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGCONT);
        #[cfg(not(unix))]
        warn!("resuming video is not supported on this platform");
    }
}

impl Drop for CommandEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

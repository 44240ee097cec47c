use crate::scan::MediaLibrary;

/// Identifies one `play` request handed to the video engine. Completion
/// events carrying an older ticket are stale and get discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackTicket(pub u64);

/// Emitted by the video engine, possibly from another thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Finished(PlaybackTicket),
    Failed {
        ticket: PlaybackTicket,
        reason: String,
    },
}

impl PlayerEvent {
    pub fn ticket(&self) -> PlaybackTicket {
        match self {
            Self::Finished(ticket) => *ticket,
            Self::Failed { ticket, .. } => *ticket,
        }
    }
}

/// Navigation requests from stdin, signals or any other input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Next,
    Previous,
    TogglePause,
    Quit,
}

/// Sent by the files task when a periodic rescan found a different library.
#[derive(Debug)]
pub enum LibraryEvent {
    Rescanned(MediaLibrary),
}

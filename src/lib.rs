pub mod config;
pub mod error;
pub mod events;
pub mod meta;
pub mod plan;
pub mod player;
pub mod presenter;
pub mod scan;
pub mod processing {
    pub mod decode;
    pub mod layout;
    pub mod tiler;
    pub mod timestamp;
}
pub mod tasks {
    pub mod batch;
    pub mod files;
    pub mod input;
    pub mod queue;
    pub mod sequencer;
}

pub use error::MediaError;

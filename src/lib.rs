//! Streaming playback for CWAV/HWAV chunked audio containers.
//!
//! The crate is layered bottom-up: [`audio::container`] parses and
//! validates a file, [`audio::decoder`] pulls PCM out of it (including
//! the ADPCM encodings), [`audio::buffer`] keeps a double-buffered sink
//! fed, and [`audio::engine`] runs the command-driven transport that the
//! binary and embedders talk to. Playlists live in [`queue`], persisted
//! settings in [`config`].

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;


pub use audio::{
    Container, CpalSink, Encoding, ExhaustionReport, Player, PlayerOptions, SampleDecoder,
    TrackChangeListener, TrackDetails,
};
pub use config::AudioConfig;
pub use error::PlayerError;
pub use queue::{PlayFlags, Playlist, PlaylistState};

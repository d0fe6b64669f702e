//! The audio stack: container parsing, sample decoding, the double
//! buffered playback engine and the transport controller on top of it.

pub mod adpcm;
pub mod buffer;
pub mod container;
pub mod decoder;
pub mod engine;
pub mod sink;

#[cfg(test)]
pub mod tests;

pub use container::{Container, Encoding};
pub use decoder::SampleDecoder;
pub use engine::{ExhaustionReport, Player, PlayerOptions, TrackChangeListener, TrackDetails};
pub use sink::{AudioSink, CpalSink};

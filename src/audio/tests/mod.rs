//! Shared test support for the audio stack.

pub mod fixtures;

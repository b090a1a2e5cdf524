//! `pylsltools`: a time-disciplined multi-stream engine for Lab Streaming
//! Layer data. See `SPEC_FULL.md` for the full module-by-module design.

pub mod clock;
pub mod control;
pub mod error;
pub mod generator;
pub mod generator_driver;
pub mod inlet;
pub mod monitor;
pub mod outlet;
pub mod relay;
pub mod resolver;
pub mod sample;
pub mod stream_key;
pub mod supervisor;
pub mod worker;

//! CLI surface (spec.md §6): five entry points, one per subcommand.

pub mod control;
pub mod monitor;
pub mod playback;
pub mod relay;
pub mod simulate;

//! Domain types for the signal engine.

pub mod bar;
pub mod position;
pub mod signal;

pub use bar::{Bar, BarError};
pub use position::{Position, PositionState};
pub use signal::{ExitReason, SignalEvent, SignalKind};

// THEORY:
// The engine talks to the outside world through three narrow, constructor-injected
// seams. Each is a `Send + Sync` trait so the worker can hand calls to the blocking
// thread pool and bound them with a timeout:
//
// - `CaptureSurface`: where frames come from (a real display, a test pattern).
// - `PositionStore`: which fixture sits where, re-read every cycle so placements can
//   be edited while mirroring runs.
// - `LightActuator`: where committed colors go (a lighting bridge, a log).
//
// Implementations shipped here are the ones a runner needs out of the box; the
// lighting bridge itself lives with the caller.

pub mod actuator;
pub mod capture;
pub mod positions;

pub use actuator::{ColorCommand, LightActuator, LoggingActuator};
pub use capture::{CaptureSurface, TestPattern};
#[cfg(feature = "screen")]
pub use capture::ScreenCapture;
pub use positions::{FixtureAssignment, JsonPositionStore, MemoryPositionStore, PositionStore};

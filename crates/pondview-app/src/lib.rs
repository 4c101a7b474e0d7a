//! Viewer application: trace acquisition, playback state, and the
//! terminal frontend.

pub mod loader;
pub mod playback;
pub mod terminal;
pub mod viewer;

pub use loader::TraceSource;
pub use playback::{DEFAULT_INTERVAL, MAX_INTERVAL, MIN_INTERVAL, Playback};
pub use terminal::TerminalUi;
pub use viewer::{ViewerOptions, ViewerState};

//! Word-level playback: the controller state machine, its effect and event
//! vocabulary, and the timer queue the session loop runs it against.

pub mod controller;
pub mod state;
pub mod timers;

pub use controller::{ControllerSettings, PlaybackController};
pub use state::{AdapterEvent, Effect, PlaybackState, SessionCommand, SynthesisChunk};
pub use timers::{TimerId, TimerQueue};

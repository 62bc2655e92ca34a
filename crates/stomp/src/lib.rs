//! STOMP 1.2 frames as carried over WebSocket text messages.

pub mod error;
pub mod frame;
pub mod heartbeat;

pub use error::FrameError;
pub use frame::{Command, Frame, StompMessage};
pub use heartbeat::HeartBeat;

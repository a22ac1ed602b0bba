//! Streaming conversation core: an append-only history plus a controller that turns one
//! provider stream at a time into a committed assistant turn.
pub mod buffer;
pub mod controller;
pub mod error;
pub mod history;
pub mod session;

pub use buffer::{BufferStatus, LiveBuffer, TransitionRejection};
pub use controller::{
    OutcomeKind, SessionController, SessionOptions, StreamLaunch, StreamOutcome, ViewState,
};
pub use error::{SessionError, SessionResult};
pub use history::{History, HistorySnapshot, Role, Turn};
pub use session::{STREAM_CLOSED_EARLY_MESSAGE, Session};

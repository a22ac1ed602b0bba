use std::fmt;

use uuid::Uuid;

/// Stable identifier for one chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Mints a fresh random session identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier for one streaming generation inside a session.
///
/// This must change on every submit so late chunks from a superseded stream can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamGeneration(pub u64);

impl StreamGeneration {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Stream routing key used for stale-chunk rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub session_id: SessionId,
    pub generation: StreamGeneration,
}

impl StreamTarget {
    pub const fn new(session_id: SessionId, generation: StreamGeneration) -> Self {
        Self {
            session_id,
            generation,
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}#{}", self.session_id, self.generation.0)
    }
}

/// Provider-agnostic stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    Delta(String),
    ReasoningDelta(String),
    Done,
    Error(String),
}

impl StreamEventPayload {
    /// Returns true for the single terminal signal a stream may emit.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// One provider event tagged with the stream it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventMapped {
    pub target: StreamTarget,
    pub payload: StreamEventPayload,
}

impl StreamEventMapped {
    pub fn new(target: StreamTarget, payload: StreamEventPayload) -> Self {
        Self { target, payload }
    }

    pub fn delta(target: StreamTarget, text: impl Into<String>) -> Self {
        Self::new(target, StreamEventPayload::Delta(text.into()))
    }

    pub fn done(target: StreamTarget) -> Self {
        Self::new(target, StreamEventPayload::Done)
    }

    pub fn error(target: StreamTarget, message: impl Into<String>) -> Self {
        Self::new(target, StreamEventPayload::Error(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_are_strictly_increasing() {
        let first = StreamGeneration::new(1);
        assert!(first.next() > first);
        assert_eq!(StreamGeneration::new(u64::MAX).next().0, u64::MAX);
    }

    #[test]
    fn targets_from_different_sessions_never_match() {
        let generation = StreamGeneration::new(3);
        let left = StreamTarget::new(SessionId::new_v4(), generation);
        let right = StreamTarget::new(SessionId::new_v4(), generation);
        assert_ne!(left, right);
    }

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(StreamEventPayload::Done.is_terminal());
        assert!(StreamEventPayload::Error("boom".into()).is_terminal());
        assert!(!StreamEventPayload::Delta("x".into()).is_terminal());
        assert!(!StreamEventPayload::ReasoningDelta("x".into()).is_terminal());
    }
}

use parley_llm::StreamTarget;

/// Lifecycle marker for the live answer.
///
/// `Committed`, `Cancelled` and `Failed` are transient: the controller resets to `Idle`
/// within the same call that reached them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferStatus {
    #[default]
    Idle,
    Streaming,
    Committed,
    Cancelled,
    Failed,
}

/// Rejection reason for an illegal buffer transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    AlreadyStreaming {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveStream {
        attempted: Option<StreamTarget>,
    },
    StaleTarget {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

/// In-progress assistant answer for the one stream in flight.
#[derive(Debug, Clone, Default)]
pub struct LiveBuffer {
    target: Option<StreamTarget>,
    accumulated: String,
    status: BufferStatus,
}

impl LiveBuffer {
    pub fn status(&self) -> BufferStatus {
        self.status
    }

    /// Target of the stream currently feeding this buffer.
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self.status {
            BufferStatus::Streaming => self.target,
            _ => None,
        }
    }

    pub fn accepts(&self, target: StreamTarget) -> bool {
        self.active_target() == Some(target)
    }

    /// Accumulated text, present if and only if the buffer is streaming.
    pub fn live_text(&self) -> Option<&str> {
        match self.status {
            BufferStatus::Streaming => Some(self.accumulated.as_str()),
            _ => None,
        }
    }

    pub fn start(&mut self, target: StreamTarget) -> Result<(), TransitionRejection> {
        if let Some(active) = self.active_target() {
            return Err(TransitionRejection::AlreadyStreaming {
                active,
                attempted: target,
            });
        }

        self.target = Some(target);
        self.accumulated.clear();
        self.status = BufferStatus::Streaming;
        Ok(())
    }

    /// Appends one fragment in arrival order.
    pub fn push(&mut self, target: StreamTarget, fragment: &str) -> Result<(), TransitionRejection> {
        self.check_target(Some(target))?;
        self.accumulated.push_str(fragment);
        Ok(())
    }

    /// Moves to `Committed` and hands back the finished text.
    pub fn commit(&mut self, target: StreamTarget) -> Result<String, TransitionRejection> {
        self.check_target(Some(target))?;
        self.status = BufferStatus::Committed;
        Ok(std::mem::take(&mut self.accumulated))
    }

    /// Moves to `Cancelled`, discarding the partial text. `None` cancels whatever is streaming.
    pub fn cancel(
        &mut self,
        target: Option<StreamTarget>,
    ) -> Result<StreamTarget, TransitionRejection> {
        let active = self.check_target(target)?;
        self.accumulated.clear();
        self.status = BufferStatus::Cancelled;
        Ok(active)
    }

    /// Moves to `Failed`, discarding the partial text.
    pub fn fail(&mut self, target: StreamTarget) -> Result<(), TransitionRejection> {
        self.check_target(Some(target))?;
        self.accumulated.clear();
        self.status = BufferStatus::Failed;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.target = None;
        self.accumulated.clear();
        self.status = BufferStatus::Idle;
    }

    fn check_target(
        &self,
        attempted: Option<StreamTarget>,
    ) -> Result<StreamTarget, TransitionRejection> {
        let Some(active) = self.active_target() else {
            return Err(TransitionRejection::NoActiveStream { attempted });
        };

        match attempted {
            Some(attempted) if attempted != active => {
                Err(TransitionRejection::StaleTarget { active, attempted })
            }
            _ => Ok(active),
        }
    }
}

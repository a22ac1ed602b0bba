use parley_llm::{ProviderError, StreamTarget};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    /// The provider refused the request before any stream was opened.
    #[snafu(display("request for {target} was rejected on `{stage}`: {source}"))]
    RequestRejected {
        stage: &'static str,
        target: StreamTarget,
        source: ProviderError,
    },
    #[snafu(display("session view channel closed on `{stage}`"))]
    ViewClosed { stage: &'static str },
}

pub type SessionResult<T> = Result<T, SessionError>;

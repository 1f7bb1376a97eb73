//! Error types for the RTSP session bridge.

use std::fmt;

use crate::client::ClientError;

/// Errors returned by [`Puller`](crate::Puller) and [`Pusher`](crate::Pusher).
///
/// Variants follow the order in which a session can fail:
///
/// - **Configuration**: [`InvalidUrl`](Self::InvalidUrl),
///   [`MissingHost`](Self::MissingHost),
///   [`InvalidTransport`](Self::InvalidTransport),
///   [`InvalidMediaKind`](Self::InvalidMediaKind). Raised before any
///   network action.
/// - **Connect**: [`Connect`](Self::Connect), the remote was not reachable.
/// - **Negotiation**: [`Request`](Self::Request),
///   [`NoTracks`](Self::NoTracks), [`NotConnected`](Self::NotConnected).
/// - **Runtime**: [`Stream`](Self::Stream) while playing,
///   [`Write`](Self::Write) while relaying.
/// - **Cancellation**: [`Stopped`](Self::Stopped). `pull`/`push` report a
///   stop through [`SessionHandle`](crate::SessionHandle) as a clean end,
///   so callers only see it from [`Session::request`](crate::session::Session::request).
///
/// None of these are retried internally; the caller owns reconnect policy.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// The remote address could not be parsed as a URL.
    #[error("invalid remote URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The remote URL parsed but has no host to connect to.
    #[error("remote URL has no host: {0}")]
    MissingHost(String),

    /// A transport preference string other than `tcp`, `udp` or unset.
    #[error("invalid transport preference: {0:?} (expected \"tcp\", \"udp\" or empty)")]
    InvalidTransport(String),

    /// A media kind other than `video` or `audio`.
    #[error("unsupported media kind: {0:?}")]
    InvalidMediaKind(String),

    /// Opening the connection to the remote server failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: ClientError,
    },

    /// An RTSP request in the negotiation sequence failed.
    #[error("{method} failed: {source}")]
    Request {
        method: RequestMethod,
        #[source]
        source: ClientError,
    },

    /// The session ended with an I/O error after PLAY.
    #[error("session terminated: {0}")]
    Stream(#[source] ClientError),

    /// Writing a relayed packet to the remote server failed.
    #[error("failed to write packet on track {track}: {source}")]
    Write {
        track: usize,
        #[source]
        source: ClientError,
    },

    /// `pull`/`push` was called without a successful `connect`.
    #[error("session not connected")]
    NotConnected,

    /// The engine had no tracks to announce.
    #[error("no tracks available to announce")]
    NoTracks,

    /// The session was stopped before the next request went out.
    #[error("session stopped")]
    Stopped,
}

impl RtspError {
    /// The request step that failed, if this is a negotiation error.
    pub fn method(&self) -> Option<RequestMethod> {
        match self {
            Self::Request { method, .. } => Some(*method),
            _ => None,
        }
    }
}

/// RTSP request methods issued by the bridge (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Options,
    Describe,
    Setup,
    Play,
    Announce,
    Record,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Options => write!(f, "OPTIONS"),
            Self::Describe => write!(f, "DESCRIBE"),
            Self::Setup => write!(f, "SETUP"),
            Self::Play => write!(f, "PLAY"),
            Self::Announce => write!(f, "ANNOUNCE"),
            Self::Record => write!(f, "RECORD"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

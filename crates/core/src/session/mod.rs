//! RTSP client session state (RFC 2326 §A.1, client side).
//!
//! A [`Session`] exists for one connect attempt of a
//! [`Puller`](crate::Puller) or [`Pusher`](crate::Pusher). It owns the
//! protocol client, the parsed remote URL, the negotiated transport and the
//! negotiated track list. The part that other threads need is split into a
//! cloneable [`SessionHandle`].
//!
//! ## Lifecycles
//!
//! ```text
//! pull: Idle -> Connected -> OptionsOk -> TracksDescribed -> TracksSetup -> Playing
//! push: Idle -> Connected -> Announced -> TracksSetup -> Recording -> Relaying
//!
//! any state -> Stopped | Failed   (terminal, never left)
//! ```

pub mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use url::Url;

use crate::client::{ClientError, RtspClient, Track};
use crate::error::{RequestMethod, Result, RtspError};
pub use transport::TransportMode;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection opened yet.
    Idle,
    /// Transport-level connection is open.
    Connected,
    /// Pull: OPTIONS answered.
    OptionsOk,
    /// Pull: DESCRIBE returned the track list.
    TracksDescribed,
    /// Push: ANNOUNCE accepted.
    Announced,
    /// Every track was SETUP.
    TracksSetup,
    /// Pull: PLAY accepted, packets flowing in.
    Playing,
    /// Push: RECORD accepted.
    Recording,
    /// Push: engine packets are being relayed out.
    Relaying,
    /// Ended without error.
    Stopped,
    /// Ended with an error.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

struct Shared {
    client: Arc<dyn RtspClient>,
    state: RwLock<SessionState>,
    stopped: AtomicBool,
    url: Url,
}

/// Cloneable handle to a live session.
///
/// Handed to the engine through `set_io`. [`stop`](Self::stop) is the
/// cancellation primitive: it may be called from any thread, any number of
/// times, and unblocks a pending wait.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Close the underlying connection.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn stop(&self) -> bool {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::debug!(url = %self.shared.url, "closing RTSP connection");
        self.shared.client.close();
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    pub(crate) fn client(&self) -> &Arc<dyn RtspClient> {
        &self.shared.client
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("url", &self.shared.url.as_str())
            .field("state", &self.state())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// One RTSP client session.
pub struct Session {
    handle: SessionHandle,
    transport: TransportMode,
    tracks: Vec<Track>,
}

impl Session {
    /// Create an idle session for `url` on a not-yet-started client.
    pub fn new(url: Url, transport: TransportMode, client: Arc<dyn RtspClient>) -> Self {
        Session {
            handle: SessionHandle {
                shared: Arc::new(Shared {
                    client,
                    state: RwLock::new(SessionState::Idle),
                    stopped: AtomicBool::new(false),
                    url,
                }),
            },
            transport,
            tracks: Vec::new(),
        }
    }

    /// Open the connection with `start(scheme, host)`.
    ///
    /// On failure the session is left [`Failed`](SessionState::Failed).
    pub fn connect(&self) -> Result<()> {
        let url = self.url();
        let host = host_port(url).ok_or_else(|| RtspError::MissingHost(url.to_string()))?;

        if let Err(source) = self.client().start(url.scheme(), &host) {
            tracing::error!(%url, transport = %self.transport, phase = "start", error = %source, "connect failed");
            self.set_state(SessionState::Failed);
            return Err(RtspError::Connect {
                url: url.to_string(),
                source,
            });
        }

        tracing::info!(%url, transport = %self.transport, "connected");
        self.set_state(SessionState::Connected);
        Ok(())
    }

    /// Issue one request of the negotiation sequence.
    ///
    /// Nothing is sent once the session was stopped; that returns
    /// [`RtspError::Stopped`]. A failure is logged with the step name and
    /// returned as [`RtspError::Request`]; the caller decides how to tear down.
    pub fn request<T>(
        &self,
        method: RequestMethod,
        send: impl FnOnce(&dyn RtspClient) -> std::result::Result<T, ClientError>,
    ) -> Result<T> {
        self.check_live()?;
        tracing::debug!(url = %self.url(), step = %method, "request");
        send(self.client().as_ref()).map_err(|source| {
            tracing::error!(url = %self.url(), step = %method, error = %source, "request failed");
            RtspError::Request { method, source }
        })
    }

    /// `Err(Stopped)` once [`SessionHandle::stop`] was called from anywhere.
    pub fn check_live(&self) -> Result<()> {
        if self.is_stopped() {
            tracing::debug!(url = %self.url(), state = ?self.state(), "session stopped, not continuing");
            return Err(RtspError::Stopped);
        }
        Ok(())
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn client(&self) -> &Arc<dyn RtspClient> {
        &self.handle.shared.client
    }

    pub fn url(&self) -> &Url {
        &self.handle.shared.url
    }

    pub fn transport(&self) -> TransportMode {
        self.transport
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Record the negotiated track set.
    ///
    /// Tracks are fixed once set; a second call is ignored so indices can't
    /// be remapped mid-session.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        if !self.tracks.is_empty() {
            tracing::warn!(url = %self.url(), "track set already negotiated, ignoring");
            return;
        }
        self.tracks = tracks;
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Move to `state`. Terminal states are never left.
    pub fn set_state(&self, state: SessionState) {
        let mut current = self.handle.shared.state.write();
        if current.is_terminal() {
            tracing::trace!(old_state = ?*current, new_state = ?state, "ignoring transition out of terminal state");
            return;
        }
        tracing::debug!(url = %self.handle.shared.url, old_state = ?*current, new_state = ?state, "state transition");
        *current = state;
    }

    /// Close the connection (idempotent) and mark the session stopped
    /// unless it already failed.
    pub fn stop(&self) -> bool {
        let closed = self.handle.stop();
        self.set_state(SessionState::Stopped);
        closed
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_stopped()
    }
}

/// Parse the remote address, rejecting URLs without a host before any
/// network action.
pub fn parse_remote_url(remote: &str) -> Result<Url> {
    let url = Url::parse(remote).map_err(|source| RtspError::InvalidUrl {
        url: remote.to_string(),
        source,
    })?;
    if host_port(&url).is_none() {
        return Err(RtspError::MissingHost(remote.to_string()));
    }
    Ok(url)
}

/// `host[:port]` as passed to `start`.
fn host_port(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

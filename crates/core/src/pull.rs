//! Pull direction: receive media from a remote RTSP server and publish it
//! into the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::client::{ChannelPair, ClientFactory, ClientOptions, PacketReceiver, Track, index_tracks};
use crate::config::BridgeConfig;
use crate::engine::{Publisher, TrackSink};
use crate::error::{RequestMethod, Result, RtspError};
use crate::session::transport::{TransportMode, negotiate};
use crate::session::{self, Session, SessionHandle, SessionState};

/// Routes inbound packets to engine sinks by track index.
///
/// The sink table is installed once, after DESCRIBE, and only read from
/// then on, so the packet path takes no lock. Packets for an index without
/// a sink (unknown, declined, or arriving before installation) are dropped.
#[derive(Default)]
pub struct TrackRouter {
    sinks: OnceLock<Vec<Option<Arc<dyn TrackSink>>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Packet counters of a [`TrackRouter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub delivered: u64,
    pub dropped: u64,
}

impl TrackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the sink table for `track_count` negotiated tracks.
    ///
    /// Extra sinks beyond `track_count` are discarded. Returns `false` if a
    /// table was already installed; the existing one is kept.
    pub fn install(&self, mut sinks: Vec<Option<Arc<dyn TrackSink>>>, track_count: usize) -> bool {
        sinks.truncate(track_count);
        let accepted = sinks.iter().filter(|s| s.is_some()).count();
        if self.sinks.set(sinks).is_err() {
            tracing::warn!("track sinks already installed, keeping existing mapping");
            return false;
        }
        tracing::debug!(track_count, accepted, "track sinks installed");
        true
    }

    /// Deliver `packet` to the sink for `track`. Returns whether it was delivered.
    pub fn route(&self, track: usize, packet: Bytes) -> bool {
        match self.sinks.get().and_then(|sinks| sinks.get(track)).and_then(Option::as_ref) {
            Some(sink) => {
                sink.write_packet(packet);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                tracing::trace!(track, len = packet.len(), "no sink for track, dropping packet");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> RouteStats {
        RouteStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl PacketReceiver for TrackRouter {
    fn on_packet(&self, track: usize, packet: Bytes) {
        self.route(track, packet);
    }
}

/// RTSP client that pulls a remote stream into a [`Publisher`].
///
/// The caller drives it as `connect()` then `pull()`, and owns retrying:
/// calling `connect()` again after a failure starts a new session, and with
/// no configured transport each new attempt flips between TCP and UDP.
///
/// `pull()` blocks until the session ends. To end it from elsewhere use the
/// [`SessionHandle`] from [`handle`](Self::handle) (also given to the engine
/// through [`Publisher::set_io`]).
pub struct Puller {
    remote_url: String,
    config: Arc<BridgeConfig>,
    factory: Arc<dyn ClientFactory>,
    publisher: Arc<dyn Publisher>,
    last_transport: Option<TransportMode>,
    session: Option<Session>,
    router: Arc<TrackRouter>,
}

impl Puller {
    pub fn new(
        remote_url: &str,
        config: Arc<BridgeConfig>,
        factory: Arc<dyn ClientFactory>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            remote_url: remote_url.to_string(),
            config,
            factory,
            publisher,
            last_transport: None,
            session: None,
            router: Arc::new(TrackRouter::new()),
        }
    }

    /// Open a new connection to the remote server.
    ///
    /// Any previous session is stopped first. Once the URL parses, the
    /// chosen transport is remembered even if the connection is refused, so
    /// the next attempt can flip it. A refused connection is closed before
    /// returning.
    pub fn connect(&mut self) -> Result<()> {
        if let Some(previous) = self.session.take() {
            previous.stop();
        }

        let url = session::parse_remote_url(&self.remote_url).inspect_err(|e| {
            tracing::error!(url = %self.remote_url, error = %e, "invalid pull URL");
        })?;

        let transport = negotiate(self.config.pull_transport, self.last_transport);
        self.last_transport = Some(transport);

        let router = Arc::new(TrackRouter::new());
        let receiver: Arc<dyn PacketReceiver> = router.clone();
        let client = self.factory.new_client(ClientOptions {
            transport,
            read_buffer_count: self.config.read_buffer_count,
            receiver: Some(receiver),
        });

        let session = Session::new(url, transport, client);
        let connected = session.connect();
        if connected.is_err() {
            session.stop();
        }
        let handle = session.handle();
        self.router = router;
        self.session = Some(session);
        connected?;

        self.publisher.set_io(handle);
        Ok(())
    }

    /// Run OPTIONS, DESCRIBE, SETUP per track and PLAY, then block until
    /// the session ends.
    ///
    /// The session is always stopped on return. Errors name the failing
    /// step; nothing is retried. A stop through the [`SessionHandle`] at any
    /// point ends it cleanly with no further requests.
    pub fn pull(&mut self) -> Result<()> {
        match &self.session {
            Some(session) if session.state() == SessionState::Connected => {}
            _ => return Err(RtspError::NotConnected),
        }
        let result = match self.play_session() {
            Err(RtspError::Stopped) => Ok(()),
            result => result,
        };
        self.finish(result)
    }

    fn play_session(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(RtspError::NotConnected)?;
        let url = session.url().clone();

        session.request(RequestMethod::Options, |c| c.options(&url))?;
        session.set_state(SessionState::OptionsOk);

        let (tracks, base_url) = session.request(RequestMethod::Describe, |c| c.describe(&url))?;
        let tracks = index_tracks(tracks);
        tracing::info!(%url, tracks = tracks.len(), "tracks described");
        session.set_state(SessionState::TracksDescribed);

        session.check_live()?;
        let sinks = self.publisher.set_tracks(&tracks);
        self.router.install(sinks, tracks.len());
        session.set_tracks(tracks);

        for track in session.tracks() {
            session.request(RequestMethod::Setup, |c| {
                c.setup(track, &base_url, ChannelPair::AUTO)
            })?;
        }
        session.set_state(SessionState::TracksSetup);

        session.request(RequestMethod::Play, |c| c.play())?;
        session.set_state(SessionState::Playing);
        tracing::info!(%url, transport = %session.transport(), "playing");

        match session.client().wait() {
            Ok(()) => Ok(()),
            Err(_) if session.is_stopped() => Ok(()),
            Err(source) => {
                tracing::warn!(%url, error = %source, "session terminated");
                Err(RtspError::Stream(source))
            }
        }
    }

    fn finish(&mut self, result: Result<()>) -> Result<()> {
        if let Some(session) = &self.session {
            if result.is_err() {
                session.set_state(SessionState::Failed);
            }
            session.stop();
            self.publisher.stop();
            let stats = self.router.stats();
            tracing::info!(
                url = %session.url(),
                state = ?session.state(),
                delivered = stats.delivered,
                dropped = stats.dropped,
                "pull session ended"
            );
        }
        result
    }

    /// Stop the current session, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(session) = &self.session {
            session.stop();
        }
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.session.as_ref().map(Session::handle)
    }

    pub fn state(&self) -> SessionState {
        self.session.as_ref().map_or(SessionState::Idle, Session::state)
    }

    /// Transport used by the most recent connect attempt.
    pub fn transport(&self) -> Option<TransportMode> {
        self.last_transport
    }

    pub fn tracks(&self) -> &[Track] {
        self.session.as_ref().map(Session::tracks).unwrap_or_default()
    }

    pub fn stats(&self) -> RouteStats {
        self.router.stats()
    }
}

impl Drop for Puller {
    fn drop(&mut self) {
        self.stop();
    }
}

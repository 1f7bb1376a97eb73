//! Push direction: send engine media to a remote RTSP server (ANNOUNCE /
//! RECORD, RFC 2326 §10.3 and §10.11).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::client::{ChannelPair, ClientFactory, ClientOptions, MediaKind, Track, index_tracks};
use crate::config::BridgeConfig;
use crate::engine::{EngineEvent, EventHandler, Subscriber};
use crate::error::{RequestMethod, Result, RtspError};
use crate::session::transport::{TransportMode, negotiate};
use crate::session::{self, Session, SessionHandle, SessionState};

/// Forwards engine packet events to the remote server.
///
/// Video and audio packets go to the first announced track of that kind;
/// every other event is handed to the subscriber's own handler. Delivery is
/// best effort: the first write error stops the session and later events
/// are ignored.
pub struct Relay {
    handle: SessionHandle,
    video: Option<usize>,
    audio: Option<usize>,
    base: Arc<dyn Subscriber>,
    failure: OnceLock<RtspError>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Relay {
    /// Track indices are taken from `tracks` now and never change.
    pub fn new(handle: SessionHandle, tracks: &[Track], base: Arc<dyn Subscriber>) -> Self {
        let first = |kind: MediaKind| tracks.iter().find(|t| t.kind == kind).map(|t| t.index);
        Self {
            handle,
            video: first(MediaKind::Video),
            audio: first(MediaKind::Audio),
            base,
            failure: OnceLock::new(),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn video_track(&self) -> Option<usize> {
        self.video
    }

    pub fn audio_track(&self) -> Option<usize> {
        self.audio
    }

    fn forward(&self, kind: MediaKind, track: Option<usize>, packet: Bytes) {
        if self.handle.is_stopped() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(track) = track else {
            tracing::trace!(%kind, "no announced track for packet kind, dropping");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match self.handle.client().write_packet(track, packet) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(source) => {
                tracing::error!(url = %self.handle.url(), track, error = %source, "write failed, stopping session");
                let _ = self.failure.set(RtspError::Write { track, source });
                self.handle.stop();
            }
        }
    }

    /// Packets written and packets dropped so far.
    pub fn counts(&self) -> (u64, u64) {
        (
            self.sent.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }

    /// The first write error, if any.
    pub fn into_result(self) -> Result<()> {
        match self.failure.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl EventHandler for Relay {
    fn on_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::VideoPacket(packet) => self.forward(MediaKind::Video, self.video, packet),
            EngineEvent::AudioPacket(packet) => self.forward(MediaKind::Audio, self.audio, packet),
            other => self.base.on_event(other),
        }
    }
}

/// RTSP client that publishes a [`Subscriber`]'s media to a remote server.
///
/// Driven as `connect()` then `push()`; the caller owns retrying. `push()`
/// blocks while the engine dispatches events through the relay.
pub struct Pusher {
    remote_url: String,
    config: Arc<BridgeConfig>,
    factory: Arc<dyn ClientFactory>,
    subscriber: Arc<dyn Subscriber>,
    last_transport: Option<TransportMode>,
    session: Option<Session>,
}

impl Pusher {
    pub fn new(
        remote_url: &str,
        config: Arc<BridgeConfig>,
        factory: Arc<dyn ClientFactory>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Self {
        Self {
            remote_url: remote_url.to_string(),
            config,
            factory,
            subscriber,
            last_transport: None,
            session: None,
        }
    }

    /// Open a new connection and probe it with OPTIONS.
    ///
    /// A refused connection or a failed probe closes the client before
    /// returning.
    pub fn connect(&mut self) -> Result<()> {
        if let Some(previous) = self.session.take() {
            previous.stop();
        }

        let url = session::parse_remote_url(&self.remote_url).inspect_err(|e| {
            tracing::error!(url = %self.remote_url, error = %e, "invalid push URL");
        })?;

        let transport = negotiate(self.config.push_transport, self.last_transport);
        self.last_transport = Some(transport);

        let client = self.factory.new_client(ClientOptions {
            transport,
            read_buffer_count: self.config.read_buffer_count,
            receiver: None,
        });

        let session = self.session.insert(Session::new(url, transport, client));
        if let Err(err) = session.connect() {
            session.stop();
            return Err(err);
        }
        self.subscriber.set_io(session.handle());

        let url = session.url().clone();
        if let Err(err) = session.request(RequestMethod::Options, |c| c.options(&url)) {
            session.set_state(SessionState::Failed);
            session.stop();
            return Err(err);
        }
        Ok(())
    }

    /// Run ANNOUNCE, SETUP per track and RECORD, then relay engine packets
    /// until the subscription or the session ends.
    ///
    /// The session is always stopped on return. A stop through the
    /// [`SessionHandle`] at any point ends it cleanly with no further
    /// requests.
    pub fn push(&mut self) -> Result<()> {
        match &self.session {
            Some(session) if session.state() == SessionState::Connected => {}
            _ => return Err(RtspError::NotConnected),
        }
        let result = match self.record_session() {
            Err(RtspError::Stopped) => Ok(()),
            result => result,
        };
        self.finish(result)
    }

    fn record_session(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(RtspError::NotConnected)?;
        let url = session.url().clone();

        let tracks = index_tracks(self.subscriber.tracks());
        if tracks.is_empty() {
            tracing::error!(%url, "no tracks to announce");
            return Err(RtspError::NoTracks);
        }

        session.request(RequestMethod::Announce, |c| c.announce(&url, &tracks))?;
        session.set_tracks(tracks);
        session.set_state(SessionState::Announced);

        for track in session.tracks() {
            session.request(RequestMethod::Setup, |c| c.setup(track, &url, ChannelPair::AUTO))?;
        }
        session.set_state(SessionState::TracksSetup);

        session.request(RequestMethod::Record, |c| c.record())?;
        session.set_state(SessionState::Recording);

        let relay = Relay::new(session.handle(), session.tracks(), self.subscriber.clone());
        tracing::info!(
            %url,
            transport = %session.transport(),
            video_track = ?relay.video_track(),
            audio_track = ?relay.audio_track(),
            "recording"
        );
        session.check_live()?;
        session.set_state(SessionState::Relaying);

        self.subscriber.play(&relay);

        let (sent, dropped) = relay.counts();
        tracing::debug!(%url, sent, dropped, "relay finished");
        relay.into_result()
    }

    fn finish(&mut self, result: Result<()>) -> Result<()> {
        if let Some(session) = &self.session {
            if result.is_err() {
                session.set_state(SessionState::Failed);
            }
            session.stop();
            self.subscriber.stop();
            tracing::info!(url = %session.url(), state = ?session.state(), "push session ended");
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
}

impl Drop for Pusher {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Contract with the RTSP protocol library.
//!
//! The bridge never frames RTSP messages, parses SDP or touches RTP headers
//! itself. It drives an [`RtspClient`] supplied by a [`ClientFactory`] and
//! only decides *which* requests to send, in what order, and where the
//! resulting packets go.
//!
//! ## Pull sequence (RFC 2326 §A)
//!
//! ```text
//! start(scheme, host)
//! OPTIONS  -> DESCRIBE -> SETUP (per track) -> PLAY -> wait()
//! ```
//!
//! ## Push sequence (RFC 2326 §10.11)
//!
//! ```text
//! start(scheme, host) -> OPTIONS
//! ANNOUNCE -> SETUP (per track) -> RECORD -> write_packet()...
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::error::RtspError;
use crate::session::transport::TransportMode;

/// Error type surfaced by the protocol library.
pub type ClientError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Kind of media carried by a track (SDP `m=` media field, RFC 4566 §5.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Video => "video",
            Self::Audio => "audio",
        })
    }
}

impl FromStr for MediaKind {
    type Err = RtspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(RtspError::InvalidMediaKind(other.to_string())),
        }
    }
}

/// One negotiated media stream within a session.
///
/// `index` is the position of the track in the negotiated set and is the
/// key used for every packet routed afterwards. The remaining fields are
/// opaque to the bridge and only round-trip through the protocol library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub index: usize,
    pub kind: MediaKind,
    /// `a=control` value from the session description, if any.
    pub control: Option<String>,
    /// Remaining SDP media-level attribute lines (`a=rtpmap:...`, `a=fmtp:...`).
    pub attributes: Vec<String>,
}

impl Track {
    pub fn new(index: usize, kind: MediaKind) -> Self {
        Self {
            index,
            kind,
            control: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: &str) -> Self {
        self.control = Some(control.to_string());
        self
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attributes.push(attribute.to_string());
        self
    }
}

/// Assign indices `0..N-1` by position.
///
/// Applied to every track list entering a session so routing never depends
/// on numbering chosen elsewhere.
pub(crate) fn index_tracks(tracks: Vec<Track>) -> Vec<Track> {
    tracks
        .into_iter()
        .enumerate()
        .map(|(index, track)| Track { index, ..track })
        .collect()
}

/// Interleaved channel or UDP port pair requested in SETUP (RFC 2326 §12.39).
///
/// [`ChannelPair::AUTO`] (`0-0`) lets the protocol library pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPair {
    pub rtp: u16,
    pub rtcp: u16,
}

impl ChannelPair {
    pub const AUTO: ChannelPair = ChannelPair { rtp: 0, rtcp: 0 };
}

/// Receives inbound RTP packets once a pull session is playing.
///
/// Registered through [`ClientOptions::receiver`] before the connection is
/// opened. The library may call it from its own reader threads, concurrently
/// with [`RtspClient::wait`].
pub trait PacketReceiver: Send + Sync {
    fn on_packet(&self, track: usize, packet: Bytes);
}

/// Parameters for a fresh client, one per connect attempt.
#[derive(Clone)]
pub struct ClientOptions {
    pub transport: TransportMode,
    /// Number of packets the library may buffer per read.
    pub read_buffer_count: usize,
    pub receiver: Option<Arc<dyn PacketReceiver>>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("transport", &self.transport)
            .field("read_buffer_count", &self.read_buffer_count)
            .field("receiver", &self.receiver.is_some())
            .finish()
    }
}

/// Creates protocol-library clients.
pub trait ClientFactory: Send + Sync {
    fn new_client(&self, options: ClientOptions) -> Arc<dyn RtspClient>;
}

/// A single RTSP client connection provided by the protocol library.
///
/// Every method takes `&self`: [`close`](Self::close) must be callable from
/// another thread while [`wait`](Self::wait) is blocked, and must make it
/// return promptly.
pub trait RtspClient: Send + Sync {
    /// Open the transport-level connection to `host` (`host[:port]`).
    fn start(&self, scheme: &str, host: &str) -> Result<(), ClientError>;

    fn options(&self, url: &Url) -> Result<(), ClientError>;

    /// Returns the described tracks and the base URL for SETUP.
    fn describe(&self, url: &Url) -> Result<(Vec<Track>, Url), ClientError>;

    fn setup(
        &self,
        track: &Track,
        base_url: &Url,
        channels: ChannelPair,
    ) -> Result<(), ClientError>;

    fn play(&self) -> Result<(), ClientError>;

    fn announce(&self, url: &Url, tracks: &[Track]) -> Result<(), ClientError>;

    fn record(&self) -> Result<(), ClientError>;

    fn write_packet(&self, track: usize, packet: Bytes) -> Result<(), ClientError>;

    /// Block until the session ends.
    ///
    /// Returns `Ok(())` after a remote TEARDOWN or [`close`](Self::close),
    /// `Err` on an I/O failure.
    fn wait(&self) -> Result<(), ClientError>;

    /// Release the connection. Must be idempotent.
    fn close(&self);
}

//! RTSP session bridge.
//!
//! Connects a local media engine to remote RTSP servers in two directions:
//!
//! - [`Puller`] receives a remote stream (OPTIONS, DESCRIBE, SETUP, PLAY)
//!   and feeds each packet to the engine sink registered for its track.
//! - [`Pusher`] publishes engine media to a remote server (OPTIONS,
//!   ANNOUNCE, SETUP, RECORD) by relaying the engine's packet events.
//!
//! RTSP framing, RTP and SDP are left to a protocol library behind
//! [`RtspClient`]; the engine side is reached through the traits in
//! [`engine`].

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod pull;
pub mod push;
pub mod session;

pub use client::{ChannelPair, ClientFactory, ClientOptions, MediaKind, PacketReceiver, RtspClient, Track};
pub use config::BridgeConfig;
pub use engine::{EngineEvent, EventHandler, Publisher, Subscriber, TrackSink};
pub use error::{RequestMethod, Result, RtspError};
pub use pull::Puller;
pub use push::Pusher;
pub use session::transport::negotiate;
pub use session::{SessionHandle, SessionState, TransportMode};

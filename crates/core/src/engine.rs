//! Contract with the local media-routing engine.
//!
//! The engine owns tracks, subscribers and its event bus. The bridge only
//! needs the hooks below: a [`Publisher`] to feed pulled packets into and a
//! [`Subscriber`] to take pushed packets from.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::client::Track;
use crate::session::SessionHandle;

/// Engine-side sink for one pulled track.
pub trait TrackSink: Send + Sync {
    fn write_packet(&self, packet: Bytes);
}

/// Engine-side publisher a [`Puller`](crate::Puller) feeds.
pub trait Publisher: Send + Sync {
    /// Hands over the live connection so the engine can stop it.
    fn set_io(&self, io: SessionHandle);

    /// Called once DESCRIBE has discovered the remote tracks, before any
    /// packet flows.
    ///
    /// The returned sinks are indexed like `tracks`. `None`, or a shorter
    /// vector, declines a track; its packets are dropped.
    fn set_tracks(&self, tracks: &[Track]) -> Vec<Option<Arc<dyn TrackSink>>>;

    /// The session has ended.
    fn stop(&self);
}

/// Event delivered by the engine to a subscriber.
pub enum EngineEvent {
    VideoPacket(Bytes),
    AudioPacket(Bytes),
    /// Anything else (track definitions, control events). Not interpreted
    /// by the bridge.
    Other(Box<dyn Any + Send>),
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoPacket(p) => f.debug_tuple("VideoPacket").field(&p.len()).finish(),
            Self::AudioPacket(p) => f.debug_tuple("AudioPacket").field(&p.len()).finish(),
            Self::Other(_) => f.write_str("Other(..)"),
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Engine-side subscriber a [`Pusher`](crate::Pusher) relays from.
///
/// Its own [`EventHandler`] impl is the default handling for events the
/// bridge does not consume.
pub trait Subscriber: EventHandler {
    fn set_io(&self, io: SessionHandle);

    /// Tracks currently known locally, in announce order.
    fn tracks(&self) -> Vec<Track>;

    /// Dispatch events into `handler` until the subscription ends.
    ///
    /// Implementations should return once the handle passed to
    /// [`set_io`](Self::set_io) reports
    /// [`is_stopped`](SessionHandle::is_stopped).
    fn play(&self, handler: &dyn EventHandler);

    /// The session has ended.
    fn stop(&self);
}

//! Scripted protocol client and engine doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use url::Url;

use rtsp_bridge::client::ClientError;
use rtsp_bridge::{
    ChannelPair, ClientFactory, ClientOptions, EngineEvent, EventHandler, MediaKind, Publisher,
    RtspClient, SessionHandle, SessionState, Subscriber, Track, TrackSink,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How `wait()` ends once PLAY/RECORD succeeded.
#[derive(Debug, Clone, Default)]
pub enum WaitMode {
    /// Block until `close()`.
    #[default]
    UntilClosed,
    /// Remote TEARDOWN right away.
    RemoteTeardown,
    /// I/O error right away.
    IoError(String),
}

/// Behaviour of one client instance.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub refuse_start: bool,
    /// Fail the request whose recorded name equals this (e.g. `"SETUP 0"`).
    pub fail_request: Option<String>,
    pub tracks: Vec<Track>,
    /// Packets delivered to the registered receiver right after PLAY.
    pub inbound: Vec<(usize, Bytes)>,
    pub wait: WaitMode,
    /// Zero-based index of the write that fails.
    pub fail_write: Option<usize>,
}

pub struct MockClient {
    pub options: ClientOptions,
    script: Script,
    calls: Mutex<Vec<String>>,
    writes: Mutex<Vec<(usize, Bytes)>>,
    write_attempts: AtomicUsize,
    closes: AtomicUsize,
    closed: Mutex<bool>,
    closed_cv: Condvar,
}

impl MockClient {
    fn new(options: ClientOptions, script: Script) -> Self {
        Self {
            options,
            script,
            calls: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            write_attempts: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            closed: Mutex::new(false),
            closed_cv: Condvar::new(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<(usize, Bytes)> {
        self.writes.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn log_call(&self, call: String) -> Result<(), ClientError> {
        let failed = self.script.fail_request.as_deref() == Some(call.as_str());
        self.calls.lock().push(call.clone());
        if failed {
            return Err(format!("{call}: 454 Session Not Found").into());
        }
        Ok(())
    }
}

impl RtspClient for MockClient {
    fn start(&self, scheme: &str, host: &str) -> Result<(), ClientError> {
        self.calls.lock().push(format!("START {scheme} {host}"));
        if self.script.refuse_start {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        Ok(())
    }

    fn options(&self, _url: &Url) -> Result<(), ClientError> {
        self.log_call("OPTIONS".to_string())
    }

    fn describe(&self, url: &Url) -> Result<(Vec<Track>, Url), ClientError> {
        self.log_call("DESCRIBE".to_string())?;
        Ok((self.script.tracks.clone(), url.clone()))
    }

    fn setup(&self, track: &Track, _base_url: &Url, channels: ChannelPair) -> Result<(), ClientError> {
        assert_eq!(channels, ChannelPair::AUTO);
        self.log_call(format!("SETUP {}", track.index))
    }

    fn play(&self) -> Result<(), ClientError> {
        self.log_call("PLAY".to_string())?;
        if let Some(receiver) = &self.options.receiver {
            for (track, packet) in &self.script.inbound {
                receiver.on_packet(*track, packet.clone());
            }
        }
        Ok(())
    }

    fn announce(&self, _url: &Url, tracks: &[Track]) -> Result<(), ClientError> {
        self.log_call(format!("ANNOUNCE {}", tracks.len()))
    }

    fn record(&self) -> Result<(), ClientError> {
        self.log_call("RECORD".to_string())
    }

    fn write_packet(&self, track: usize, packet: Bytes) -> Result<(), ClientError> {
        let attempt = self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_write == Some(attempt) {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        self.writes.lock().push((track, packet));
        Ok(())
    }

    fn wait(&self) -> Result<(), ClientError> {
        match &self.script.wait {
            WaitMode::RemoteTeardown => Ok(()),
            WaitMode::IoError(msg) => Err(msg.clone().into()),
            WaitMode::UntilClosed => {
                let mut closed = self.closed.lock();
                while !*closed {
                    self.closed_cv.wait(&mut closed);
                }
                Ok(())
            }
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        *self.closed.lock() = true;
        self.closed_cv.notify_all();
    }
}

/// Hands out clients following a queue of scripts, one per connect.
#[derive(Default)]
pub struct MockFactory {
    scripts: Mutex<VecDeque<Script>>,
    clients: Mutex<Vec<Arc<MockClient>>>,
}

impl MockFactory {
    pub fn with_scripts(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            clients: Mutex::new(Vec::new()),
        })
    }

    pub fn client(&self, n: usize) -> Arc<MockClient> {
        self.clients.lock()[n].clone()
    }

    pub fn clients(&self) -> usize {
        self.clients.lock().len()
    }
}

impl ClientFactory for MockFactory {
    fn new_client(&self, options: ClientOptions) -> Arc<dyn RtspClient> {
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        let client = Arc::new(MockClient::new(options, script));
        self.clients.lock().push(client.clone());
        client
    }
}

#[derive(Default)]
pub struct MockSink {
    packets: Mutex<Vec<Bytes>>,
}

impl MockSink {
    pub fn packets(&self) -> Vec<Bytes> {
        self.packets.lock().clone()
    }
}

impl TrackSink for MockSink {
    fn write_packet(&self, packet: Bytes) {
        self.packets.lock().push(packet);
    }
}

/// Publisher that creates one sink per track except the declined indices.
#[derive(Default)]
pub struct MockPublisher {
    decline: Vec<usize>,
    sinks: Mutex<Vec<Option<Arc<MockSink>>>>,
    io: Mutex<Option<SessionHandle>>,
    set_tracks_calls: AtomicUsize,
    stops: AtomicUsize,
}

impl MockPublisher {
    pub fn declining(decline: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            decline,
            ..Default::default()
        })
    }

    pub fn sink(&self, index: usize) -> Option<Arc<MockSink>> {
        self.sinks.lock().get(index).cloned().flatten()
    }

    pub fn io(&self) -> Option<SessionHandle> {
        self.io.lock().clone()
    }

    pub fn set_tracks_calls(&self) -> usize {
        self.set_tracks_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Publisher for MockPublisher {
    fn set_io(&self, io: SessionHandle) {
        *self.io.lock() = Some(io);
    }

    fn set_tracks(&self, tracks: &[Track]) -> Vec<Option<Arc<dyn TrackSink>>> {
        self.set_tracks_calls.fetch_add(1, Ordering::SeqCst);
        let sinks: Vec<Option<Arc<MockSink>>> = tracks
            .iter()
            .map(|t| (!self.decline.contains(&t.index)).then(|| Arc::new(MockSink::default())))
            .collect();
        *self.sinks.lock() = sinks.clone();
        sinks
            .into_iter()
            .map(|s| s.map(|s| s as Arc<dyn TrackSink>))
            .collect()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Subscriber that dispatches a fixed list of events on `play`.
///
/// A streaming subscriber keeps sending video packets afterwards until its
/// session is stopped (bounded at five seconds).
pub struct MockSubscriber {
    tracks: Vec<Track>,
    events: Mutex<Vec<EngineEvent>>,
    streaming: bool,
    defaulted: Mutex<Vec<EngineEvent>>,
    io: Mutex<Option<SessionHandle>>,
    plays: AtomicUsize,
    stops: AtomicUsize,
}

impl MockSubscriber {
    pub fn new(tracks: Vec<Track>, events: Vec<EngineEvent>) -> Arc<Self> {
        Self::build(tracks, events, false)
    }

    pub fn streaming(tracks: Vec<Track>) -> Arc<Self> {
        Self::build(tracks, Vec::new(), true)
    }

    fn build(tracks: Vec<Track>, events: Vec<EngineEvent>, streaming: bool) -> Arc<Self> {
        Arc::new(Self {
            tracks,
            events: Mutex::new(events),
            streaming,
            defaulted: Mutex::new(Vec::new()),
            io: Mutex::new(None),
            plays: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    /// Events that reached the default handler.
    pub fn defaulted(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.defaulted.lock())
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl EventHandler for MockSubscriber {
    fn on_event(&self, event: EngineEvent) {
        self.defaulted.lock().push(event);
    }
}

impl Subscriber for MockSubscriber {
    fn set_io(&self, io: SessionHandle) {
        *self.io.lock() = Some(io);
    }

    fn tracks(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    fn play(&self, handler: &dyn EventHandler) {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let events = std::mem::take(&mut *self.events.lock());
        let io = self.io.lock().clone();
        let stopped = || io.as_ref().is_some_and(SessionHandle::is_stopped);
        for event in events {
            if stopped() {
                return;
            }
            handler.on_event(event);
        }
        if self.streaming {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !stopped() && Instant::now() < deadline {
                handler.on_event(EngineEvent::VideoPacket(Bytes::from_static(b"frame")));
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn video_audio_tracks() -> Vec<Track> {
    vec![
        Track::new(0, MediaKind::Video)
            .with_control("trackID=0")
            .with_attribute("a=rtpmap:96 H264/90000"),
        Track::new(1, MediaKind::Audio)
            .with_control("trackID=1")
            .with_attribute("a=rtpmap:97 MPEG4-GENERIC/44100/2"),
    ]
}

/// Poll `handle` until it reaches `state` or two seconds pass.
pub fn wait_for_state(handle: &SessionHandle, state: SessionState) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if handle.state() == state {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

use std::fmt;
use std::str::FromStr;

use crate::error::RtspError;

/// Lower transport for RTP data (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Tcp:  Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// Udp:  Transport: RTP/AVP;unicast;client_port=8000-8001
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// RTP interleaved on the RTSP TCP connection (RFC 2326 §10.12).
    Tcp,
    /// RTP over separate UDP ports.
    Udp,
}

impl TransportMode {
    /// The other transport.
    pub fn flipped(self) -> Self {
        match self {
            Self::Tcp => Self::Udp,
            Self::Udp => Self::Tcp,
        }
    }

    /// Parse a configured preference.
    ///
    /// `tcp` and `udp` match ASCII case-insensitively. An empty string or
    /// `auto` means no preference.
    ///
    /// ```
    /// use rtsp_bridge::TransportMode;
    ///
    /// assert_eq!(TransportMode::parse_preference("TCP").unwrap(), Some(TransportMode::Tcp));
    /// assert_eq!(TransportMode::parse_preference("").unwrap(), None);
    /// assert!(TransportMode::parse_preference("sctp").is_err());
    /// ```
    pub fn parse_preference(s: &str) -> Result<Option<Self>, RtspError> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(None);
        }
        s.parse().map(Some)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        })
    }
}

impl FromStr for TransportMode {
    type Err = RtspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Self::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Self::Udp)
        } else {
            Err(RtspError::InvalidTransport(s.to_string()))
        }
    }
}

/// Pick the transport for the next connect attempt.
///
/// An explicit `preference` is used verbatim on every attempt. Without one,
/// the first attempt (`previous == None`) uses TCP and every later attempt
/// flips whatever the previous attempt used, so a caller that reconnects
/// after a failure alternates TCP, UDP, TCP, ...
pub fn negotiate(
    preference: Option<TransportMode>,
    previous: Option<TransportMode>,
) -> TransportMode {
    match (preference, previous) {
        (Some(mode), _) => mode,
        (None, Some(previous)) => previous.flipped(),
        (None, None) => TransportMode::Tcp,
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Media source descriptions.

use serde::{Deserialize, Serialize};

/// Transport protocol of a media source, used to select a source plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// Local file path.
    File,
    /// Pre-opened file descriptor.
    Fd,
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Caller-pushed byte stream.
    Stream,
    /// RTSP session.
    Rtsp,
}

impl ProtocolKind {
    /// Map a URI scheme to a protocol.
    pub fn from_scheme(scheme: &str) -> Option<ProtocolKind> {
        match scheme {
            "file" => Some(ProtocolKind::File),
            "fd" => Some(ProtocolKind::Fd),
            "http" => Some(ProtocolKind::Http),
            "https" => Some(ProtocolKind::Https),
            "stream" => Some(ProtocolKind::Stream),
            "rtsp" => Some(ProtocolKind::Rtsp),
            _ => None,
        }
    }
}

/// What the engine should play or record from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A URI: `file://...`, `fd://<n>?offset=<o>&size=<s>`, `http(s)://...`,
    /// `stream://`, `rtsp://...`, or a bare filesystem path.
    Uri(String),
    /// A pre-opened descriptor with a byte window.
    Fd {
        /// The descriptor.
        fd: i32,
        /// First byte of the window.
        offset: u64,
        /// Window length in bytes.
        size: u64,
    },
    /// Bytes pushed by the caller (capture, live streams).
    Stream,
}

/// Split a URI into scheme and remainder.
///
/// A scheme must be at least two characters before `://`; anything else is
/// treated as a bare file path.
pub fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once("://")?;
    if scheme.len() >= 2 && scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some((scheme, rest))
    } else {
        None
    }
}

impl MediaSource {
    /// Detect the protocol of this source.
    ///
    /// Bare paths are treated as `file`. An unknown scheme yields `None` and
    /// no plugin will match.
    pub fn protocol(&self) -> Option<ProtocolKind> {
        match self {
            MediaSource::Uri(uri) => match split_scheme(uri) {
                Some((scheme, _)) => ProtocolKind::from_scheme(scheme),
                None => Some(ProtocolKind::File),
            },
            MediaSource::Fd { .. } => Some(ProtocolKind::Fd),
            MediaSource::Stream => Some(ProtocolKind::Stream),
        }
    }

    /// The location part of the source: path for files, full URI otherwise.
    pub fn uri(&self) -> Option<&str> {
        match self {
            MediaSource::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    /// Extension of the source path, when one is present.
    pub fn uri_suffix(&self) -> Option<&str> {
        let uri = self.uri()?;
        let path = split_scheme(uri).map_or(uri, |(_, rest)| rest);
        let name = path.rsplit('/').next()?;
        let (stem, suffix) = name.rsplit_once('.')?;
        (!stem.is_empty() && !suffix.is_empty()).then_some(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_detection() {
        assert_eq!(
            MediaSource::Uri("file:///res/sample.mp3".into()).protocol(),
            Some(ProtocolKind::File)
        );
        assert_eq!(
            MediaSource::Uri("/res/sample.mp3".into()).protocol(),
            Some(ProtocolKind::File)
        );
        assert_eq!(
            MediaSource::Uri("https://host/a.m3u8".into()).protocol(),
            Some(ProtocolKind::Https)
        );
        assert_eq!(
            MediaSource::Uri("fd://3?offset=0&size=100".into()).protocol(),
            Some(ProtocolKind::Fd)
        );
        assert_eq!(
            MediaSource::Uri("weird-scheme://x".into()).protocol(),
            None
        );
        assert_eq!(MediaSource::Stream.protocol(), Some(ProtocolKind::Stream));
    }

    #[test]
    fn test_uri_suffix() {
        assert_eq!(
            MediaSource::Uri("file:///res/sample.mp3".into()).uri_suffix(),
            Some("mp3")
        );
        assert_eq!(
            MediaSource::Uri("/res/noext".into()).uri_suffix(),
            None
        );
        assert_eq!(MediaSource::Uri("/res/.hidden".into()).uri_suffix(), None);
    }
}

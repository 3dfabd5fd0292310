/*!
    Where a pipeline reads from or writes to.
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use vio_types::{ContainerFormat, Error, Result};

use crate::config::StreamOptions;

/**
    Network transport, selected by URL scheme.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    Rtsp,
    Rtp,
    Srtp,
    Udp,
    Tcp,
}

impl Transport {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "rtsp" | "rtsps" => Some(Self::Rtsp),
            "rtp" => Some(Self::Rtp),
            "srtp" => Some(Self::Srtp),
            "udp" => Some(Self::Udp),
            "tcp" => Some(Self::Tcp),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Rtsp => "rtsp",
            Self::Rtp => "rtp",
            Self::Srtp => "srtp",
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }

    /**
        Container written to a sink of this transport when none is configured.
    */
    pub fn default_container(&self) -> ContainerFormat {
        match self {
            Self::Rtsp => ContainerFormat::Rtsp,
            Self::Rtp | Self::Srtp => ContainerFormat::Rtp,
            Self::Udp | Self::Tcp => ContainerFormat::MpegTs,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/**
    How often, and how patiently, a network session is re-opened.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn from_options(options: &StreamOptions) -> Self {
        Self::new(options.reconnect_max_attempts, options.reconnect_backoff())
    }

    /**
        Wait before the given attempt, counting from 1. The last entry of the
        schedule repeats; an empty schedule does not wait.
    */
    pub fn delay(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) - 1) as usize;
        self.backoff
            .get(index)
            .or(self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/**
    A network source or sink.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkEndpoint {
    url: Url,
    transport: Transport,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    reconnect: ReconnectPolicy,
}

impl NetworkEndpoint {
    pub fn parse(uri: &str, options: &StreamOptions) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| Error::resource(format!("invalid url {uri}: {e}")))?;
        Self::from_url(url, options)
    }

    fn from_url(url: Url, options: &StreamOptions) -> Result<Self> {
        let transport = Transport::from_scheme(url.scheme())
            .ok_or_else(|| Error::resource(format!("unsupported scheme {}", url.scheme())))?;
        Ok(Self {
            url,
            transport,
            connect_timeout: options.connect_timeout(),
            read_timeout: options.read_timeout(),
            reconnect: ReconnectPolicy::from_options(options),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }
}

/**
    A file path or a network endpoint.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Network(NetworkEndpoint),
}

impl Location {
    /**
        Interpret a path or URL.

        Strings that do not parse as a URL, `file:` URLs and Windows drive
        letters are file paths. Other schemes must name a supported transport.
    */
    pub fn parse(uri: &str, options: &StreamOptions) -> Result<Self> {
        if uri.is_empty() {
            return Err(Error::resource("empty location"));
        }
        match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|()| Error::resource(format!("invalid file url {uri}"))),
            Ok(url) if url.scheme().len() > 1 => {
                NetworkEndpoint::from_url(url, options).map(Self::Network)
            }
            _ => Ok(Self::File(PathBuf::from(uri))),
        }
    }

    /**
        The string handed to the native engine.
    */
    pub fn uri(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().into_owned(),
            Self::Network(endpoint) => endpoint.url.as_str().to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Network(_) => None,
        }
    }

    pub fn endpoint(&self) -> Option<&NetworkEndpoint> {
        match self {
            Self::File(_) => None,
            Self::Network(endpoint) => Some(endpoint),
        }
    }

    /**
        Container a writer uses when none is configured.
    */
    pub fn default_container(&self) -> ContainerFormat {
        match self {
            Self::File(path) => ContainerFormat::from_path(path).unwrap_or(ContainerFormat::Mp4),
            Self::Network(endpoint) => endpoint.transport.default_container(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Network(endpoint) => write!(f, "{}", endpoint.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> Location {
        Location::parse(uri, &StreamOptions::default()).unwrap()
    }

    #[test]
    fn plain_paths_are_files() {
        assert_eq!(parse("clip.mp4"), Location::File(PathBuf::from("clip.mp4")));
        assert_eq!(parse("/tmp/clip.mkv"), Location::File(PathBuf::from("/tmp/clip.mkv")));
        assert_eq!(parse("C:\\videos\\clip.mp4").uri(), "C:\\videos\\clip.mp4");
    }

    #[test]
    fn file_urls_are_files() {
        assert_eq!(parse("file:///tmp/a.mp4"), Location::File(PathBuf::from("/tmp/a.mp4")));
    }

    #[test]
    fn schemes_select_transport() {
        for (uri, transport) in [
            ("rtsp://camera.local:554/live", Transport::Rtsp),
            ("rtp://239.0.0.1:5004", Transport::Rtp),
            ("srtp://10.0.0.2:5004", Transport::Srtp),
            ("udp://127.0.0.1:1234", Transport::Udp),
            ("tcp://127.0.0.1:9000", Transport::Tcp),
        ] {
            let location = parse(uri);
            assert!(location.is_network());
            assert_eq!(location.endpoint().unwrap().transport(), transport, "{uri}");
        }
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = Location::parse("gopher://example.com/x", &StreamOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
        assert!(Location::parse("", &StreamOptions::default()).is_err());
    }

    #[test]
    fn endpoint_takes_timeouts_and_policy_from_options() {
        let options = StreamOptions::default()
            .with_read_timeout(Duration::from_secs(2))
            .with_reconnect_max_attempts(7);
        let endpoint = NetworkEndpoint::parse("rtsp://cam/stream", &options).unwrap();
        assert_eq!(endpoint.read_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(endpoint.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(endpoint.reconnect().max_attempts, 7);
    }

    #[test]
    fn backoff_repeats_last_delay() {
        let policy = ReconnectPolicy::from_options(&StreamOptions::default());
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(4), Duration::from_millis(2000));
        assert_eq!(policy.delay(9), Duration::from_millis(2000));
        assert_eq!(ReconnectPolicy::new(3, Vec::new()).delay(2), Duration::ZERO);
    }

    #[test]
    fn default_container_by_destination() {
        assert_eq!(parse("out.mkv").default_container(), ContainerFormat::Matroska);
        assert_eq!(parse("out.bin").default_container(), ContainerFormat::Mp4);
        assert_eq!(parse("rtsp://server/out").default_container(), ContainerFormat::Rtsp);
        assert_eq!(parse("udp://127.0.0.1:1234").default_container(), ContainerFormat::MpegTs);
    }
}

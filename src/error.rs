use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to bind proxy on {host}:{preferred} and on an ephemeral port: {source}")]
    Bind {
        host: std::net::Ipv4Addr,
        preferred: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build upstream HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("I/O error while reading request: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed before the request head was complete")]
    Incomplete,

    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("Malformed request head: {0}")]
    Parse(#[from] httparse::Error),

    #[error("Invalid Content-Length header: {0}")]
    ContentLength(String),
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Manifest is not well-formed XML at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Manifest ended inside an unterminated AdaptationSet")]
    Unterminated,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to fetch manifest: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Manifest body is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Cannot derive a base URL from '{0}'")]
    BaseUrl(String),

    #[error("Failed to extract tracks: {0}")]
    Extract(#[from] TrackError),
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Cannot parse URL '{0}' for signing")]
    InvalidUrl(String),

    #[error("Signing key rejected by HMAC")]
    InvalidKey,

    #[error("System clock is before the Unix epoch")]
    Clock,
}

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("License request is missing the '{0}' parameter")]
    MissingParameter(&'static str),

    #[error("Upstream license URL '{0}' has no path")]
    InvalidUpstreamUrl(String),

    #[error("Failed to sign license request: {0}")]
    Signing(#[from] SignatureError),

    #[error("License server request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

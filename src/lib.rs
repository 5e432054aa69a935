//! Loopback HTTP proxy sitting between a media player and a streaming service.
//!
//! `GET /manifest?id=<url>` fetches a DASH manifest, injects a `BaseURL` and
//! filters its audio/subtitle tracks. `POST /license?url=<url>` forwards a DRM
//! license challenge upstream with an `x-sky-signature` header attached.

pub mod config;
pub mod error;
pub mod host;
pub mod manifest;
pub mod proxy;
pub mod signature;

pub use error::{LicenseError, ManifestError, ProxyError, SignatureError, TrackError};
pub use host::{HostServices, HostSettings, LogNotifier, Notifier, SettingsSource};
pub use manifest::{rewrite_manifest, RewriteFlags};
pub use proxy::{Proxy, ProxyOptions};
pub use signature::{SignatureHeader, SignatureRequest};

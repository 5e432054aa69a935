use std::sync::Arc;

use log::warn;

use crate::manifest::{DashTrackExtractor, RewriteFlags, TrackExtractor};

pub const DEFAULT_PLATFORM_ID: &str = "skyshowtime";

/// Settings the host application exposes to the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub delete_ec3_audio: bool,
    pub delete_mp4a_audio: bool,
    pub fix_languages: bool,
    pub platform_id: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            delete_ec3_audio: false,
            delete_mp4a_audio: false,
            fix_languages: false,
            platform_id: DEFAULT_PLATFORM_ID.to_string(),
        }
    }
}

impl HostSettings {
    pub fn rewrite_flags(&self) -> RewriteFlags {
        RewriteFlags {
            delete_ec3_audio: self.delete_ec3_audio,
            delete_mp4a_audio: self.delete_mp4a_audio,
            fix_languages: self.fix_languages,
        }
    }
}

/// Source of the host's settings, consulted once per request.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> HostSettings;
}

impl SettingsSource for HostSettings {
    fn current(&self) -> HostSettings {
        self.clone()
    }
}

/// User-facing notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "ottproxy::notify", "{}", message);
    }
}

/// Everything the proxy borrows from its host.
#[derive(Clone)]
pub struct HostServices {
    pub settings: Arc<dyn SettingsSource>,
    pub notifier: Arc<dyn Notifier>,
    pub extractor: Arc<dyn TrackExtractor>,
}

impl HostServices {
    pub fn new(settings: impl SettingsSource + 'static) -> Self {
        HostServices {
            settings: Arc::new(settings),
            notifier: Arc::new(LogNotifier),
            extractor: Arc::new(DashTrackExtractor),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TrackExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

const ANDROID_UA: &str =
    "Mozilla/5.0 (Linux; Android 11; SHIELD Android TV Build/RQ1A.210105.003; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/120.0.6099.230 Mobile Safari/537.36";
const DESKTOP_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MAC_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// User agent sent upstream for a (lower-cased) platform id.
pub fn user_agent(platform_id: &str) -> &'static str {
    match platform_id {
        "android" | "androidtv" | "skyshowtime" | "peacocktv" => ANDROID_UA,
        "mac" | "macos" => MAC_UA,
        _ => DESKTOP_UA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_disable_every_rewrite() {
        let flags = HostSettings::default().rewrite_flags();
        assert_eq!(flags, RewriteFlags::default());
    }

    #[test]
    fn test_rewrite_flags_follow_settings() {
        let settings = HostSettings {
            delete_ec3_audio: true,
            fix_languages: true,
            ..HostSettings::default()
        };

        let flags = settings.current().rewrite_flags();
        assert!(flags.delete_ec3_audio);
        assert!(!flags.delete_mp4a_audio);
        assert!(flags.fix_languages);
    }

    #[test]
    fn test_user_agent_known_platforms() {
        assert!(user_agent("android").contains("Android"));
        assert!(user_agent("skyshowtime").contains("Android"));
        assert!(user_agent("mac").contains("Macintosh"));
    }

    #[test]
    fn test_user_agent_unknown_platform_falls_back_to_desktop() {
        assert_eq!(user_agent("toaster"), DESKTOP_UA);
    }
}

use log::{debug, trace};
use reqwest::Url;

use crate::error::ManifestError;

mod language;
mod tracks;

pub use tracks::{DashTrackExtractor, ExtractedTracks, Track, TrackExtractor, TrackKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteFlags {
    pub delete_ec3_audio: bool,
    pub delete_mp4a_audio: bool,
    pub fix_languages: bool,
}

/// Rewrites a fetched manifest for the player.
///
/// Edits are applied in a fixed order, each as a whole-fragment substitution
/// on the document produced by the previous one: base URL, ec-3 deletion,
/// mp4a deletion, split subtitle deletion, language fixes. A fragment that
/// an earlier step replaced is no longer found by a later one.
pub fn rewrite_manifest(
    raw: &str,
    final_url: &str,
    flags: &RewriteFlags,
    extractor: &dyn TrackExtractor,
) -> Result<String, ManifestError> {
    let base_url = base_url(final_url)?;
    trace!(target: "ottproxy", "baseurl: {}", base_url);

    let mut content = insert_base_url(raw, &base_url);

    let tracks = extractor.extract(&content)?;
    debug!(target: "ottproxy", "Extracted {} audio and {} subtitle tracks", tracks.audios.len(), tracks.subs.len());

    if flags.delete_ec3_audio {
        delete_audio_by_codec(&mut content, &tracks.audios, "ec-3");
    }

    if flags.delete_mp4a_audio {
        delete_audio_by_codec(&mut content, &tracks.audios, "mp4a");
    }

    // The player cannot consume segmented subtitles and turns every
    // subtitle off when one is present.
    for track in tracks.subs.iter().filter(|t| t.split) {
        let comment = format!("<!-- Deleted subtitle track {} -->\n", track.language);
        replace_fragment(&mut content, &track.original_fragment, &comment);
    }

    if flags.fix_languages {
        for track in tracks.subs.iter().chain(&tracks.audios) {
            if let Some(modified) = &track.modified_fragment {
                replace_fragment(&mut content, &track.original_fragment, modified);
            }
        }
    }

    Ok(content)
}

/// Directory of the final request URL, without trailing slash, query or fragment.
pub fn base_url(final_url: &str) -> Result<String, ManifestError> {
    let mut url = Url::parse(final_url).map_err(|_| ManifestError::BaseUrl(final_url.to_string()))?;
    url.set_query(None);
    url.set_fragment(None);

    let url = url.as_str();
    let scheme_end = url.find("://").map_or(0, |pos| pos + 3);

    match url[scheme_end..].rfind('/') {
        Some(pos) => Ok(url[..scheme_end + pos].to_string()),
        None => Err(ManifestError::BaseUrl(final_url.to_string())),
    }
}

/// Inserts `<BaseURL>` right before the first `<Period`, if there is one.
fn insert_base_url(content: &str, base_url: &str) -> String {
    match content.find("<Period") {
        Some(pos) => format!(
            "{}<BaseURL>{}/</BaseURL>{}",
            &content[..pos],
            base_url,
            &content[pos..]
        ),
        None => content.to_string(),
    }
}

fn delete_audio_by_codec(content: &mut String, audios: &[Track], codec: &str) {
    for track in audios.iter().filter(|t| t.codec.contains(codec)) {
        let comment = format!("<!-- Deleted {} audio track {} -->\n", codec, track.language);
        replace_fragment(content, &track.original_fragment, &comment);
    }
}

fn replace_fragment(content: &mut String, fragment: &str, replacement: &str) {
    if fragment.is_empty() {
        return;
    }

    if let Some(pos) = content.find(fragment) {
        content.replace_range(pos..pos + fragment.len(), replacement);
    }
}

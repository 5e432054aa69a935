use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::TrackError;

use super::language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Subtitle,
}

/// One audio or subtitle `AdaptationSet` of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    pub codec: String,
    pub language: String,
    /// Exact text of the `AdaptationSet` element as it appears in the manifest.
    pub original_fragment: String,
    /// Same fragment with its language fixed, when a fix applies.
    pub modified_fragment: Option<String>,
    /// Subtitles delivered as fragmented segments.
    pub split: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTracks {
    pub audios: Vec<Track>,
    pub subs: Vec<Track>,
}

pub trait TrackExtractor: Send + Sync {
    fn extract(&self, xml: &str) -> Result<ExtractedTracks, TrackError>;
}

/// Extracts tracks from a DASH MPD, one per audio or text `AdaptationSet`.
pub struct DashTrackExtractor;

impl TrackExtractor for DashTrackExtractor {
    fn extract(&self, xml: &str) -> Result<ExtractedTracks, TrackError> {
        let mut reader = Reader::from_str(xml);
        let mut tracks = ExtractedTracks::default();
        let mut pending: Option<PendingSet> = None;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|source| TrackError::Xml {
                position: reader.buffer_position() as usize,
                source,
            })?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(ref e) | Event::Empty(ref e)
                    if e.local_name().as_ref() == b"AdaptationSet" =>
                {
                    let set = PendingSet::open(e, before).map_err(|source| TrackError::Xml {
                        position: before,
                        source,
                    })?;

                    if matches!(event, Event::Empty(_)) {
                        tracks.push(set.close(xml, after));
                    } else {
                        pending = Some(set);
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if let Some(set) = pending.as_mut() {
                        set.child(e).map_err(|source| TrackError::Xml {
                            position: before,
                            source,
                        })?;
                    }
                }
                Event::End(ref e) if e.local_name().as_ref() == b"AdaptationSet" => {
                    if let Some(set) = pending.take() {
                        tracks.push(set.close(xml, after));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if pending.is_some() {
            return Err(TrackError::Unterminated);
        }

        Ok(tracks)
    }
}

impl ExtractedTracks {
    fn push(&mut self, track: Option<Track>) {
        match track {
            Some(track) if track.kind == TrackKind::Audio => self.audios.push(track),
            Some(track) => self.subs.push(track),
            None => {}
        }
    }
}

struct PendingSet {
    start: usize,
    content_type: Option<String>,
    mime_types: Vec<String>,
    codecs: Vec<String>,
    lang: Option<String>,
    segment_template: bool,
}

impl PendingSet {
    fn open(element: &BytesStart<'_>, start: usize) -> Result<Self, quick_xml::Error> {
        let mut set = PendingSet {
            start,
            content_type: attribute(element, b"contentType")?,
            mime_types: Vec::new(),
            codecs: Vec::new(),
            lang: attribute(element, b"lang")?,
            segment_template: false,
        };
        set.collect_media_attributes(element)?;
        Ok(set)
    }

    fn child(&mut self, element: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        match element.local_name().as_ref() {
            b"Representation" => self.collect_media_attributes(element),
            b"SegmentTemplate" => {
                self.segment_template = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn collect_media_attributes(&mut self, element: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        if let Some(mime) = attribute(element, b"mimeType")? {
            self.mime_types.push(mime);
        }
        if let Some(codecs) = attribute(element, b"codecs")? {
            if !self.codecs.contains(&codecs) {
                self.codecs.push(codecs);
            }
        }
        Ok(())
    }

    fn kind(&self) -> Option<TrackKind> {
        match self.content_type.as_deref() {
            Some("audio") => return Some(TrackKind::Audio),
            Some("text") => return Some(TrackKind::Subtitle),
            Some(_) => return None,
            None => {}
        }

        if self.mime_types.iter().any(|m| m.starts_with("audio/")) {
            return Some(TrackKind::Audio);
        }

        let text_mime = self
            .mime_types
            .iter()
            .any(|m| m.starts_with("text/") || m == "application/ttml+xml");
        let text_codec = self
            .codecs
            .iter()
            .any(|c| c.contains("stpp") || c.contains("wvtt") || c.contains("ttml"));

        (text_mime || text_codec).then_some(TrackKind::Subtitle)
    }

    fn close(self, xml: &str, end: usize) -> Option<Track> {
        let kind = self.kind()?;
        let original_fragment = xml[self.start..end].to_string();
        let language = self.lang.unwrap_or_else(|| "und".to_string());

        let normalized = language::normalize(&language);
        let modified_fragment = if normalized != language {
            with_language(&original_fragment, &language, &normalized)
        } else {
            None
        };

        Some(Track {
            kind,
            codec: self.codecs.join(","),
            language,
            original_fragment,
            modified_fragment,
            split: kind == TrackKind::Subtitle && self.segment_template,
        })
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Rewrites the `lang` attribute of the fragment's opening tag only.
fn with_language(fragment: &str, original: &str, normalized: &str) -> Option<String> {
    let head_end = fragment.find('>')?;

    for quote in ['"', '\''] {
        let needle = format!("lang={quote}{original}{quote}");
        if let Some(pos) = fragment[..head_end].find(&needle) {
            let mut fixed = String::with_capacity(fragment.len());
            fixed.push_str(&fragment[..pos]);
            fixed.push_str(&format!("lang={quote}{normalized}{quote}"));
            fixed.push_str(&fragment[pos + needle.len()..]);
            return Some(fixed);
        }
    }

    None
}

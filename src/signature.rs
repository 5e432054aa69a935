use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use log::trace;
use md5::{Digest, Md5};
use reqwest::Url;
use sha1::Sha1;

use crate::error::SignatureError;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-sky-signature";

pub const DEFAULT_APP_ID: &str = "NBCU-ANDROID-v3";
pub const DEFAULT_VERSION: &str = "1.0";

const SIGNATURE_KEY: &[u8; 40] = b"JuLQgyFz9n89D9pxcN6ZWZXKWfgj2PNBUb32zybj";

const SIGNED_HEADER_PREFIX: &str = "x-skyott";

/// Inputs of a SkyOTT request signature.
///
/// Header names keep their original case: they are sorted as given, and only
/// the ones starting with `x-skyott` (case-insensitive) take part in the hash.
#[derive(Debug, Clone)]
pub struct SignatureRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub payload: &'a [u8],
    pub timestamp: Option<i64>,
    pub app_id: &'a str,
    pub version: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub name: &'static str,
    pub value: String,
}

impl<'a> SignatureRequest<'a> {
    pub fn new(
        method: &'a str,
        url: &'a str,
        headers: &'a BTreeMap<String, String>,
        payload: &'a [u8],
    ) -> Self {
        SignatureRequest {
            method,
            url,
            headers,
            payload,
            timestamp: None,
            app_id: DEFAULT_APP_ID,
            version: DEFAULT_VERSION,
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn sign(&self) -> Result<SignatureHeader, SignatureError> {
        let timestamp = match self.timestamp {
            Some(ts) => ts,
            None => current_timestamp()?,
        };

        let path = signing_path(self.url)?;
        let headers_md5 = hex_md5(signed_headers(self.headers).as_bytes());
        let payload_md5 = hex_md5(self.payload);

        // The response-code line stays empty when signing a request.
        let to_hash = format!(
            "{method}\n{path}\n\n{app_id}\n{version}\n{headers_md5}\n{timestamp}\n{payload_md5}\n",
            method = self.method,
            path = path,
            app_id = self.app_id,
            version = self.version,
            headers_md5 = headers_md5,
            timestamp = timestamp,
            payload_md5 = payload_md5,
        );

        trace!(target: "ottproxy", "Signing canonical request: {:?}", to_hash);

        let mut mac =
            HmacSha1::new_from_slice(SIGNATURE_KEY).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(to_hash.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(SignatureHeader {
            name: SIGNATURE_HEADER,
            value: format!(
                "SkyOTT client=\"{}\",signature=\"{}\",timestamp=\"{}\",version=\"{}\"",
                self.app_id, signature, timestamp, self.version
            ),
        })
    }
}

fn current_timestamp() -> Result<i64, SignatureError> {
    let now = chrono::Utc::now().timestamp();
    if now < 0 {
        return Err(SignatureError::Clock);
    }
    Ok(now)
}

/// Absolute URLs contribute only their path; anything else is already a path.
///
/// The path is taken verbatim from the URL text, without dot-segment removal
/// or percent-encoding. `;params` on the last segment are not part of it.
fn signing_path(url: &str) -> Result<String, SignatureError> {
    if !url.starts_with("http") {
        return Ok(url.to_string());
    }

    Url::parse(url).map_err(|_| SignatureError::InvalidUrl(url.to_string()))?;

    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| SignatureError::InvalidUrl(url.to_string()))?;

    let path_start = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let path = &rest[path_start..];
    let path = &path[..path.find(['?', '#']).unwrap_or(path.len())];

    let last_segment = path.rfind('/').unwrap_or(0);
    let path = match path[last_segment..].find(';') {
        Some(params) => &path[..last_segment + params],
        None => path,
    };

    Ok(path.to_string())
}

fn signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .filter(|(key, _)| key.to_lowercase().starts_with(SIGNED_HEADER_PREFIX))
        .map(|(key, value)| format!("{}: {}\n", key, value))
        .collect()
}

fn hex_md5(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

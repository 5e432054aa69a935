use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, trace, warn};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;

use crate::error::{LicenseError, ManifestError};
use crate::host::{user_agent, HostServices};
use crate::manifest::rewrite_manifest;
use crate::signature::SignatureRequest;

use super::http::{Request, Response};

const LICENSE_ERROR_LABEL: &str = "License error";

/// Request handling shared by every connection worker.
///
/// The blocking client pools connections and is safe to use from many
/// workers at once.
pub(crate) struct ProxyService {
    client: Client,
    services: HostServices,
}

impl ProxyService {
    pub(crate) fn new(client: Client, services: HostServices) -> Self {
        ProxyService { client, services }
    }

    pub(crate) fn handle(&self, request: &Request) -> Response {
        match request.method.as_str() {
            "GET" => self.handle_get(&request.path),
            "POST" => self.handle_post(request),
            other => {
                debug!(target: "ottproxy", "Unsupported method {} for {}", other, request.path);
                Response::new(StatusCode::NOT_IMPLEMENTED)
            }
        }
    }

    fn handle_get(&self, path: &str) -> Response {
        if !path.contains("manifest") {
            return Response::new(StatusCode::NOT_FOUND);
        }

        let url = manifest_target(path);
        trace!(target: "ottproxy", "url: {}", url);

        match self.fetch_manifest(url) {
            Ok(content) => Response::new(StatusCode::OK)
                .header("Content-Type", "application/xml")
                .body(content.into_bytes()),
            Err(e) => {
                warn!(target: "ottproxy", "Cannot proxy manifest {}: {}. Redirecting player to it.", url, e);
                Response::new(StatusCode::MOVED_PERMANENTLY).header("Location", url)
            }
        }
    }

    fn fetch_manifest(&self, url: &str) -> Result<String, ManifestError> {
        let response = self.client.get(url).send()?.error_for_status()?;
        trace!(target: "ottproxy", "headers: {:?}", response.headers());

        let final_url = response.url().to_string();
        let content = String::from_utf8(response.bytes()?.to_vec())?;

        let settings = self.services.settings.current();

        rewrite_manifest(
            &content,
            &final_url,
            &settings.rewrite_flags(),
            self.services.extractor.as_ref(),
        )
    }

    fn handle_post(&self, request: &Request) -> Response {
        if !request.path.contains("/license") {
            return Response::new(StatusCode::NOT_FOUND);
        }

        match self.forward_license(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "ottproxy", "License request failed: {}", e);
                Response::new(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn forward_license(&self, request: &Request) -> Result<Response, LicenseError> {
        let params = query_params(&request.path);
        debug!(target: "ottproxy", "params: {:?}", params);

        let challenge = &request.body;
        debug!(target: "ottproxy", "License challenge length: {}", challenge.len());
        trace!(target: "ottproxy", "License challenge: {}", STANDARD.encode(challenge));

        let url = params
            .get("url")
            .ok_or(LicenseError::MissingParameter("url"))?;

        let platform_id = self.services.settings.current().platform_id.to_lowercase();
        let path = license_signing_path(url)?;

        let unsigned_headers = BTreeMap::new();
        let signature = SignatureRequest::new("POST", &path, &unsigned_headers, challenge).sign()?;
        trace!(target: "ottproxy", "Signed {} with {}", path, signature.value);

        let response = self
            .client
            .post(url.as_str())
            .header(USER_AGENT, user_agent(&platform_id))
            .header(ACCEPT, "*/*")
            .header(signature.name, signature.value)
            .body(challenge.clone())
            .send()?;

        let status = response.status();
        let license = response.bytes()?.to_vec();
        debug!(target: "ottproxy", "License response status: {}, length: {}", status, license.len());

        self.inspect_license(&license);

        Ok(Response::new(status).body(license))
    }

    /// Surfaces license server errors to the user. Never affects the relayed response.
    fn inspect_license(&self, license: &[u8]) {
        if !license.is_ascii() {
            trace!(target: "ottproxy", "License response: {}", STANDARD.encode(license));
            return;
        }

        trace!(target: "ottproxy", "License response: {}", String::from_utf8_lossy(license));

        if let Some(description) = license_error_description(license) {
            self.services
                .notifier
                .notify(&format!("{}: {}", LICENSE_ERROR_LABEL, description));
        }
    }
}

/// Everything after the first `=` of the raw path, verbatim.
///
/// The player appends the upstream URL unencoded, so this is not a query
/// string parser: a URL containing its own `=` is kept whole.
pub(crate) fn manifest_target(path: &str) -> &str {
    path.split_once('=').map_or(path, |(_, url)| url)
}

fn query_params(path: &str) -> HashMap<String, String> {
    let query = path.split_once('?').map_or(path, |(_, query)| query);

    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Path of the license URL as signed: everything from the first `/` after the host.
fn license_signing_path(url: &str) -> Result<String, LicenseError> {
    url.split_once("://")
        .and_then(|(_, rest)| rest.split_once('/'))
        .map(|(_, path)| format!("/{}", path))
        .ok_or_else(|| LicenseError::InvalidUpstreamUrl(url.to_string()))
}

fn license_error_description(license: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(license).ok()?;
    let object = value.as_object()?;

    if !object.contains_key("errorCode") {
        return None;
    }

    object.get("description").map(|description| match description {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

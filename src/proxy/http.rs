use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use chrono::Utc;
use httparse::{Status, EMPTY_HEADER};
use reqwest::StatusCode;

use crate::error::RequestError;

const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 32;
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const SERVER: &str = concat!("ott-proxy/", env!("CARGO_PKG_VERSION"));

/// A fully read inbound request. Header names are lower-cased.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Vec<u8>,
}

/// Read a line (until \n) as raw bytes, without requiring valid UTF-8.
/// At most `limit` bytes are consumed, so the line may come back without its \n.
fn read_line_bytes<R: BufRead>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    io::Read::take(&mut *reader, limit as u64).read_until(b'\n', &mut line)?;
    Ok(line)
}

fn read_head<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, RequestError> {
    let mut head = Vec::new();

    loop {
        // One byte past the limit is enough to tell an oversized head apart.
        let line = read_line_bytes(reader, MAX_HEAD_SIZE + 1 - head.len())?;
        if line.is_empty() {
            return Err(RequestError::Incomplete);
        }

        head.extend_from_slice(&line);
        if head.len() > MAX_HEAD_SIZE {
            return Err(RequestError::HeadTooLarge(MAX_HEAD_SIZE));
        }

        if line == b"\r\n" || line == b"\n" {
            return Ok(head);
        }
    }
}

pub(crate) fn read_request<R: BufRead>(reader: &mut R) -> Result<Request, RequestError> {
    let head = read_head(reader)?;

    let mut headers = [EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    if let Status::Partial = req.parse(&head)? {
        return Err(RequestError::Incomplete);
    }

    let method = req.method.map(String::from).ok_or(RequestError::Incomplete)?;
    let path = req.path.map(String::from).ok_or(RequestError::Incomplete)?;

    let headers: HashMap<String, String> = req
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|len| *len <= MAX_BODY_SIZE)
            .ok_or_else(|| RequestError::ContentLength(value.clone()))?,
        None => 0,
    };

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    Ok(Request {
        method,
        path,
        headers,
        body,
    })
}

/// Response written back to the player. Every connection carries exactly one.
#[derive(Debug)]
pub(crate) struct Response {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Response {
    pub(crate) fn new(status: StatusCode) -> Self {
        Response {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub(crate) fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub(crate) fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let date = Utc::now().to_rfc2822().replace("+0000", "GMT");

        write!(
            writer,
            "HTTP/1.1 {} {}\r\nServer: {}\r\nDate: {}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or(""),
            SERVER,
            date
        )?;

        for (name, value) in &self.headers {
            write!(writer, "{}: {}\r\n", name, value)?;
        }

        write!(
            writer,
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        )?;

        writer.write_all(&self.body)?;
        writer.flush()
    }
}

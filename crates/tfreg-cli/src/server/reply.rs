//! Responses and how they are written to a connection.

use bytes::{Buf, Bytes};
use futures_util::StreamExt;
use serde::Serialize;
use std::io::{self, Read};
use tfreg_registry::metadata::ProviderVersion;
use tfreg_registry::{ArtifactStream, RegistryError, ARCHIVE_CONTENT_TYPE};
use tiny_http::{Header, Request, Response, StatusCode};
use tokio::sync::mpsc;

/// Archive chunks buffered between the store and the socket
const STREAM_BUFFER_CHUNKS: usize = 8;

pub enum Reply {
    Json { status: u16, body: Vec<u8> },
    /// 204 pointing Terraform at the archive
    Download { location: String },
    Archive { file_name: String, stream: ArtifactStream },
}

impl Reply {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Reply {
        match serde_json::to_vec(value) {
            Ok(body) => Reply::Json { status, body },
            Err(e) => Reply::error(500, &format!("Failed to encode response: {}", e)),
        }
    }

    pub fn error(status: u16, message: &str) -> Reply {
        Reply::Json {
            status,
            body: serde_json::json!({ "error": message }).to_string().into_bytes(),
        }
    }

    /// 404 for unknown names, 500 for everything else
    pub fn from_error(err: &RegistryError) -> Reply {
        if err.is_not_found() {
            return Reply::error(404, &err.to_string());
        }

        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        log::error!("{}", message);
        Reply::error(500, &err.to_string())
    }

    pub fn status(&self) -> u16 {
        match self {
            Reply::Json { status, .. } => *status,
            Reply::Download { .. } => 204,
            Reply::Archive { .. } => 200,
        }
    }

    /// Write the reply, streaming archives chunk by chunk
    pub async fn send(self, request: Request) -> io::Result<()> {
        match self {
            Reply::Json { status, body } => {
                let mut response = Response::from_data(body).with_status_code(StatusCode(status));
                for header in headers(&[("Content-Type", "application/json")]) {
                    response.add_header(header);
                }
                respond(request, response).await
            }
            Reply::Download { location } => {
                let mut response = Response::empty(StatusCode(204));
                for header in headers(&[("X-Terraform-Get", location.as_str())]) {
                    response.add_header(header);
                }
                respond(request, response).await
            }
            Reply::Archive { file_name, mut stream } => {
                let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
                let disposition = format!("attachment; filename=\"{}\"", file_name);
                let archive_headers = headers(&[
                    ("Content-Type", ARCHIVE_CONTENT_TYPE),
                    ("Content-Disposition", disposition.as_str()),
                ]);
                let response = Response::new(StatusCode(200), archive_headers, ChannelReader::new(rx), None, None);
                let writer = respond(request, response);

                let pump = async move {
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e));
                        let failed = chunk.is_err();
                        // A closed channel means the client went away
                        if tx.send(chunk).await.is_err() || failed {
                            break;
                        }
                    }
                };

                let (result, ()) = tokio::join!(writer, pump);
                result
            }
        }
    }
}

fn headers(pairs: &[(&str, &str)]) -> Vec<Header> {
    pairs
        .iter()
        .filter_map(|(name, value)| Header::from_bytes(name.as_bytes(), value.as_bytes()).ok())
        .collect()
}

/// tiny_http writes on a blocking thread
async fn respond<R>(request: Request, response: Response<R>) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || request.respond(response))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Blocking reader over chunks sent from async code
pub struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
}

impl ChannelReader {
    pub fn new(rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

/// `{"modules":[{"versions":[{"version":"1.0.0"}]}]}`
pub fn module_versions_body(versions: &[String]) -> serde_json::Value {
    let versions: Vec<serde_json::Value> = versions
        .iter()
        .map(|v| serde_json::json!({ "version": v }))
        .collect();
    serde_json::json!({ "modules": [{ "versions": versions }] })
}

pub fn provider_versions_body(versions: &[ProviderVersion]) -> serde_json::Value {
    let versions: Vec<serde_json::Value> = versions
        .iter()
        .map(|v| {
            serde_json::json!({
                "version": v.version,
                "protocols": v.protocols,
                "platforms": v.platforms.iter()
                    .map(|p| serde_json::json!({ "os": p.os, "arch": p.arch }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({ "versions": versions })
}

pub fn discovery_body() -> serde_json::Value {
    serde_json::json!({
        "modules.v1": "/terraform/modules/v1/",
        "providers.v1": "/terraform/providers/v1/",
    })
}

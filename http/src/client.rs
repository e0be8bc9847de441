//! reqwest-backed transport implementation

use crate::error::{transport_error, HttpError};
use api_dispatch_core::method::HttpMethod;
use api_dispatch_core::multipart::{MultipartForm, ProgressFn, UploadProgress};
use api_dispatch_core::params::{url_pairs, ParameterEncoding, Parameters};
use api_dispatch_core::transport::{
    Headers, Transport, TransportError, TransportRequest, TransportResponse, UploadRequest,
};
use async_stream::stream;
use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder};
use std::time::Duration;

/// Default per-exchange timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of the chunks the upload body is streamed in; progress is reported
/// once per chunk.
pub const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

/// HTTP transport backed by a shared `reqwest::Client`.
///
/// Responses are returned whatever their status code: the response envelope,
/// not the HTTP status, decides success. Cookies are not stored by the client;
/// the session store replays them explicitly.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the given per-exchange timeout.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::ClientBuild` if the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::ClientBuild(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Per-exchange timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn prepare(&self, request: TransportRequest) -> Result<(RequestBuilder, Option<String>), TransportError> {
        let mut builder = self
            .client
            .request(method(request.method), &request.url)
            .timeout(self.timeout);
        builder = with_headers(builder, &request.headers);

        let Some(parameters) = request.parameters.filter(|p| !p.is_empty()) else {
            return Ok((builder, None));
        };

        match request.encoding {
            ParameterEncoding::Url if request.method.encodes_in_query() => {
                Ok((builder.query(&url_pairs(&parameters)), None))
            }
            ParameterEncoding::Url => {
                let body = form_urlencoded(&parameters);
                let builder = builder
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
                    .body(body.clone());
                Ok((builder, Some(body)))
            }
            ParameterEncoding::Json => {
                let body = serde_json::to_string(&parameters)
                    .map_err(|e| TransportError::Encoding(e.to_string()))?;
                let builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
                Ok((builder, Some(body)))
            }
        }
    }

    fn prepare_upload(&self, request: UploadRequest) -> Result<(RequestBuilder, String), TransportError> {
        let summary = format!(
            "multipart: {}={} ({} bytes)",
            request.form.file.name,
            request.form.file.file_name,
            request.form.file_len()
        );
        let form = multipart(request.form, request.progress)?;
        let builder = self
            .client
            .post(&request.url)
            .timeout(self.timeout);
        let builder = with_headers(builder, &request.headers).multipart(form);
        Ok((builder, summary))
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let prepared = self.prepare(request);
        Box::pin(async move {
            let (builder, request_body) = prepared?;
            let response = builder.send().await.map_err(|e| transport_error(&e))?;
            read_response(response, request_body).await
        })
    }

    fn upload(
        &self,
        request: UploadRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let prepared = self.prepare_upload(request);
        Box::pin(async move {
            let (builder, summary) = prepared?;
            let response = builder.send().await.map_err(|e| transport_error(&e))?;
            read_response(response, Some(summary)).await
        })
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Trace => Method::TRACE,
        HttpMethod::Connect => Method::CONNECT,
    }
}

fn with_headers(mut builder: RequestBuilder, headers: &Headers) -> RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn form_urlencoded(parameters: &Parameters) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(url_pairs(parameters))
        .finish()
}

fn multipart(form: MultipartForm, progress: Option<ProgressFn>) -> Result<Form, TransportError> {
    let total = form.file_len();
    let file = Part::stream_with_length(progress_body(form.file.data, progress), total)
        .file_name(form.file.file_name)
        .mime_str(&form.file.mime_type)
        .map_err(|e| TransportError::Encoding(e.to_string()))?;

    Ok(form
        .fields
        .into_iter()
        .fold(Form::new().part(form.file.name, file), |multipart, field| {
            multipart.text(field.name, field.value)
        }))
}

/// Stream `data` in chunks, reporting progress as each chunk is taken by the
/// connection.
fn progress_body(data: Vec<u8>, progress: Option<ProgressFn>) -> Body {
    let total = data.len() as u64;
    let chunks = stream! {
        let mut sent = 0u64;
        for chunk in data.chunks(UPLOAD_CHUNK_SIZE) {
            let chunk = chunk.to_vec();
            sent += chunk.len() as u64;
            yield Ok::<_, std::io::Error>(chunk);
            if let Some(progress) = &progress {
                progress.report(UploadProgress { bytes_sent: sent, total_bytes: total });
            }
        }
    };
    Body::wrap_stream(chunks)
}

async fn read_response(
    response: reqwest::Response,
    request_body: Option<String>,
) -> Result<TransportResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response.bytes().await.map_err(|e| transport_error(&e))?;

    tracing::trace!(status, bytes = body.len(), "Response received");

    Ok(TransportResponse {
        status,
        headers,
        body: body.to_vec(),
        request_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn methods_map_one_to_one() {
        for m in HttpMethod::ALL {
            assert_eq!(method(m).as_str(), m.as_str());
        }
    }

    #[test]
    fn form_body_flattens_nested_values() {
        let parameters = json!({"tags": ["a", "b"], "q": "x y"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        assert_eq!(
            form_urlencoded(&parameters),
            "q=x+y&tags%5B%5D=a&tags%5B%5D=b"
        );
    }

    #[test]
    fn transport_keeps_timeout() {
        let transport = ReqwestTransport::with_client(Client::new(), Duration::from_secs(5));
        assert_eq!(transport.timeout(), Duration::from_secs(5));
    }
}

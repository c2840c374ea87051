//! HTTP transport built on `reqwest`.

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::multipart::{Form, Part};
use tracing::debug;
use url::Url;

use super::sse::SseParser;
use super::{AskRequest, AskResponse, Backend, PushStream};
use crate::error::{Error, Result};
use crate::upload::{CorrelationId, SelectedFile};

/// HTTP client for the ingestion / QA backend.
///
/// # Example
///
/// ```rust,no_run
/// use pdf_chat_assistant::backend::{Backend, HttpBackend};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = HttpBackend::new("http://localhost:8000")?;
/// let answer = backend.ask("What is this document about?").await?;
/// println!("{answer}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the backend (e.g., "http://localhost:8000")
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the notification stream for a correlation id.
    pub fn notifications_url(&self, correlation_id: &CorrelationId) -> Result<Url> {
        self.url(&format!("notifications/{correlation_id}"))
    }

    // Keeps any path prefix of the base URL, unlike `Url::join`.
    fn url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn api_error(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        Error::Api { status, message }
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn upload_document(
        &self,
        file: &SelectedFile,
        correlation_id: &CorrelationId,
    ) -> Result<()> {
        let part = Part::bytes(file.contents().to_vec())
            .file_name(file.name().to_string())
            .mime_str(&file.mime_type())?;
        let form = Form::new()
            .part("file", part)
            .text("upload_id", correlation_id.to_string());

        let response = self
            .http
            .post(self.url("upload_pdf")?)
            .multipart(form)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn subscribe(&self, correlation_id: &CorrelationId) -> Result<PushStream> {
        let response = self
            .http
            .get(self.notifications_url(correlation_id)?)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let byte_stream = response.bytes_stream();
        let out = async_stream::stream! {
            let mut parser = SseParser::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(Error::Http(e));
                        return;
                    }
                };
                for event in parser.push(&chunk) {
                    if event.is_message() {
                        yield Ok(event.data);
                    } else {
                        debug!(event = %event.event, "Skipping named SSE event");
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let req = AskRequest {
            question: question.to_string(),
        };
        let response = self
            .http
            .post(self.url("ask")?)
            .json(&req)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body = response.text().await?;
        let parsed: AskResponse = serde_json::from_str(&body)?;
        Ok(parsed.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_keep_base_path() {
        let backend = HttpBackend::new("http://localhost:8000/api/").unwrap();
        assert_eq!(
            backend.url("upload_pdf").unwrap().as_str(),
            "http://localhost:8000/api/upload_pdf"
        );
    }

    #[test]
    fn notifications_url_embeds_correlation_id() {
        let backend = HttpBackend::new("http://localhost:8000").unwrap();
        let id = CorrelationId::generate();
        assert_eq!(
            backend.notifications_url(&id).unwrap().as_str(),
            format!("http://localhost:8000/notifications/{id}")
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpBackend::new("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }
}

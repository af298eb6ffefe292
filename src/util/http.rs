use futures::StreamExt;
use thiserror::Error;

/// Failure while reading a capped response body.
///
/// Each upstream client maps this onto its own error type.
#[derive(Debug, Error)]
pub enum ReadLimitError {
    #[error("Response exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Network error: {0}")]
    Transport(#[source] reqwest::Error),
}

/// Reads a response body, refusing anything larger than `limit` bytes.
///
/// The Content-Length header is checked first; the streamed total is
/// checked as well since the header can be absent or wrong. Transport
/// errors have their URL stripped so query-string secrets never reach
/// logs.
pub async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ReadLimitError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ReadLimitError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ReadLimitError::Transport(e.without_url()))?;
        // SEC-003: Use saturating_add to prevent integer overflow in size check
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ReadLimitError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch(server: &MockServer, body: &str) -> reqwest::Response {
        Mock::given(path("/body"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
        reqwest::get(format!("{}/body", server.uri())).await.unwrap()
    }

    #[tokio::test]
    async fn test_body_within_limit() {
        let server = MockServer::start().await;
        let response = fetch(&server, "hello").await;
        let bytes = read_limited_bytes(response, 5).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_body_over_limit() {
        let server = MockServer::start().await;
        let response = fetch(&server, "hello!").await;
        let err = read_limited_bytes(response, 5).await.unwrap_err();
        assert!(matches!(err, ReadLimitError::TooLarge(5)));
    }
}

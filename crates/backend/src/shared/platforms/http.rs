use reqwest::StatusCode;
use std::time::Duration;

use super::AdapterError;

/// HTTP-клиент для всех pull-адаптеров (общий пул соединений)
pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("authorstack-ingest/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Map a non-success status onto the adapter error taxonomy
pub fn classify_status(status: StatusCode, body: &[u8]) -> AdapterError {
    let preview: String = String::from_utf8_lossy(body).chars().take(300).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdapterError::AuthExpired(format!("status {}: {}", status, preview))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AdapterError::TransientNetwork(format!("status {}", status))
        }
        s if s.is_server_error() => AdapterError::TransientNetwork(format!("status {}", s)),
        s => AdapterError::malformed_with_raw(
            format!("unexpected status {}: {}", s, preview),
            body,
        ),
    }
}

pub fn map_request_error(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        AdapterError::TransientNetwork(err.to_string())
    } else if err.is_decode() {
        AdapterError::malformed(err.to_string())
    } else {
        AdapterError::TransientNetwork(err.to_string())
    }
}

/// Send the request and return the body of a 2xx answer
pub async fn send_for_body(request: reqwest::RequestBuilder) -> Result<Vec<u8>, AdapterError> {
    let response = request.send().await.map_err(map_request_error)?;
    let status = response.status();
    let body = response.bytes().await.map_err(map_request_error)?.to_vec();

    if !status.is_success() {
        return Err(classify_status(status, &body));
    }
    Ok(body)
}

/// Decode JSON, keeping the body when it does not decode
pub fn decode_json<T: serde::de::DeserializeOwned>(
    body: &[u8],
    what: &str,
) -> Result<T, AdapterError> {
    serde_json::from_slice(body)
        .map_err(|e| AdapterError::malformed_with_raw(format!("{}: {}", what, e), body))
}

/// Sleep the adapter's inter-page delay before any page after the first
pub async fn pace(cursor: Option<&str>, delay: Duration) {
    if cursor.is_some() && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, b"{}"),
            AdapterError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, b""),
            AdapterError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, b""),
            AdapterError::TransientNetwork(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, b""),
            AdapterError::TransientNetwork(_)
        ));
        match classify_status(StatusCode::UNPROCESSABLE_ENTITY, b"bad") {
            AdapterError::MalformedInput { raw, .. } => assert_eq!(raw, Some(b"bad".to_vec())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_json_preserves_body() {
        let err = decode_json::<serde_json::Value>(b"<html>", "sales page").unwrap_err();
        match err {
            AdapterError::MalformedInput { reason, raw } => {
                assert!(reason.starts_with("sales page"));
                assert_eq!(raw, Some(b"<html>".to_vec()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pace_waits_only_between_pages() {
        use tokio::time::timeout;
        let delay = Duration::from_secs(30);
        let budget = Duration::from_millis(200);

        // First page goes out at once
        assert!(timeout(budget, pace(None, delay)).await.is_ok());
        // Any later page sits out the delay
        assert!(timeout(budget, pace(Some("2"), delay)).await.is_err());
        assert!(timeout(budget, pace(Some("2"), Duration::ZERO)).await.is_ok());

        let started = std::time::Instant::now();
        pace(Some("3"), Duration::from_millis(60)).await;
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}

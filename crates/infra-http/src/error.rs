// reqwest -> GatewayError mapping

use auditdesk_core::port::GatewayError;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;

/// Longest response body echoed into an error
const MAX_ERROR_BODY: usize = 512;

/// Transport failures: timeouts and connection problems are transient
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        return GatewayError::InvalidResponse(err.to_string());
    }
    if err.is_timeout() {
        return GatewayError::ServiceUnavailable(format!("request timed out: {}", err));
    }
    if err.is_connect() {
        return GatewayError::ServiceUnavailable(format!("connection failed: {}", err));
    }
    GatewayError::ServiceUnavailable(err.to_string())
}

/// Non-2xx handling: 5xx is transient, everything else is a rejection
pub(crate) async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(GatewayError::ServiceUnavailable(format!(
            "status {}: {}",
            status.as_u16(),
            body
        )))
    } else {
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Read a 2xx body as JSON. Malformed bodies are InvalidResponse.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

/// `base` + path segments, each segment percent-encoded
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, GatewayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GatewayError::InvalidResponse(format!("invalid base url {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("http://crawler.local:8080/").unwrap();
        let url = endpoint(&base, &["api", "audit", "status", "a b/c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://crawler.local:8080/api/audit/status/a%20b%2Fc"
        );

        let nested = Url::parse("http://crawler.local/v2").unwrap();
        let url = endpoint(&nested, &["health"]).unwrap();
        assert_eq!(url.as_str(), "http://crawler.local/v2/health");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "é".repeat(400);
        let cut = floor_char_boundary(&s, MAX_ERROR_BODY);
        assert!(cut <= MAX_ERROR_BODY);
        assert!(s.is_char_boundary(cut));
    }
}

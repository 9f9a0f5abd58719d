use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};

pub const AUTH_HEADER: &str = "x-starfighter-authorization";

/// API-key credentials for the venue. Every authenticated REST call and the
/// WebSocket upgrade carry the key in a single header.
pub struct VenueAuth {
    api_key: String,
}

impl VenueAuth {
    pub fn new(api_key: String) -> Result<Self> {
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            anyhow::bail!("API key is empty");
        }
        // Validate once so header construction can't fail later
        HeaderValue::from_str(&api_key).context("API key contains invalid header characters")?;
        Ok(Self { api_key })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Build auth headers for a request.
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTH_HEADER,
            HeaderValue::from_str(&self.api_key).context("invalid API key header value")?,
        );
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_trimmed() {
        let auth = VenueAuth::new("  abc123\n".to_string()).unwrap();
        assert_eq!(auth.api_key(), "abc123");
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(VenueAuth::new("   ".to_string()).is_err());
    }

    #[test]
    fn test_headers_carry_key() {
        let auth = VenueAuth::new("abc123".to_string()).unwrap();
        let headers = auth.headers().unwrap();
        assert_eq!(headers.get(AUTH_HEADER).unwrap(), "abc123");
    }
}

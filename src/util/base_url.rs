use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum BaseUrlError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    Insecure,
    #[error("Base URL must not carry a query or fragment")]
    HasQuery,
}

/// Validates the content provider base URL.
///
/// HTTPS is required. Plain HTTP is accepted only for `localhost` and
/// `127.0.0.1` so tests can point the client at a mock server. A trailing
/// slash is removed so paths can be appended with `format!("{base}/...")`.
///
/// ```
/// use wikiscroll::util::validate_base_url;
///
/// assert!(validate_base_url("https://en.wikipedia.org").is_ok());
/// assert!(validate_base_url("http://127.0.0.1:8080").is_ok());
/// assert!(validate_base_url("http://example.com").is_err());
/// ```
pub fn validate_base_url(raw: &str) -> Result<String, BaseUrlError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "https" => {}
        "http" => {
            let is_localhost = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
            if !is_localhost {
                tracing::error!(base_url = %raw, "Rejecting non-HTTPS base URL");
                return Err(BaseUrlError::Insecure);
            }
            tracing::warn!(base_url = %raw, "Using non-HTTPS content base URL (localhost only)");
        }
        _ => return Err(BaseUrlError::Insecure),
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(BaseUrlError::HasQuery);
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

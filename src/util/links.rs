use thiserror::Error;
use url::Url;

/// Errors that can occur while resolving item links.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

fn check_scheme(url: Url) -> Result<Url, LinkError> {
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(LinkError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Parses a base URL used to resolve relative item links.
///
/// The base must be an absolute `http` or `https` URL.
///
/// # Examples
///
/// ```
/// use feedcast::util::parse_base_url;
///
/// assert!(parse_base_url("https://example.com/blog/").is_ok());
/// assert!(parse_base_url("/blog/").is_err());
/// assert!(parse_base_url("ftp://example.com/").is_err());
/// ```
pub fn parse_base_url(base: &str) -> Result<Url, LinkError> {
    check_scheme(Url::parse(base)?)
}

/// Resolves `href` against `base` and rejects anything that is not http(s).
///
/// Absolute links are returned as-is (after the scheme check); relative links
/// are joined onto `base`. Links such as `javascript:` or `data:` are
/// rejected so they never reach a rendered `href` attribute.
pub fn resolve_link(base: &Url, href: &str) -> Result<Url, LinkError> {
    check_scheme(base.join(href.trim())?)
}

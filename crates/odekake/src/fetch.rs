use std::borrow::Cow;
use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

use flate2::read::{GzDecoder, ZlibDecoder};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_ENCODING, CONTENT_TYPE, HeaderMap,
    HeaderName, HeaderValue, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{ErrorKind, Result, ScrapeError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Substrings that mark a WAF or maintenance page served with a 200 status.
pub const ERROR_PAGE_INDICATORS: [&str; 3] = ["Access Denied", "Forbidden", "Service Unavailable"];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZLIB_HEADER: u8 = 0x78;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
    #[default]
    Utf8,
    ShiftJis,
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported encoding '{0}'. Accepted values: 'utf-8', 'shift_jis'")]
pub struct EncodingParseError(String);

impl Encoding {
    pub fn label(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::ShiftJis => "Shift_JIS",
        }
    }
}

impl FromStr for Encoding {
    type Err = EncodingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "shift_jis" | "shift-jis" | "sjis" => Ok(Encoding::ShiftJis),
            _ => Err(EncodingParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = EncodingParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Extra request headers; these replace defaults with the same name.
    pub headers: Vec<(String, String)>,
    pub accept_encoding: String,
    pub encoding: Encoding,
    pub timeout: Duration,
    /// Enables per-request diagnostics at debug level, tagged with this label.
    pub debug_label: Option<String>,
    pub check_error_page: bool,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            accept_encoding: "identity".to_string(),
            encoding: Encoding::Utf8,
            timeout: DEFAULT_TIMEOUT,
            debug_label: None,
            check_error_page: true,
            retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl FetchOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn accept_encoding(mut self, value: impl Into<String>) -> Self {
        self.accept_encoding = value.into();
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn debug_label(mut self, label: impl Into<String>) -> Self {
        self.debug_label = Some(label.into());
        self
    }

    pub fn check_error_page(mut self, enabled: bool) -> Self {
        self.check_error_page = enabled;
        self
    }

    pub fn retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }
}

/// Decoded body plus the response metadata callers occasionally need
/// (for example a `Last-Modified` header or the post-redirect URL).
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub text: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ScrapeError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn fetch_text(&self, url: &str, options: &FetchOptions) -> Result<String> {
        Ok(self.fetch_text_with_meta(url, options).await?.text)
    }

    pub async fn fetch_text_with_meta(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, options).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < options.retries && is_retryable(&e) => {
                    attempt += 1;
                    let delay = options.retry_delay * attempt;
                    log::warn!(
                        "Fetch of {} failed ({}), retry {}/{} in {:?}",
                        url,
                        e,
                        attempt,
                        options.retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        let label = options.debug_label.as_deref();
        let headers = build_headers(options)?;

        if let Some(label) = label {
            log::debug!("[{label}] GET {url}");
        }

        let request = async {
            let response = self
                .client
                .get(url)
                .headers(headers)
                .send()
                .await
                .map_err(|source| ScrapeError::Request {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if status != StatusCode::OK {
                return Err(ScrapeError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let headers = response.headers().clone();
            let final_url = response.url().to_string();
            let body = response
                .bytes()
                .await
                .map_err(|source| ScrapeError::Request {
                    url: url.to_string(),
                    source,
                })?;
            Ok::<_, ScrapeError>((status, headers, final_url, body))
        };

        let (status, headers, final_url, body) = tokio::time::timeout(options.timeout, request)
            .await
            .map_err(|_| ScrapeError::Timeout {
                url: url.to_string(),
                timeout_ms: options.timeout.as_millis() as u64,
            })??;

        let content_encoding = header_str(&headers, CONTENT_ENCODING);
        let content_type = header_str(&headers, CONTENT_TYPE);

        if let Some(label) = label {
            log::debug!(
                "[{label}] {} {} bytes, content-type={:?}, content-encoding={:?}",
                status.as_u16(),
                body.len(),
                content_type,
                content_encoding
            );
        }

        if body.is_empty() {
            return Err(ScrapeError::EmptyBody {
                url: url.to_string(),
            });
        }

        let bytes = decompress(&body, content_encoding.as_deref(), url)?;
        let text = decode(&bytes, options.encoding, url)?;

        if options.check_error_page
            && content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"))
            && let Some(indicator) = find_error_indicator(&text)
        {
            return Err(ScrapeError::SoftBlock {
                url: url.to_string(),
                indicator,
            });
        }

        if let Some(label) = label {
            log::debug!("[{label}] decoded {} chars as {}", text.len(), options.encoding);
        }

        Ok(FetchResponse {
            text,
            status: status.as_u16(),
            headers,
            url: final_url,
        })
    }
}

fn build_headers(options: &FetchOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ja,en-US;q=0.7,en;q=0.3"),
    );
    headers.insert(
        ACCEPT_ENCODING,
        HeaderValue::from_str(&options.accept_encoding).map_err(|_| {
            ScrapeError::Config(format!(
                "Invalid Accept-Encoding value: {}",
                options.accept_encoding
            ))
        })?,
    );

    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ScrapeError::Config(format!("Invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ScrapeError::Config(format!("Invalid value for header {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// 4xx answers other than 408 and 429 will not change on a second try.
fn is_retryable(err: &ScrapeError) -> bool {
    if err.kind() != ErrorKind::Network {
        return false;
    }
    match err.status() {
        Some(408 | 429) => true,
        Some(status) => !(400..500).contains(&status),
        None => true,
    }
}

/// Inflates the body according to `Content-Encoding`.
///
/// Some servers (and some proxies) label a body as compressed after it has
/// already been inflated, so the stream header is sniffed first and a body
/// without it is passed through unchanged.
pub(crate) fn decompress<'a>(
    body: &'a [u8],
    content_encoding: Option<&str>,
    url: &str,
) -> Result<Cow<'a, [u8]>> {
    let Some(encoding) = content_encoding.map(|e| e.trim().to_ascii_lowercase()) else {
        return Ok(Cow::Borrowed(body));
    };

    let inflated = if encoding.contains("gzip") {
        if !body.starts_with(&GZIP_MAGIC) {
            log::debug!("{url}: labelled gzip but no gzip magic, using body as is");
            return Ok(Cow::Borrowed(body));
        }
        read_all(GzDecoder::new(body))
    } else if encoding.contains("deflate") {
        if body.first() != Some(&ZLIB_HEADER) {
            log::debug!("{url}: labelled deflate but no zlib header, using body as is");
            return Ok(Cow::Borrowed(body));
        }
        read_all(ZlibDecoder::new(body))
    } else if encoding == "identity" {
        return Ok(Cow::Borrowed(body));
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("unsupported content-encoding '{encoding}'"),
        ))
    };

    inflated
        .map(Cow::Owned)
        .map_err(|source| ScrapeError::Decompress {
            url: url.to_string(),
            encoding,
            source,
        })
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8], encoding: Encoding, url: &str) -> Result<String> {
    let decoded = match encoding {
        Encoding::Utf8 => std::str::from_utf8(bytes)
            .ok()
            .map(|s| s.trim_start_matches('\u{feff}').to_string()),
        Encoding::ShiftJis => encoding_rs::SHIFT_JIS
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned),
    };
    decoded.ok_or_else(|| ScrapeError::Decode {
        url: url.to_string(),
        encoding: encoding.label(),
    })
}

fn find_error_indicator(text: &str) -> Option<&'static str> {
    ERROR_PAGE_INDICATORS
        .iter()
        .copied()
        .find(|indicator| text.contains(indicator))
}

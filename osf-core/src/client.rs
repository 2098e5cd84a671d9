use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_CHARSET, AUTHORIZATION, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode, redirect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.osf.io/v2/";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const API_MEDIA_TYPE: &str = "application/vnd.api+json";
const CLIENT_USER_AGENT: &str = concat!("osf-sync/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum OsfError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unauthorized request to {url}")]
    Unauthorized { url: Url },
    #[error("{url} returned unexpected status {status}")]
    Status { status: StatusCode, url: Url },
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed record: {0}")]
    Decode(String),
    #[error("refusing to follow {status} redirect from {url}")]
    UnsupportedRedirect { status: StatusCode, url: Url },
}

impl OsfError {
    /// True for failures below HTTP (connect, reset, body stream), as opposed
    /// to a response the server actually sent.
    pub fn is_transport(&self) -> bool {
        matches!(self, OsfError::Request(err) if !err.is_decode() && !err.is_status())
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            OsfError::Status { status, .. } | OsfError::UnsupportedRedirect { status, .. } => {
                Some(*status)
            }
            OsfError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            OsfError::Request(err) => err.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// `None` leaves body reads unbounded so multi-gigabyte transfers are not
    /// cut off mid-stream.
    pub read_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: None,
        }
    }
}

/// Shared HTTP session for one API endpoint.
///
/// Cloning is cheap: every entity materialized from a root holds a clone and
/// only reads from it. The underlying client never follows redirects on its
/// own; [`OsfSession::get_stream`] handles them so API credentials are not
/// forwarded to third-party storage.
#[derive(Clone)]
pub struct OsfSession {
    http: Client,
    base_url: Url,
    token: Option<Arc<str>>,
}

impl OsfSession {
    pub fn new(token: Option<String>) -> Result<Self, OsfError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: Option<String>) -> Result<Self, OsfError> {
        Self::with_config(base_url, token, SessionConfig::default())
    }

    pub fn with_config(
        base_url: &str,
        token: Option<String>,
        config: SessionConfig,
    ) -> Result<Self, OsfError> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.connect_timeout);
        if let Some(read_timeout) = config.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: Url::parse(base_url)?,
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_auth(&self) -> bool {
        self.token.is_some()
    }

    pub fn build_url(&self, parts: &[&str]) -> Result<Url, OsfError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut joined = String::from(base);
        for part in parts {
            joined.push('/');
            joined.push_str(part.trim_matches('/'));
        }
        joined.push('/');
        Ok(Url::parse(&joined)?)
    }

    /// GET that expects a `200` JSON body. Redirects back to the API's own
    /// origin keep the API headers and token; anything else is followed bare.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, OsfError> {
        let response = self.get_following(url, Forward::SameOrigin).await?;
        if response.status() != StatusCode::OK {
            return Err(OsfError::Status {
                status: response.status(),
                url: url.clone(),
            });
        }
        read_json(response).await
    }

    /// GET whose body is left unread for the caller to stream.
    ///
    /// `301`/`302`/`303` are followed with a fresh request that carries only
    /// the user agent and charset: presigned storage URLs are signed over an
    /// exact header set and reject anything API-specific. `307`/`308` would
    /// need the original request replayed and are rejected.
    pub async fn get_stream(&self, url: &Url) -> Result<Response, OsfError> {
        self.get_following(url, Forward::Bare).await
    }

    async fn get_following(&self, url: &Url, forward: Forward) -> Result<Response, OsfError> {
        let mut response = self.send(self.api_request(Method::GET, url.clone()), url).await?;
        let mut current = url.clone();
        for _ in 0..MAX_REDIRECTS {
            match response.status() {
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {}
                status @ (StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT) => {
                    return Err(OsfError::UnsupportedRedirect {
                        status,
                        url: current,
                    });
                }
                _ => return Ok(response),
            }
            let Some(location) = redirect_location(&current, &response)? else {
                return Ok(response);
            };
            let request = match forward {
                Forward::SameOrigin if location.origin() == url.origin() => {
                    self.api_request(Method::GET, location.clone())
                }
                _ => self.bare_request(location.clone()),
            };
            debug!(from = %current, to = %location.origin().ascii_serialization(), "following redirect");
            response = self.send(request, &location).await?;
            current = location;
        }
        Ok(response)
    }

    pub async fn put(
        &self,
        url: &Url,
        query: &[(&str, &str)],
        body: impl Into<Body>,
    ) -> Result<Response, OsfError> {
        let url = query
            .iter()
            .fold(url.clone(), |url, (key, value)| with_query_param(&url, key, value));
        let request = self.api_request(Method::PUT, url.clone()).body(body);
        self.send(request, &url).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<Response, OsfError> {
        let payload = serde_json::to_vec(body)?;
        let request = self.api_request(Method::POST, url.clone()).body(payload);
        self.send(request, url).await
    }

    pub async fn delete(&self, url: &Url) -> Result<Response, OsfError> {
        self.send(self.api_request(Method::DELETE, url.clone()), url)
            .await
    }

    fn api_request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, API_MEDIA_TYPE)
            .header(ACCEPT_CHARSET, "utf-8")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    fn bare_request(&self, url: Url) -> RequestBuilder {
        self.http
            .get(url)
            .header(ACCEPT_CHARSET, "utf-8")
            .header(USER_AGENT, CLIENT_USER_AGENT)
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, OsfError> {
        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(OsfError::Unauthorized { url: url.clone() });
        }
        Ok(response)
    }
}

#[derive(Clone, Copy)]
enum Forward {
    Bare,
    SameOrigin,
}

impl fmt::Debug for OsfSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsfSession")
            .field("base_url", &self.base_url.as_str())
            .field("has_auth", &self.has_auth())
            .finish()
    }
}

pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, OsfError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    {
        let mut query = out.query_pairs_mut();
        query.clear();
        for (k, v) in &retained {
            query.append_pair(k, v);
        }
        query.append_pair(key, value);
    }
    out
}

fn redirect_location(current: &Url, response: &Response) -> Result<Option<Url>, OsfError> {
    let Some(value) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let Ok(location) = value.to_str() else {
        return Ok(None);
    };
    Ok(Some(current.join(location)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_always_ends_with_slash() {
        let session = OsfSession::with_base_url("https://api.test.osf.io/v2", None).unwrap();
        let url = session.build_url(&["nodes", "f3szh", "files"]).unwrap();
        assert_eq!(url.as_str(), "https://api.test.osf.io/v2/nodes/f3szh/files/");

        let session = OsfSession::with_base_url("https://api.test.osf.io/v2/", None).unwrap();
        let url = session.build_url(&["nodes"]).unwrap();
        assert_eq!(url.as_str(), "https://api.test.osf.io/v2/nodes/");
    }

    #[test]
    fn with_query_param_replaces_existing_value() {
        let url = Url::parse("https://files.example/v1/folder/?kind=folder&next_token=a").unwrap();
        let next = with_query_param(&url, "next_token", "b");
        assert_eq!(
            next.as_str(),
            "https://files.example/v1/folder/?kind=folder&next_token=b"
        );
    }

    #[test]
    fn with_query_param_appends_to_bare_url() {
        let url = Url::parse("https://files.example/v1/folder/").unwrap();
        let next = with_query_param(&url, "name", "Hello World.txt");
        assert_eq!(next.query_pairs().next().unwrap().1, "Hello World.txt");
    }

    #[test]
    fn empty_token_means_anonymous() {
        let session = OsfSession::new(Some(String::new())).unwrap();
        assert!(!session.has_auth());
        let session = OsfSession::new(Some("secret".into())).unwrap();
        assert!(session.has_auth());
    }
}

use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::navigation::{self, Navigator};
use crate::session::{refresh, LoginRequest, RefreshOutcome, SessionManager, SignupRequest, TokenPair};

/// Path fragments of endpoints callable without a session
pub const PUBLIC_AUTH_PATHS: [&str; 4] = ["users/signup/", "users/login/", "token/", "token/refresh/"];

/// Token issuance endpoint, relative to the API root
pub const TOKEN_PATH: &str = "token/";

/// Refresh endpoint, relative to the API root
pub const TOKEN_REFRESH_PATH: &str = "token/refresh/";

const SIGNUP_PATH: &str = "users/signup/";
const PROFILE_PATH: &str = "users/profile/";

/// True when `path` targets a public authentication endpoint
pub fn is_public_auth_endpoint(path: &str) -> bool {
    PUBLIC_AUTH_PATHS.iter().any(|fragment| path.contains(fragment))
}

/// Lifecycle of one logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// First attempt in flight
    Sent,
    /// 401 received, waiting on the refresh exchange
    RefreshPending,
    /// Resubmitted after a refresh; will not refresh again
    Retried,
    Done,
}

/// Builds a fresh request for every attempt
type RequestBuilderFn<'a> = Box<dyn Fn() -> Result<Request> + Send + Sync + 'a>;

/// Where each attempt's request comes from
enum RequestSource<'a> {
    /// Built once by the caller. A cloneable copy is kept for the retry;
    /// streamed bodies can be sent once only.
    Built(Option<Request>),
    /// Rebuilt per attempt, for bodies reqwest cannot clone (multipart)
    Rebuild(RequestBuilderFn<'a>),
}

impl RequestSource<'_> {
    fn next_attempt(&mut self) -> Result<Request> {
        match self {
            RequestSource::Built(slot) => {
                let request = slot.take().context("Request body is not cloneable")?;
                *slot = request.try_clone();
                Ok(request)
            }
            RequestSource::Rebuild(build) => build(),
        }
    }
}

/// Per-call context; the caller's request is never mutated
struct CallContext<'a> {
    id: String,
    method: Method,
    url: Url,
    source: RequestSource<'a>,
    public: bool,
    state: CallState,
    /// Token to attach instead of the stored one (set after a refresh)
    bearer: Option<String>,
}

impl<'a> CallContext<'a> {
    fn new(method: Method, url: Url, source: RequestSource<'a>) -> Self {
        let public = is_public_auth_endpoint(url.path());
        Self {
            id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            method,
            url,
            source,
            public,
            state: CallState::Sent,
            bearer: None,
        }
    }

    fn built(request: Request) -> Self {
        let (method, url) = (request.method().clone(), request.url().clone());
        Self::new(method, url, RequestSource::Built(Some(request)))
    }
}

/// Profile fields cached locally after a profile fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
}

/// Authenticated client for the Sayahat API
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// API root
    base: Url,

    /// Resolved refresh endpoint
    refresh_url: Url,

    /// Token store and refresh serialization
    session: Arc<SessionManager>,

    /// Target of the error-view redirect
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(
        config: &ClientConfig,
        session: Arc<SessionManager>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let refresh_url = config
            .api_base
            .join(TOKEN_REFRESH_PATH)
            .context("Failed to build token refresh URL")?;

        Ok(Self {
            client,
            base: config.api_base.clone(),
            refresh_url,
            session,
            navigator,
        })
    }

    /// Session state used by this client
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> Result<Url> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid API path: {}", path))?;
        Ok(url)
    }

    /// Start a request for an API path; send it with [`ApiClient::execute`]
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.client.request(method, self.url(path)?))
    }

    /// Execute a request through the authentication interceptors
    ///
    /// - public auth endpoints are sent without Authorization
    /// - other requests carry the stored access token
    /// - a first 401 triggers one refresh and one resubmission
    /// - failures carry a sanitized message; server-class failures also
    ///   redirect to the error view
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.dispatch(CallContext::built(request)).await
    }

    async fn dispatch(&self, mut call: CallContext<'_>) -> Result<Response> {
        tracing::debug!(
            call_id = %call.id,
            method = %call.method,
            url = %call.url,
            public = call.public,
            "Sending API request"
        );

        let result = self.run(&mut call).await;
        call.state = CallState::Done;

        match result {
            Ok(response) => {
                tracing::debug!(
                    call_id = %call.id,
                    status = %response.status(),
                    "API request successful"
                );
                Ok(response)
            }
            Err(err) => {
                self.report_failure(&call, &err);
                Err(err)
            }
        }
    }

    async fn run(&self, call: &mut CallContext<'_>) -> Result<Response> {
        loop {
            let (request, sent_access) = self.intercept_request(call)?;
            let response = self
                .client
                .execute(request)
                .await
                .map_err(ApiError::network)?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::status(status.as_u16(), body);

            if status != StatusCode::UNAUTHORIZED || call.public || call.state != CallState::Sent {
                return Err(error);
            }

            call.state = CallState::RefreshPending;
            tracing::warn!(call_id = %call.id, "Received 401, refreshing session...");

            let client = &self.client;
            let refresh_url = &self.refresh_url;
            let outcome = self
                .session
                .refresh_access_token(sent_access.as_deref(), move |token| async move {
                    refresh::exchange_refresh_token(client, refresh_url, &token).await
                })
                .await?;

            match outcome {
                RefreshOutcome::Refreshed(access) | RefreshOutcome::Reused(access) => {
                    call.bearer = Some(access);
                    call.state = CallState::Retried;
                    tracing::debug!(call_id = %call.id, "Resubmitting request with new access token");
                }
                RefreshOutcome::NoRefreshToken => return Err(error),
            }
        }
    }

    /// Build the outgoing request for the current attempt
    ///
    /// Returns the request and the access token it carries.
    fn intercept_request(&self, call: &mut CallContext<'_>) -> Result<(Request, Option<String>)> {
        let mut request = call.source.next_attempt()?;

        if call.public {
            request.headers_mut().remove(AUTHORIZATION);
            return Ok((request, None));
        }

        let token = match &call.bearer {
            Some(token) => Some(token.clone()),
            None => self.session.access_token()?,
        };

        if let Some(ref token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Access token is not a valid header value")?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok((request, token))
    }

    /// Log a failed call and redirect to the error view on server-class
    /// failures
    fn report_failure(&self, call: &CallContext<'_>, err: &ApiError) {
        tracing::warn!(
            call_id = %call.id,
            url = %call.url,
            status = ?err.status_code(),
            user_message = err.user_message(),
            error = ?err,
            "API request failed"
        );

        if !err.is_server_failure() {
            return;
        }

        let current = self.navigator.current_path();
        if navigation::is_error_route(&current) {
            tracing::debug!(call_id = %call.id, "Already on the error view, not redirecting");
            return;
        }

        self.navigator
            .navigate(&navigation::error_route(err.status_code()));
    }

    /// Send a built request and decode its JSON body
    async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let response = self.execute(request).await?;
        decode_json(response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self
            .request(Method::GET, path)?
            .build()
            .context("Failed to build request")?;
        self.execute_json(request).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::PATCH, path, body).await
    }

    /// DELETE an API path; the response body is ignored
    pub async fn delete(&self, path: &str) -> Result<()> {
        let request = self
            .request(Method::DELETE, path)?
            .build()
            .context("Failed to build request")?;
        self.execute(request).await?;
        Ok(())
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self
            .request(method, path)?
            .json(body)
            .build()
            .context("Failed to build request")?;
        self.execute_json(request).await
    }

    /// Register a new account
    pub async fn signup(&self, payload: &SignupRequest) -> Result<serde_json::Value> {
        self.post(SIGNUP_PATH, payload).await
    }

    /// Obtain tokens and start a session
    ///
    /// Cached user data of a different identity is purged before the new
    /// tokens are stored.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenPair> {
        let tokens: TokenPair = self.post(TOKEN_PATH, credentials).await?;
        self.session.begin_session(&tokens)?;
        Ok(tokens)
    }

    /// Drop the local session
    pub fn logout(&self) -> Result<()> {
        self.session.clear_session()?;
        Ok(())
    }

    /// Fetch the signed-in profile and cache its display fields
    pub async fn fetch_profile(&self) -> Result<Profile> {
        let profile: Profile = self.get(PROFILE_PATH).await?;
        self.cache_profile(&profile)?;
        Ok(profile)
    }

    /// Upload a new avatar image and cache the updated profile
    ///
    /// The multipart form is rebuilt for each attempt, so a 401 retry sends
    /// the same file again.
    pub async fn upload_avatar(&self, bytes: Vec<u8>, filename: &str) -> Result<Profile> {
        let url = self.url(PROFILE_PATH)?;
        let client = &self.client;
        let target = url.clone();

        let build = move || -> Result<Request> {
            let part = Part::bytes(bytes.clone()).file_name(filename.to_string());
            let request = client
                .patch(target.clone())
                .multipart(Form::new().part("avatar", part))
                .build()
                .context("Failed to build avatar upload")?;
            Ok(request)
        };

        let call = CallContext::new(Method::PATCH, url, RequestSource::Rebuild(Box::new(build)));
        let response = self.dispatch(call).await?;
        let profile: Profile = decode_json(response).await?;
        self.cache_profile(&profile)?;

        tracing::info!(filename = %filename, "Avatar uploaded");
        Ok(profile)
    }

    /// Mirror profile display fields into the store; absent fields are removed
    fn cache_profile(&self, profile: &Profile) -> Result<()> {
        let store = self.session.store();
        let fields = [
            ("username", &profile.username),
            ("email", &profile.email),
            ("avatar", &profile.avatar),
            ("cover", &profile.cover),
        ];
        for (key, value) in fields {
            match value {
                Some(value) => store.set(key, value)?,
                None => store.remove(key)?,
            }
        }

        let style = profile
            .preferences
            .as_ref()
            .and_then(|p| p.get("travel_style"))
            .and_then(|s| s.as_str());
        match style {
            Some(style) => store.set("travelStyle", style)?,
            None => store.remove("travelStyle")?,
        }

        Ok(())
    }
}

/// Decode a success response as JSON
///
/// A body that does not decode is a generic failure, not a server outage.
async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status().as_u16();
    let url = response.url().clone();
    response.json::<T>().await.map_err(|e| {
        tracing::warn!(url = %url, status, error = %e, "Failed to parse API response");
        ApiError::Decode {
            status,
            source: anyhow::Error::new(e).context("Failed to parse API response"),
        }
    })
}

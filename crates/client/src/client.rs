// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatcher: attaches the bearer token, refreshes ahead of expiry,
//! and retries once after a `401`.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, HttpError};
use crate::session::AuthSession;
use crate::store::{CredentialStore, KeyValueStore};

/// Body of an [`ApiRequest`].
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(FormData),
}

#[derive(Debug, Clone)]
enum FormPart {
    Text(String),
    File { file_name: String, mime: Option<String>, bytes: Vec<u8> },
}

/// Multipart payload that can be rebuilt for every attempt.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    parts: Vec<(String, FormPart)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let part = FormPart::File { file_name: file_name.into(), mime: None, bytes };
        self.parts.push((name.into(), part));
        self
    }

    /// Like [`file`](Self::file) with an explicit MIME type. An invalid type
    /// surfaces as [`ApiError::Form`] when the request is sent.
    pub fn typed_file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let part =
            FormPart::File { file_name: file_name.into(), mime: Some(mime.into()), bytes };
        self.parts.push((name.into(), part));
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn to_multipart(&self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for (name, part) in &self.parts {
            form = match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File { file_name, mime, bytes } => {
                    let mut p = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        p = p.mime_str(mime)?;
                    }
                    form.part(name.clone(), p)
                }
            };
        }
        Ok(form)
    }
}

/// One logical API call. `retried` is set on the single re-execution after
/// a successful reactive refresh and is never set by callers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Appended verbatim to the base URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, form: FormData) -> Self {
        self.body = RequestBody::Form(form);
        self
    }
}

/// Authenticated client for the Rahnum API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: Arc<AuthSession>,
}

impl ApiClient {
    /// Build a client over `backend` using the configured base URL, timeout
    /// and refresh policy.
    pub fn new(config: &ClientConfig, backend: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        let session = AuthSession::builder(
            CredentialStore::new(backend),
            http.clone(),
            config.refresh_url(),
        )
        .policy(config.refresh_policy())
        .build();
        Ok(Self::with_session(config.base_url.clone(), http, session))
    }

    pub fn with_session(
        base_url: impl Into<String>,
        http: reqwest::Client,
        session: Arc<AuthSession>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { base_url, http, session }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Arm the proactive refresh for a session restored from storage.
    /// Must be called within a Tokio runtime.
    pub fn resume(&self) {
        self.session.reschedule();
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.dispatch(ApiRequest::new(Method::GET, path)).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        self.dispatch(ApiRequest::new(Method::POST, path).json(body)).await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        self.dispatch(ApiRequest::new(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.dispatch(ApiRequest::new(Method::DELETE, path)).await
    }

    pub async fn post_form(&self, path: &str, form: FormData) -> Result<Value, ApiError> {
        self.dispatch(ApiRequest::new(Method::POST, path).form(form)).await
    }

    /// Execute `request` with the current access token.
    ///
    /// A token inside the proactive window is refreshed first (best effort).
    /// A `401` triggers one reactive refresh; on success the request is
    /// re-sent exactly once, on failure the session ends and the first
    /// `401` is returned.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<Value, ApiError> {
        if self.session.needs_proactive_refresh() {
            debug!(path = %request.path, "access token near expiry, refreshing first");
            if !self.session.attempt_refresh().await {
                warn!(path = %request.path, "proactive refresh failed, sending request anyway");
            }
        }

        let (status, data, authorized) = self.execute(&request).await?;
        if status.is_success() {
            return Ok(data);
        }

        if status == StatusCode::UNAUTHORIZED && !request.retried {
            if self.session.attempt_refresh().await {
                debug!(path = %request.path, "token refreshed, retrying once");
                let retry = ApiRequest { retried: true, ..request };
                let (status, data, _) = self.execute(&retry).await?;
                if status.is_success() {
                    return Ok(data);
                }
                return Err(HttpError::new(status.as_u16(), data).into());
            }
            if authorized {
                // Covers a stored access token with no refresh token to recover it.
                self.session.terminate();
            }
        }
        Err(HttpError::new(status.as_u16(), data).into())
    }

    /// Persist the session from a login response. Returns the parsed body.
    pub async fn login<T: Serialize + ?Sized>(&self, credentials: &T) -> Result<Value, ApiError> {
        let data = self.post("/login/", credentials).await?;
        if self.session.adopt_login_response(&data) {
            info!("logged in");
        } else {
            warn!("login response carried no access token");
        }
        Ok(data)
    }

    /// Register an account with a JSON or multipart body. A response that
    /// carries tokens starts a session just like [`login`](Self::login).
    pub async fn sign_up(&self, body: RequestBody) -> Result<Value, ApiError> {
        let data = self.dispatch(ApiRequest { body, ..ApiRequest::new(Method::POST, "/signup/") }).await?;
        if self.session.adopt_login_response(&data) {
            info!("signed up with session");
        }
        Ok(data)
    }

    pub fn logout(&self) {
        self.session.terminate();
    }

    pub fn cached_profile(&self) -> Option<Value> {
        self.session.store().profile()
    }

    /// One network round trip. Returns the status, the parsed body, and
    /// whether a bearer header was attached.
    async fn execute(&self, request: &ApiRequest) -> Result<(StatusCode, Value, bool), ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let headers = self.headers_for(request);
        let authorized = headers.contains_key(AUTHORIZATION);

        let mut req = self.http.request(request.method.clone(), &url).headers(headers);
        req = match request.body {
            RequestBody::Empty => req,
            RequestBody::Json(ref body) => req.body(body.to_string()),
            RequestBody::Form(ref form) => req.multipart(form.to_multipart().map_err(ApiError::Form)?),
        };

        let resp = req.send().await.map_err(ApiError::Network)?;
        let status = resp.status();
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let text = resp.text().await.map_err(ApiError::Network)?;

        let data = if !is_json {
            Value::String(text)
        } else if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|source| ApiError::Decode { status: status.as_u16(), source })?
        };

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), retried = request.retried, "API request failed");
        }
        Ok((status, data, authorized))
    }

    /// Default content type, caller overrides, then the bearer header.
    fn headers_for(&self, request: &ApiRequest) -> HeaderMap {
        let is_form = matches!(request.body, RequestBody::Form(_));
        let mut headers = HeaderMap::new();
        if !is_form {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        for (name, value) in &request.headers {
            if is_form && *name == CONTENT_TYPE {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }

        let bearer = self.session.access_token().and_then(|token| {
            let raw = format!("Bearer {token}");
            match HeaderValue::from_str(&raw) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    debug!(auth = %mask(&raw), "auth header present");
                    Some(value)
                }
                Err(e) => {
                    warn!(err = %e, "stored access token is not a valid header value");
                    None
                }
            }
        });
        match bearer {
            Some(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            None => debug!("auth header not present"),
        }
        headers
    }
}

/// First 12 characters of a header value followed by `...`.
pub(crate) fn mask(header: &str) -> String {
    match header.char_indices().nth(12) {
        Some((cut, _)) => format!("{}...", &header[..cut]),
        None => header.to_owned(),
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", self.session.store())
            .finish()
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

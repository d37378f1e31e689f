//! Auth Client
//!
//! High-level client running every session operation through the rate
//! limiter, the backoff retrier and the session state machine.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestHttpTransport,
    DEFAULT_MAX_RESPONSE_SIZE,
};
use crate::error::{create_error_from_response, ProtocolError, SessionError, SessionResult};
use crate::resilience::BackoffRetrier;
use crate::session::SessionManager;
use crate::types::payloads::RefreshTokenRequest;
use crate::types::{
    extract_user, unwrap_envelope, AuthPayload, ForgotPasswordRequest, LoginRequest,
    MessageResponse, OperationKind, ProfilePatch, RegisterRequest, ResendCodeRequest,
    ResetPasswordRequest, Session, SessionConfig, SessionStatus, UpdatePasswordRequest,
    UserProfile, VerifyCodeRequest,
};

/// Per-call options.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Failures are swallowed into `SessionError::Cancelled` and never
    /// touch the session. Used for background refreshes.
    pub silent: bool,
    /// Abandon the request when this token fires.
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// Client for the EduPulse auth API.
pub struct AuthClient<T: HttpTransport = ReqwestHttpTransport> {
    config: SessionConfig,
    transport: Arc<T>,
    session: Arc<SessionManager>,
    retrier: BackoffRetrier,
    refresh_flight: tokio::sync::Mutex<()>,
}

impl AuthClient<ReqwestHttpTransport> {
    /// Create a client with the reqwest transport and a session manager
    /// built from `config`.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        let transport = ReqwestHttpTransport::with_options(config.timeout, DEFAULT_MAX_RESPONSE_SIZE)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: HttpTransport> AuthClient<T> {
    /// Create a client with a custom transport.
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        let session = Arc::new(SessionManager::from_config(&config));
        Self::with_components(config, Arc::new(transport), session)
    }

    /// Create a client sharing an existing transport and session manager.
    pub fn with_components(
        config: SessionConfig,
        transport: Arc<T>,
        session: Arc<SessionManager>,
    ) -> Self {
        let retrier = BackoffRetrier::new(config.retry.clone());
        Self {
            config,
            transport,
            session,
            retrier,
            refresh_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session manager shared with the rest of the process.
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.current_user()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn retrier(&self) -> &BackoffRetrier {
        &self.retrier
    }

    // ========== Startup ==========

    /// Validate stored credentials at startup.
    ///
    /// Without a stored token the session stays anonymous and no request is
    /// made. A 401 clears the stored credentials. Any other failure keeps
    /// the stored session so an offline start does not sign the user out.
    /// Dropping this future before it completes leaves the session
    /// `anonymous` with no tokens in memory.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionResult<SessionStatus> {
        let Some(pending) = self.session.restore() else {
            return Ok(SessionStatus::Anonymous);
        };
        let stored = self.session.session();

        match self.get_current_user(RequestOptions::default()).await {
            Ok(_) => {}
            Err(SessionError::Unauthorized { .. }) => {
                info!("Stored session rejected by server");
            }
            Err(error) => {
                warn!(error = %error, "Could not validate stored session, keeping it");
                self.session.authenticate(stored)?;
            }
        }

        drop(pending);
        Ok(self.session.status())
    }

    // ========== Registration ==========

    /// Create an account. The server emails a verification code.
    #[instrument(skip(self, request, options))]
    pub async fn register(
        &self,
        request: RegisterRequest,
        options: RequestOptions,
    ) -> SessionResult<MessageResponse> {
        let body = encode(&request)?;
        let value = self
            .dispatch(OperationKind::Register, HttpMethod::Post, Some(body), None, &options)
            .await?;
        Ok(message(value))
    }

    /// Confirm a registration with the emailed code and sign in.
    #[instrument(skip(self, request, options))]
    pub async fn verify_code(
        &self,
        request: VerifyCodeRequest,
        options: RequestOptions,
    ) -> SessionResult<Session> {
        let body = encode(&request)?;
        let _pending = self.session.begin_pending();
        let value = self
            .dispatch(OperationKind::VerifyCode, HttpMethod::Post, Some(body), None, &options)
            .await?;
        self.adopt(value)
    }

    /// Ask for a new verification code.
    #[instrument(skip(self, request, options))]
    pub async fn resend_verification_code(
        &self,
        request: ResendCodeRequest,
        options: RequestOptions,
    ) -> SessionResult<MessageResponse> {
        let body = encode(&request)?;
        let value = self
            .dispatch(
                OperationKind::ResendVerificationCode,
                HttpMethod::Post,
                Some(body),
                None,
                &options,
            )
            .await?;
        Ok(message(value))
    }

    // ========== Sign-in ==========

    /// Sign in with email and password.
    #[instrument(skip(self, request, options))]
    pub async fn login(
        &self,
        request: LoginRequest,
        options: RequestOptions,
    ) -> SessionResult<Session> {
        let body = encode(&request)?;
        let _pending = self.session.begin_pending();
        let value = self
            .dispatch(OperationKind::Login, HttpMethod::Post, Some(body), None, &options)
            .await?;
        self.adopt(value)
    }

    /// Sign out. Local credentials are cleared whatever the server says.
    #[instrument(skip(self, options))]
    pub async fn logout(&self, options: RequestOptions) -> SessionResult<()> {
        if let Some(token) = self.session.access_token() {
            let result = self
                .dispatch(OperationKind::Logout, HttpMethod::Post, None, Some(token), &options)
                .await;
            if let Err(error) = result {
                debug!(error = %error, "Server-side logout failed, clearing locally");
            }
        }
        self.session.logout()
    }

    /// Fetch the profile of the signed-in user and cache it.
    #[instrument(skip(self, options))]
    pub async fn get_current_user(&self, options: RequestOptions) -> SessionResult<UserProfile> {
        let token = self.require_token(OperationKind::GetUser)?;
        let _pending = self.session.begin_pending();
        let value = self
            .dispatch(OperationKind::GetUser, HttpMethod::Get, None, Some(token), &options)
            .await?;

        let user = extract_user(value).ok_or_else(|| ProtocolError::MissingField {
            field: "user".to_string(),
        })?;
        self.session.set_user(user.clone())?;
        Ok(user)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent calls are serialized; a caller that waited behind a
    /// refresh which already replaced the token gets that session back
    /// without another request.
    #[instrument(skip(self, options))]
    pub async fn refresh_token(&self, options: RequestOptions) -> SessionResult<Session> {
        let observed = self.session.access_token();
        let _flight = self.refresh_flight.lock().await;

        let current = self.session.access_token();
        if current.is_some() && current != observed {
            debug!("Token already refreshed by a concurrent caller");
            return Ok(self.session.session());
        }

        let token = self.require_token(OperationKind::RefreshToken)?;
        let refresh = self
            .session
            .refresh_token()
            .ok_or_else(|| SessionError::NoCredential {
                operation: OperationKind::RefreshToken.to_string(),
            })?;
        let body = encode(&RefreshTokenRequest {
            refresh_token: &refresh,
        })?;

        let _pending = self.session.begin_pending();
        let value = self
            .dispatch(
                OperationKind::RefreshToken,
                HttpMethod::Post,
                Some(body),
                Some(token),
                &options,
            )
            .await?;
        let payload: AuthPayload = decode(unwrap_envelope(value))?;
        self.session
            .replace_tokens(payload.access_token, payload.refresh_token)
    }

    // ========== Passwords ==========

    /// Request a password-reset email.
    #[instrument(skip(self, request, options))]
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
        options: RequestOptions,
    ) -> SessionResult<MessageResponse> {
        let body = encode(&request)?;
        let value = self
            .dispatch(OperationKind::ForgotPassword, HttpMethod::Post, Some(body), None, &options)
            .await?;
        Ok(message(value))
    }

    /// Set a new password with the emailed reset token and sign in.
    #[instrument(skip(self, request, options))]
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        options: RequestOptions,
    ) -> SessionResult<Session> {
        let body = encode(&request)?;
        let value = self
            .dispatch(OperationKind::ResetPassword, HttpMethod::Post, Some(body), None, &options)
            .await?;
        self.adopt(value)
    }

    /// Change the password of the signed-in user.
    #[instrument(skip(self, request, options))]
    pub async fn update_password(
        &self,
        request: UpdatePasswordRequest,
        options: RequestOptions,
    ) -> SessionResult<MessageResponse> {
        let token = self.require_token(OperationKind::UpdatePassword)?;
        let body = encode(&request)?;
        let value = self
            .dispatch(
                OperationKind::UpdatePassword,
                HttpMethod::Put,
                Some(body),
                Some(token),
                &options,
            )
            .await?;
        Ok(message(value))
    }

    // ========== Profile ==========

    /// Update profile fields. The cached profile is merged and persisted.
    #[instrument(skip(self, patch, options))]
    pub async fn update_profile(
        &self,
        patch: ProfilePatch,
        options: RequestOptions,
    ) -> SessionResult<UserProfile> {
        let token = self.require_token(OperationKind::UpdateProfile)?;
        let body = encode(&patch)?;
        let value = self
            .dispatch(
                OperationKind::UpdateProfile,
                HttpMethod::Put,
                Some(body),
                Some(token),
                &options,
            )
            .await?;
        self.session.update_user(&patch, extract_user(value))
    }

    // ========== Request pipeline ==========

    fn require_token(&self, kind: OperationKind) -> SessionResult<String> {
        self.session
            .access_token()
            .ok_or_else(|| SessionError::NoCredential {
                operation: kind.to_string(),
            })
    }

    fn adopt(&self, value: Value) -> SessionResult<Session> {
        let payload: AuthPayload = decode(unwrap_envelope(value))?;
        let session = Session {
            access_token: Some(payload.access_token),
            refresh_token: payload.refresh_token,
            user: payload.user,
        };
        self.session.authenticate(session.clone())?;
        Ok(session)
    }

    /// Admit, send with retry, classify, and settle the outcome.
    async fn dispatch(
        &self,
        kind: OperationKind,
        method: HttpMethod,
        body: Option<String>,
        bearer: Option<String>,
        options: &RequestOptions,
    ) -> SessionResult<Value> {
        if options.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let outcome = match self.session.admit(kind) {
            Ok(()) => self.send_with_retry(kind, method, body, bearer.as_deref(), options).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(response) => {
                self.session.record_success(kind);
                debug!(kind = %kind, status = response.status, "Request succeeded");
                parse_body(&response.body)
            }
            Err(error) => Err(self.settle_failure(kind, error, bearer.as_deref(), options)),
        }
    }

    async fn send_with_retry(
        &self,
        kind: OperationKind,
        method: HttpMethod,
        body: Option<String>,
        bearer: Option<&str>,
        options: &RequestOptions,
    ) -> SessionResult<HttpResponse> {
        let mut request = HttpRequest::new(method, self.config.endpoint_url(kind))
            .timeout(self.config.timeout);
        if let Some(body) = body {
            request = request.json_body(body);
        }
        if let Some(token) = bearer {
            request = request.bearer(token);
        }
        let credentialed = bearer.is_some();
        let transport = &self.transport;

        let attempts = self.retrier.execute(|| {
            let request = request.clone();
            async move {
                let response = transport.send(request).await?;
                if response.is_success() {
                    Ok(response)
                } else {
                    debug!(kind = %kind, status = response.status, "Request failed");
                    Err(create_error_from_response(
                        response.status,
                        &response.body,
                        response.retry_after(),
                        credentialed,
                    ))
                }
            }
        });

        match &options.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(SessionError::Cancelled),
                result = attempts => result,
            },
            None => attempts.await,
        }
    }

    fn settle_failure(
        &self,
        kind: OperationKind,
        error: SessionError,
        bearer: Option<&str>,
        options: &RequestOptions,
    ) -> SessionError {
        if error.is_cancelled() {
            debug!(kind = %kind, "Request cancelled");
            return error;
        }
        if options.silent {
            debug!(kind = %kind, error = %error, "Silent request failed");
            return SessionError::Cancelled;
        }

        match error {
            SessionError::Unauthorized { .. } => {
                if let Some(token) = bearer {
                    if let Err(storage_error) = self.session.invalidate_token(token) {
                        warn!(error = %storage_error, "Failed to clear stored credentials");
                    }
                }
                error
            }
            SessionError::ThrottledRemotely { retry_after, .. } => {
                warn!(kind = %kind, "Server still throttling after retries");
                SessionError::ThrottledRemotely {
                    message: kind.server_busy_message(),
                    retry_after,
                }
            }
            SessionError::ThrottledLocally { .. } => {
                debug!(kind = %kind, "Throttled locally");
                error
            }
            other => other,
        }
    }
}

fn encode<B: Serialize>(body: &B) -> SessionResult<String> {
    serde_json::to_string(body).map_err(|e| {
        ProtocolError::InvalidJson {
            message: e.to_string(),
        }
        .into()
    })
}

fn decode<R: DeserializeOwned>(value: Value) -> SessionResult<R> {
    serde_json::from_value(value).map_err(|e| {
        ProtocolError::InvalidResponse {
            message: e.to_string(),
        }
        .into()
    })
}

fn parse_body(body: &str) -> SessionResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| {
        ProtocolError::InvalidJson {
            message: e.to_string(),
        }
        .into()
    })
}

fn message(value: Value) -> MessageResponse {
    match serde_json::from_value(unwrap_envelope(value)) {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "Unexpected message body, using an empty message");
            MessageResponse::default()
        }
    }
}

/// Create an auth client with the default transport.
pub fn auth_client(config: SessionConfig) -> SessionResult<AuthClient> {
    AuthClient::new(config)
}

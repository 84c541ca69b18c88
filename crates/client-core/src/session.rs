//! Session API client
//!
//! Thin HTTP layer over the signaling service. A session is created first,
//! the transport consumes whatever the service returned, and the session is
//! deleted again on teardown:
//!
//! ```text
//! POST   {base}/session                     {userId}            -> {sessionId, token?, url?}
//! POST   {base}/session/{id}/offer          {sdpOffer}          -> {sdpAnswer}
//! POST   {base}/session/{id}/ice-candidate  {candidate, sdpMid, sdpMLineIndex}
//! DELETE {base}/session/{id}
//! ```
//!
//! Candidate delivery and deletion are best-effort: failures are logged and
//! never returned.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::transport::BackendKind;

/// Identifier issued by the session API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend specific data returned with a new session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCredentials {
    /// Peer-relay: signaling continues through the offer/candidate calls
    PeerRelay,
    /// Room: connect to `url` presenting `token`
    Room { url: String, token: String },
}

/// A freshly created session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: SessionId,
    pub credentials: BackendCredentials,
}

/// A locally discovered network candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: u16,
}

/// Operations the client needs from the signaling service
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Create a session for `user_id`
    async fn create_session(&self, user_id: &str) -> ClientResult<SessionGrant>;

    /// Post the local offer and return the remote answer (peer-relay only)
    async fn exchange_offer(&self, session_id: &SessionId, sdp_offer: &str) -> ClientResult<String>;

    /// Push one candidate to the server (peer-relay only). Never fails.
    async fn send_ice_candidate(&self, session_id: &SessionId, candidate: &IceCandidate);

    /// Tell the server the session is over. Never fails.
    async fn delete_session(&self, session_id: &SessionId);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OfferRequest<'a> {
    sdp_offer: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerResponse {
    sdp_answer: String,
}

/// [`SessionApi`] over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    http: reqwest::Client,
    base_url: Url,
    backend: BackendKind,
}

impl HttpSessionApi {
    /// Create a client rooted at `base_url` (e.g. `https://host/api/webrtc/livekit`)
    pub fn new(base_url: Url, backend: BackendKind, request_timeout: Duration) -> ClientResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(ClientError::invalid_configuration(
                "server_origin",
                format!("{} cannot be used as a base URL", base_url),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClientError::internal_error(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            backend,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::invalid_configuration("server_origin", "cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn credentials(&self, body: CreateSessionResponse) -> ClientResult<BackendCredentials> {
        match self.backend {
            BackendKind::PeerRelay => Ok(BackendCredentials::PeerRelay),
            BackendKind::Room => {
                let token = body.token.filter(|t| !t.is_empty());
                let url = body.url.filter(|u| !u.is_empty());
                match (url, token) {
                    (Some(url), Some(token)) => Ok(BackendCredentials::Room { url, token }),
                    _ => Err(ClientError::configuration(
                        "room token or URL not provided by the session API; check the server's backend strategy",
                    )),
                }
            }
        }
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create_session(&self, user_id: &str) -> ClientResult<SessionGrant> {
        let url = self.endpoint(&["session"])?;
        debug!(url = %url, user_id = user_id, "Creating session");

        let response = self
            .http
            .post(url)
            .json(&CreateSessionRequest { user_id })
            .send()
            .await
            .map_err(|e| ClientError::session_create(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::session_create(format!("HTTP {}", status.as_u16())));
        }

        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| ClientError::session_create(format!("invalid response body: {}", e)))?;

        let session_id = body
            .session_id
            .clone()
            .filter(|id| !id.is_empty())
            .map(SessionId)
            .ok_or_else(|| ClientError::session_create("response carries no sessionId"))?;

        if let Some(server_status) = &body.status {
            debug!(session_id = %session_id, status = %server_status, message = ?body.message, "Server session status");
        }

        let credentials = self.credentials(body)?;
        info!(session_id = %session_id, backend = %self.backend, "Session created");

        Ok(SessionGrant {
            session_id,
            credentials,
        })
    }

    async fn exchange_offer(&self, session_id: &SessionId, sdp_offer: &str) -> ClientResult<String> {
        let url = self.endpoint(&["session", session_id.as_str(), "offer"])?;
        debug!(session_id = %session_id, sdp_size = sdp_offer.len(), "Sending SDP offer");

        let response = self
            .http
            .post(url)
            .json(&OfferRequest { sdp_offer })
            .send()
            .await
            .map_err(|e| ClientError::signaling(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::signaling(format!(
                "offer rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let answer: AnswerResponse = response
            .json()
            .await
            .map_err(|e| ClientError::signaling(format!("invalid answer body: {}", e)))?;

        debug!(session_id = %session_id, sdp_size = answer.sdp_answer.len(), "Received SDP answer");
        Ok(answer.sdp_answer)
    }

    async fn send_ice_candidate(&self, session_id: &SessionId, candidate: &IceCandidate) {
        let url = match self.endpoint(&["session", session_id.as_str(), "ice-candidate"]) {
            Ok(url) => url,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cannot build candidate URL");
                return;
            }
        };

        match self.http.post(url).json(candidate).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(session_id = %session_id, candidate = %candidate.candidate, "ICE candidate sent");
            }
            Ok(response) => {
                warn!(
                    session_id = %session_id,
                    status = response.status().as_u16(),
                    "ICE candidate rejected by server"
                );
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to send ICE candidate");
            }
        }
    }

    async fn delete_session(&self, session_id: &SessionId) {
        let url = match self.endpoint(&["session", session_id.as_str()]) {
            Ok(url) => url,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cannot build session URL");
                return;
            }
        };

        match self.http.delete(url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(session_id = %session_id, "Session closed on server");
            }
            Ok(response) => {
                let err = ClientError::teardown(format!("HTTP {}", response.status().as_u16()));
                warn!(session_id = %session_id, error = %err, "Session delete not acknowledged");
            }
            Err(e) => {
                let err = ClientError::teardown(e.to_string());
                warn!(session_id = %session_id, error = %err, "Failed to close session");
            }
        }
    }
}

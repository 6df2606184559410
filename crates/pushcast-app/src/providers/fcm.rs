use std::{path::Path, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use pushcast_core::{
    Error,
    config::AndroidConfig,
    dispatch::ClientFactory,
    providers::{
        BoxFuture, FcmAccess, FcmClient, FcmService, FcmTokenProvider as FcmTokenProviderTrait,
        TokenInfo,
    },
};

const FCM_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const FCM_TIMEOUT: Duration = Duration::from_secs(60);
const FCM_TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

/// The fields of a Google service-account key file this service needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            Error::ClientInit(format!(
                "failed to read service account key {}: {err}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            Error::ClientInit(format!(
                "failed to parse service account key {}: {err}",
                path.display()
            ))
        })
    }

    /// Configured project id, else the key's own.
    fn resolve_project_id(&self, configured: &str) -> Result<String, Error> {
        let configured = configured.trim();
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::ClientInit("missing FCM project id".to_string()))
    }
}

#[derive(Debug)]
struct FcmTokenState {
    token: Arc<str>,
    expires_at: std::time::Instant,
}

impl FcmTokenState {
    fn empty() -> Self {
        Self {
            token: Arc::from(""),
            expires_at: std::time::Instant::now() - Duration::from_secs(1),
        }
    }
}

struct FcmAuth {
    client_email: Arc<str>,
    token_uri: Arc<str>,
    encoding_key: EncodingKey,
}

/// Exchanges a signed service-account assertion for OAuth access tokens,
/// reusing the last token until it nears expiry.
pub struct FcmTokenProvider {
    client: Client,
    access_token: ArcSwap<FcmTokenState>,
    auth: FcmAuth,
    project_id: Arc<str>,
}

impl FcmTokenProvider {
    pub fn new(key: &ServiceAccountKey, project_id: &str) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent("pushcast/0.1.0")
            .timeout(FCM_TIMEOUT)
            .build()
            .map_err(|err| Error::Internal(err.to_string()))?;

        Ok(Self {
            client,
            access_token: ArcSwap::from_pointee(FcmTokenState::empty()),
            auth: build_fcm_auth(key)?,
            project_id: Arc::from(project_id),
        })
    }

    async fn token_info(&self) -> Result<FcmAccess, Error> {
        let cached = self.access_token.load();
        let now = std::time::Instant::now();
        let remaining = cached.expires_at.saturating_duration_since(now);
        let cached_valid = !cached.token.is_empty() && remaining > Duration::ZERO;
        if cached_valid && remaining > Duration::from_secs(FCM_TOKEN_REFRESH_BUFFER_SECS) {
            return Ok(self.access(Arc::clone(&cached.token)));
        }

        match get_google_access_token(&self.client, &self.auth).await {
            Ok(token) => {
                let expires_in = token.expires_in;
                let token_arc: Arc<str> = Arc::from(token.value.into_boxed_str());
                let expires_at = std::time::Instant::now() + Duration::from_secs(expires_in);
                self.access_token.store(Arc::new(FcmTokenState {
                    token: Arc::clone(&token_arc),
                    expires_at,
                }));
                Ok(self.access(token_arc))
            }
            Err(err) if cached_valid => {
                tracing::warn!(error = %err, "FCM token refresh failed, using cached token");
                Ok(self.access(Arc::clone(&cached.token)))
            }
            Err(err) => Err(err),
        }
    }

    fn access(&self, token: Arc<str>) -> FcmAccess {
        FcmAccess {
            token: TokenInfo { token },
            project_id: Arc::clone(&self.project_id),
        }
    }
}

impl FcmTokenProviderTrait for FcmTokenProvider {
    fn token_info<'a>(&'a self) -> BoxFuture<'a, Result<FcmAccess, Error>> {
        Box::pin(async move { self.token_info().await })
    }
}

/// Creates FCM clients from the service-account key named in the config.
#[derive(Debug, Default)]
pub struct ServiceAccountFactory;

impl ServiceAccountFactory {
    async fn connect(&self, config: &AndroidConfig) -> Result<Arc<dyn FcmClient>, Error> {
        let key = ServiceAccountKey::from_file(&config.service_account_key).await?;
        let project_id = key.resolve_project_id(&config.project_id)?;
        let token_provider = Arc::new(FcmTokenProvider::new(&key, &project_id)?);

        // Fail creation on bad credentials instead of at first send.
        token_provider
            .token_info()
            .await
            .map_err(|err| Error::ClientInit(format!("unable to authorize FCM client: {err}")))?;

        let service = FcmService::new(token_provider)?;
        tracing::info!(project_id = %project_id, "FCM client ready");
        Ok(Arc::new(service))
    }
}

impl ClientFactory for ServiceAccountFactory {
    fn create<'a>(
        &'a self,
        config: &'a AndroidConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn FcmClient>, Error>> {
        Box::pin(async move { self.connect(config).await })
    }
}

struct AccessToken {
    value: String,
    expires_in: u64,
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: usize,
    iat: usize,
}

async fn get_google_access_token(client: &Client, auth: &FcmAuth) -> Result<AccessToken, Error> {
    let now = Utc::now();
    let exp = (now + chrono::Duration::minutes(60)).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        iss: auth.client_email.to_string(),
        scope: FCM_SCOPE.to_string(),
        aud: auth.token_uri.to_string(),
        exp,
        iat,
    };
    let header = Header::new(Algorithm::RS256);
    let jwt_token = encode(&header, &claims, &auth.encoding_key)
        .map_err(|err| Error::Internal(format!("failed to sign FCM JWT: {err}")))?;

    let params = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", jwt_token.as_str()),
    ];

    let response = client
        .post(auth.token_uri.as_ref())
        .form(&params)
        .send()
        .await
        .map_err(|err| Error::Internal(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("Google OAuth error, status {status_code}")
        } else {
            body
        };
        return Err(Error::Upstream {
            provider: "Google OAuth",
            status: status_code,
            message,
        });
    }

    let token: AccessTokenResponse = response
        .json()
        .await
        .map_err(|err| Error::Internal(err.to_string()))?;
    let value = token.access_token.ok_or_else(|| Error::Upstream {
        provider: "Google OAuth",
        status: status.as_u16(),
        message: "missing access_token".to_string(),
    })?;
    let expires_in = token.expires_in.unwrap_or(3600);

    Ok(AccessToken { value, expires_in })
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

fn build_fcm_auth(key: &ServiceAccountKey) -> Result<FcmAuth, Error> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|err| Error::ClientInit(format!("invalid FCM private_key: {err}")))?;
    let token_uri = key
        .token_uri
        .as_deref()
        .filter(|uri| !uri.trim().is_empty())
        .unwrap_or(FCM_TOKEN_URL);
    Ok(FcmAuth {
        client_email: Arc::from(key.client_email.as_str()),
        token_uri: Arc::from(token_uri),
        encoding_key,
    })
}

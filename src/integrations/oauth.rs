use crate::config::GoogleConfig;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const OAUTH_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/tasks";
const PROVIDER_GOOGLE: &str = "google";
/// Tokens this close to expiry are refreshed ahead of use.
const EXPIRY_MARGIN_SECS: i64 = 60;
pub const LOGIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10 * 60);
const MAX_REDIRECT_REQUEST_BYTES: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no Google account linked; run `taskpanel login`")]
    NoAccount,
    #[error("unsupported authentication method: {0}")]
    UnsupportedMethod(String),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("credential storage error: {0}")]
    Storage(String),
}

impl From<io::Error> for AuthError {
    fn from(err: io::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

/// Source of bearer tokens for the tasks API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed token, e.g. from `TASKPANEL_ACCESS_TOKEN`.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        if self.0.trim().is_empty() {
            return Err(AuthError::NoAccount);
        }
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

fn default_provider() -> String {
    PROVIDER_GOOGLE.to_string()
}

impl StoredToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now().timestamp() + EXPIRY_MARGIN_SECS
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Client credentials needed to talk to the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl OAuthSettings {
    pub fn from_config(config: &GoogleConfig) -> Self {
        Self {
            client_id: config.client_id.trim().to_string(),
            client_secret: config.client_secret.trim().to_string(),
            token_url: config.token_url.clone(),
        }
    }

    fn ensure_configured(&self) -> Result<(), AuthError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AuthError::TokenExchange(
                "Google client_id/client_secret required in config.toml".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads the token written by `taskpanel login`, refreshing it when it is
/// about to expire.
pub struct StoredTokenProvider {
    path: PathBuf,
    oauth: OAuthSettings,
    http: reqwest::Client,
    cached: Mutex<Option<StoredToken>>,
}

impl StoredTokenProvider {
    pub fn new(path: PathBuf, oauth: OAuthSettings) -> Self {
        Self {
            path,
            oauth,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for StoredTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        let stored = match cached.take() {
            Some(token) => token,
            None => load_token(&self.path)?,
        };

        if stored.provider != PROVIDER_GOOGLE {
            return Err(AuthError::NoAccount);
        }
        if stored.is_fresh() {
            let token = stored.access_token.clone();
            *cached = Some(stored);
            return Ok(token);
        }
        if stored.refresh_token.trim().is_empty() {
            return Err(AuthError::UnsupportedMethod(
                "stored credential cannot be refreshed (no refresh token)".to_string(),
            ));
        }

        debug!("access token expired, refreshing");
        let refreshed = refresh_access_token(&self.http, &self.oauth, &stored).await?;
        if let Err(err) = save_token(&self.path, &refreshed) {
            warn!(error = %err, "failed to persist refreshed token");
        }
        let token = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(token)
    }
}

pub async fn refresh_access_token(
    http: &reqwest::Client,
    oauth: &OAuthSettings,
    stored: &StoredToken,
) -> Result<StoredToken, AuthError> {
    oauth.ensure_configured()?;
    let resp = http
        .post(&oauth.token_url)
        .form(&[
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("refresh_token", stored.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::TokenExchange(format_oauth_error(status, &body)));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
    Ok(StoredToken {
        provider: stored.provider.clone(),
        access_token: token.access_token,
        refresh_token: token
            .refresh_token
            .unwrap_or_else(|| stored.refresh_token.clone()),
        expires_at: expiry_from_now(token.expires_in),
    })
}

fn expiry_from_now(expires_in: u64) -> i64 {
    let seconds = i64::try_from(expires_in).unwrap_or(i64::MAX / 2);
    (Utc::now() + Duration::seconds(seconds)).timestamp()
}

pub fn load_token(path: &Path) -> Result<StoredToken, AuthError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(AuthError::NoAccount),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&content).map_err(|e| AuthError::Storage(e.to_string()))
}

pub fn save_token(path: &Path, token: &StoredToken) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(token).map_err(|e| AuthError::Storage(e.to_string()))?;
    fs::write(path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

/// Removes the stored token. Returns whether there was one.
pub fn remove_token(path: &Path) -> Result<bool, AuthError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// A pending loopback authorization: the browser is sent to `auth_url` and
/// Google redirects back to `listen_addr`.
pub struct AuthSession {
    pub auth_url: String,
    pub listen_addr: SocketAddr,
    listener: TcpListener,
    state: String,
    redirect_uri: String,
}

pub async fn start_login(oauth: &OAuthSettings) -> Result<AuthSession, AuthError> {
    oauth.ensure_configured()?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let listen_addr = listener.local_addr()?;
    let redirect_uri = format!("http://{listen_addr}");
    let state = generate_state();

    let auth_url = Url::parse_with_params(
        OAUTH_AUTH_URL,
        [
            ("client_id", oauth.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", TASKS_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state.as_str()),
        ],
    )
    .map_err(|e| AuthError::TokenExchange(e.to_string()))?
    .to_string();

    Ok(AuthSession {
        auth_url,
        listen_addr,
        listener,
        state,
        redirect_uri,
    })
}

/// Waits for the single redirect, exchanges the code and stores the token.
pub async fn complete_login(
    session: AuthSession,
    oauth: &OAuthSettings,
    token_path: &Path,
    timeout: std::time::Duration,
) -> Result<(), AuthError> {
    let (mut stream, peer) = tokio::time::timeout(timeout, session.listener.accept())
        .await
        .map_err(|_| AuthError::TokenExchange("authorization timed out".to_string()))??;
    debug!(%peer, "received OAuth redirect");

    let result = handle_redirect(&mut stream, &session, oauth, token_path).await;
    let message = match &result {
        Ok(()) => "Authorization complete. You can close this window.".to_string(),
        Err(err) => format!("Authorization failed: {err}"),
    };
    if let Err(err) = respond_with_message(&mut stream, &message).await {
        warn!(error = %err, "failed to answer the browser");
    }
    if result.is_ok() {
        info!("stored Google credentials");
    }
    result
}

async fn handle_redirect(
    stream: &mut TcpStream,
    session: &AuthSession,
    oauth: &OAuthSettings,
    token_path: &Path,
) -> Result<(), AuthError> {
    let request = read_request_head(stream).await?;
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    let params = parse_query(query);

    if let Some(error) = params.get("error") {
        let detail = params
            .get("error_description")
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        return Err(AuthError::TokenExchange(format!("{error}{detail}")));
    }
    let Some(code) = params.get("code") else {
        return Err(AuthError::TokenExchange(
            "missing authorization code".to_string(),
        ));
    };
    if params.get("state").map(String::as_str) != Some(session.state.as_str()) {
        return Err(AuthError::TokenExchange("invalid OAuth state".to_string()));
    }

    let token = exchange_code(oauth, code, &session.redirect_uri).await?;
    save_token(token_path, &token)
}

async fn exchange_code(
    oauth: &OAuthSettings,
    code: &str,
    redirect_uri: &str,
) -> Result<StoredToken, AuthError> {
    let resp = reqwest::Client::new()
        .post(&oauth.token_url)
        .form(&[
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::TokenExchange(format_oauth_error(status, &body)));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
    let Some(refresh_token) = token.refresh_token else {
        return Err(AuthError::UnsupportedMethod(
            "Google did not return a refresh token; grant offline access and retry".to_string(),
        ));
    };

    Ok(StoredToken {
        provider: PROVIDER_GOOGLE.to_string(),
        access_token: token.access_token,
        refresh_token,
        expires_at: expiry_from_now(token.expires_in),
    })
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = tokio::time::timeout(std::time::Duration::from_secs(2), stream.read(&mut chunk))
            .await
            .map_err(|_| AuthError::TokenExchange("browser request timed out".to_string()))??;
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REDIRECT_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn respond_with_message(stream: &mut TcpStream, message: &str) -> io::Result<()> {
    let body = format!("{message}\n");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn generate_state() -> String {
    use rand::{Rng, distributions::Alphanumeric};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn format_oauth_error(status: reqwest::StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }
    let summary = match serde_json::from_str::<TokenErrorResponse>(trimmed) {
        Ok(TokenErrorResponse {
            error,
            error_description: Some(desc),
        }) => format!("{desc} ({error})"),
        Ok(TokenErrorResponse { error, .. }) => error,
        Err(_) => truncate_error(trimmed),
    };
    format!("HTTP {status}: {summary}")
}

fn truncate_error(message: &str) -> String {
    let mut out: String = message.replace(['\n', '\r'], " ").chars().take(240).collect();
    if out.len() < message.len() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(token_url: String) -> OAuthSettings {
        OAuthSettings {
            client_id: "cid".to_string(),
            client_secret: "csec".to_string(),
            token_url,
        }
    }

    fn stored(expires_at: i64, refresh_token: &str) -> StoredToken {
        StoredToken {
            provider: PROVIDER_GOOGLE.to_string(),
            access_token: "ya29.old".to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn missing_token_file_means_no_account() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StoredTokenProvider::new(
            dir.path().join("google-token.json"),
            settings(GOOGLE_TOKEN_URL.to_string()),
        );

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::NoAccount));
    }

    #[tokio::test]
    async fn other_provider_means_no_account() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        let mut token = stored(Utc::now().timestamp() + 3600, "rt");
        token.provider = "microsoft".to_string();
        save_token(&token_path, &token).unwrap();

        let provider = StoredTokenProvider::new(token_path, settings(GOOGLE_TOKEN_URL.to_string()));
        assert!(matches!(
            provider.access_token().await.unwrap_err(),
            AuthError::NoAccount
        ));
    }

    #[tokio::test]
    async fn fresh_token_is_used_without_refreshing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        save_token(&token_path, &stored(Utc::now().timestamp() + 3600, "rt")).unwrap();

        let provider = StoredTokenProvider::new(token_path, settings(format!("{}/token", server.uri())));
        assert_eq!(provider.access_token().await.unwrap(), "ya29.old");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.old");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-keep"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        save_token(&token_path, &stored(0, "rt-keep")).unwrap();

        let provider = StoredTokenProvider::new(
            token_path.clone(),
            settings(format!("{}/token", server.uri())),
        );
        assert_eq!(provider.access_token().await.unwrap(), "ya29.new");

        let on_disk = load_token(&token_path).unwrap();
        assert_eq!(on_disk.access_token, "ya29.new");
        assert_eq!(on_disk.refresh_token, "rt-keep");
        assert!(on_disk.expires_at > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn refresh_failure_is_a_token_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been revoked."
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        save_token(&token_path, &stored(0, "rt")).unwrap();

        let provider = StoredTokenProvider::new(token_path, settings(format!("{}/token", server.uri())));
        match provider.access_token().await.unwrap_err() {
            AuthError::TokenExchange(message) => {
                assert!(message.contains("invalid_grant"));
                assert!(message.contains("revoked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        save_token(&token_path, &stored(0, "")).unwrap();

        let provider = StoredTokenProvider::new(token_path, settings(GOOGLE_TOKEN_URL.to_string()));
        assert!(matches!(
            provider.access_token().await.unwrap_err(),
            AuthError::UnsupportedMethod(_)
        ));
    }

    #[tokio::test]
    async fn refresh_requires_client_credentials() {
        let oauth = OAuthSettings {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        };
        let err = refresh_access_token(&reqwest::Client::new(), &oauth, &stored(0, "rt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange(_)));
    }

    #[test]
    fn query_components_are_decoded() {
        let params = parse_query("code=4%2F0Ab&state=xyz&scope=a+b&empty=&flag");
        assert_eq!(params.get("code").map(String::as_str), Some("4/0Ab"));
        assert_eq!(params.get("scope").map(String::as_str), Some("a b"));
        assert_eq!(params.get("empty").map(String::as_str), Some(""));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn malformed_escapes_are_kept_verbatim() {
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%zz"), "%zz");
    }

    #[test]
    fn generated_state_is_alphanumeric() {
        let state = generate_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn login_flow_stores_exchanged_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.login",
                "refresh_token": "rt-login",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        let oauth = settings(format!("{}/token", server.uri()));

        let session = start_login(&oauth).await.unwrap();
        assert!(session.auth_url.contains("client_id=cid"));
        assert!(session.auth_url.contains("access_type=offline"));
        let addr = session.listen_addr;
        let request = format!(
            "GET /?state={}&code=abc HTTP/1.1\r\nHost: {addr}\r\n\r\n",
            session.state
        );

        let login = {
            let token_path = token_path.clone();
            let oauth = oauth.clone();
            tokio::spawn(async move {
                complete_login(session, &oauth, &token_path, std::time::Duration::from_secs(5)).await
            })
        };

        let mut browser = TcpStream::connect(addr).await.unwrap();
        browser.write_all(request.as_bytes()).await.unwrap();
        let mut reply = String::new();
        browser.read_to_string(&mut reply).await.unwrap();

        login.await.unwrap().unwrap();
        assert!(reply.contains("Authorization complete"));
        let token = load_token(&token_path).unwrap();
        assert_eq!(token.access_token, "ya29.login");
        assert_eq!(token.refresh_token, "rt-login");
    }

    #[tokio::test]
    async fn login_rejects_mismatched_state() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("google-token.json");
        let oauth = settings("http://127.0.0.1:9/token".to_string());

        let session = start_login(&oauth).await.unwrap();
        let addr = session.listen_addr;
        let login = {
            let token_path = token_path.clone();
            tokio::spawn(async move {
                complete_login(session, &oauth, &token_path, std::time::Duration::from_secs(5)).await
            })
        };

        let mut browser = TcpStream::connect(addr).await.unwrap();
        browser
            .write_all(b"GET /?state=wrong&code=abc HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        browser.read_to_string(&mut reply).await.unwrap();

        assert!(login.await.unwrap().is_err());
        assert!(reply.contains("Authorization failed"));
        assert!(!token_path.exists());
    }
}

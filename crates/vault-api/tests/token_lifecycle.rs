//! End-to-end token lifecycle against a mock vault server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::sync::mpsc::UnboundedReceiver;
use transport::{Method, ReqwestTransport};
use vault_api::{ApiClient, DeviceType, EnvironmentUrls, Error, LogoutEvent, RequestBody};
use vault_auth::{DecodedAccessToken, FileTokenStore, MemoryTokenStore, TokenStore};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn jwt(expires_in_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = serde_json::json!({ "client_id": "desktop", "exp": now + expires_in_secs });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

fn client_with(
    server: &MockServer,
    store: Arc<dyn TokenStore>,
) -> (ApiClient, UnboundedReceiver<LogoutEvent>) {
    let (tx, rx) = vault_api::logout::channel();
    let client = ApiClient::new(
        &EnvironmentUrls::base(server.uri()),
        DeviceType::Linux,
        store,
        Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap()),
        Arc::new(tx),
    );
    (client, rx)
}

async fn mount_refresh(server: &MockServer, access: &str, delay: Duration, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/identity/connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": access,
                    "refresh_token": "rt_rotated",
                    "expires_in": 3600,
                    "token_type": "Bearer"
                }))
                .set_delay(delay),
        )
        .expect(calls)
        .mount(server)
        .await;
}

/// Memory store that pauses after sampling one chosen read, so the value a
/// caller acts on can go out of date while it waits.
struct SlowStore {
    inner: MemoryTokenStore,
    pause: Duration,
    slow_access_read: Option<usize>,
    slow_staleness_check: Option<usize>,
    access_reads: AtomicUsize,
    staleness_checks: AtomicUsize,
}

impl SlowStore {
    fn new(inner: MemoryTokenStore, pause: Duration) -> Self {
        Self {
            inner,
            pause,
            slow_access_read: None,
            slow_staleness_check: None,
            access_reads: AtomicUsize::new(0),
            staleness_checks: AtomicUsize::new(0),
        }
    }
}

impl TokenStore for SlowStore {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        let n = self.access_reads.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let value = self.inner.access_token().await;
            if self.slow_access_read == Some(n) {
                tokio::time::sleep(self.pause).await;
            }
            value
        })
    }

    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        self.inner.refresh_token()
    }

    fn needs_refresh(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let n = self.staleness_checks.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let stale = self.inner.needs_refresh().await;
            if self.slow_staleness_check == Some(n) {
                tokio::time::sleep(self.pause).await;
            }
            stale
        })
    }

    fn decode_access_token(
        &self,
    ) -> Pin<Box<dyn Future<Output = vault_auth::Result<DecodedAccessToken>> + Send + '_>> {
        self.inner.decode_access_token()
    }

    fn set_tokens(
        &self,
        access: String,
        refresh: String,
    ) -> Pin<Box<dyn Future<Output = vault_auth::Result<()>> + Send + '_>> {
        self.inner.set_tokens(access, refresh)
    }

    fn clear_two_factor_token<'a>(
        &'a self,
        identity: &'a str,
    ) -> Pin<Box<dyn Future<Output = vault_auth::Result<()>> + Send + 'a>> {
        self.inner.clear_two_factor_token(identity)
    }
}

/// Profile endpoint that accepts only `fresh`; the stale bearer gets a 401
/// that must never be provoked.
async fn mount_profile(server: &MockServer, fresh: &str, stale: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/accounts/profile"))
        .and(header("authorization", format!("Bearer {fresh}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(calls)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/accounts/profile"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(0)
        .mount(server)
        .await;
}

/// Fresh token: one request, no refresh.
#[tokio::test]
async fn fresh_token_makes_a_single_call() {
    let server = MockServer::start().await;
    let access = jwt(3600);
    mount_refresh(&server, "unused", Duration::ZERO, 0).await;
    Mock::given(method("GET"))
        .and(path("/api/accounts/profile"))
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Email": "u@x.test"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _rx) = client_with(&server, Arc::new(MemoryTokenStore::with_tokens(access, "rt")));
    let profile = client.get_profile().await.unwrap();
    assert_eq!(profile["Email"], "u@x.test");
}

/// Stale token: refresh first, then the request carries the new token, and
/// the rotated pair is on disk.
#[tokio::test]
async fn stale_token_refreshes_and_persists() {
    let server = MockServer::start().await;
    let fresh = jwt(3600);
    mount_refresh(&server, &fresh, Duration::ZERO, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/accounts/revision-date"))
        .and(header("authorization", format!("Bearer {fresh}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(1_700_000_000_000i64))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("tokens.json");
    let store = Arc::new(FileTokenStore::load(token_path.clone()).await.unwrap());
    store.set_tokens(jwt(60), "rt_old".into()).await.unwrap();

    let (client, _rx) = client_with(&server, store);
    assert_eq!(
        client.get_account_revision_date().await.unwrap(),
        1_700_000_000_000
    );

    let reloaded = FileTokenStore::load(token_path).await.unwrap();
    assert_eq!(reloaded.access_token().await.as_deref(), Some(fresh.as_str()));
    assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt_rotated"));
}

/// 401 on a resource call: logout fires once, caller gets the sentinel.
#[tokio::test]
async fn unauthorized_forces_logout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (client, mut rx) = client_with(&server, Arc::new(MemoryTokenStore::with_tokens(jwt(3600), "rt")));
    let err = client.get_sync().await.unwrap_err();
    assert!(matches!(err, Error::LoggedOut));
    assert_eq!(rx.recv().await, Some(LogoutEvent { expired: true }));
    assert!(rx.try_recv().is_err());
}

/// Two concurrent calls with a stale token share one refresh exchange.
#[tokio::test]
async fn concurrent_calls_share_one_refresh() {
    let server = MockServer::start().await;
    let fresh = jwt(3600);
    mount_refresh(&server, &fresh, Duration::from_millis(200), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/accounts/profile"))
        .and(header("authorization", format!("Bearer {fresh}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let (client, _rx) = client_with(&server, Arc::new(MemoryTokenStore::with_tokens(jwt(10), "rt")));
    let (a, b) = tokio::join!(client.get_profile(), client.get_profile());
    a.unwrap();
    b.unwrap();
}

/// A rejected shared refresh logs out exactly once for every waiter.
#[tokio::test]
async fn failed_shared_refresh_logs_out_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/connect/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error": "invalid_grant"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, mut rx) = client_with(&server, Arc::new(MemoryTokenStore::with_tokens(jwt(10), "rt")));
    let results = spawn_profile_calls(&client, 4).await;
    for result in results {
        assert!(matches!(result, Err(Error::LoggedOut)));
    }
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err(), "logout must fire once");
}

async fn spawn_profile_calls(client: &ApiClient, n: usize) -> Vec<vault_api::Result<Option<serde_json::Value>>> {
    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .send(Method::GET, "/accounts/profile", RequestBody::Empty, true, true)
                .await
        }));
    }
    let mut results = Vec::with_capacity(n);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

/// Without a refresh token the client fails fast and stays off the network.
#[tokio::test]
async fn missing_refresh_token_is_unavailable() {
    let server = MockServer::start().await;
    let (client, mut rx) = client_with(&server, Arc::new(MemoryTokenStore::new()));

    let err = client.get_profile().await.unwrap_err();
    assert!(matches!(err, Error::RefreshUnavailable));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(rx.try_recv().is_err());
}

/// A caller whose token read stalls while another caller refreshes still
/// sends the renewed token.
#[tokio::test]
async fn slow_token_read_never_sends_the_replaced_token() {
    let server = MockServer::start().await;
    let stale = jwt(10);
    let fresh = jwt(3600);
    mount_refresh(&server, &fresh, Duration::from_millis(50), 1).await;
    mount_profile(&server, &fresh, &stale, 2).await;

    let mut store = SlowStore::new(
        MemoryTokenStore::with_tokens(stale, "rt"),
        Duration::from_millis(300),
    );
    store.slow_access_read = Some(0);

    let (client, mut rx) = client_with(&server, Arc::new(store));
    let (a, b) = tokio::join!(client.get_profile(), client.get_profile());
    a.unwrap();
    b.unwrap();
    assert!(rx.try_recv().is_err());
}

/// A caller that saw the stale token but arrives after the refresh finished
/// reuses the renewed token instead of refreshing again.
#[tokio::test]
async fn late_caller_does_not_refresh_twice() {
    let server = MockServer::start().await;
    let stale = jwt(10);
    let fresh = jwt(3600);
    mount_refresh(&server, &fresh, Duration::from_millis(50), 1).await;
    mount_profile(&server, &fresh, &stale, 2).await;

    let mut store = SlowStore::new(
        MemoryTokenStore::with_tokens(stale, "rt"),
        Duration::from_millis(300),
    );
    store.slow_staleness_check = Some(0);

    let (client, mut rx) = client_with(&server, Arc::new(store));
    let (a, b) = tokio::join!(client.get_profile(), client.get_profile());
    a.unwrap();
    b.unwrap();
    assert!(rx.try_recv().is_err());
}

/// An empty stored refresh token is treated like a missing one.
#[tokio::test]
async fn empty_refresh_token_is_unavailable() {
    let server = MockServer::start().await;
    mount_refresh(&server, "unused", Duration::ZERO, 0).await;

    let (client, mut rx) =
        client_with(&server, Arc::new(MemoryTokenStore::with_tokens(jwt(10), "")));

    let err = client.get_profile().await.unwrap_err();
    assert!(matches!(err, Error::RefreshUnavailable));
    assert!(rx.try_recv().is_err());
}

/// 403 on a resource call is handled like a 401.
#[tokio::test]
async fn forbidden_forces_logout_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts/profile"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let (client, mut rx) = client_with(&server, Arc::new(MemoryTokenStore::with_tokens(jwt(3600), "rt")));
    let err = client.get_profile().await.unwrap_err();
    assert!(matches!(err, Error::LoggedOut));
    assert_eq!(rx.recv().await, Some(LogoutEvent { expired: true }));
    assert!(rx.try_recv().is_err());

    // The store is untouched by the client itself; a second call is a second logout
    let err = client.get_profile().await.unwrap_err();
    assert!(matches!(err, Error::LoggedOut));
    assert_eq!(rx.recv().await, Some(LogoutEvent { expired: true }));
}

//! Provider — capability traits for the remote identity and storage service.
//!
//! DESIGN
//! ======
//! The session controller, route guard and storage helpers only see these
//! traits. `SupabaseClient` is the HTTP implementation; tests substitute the
//! in-memory provider in `test_helpers`.
//!
//! Session-change notifications are a `tokio::sync::broadcast` channel rather
//! than a callback, so each listener owns its receiver and teardown is just
//! dropping it.

pub mod supabase;
pub mod types;

use tokio::sync::broadcast;

pub use supabase::SupabaseClient;
pub use types::{AuthChange, AuthEvent, ProviderError, Session, User};

/// Identity/session operations the rest of the crate depends on.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Password sign-in. On success the provider caches and broadcasts the session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError>;

    /// Sign out. Succeeds without a network call when no session is cached.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Current session, refreshed first if it is about to expire.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Fresh user lookup against the provider, bypassing any cached user.
    async fn get_user(&self) -> Result<Option<User>, ProviderError>;

    /// Subscribe to session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Object storage operations used by the image helpers.
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` inside `bucket`, returning the stored path.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, ProviderError>;

    /// Public URL for an object. Pure string construction, no request.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Delete the given object paths from `bucket`.
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), ProviderError>;
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Build a session for `email` with a one-hour lifetime.
    #[must_use]
    pub fn session_for(email: &str) -> Session {
        Session {
            access_token: format!("access-{email}"),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: Some(4_102_444_800),
            refresh_token: format!("refresh-{email}"),
            user: User {
                id: Uuid::new_v4(),
                email: Some(email.to_string()),
                role: Some("admin".into()),
                created_at: None,
                updated_at: None,
            },
        }
    }

    /// In-memory provider. Accepts one password per email, records calls,
    /// and can be primed with failures for the next call of each kind.
    pub struct MockProvider {
        passwords: Mutex<BTreeMap<String, String>>,
        session: Mutex<Option<Session>>,
        changes: broadcast::Sender<AuthChange>,
        fail_sign_out: Mutex<VecDeque<ProviderError>>,
        fail_get_session: Mutex<VecDeque<ProviderError>>,
        fail_sign_in: Mutex<VecDeque<ProviderError>>,
        pub sign_in_calls: Mutex<usize>,
        pub sign_out_calls: Mutex<usize>,
        pub get_user_calls: Mutex<usize>,
        pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MockProvider {
        #[must_use]
        pub fn new() -> Self {
            let (changes, _) = broadcast::channel(16);
            Self {
                passwords: Mutex::new(BTreeMap::new()),
                session: Mutex::new(None),
                changes,
                fail_sign_out: Mutex::new(VecDeque::new()),
                fail_get_session: Mutex::new(VecDeque::new()),
                fail_sign_in: Mutex::new(VecDeque::new()),
                sign_in_calls: Mutex::new(0),
                sign_out_calls: Mutex::new(0),
                get_user_calls: Mutex::new(0),
                objects: Mutex::new(BTreeMap::new()),
            }
        }

        #[must_use]
        pub fn with_account(self, email: &str, password: &str) -> Self {
            self.passwords
                .lock()
                .unwrap()
                .insert(email.to_string(), password.to_string());
            self
        }

        /// Pretend a session already exists (e.g. restored from disk).
        pub fn seed_session(&self, session: Session) {
            *self.session.lock().unwrap() = Some(session);
        }

        pub fn current_session(&self) -> Option<Session> {
            self.session.lock().unwrap().clone()
        }

        /// Push a notification exactly as the provider would.
        pub fn push(&self, change: AuthChange) {
            *self.session.lock().unwrap() = change.session.clone();
            let _ = self.changes.send(change);
        }

        pub fn fail_next_sign_out(&self, err: ProviderError) {
            self.fail_sign_out.lock().unwrap().push_back(err);
        }

        pub fn fail_next_get_session(&self, err: ProviderError) {
            self.fail_get_session.lock().unwrap().push_back(err);
        }

        pub fn fail_next_sign_in(&self, err: ProviderError) {
            self.fail_sign_in.lock().unwrap().push_back(err);
        }
    }

    impl Default for MockProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl AuthProvider for MockProvider {
        async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
            *self.sign_in_calls.lock().unwrap() += 1;
            if let Some(err) = self.fail_sign_in.lock().unwrap().pop_front() {
                return Err(err);
            }
            let accepted = self
                .passwords
                .lock()
                .unwrap()
                .get(email)
                .is_some_and(|p| p == password);
            if !accepted {
                return Err(ProviderError::Rejected { status: 400, message: "Invalid login credentials".into() });
            }
            let session = session_for(email);
            self.push(AuthChange::new(AuthEvent::SignedIn, Some(session.clone())));
            Ok(session)
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            *self.sign_out_calls.lock().unwrap() += 1;
            if let Some(err) = self.fail_sign_out.lock().unwrap().pop_front() {
                return Err(err);
            }
            let had_session = self.session.lock().unwrap().take().is_some();
            if had_session {
                let _ = self.changes.send(AuthChange::signed_out());
            }
            Ok(())
        }

        async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
            if let Some(err) = self.fail_get_session.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(self.current_session())
        }

        async fn get_user(&self) -> Result<Option<User>, ProviderError> {
            *self.get_user_calls.lock().unwrap() += 1;
            Ok(self.current_session().map(|s| s.user))
        }

        fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
            self.changes.subscribe()
        }
    }

    #[async_trait::async_trait]
    impl ObjectStorage for MockProvider {
        async fn upload(
            &self,
            bucket: &str,
            path: &str,
            bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, ProviderError> {
            let mut objects = self.objects.lock().unwrap();
            let key = format!("{bucket}/{path}");
            if objects.contains_key(&key) {
                return Err(ProviderError::Rejected { status: 409, message: "The resource already exists".into() });
            }
            objects.insert(key, bytes);
            Ok(path.to_string())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("https://mock.test/storage/v1/object/public/{bucket}/{path}")
        }

        async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), ProviderError> {
            let mut objects = self.objects.lock().unwrap();
            for path in paths {
                objects.remove(&format!("{bucket}/{path}"));
            }
            Ok(())
        }
    }

    /// Minimal HTTP/1.1 server answering each connection with the next canned
    /// `(status, body)` pair and recording the raw request text.
    pub struct StubServer {
        pub base_url: String,
        pub requests: std::sync::Arc<Mutex<Vec<String>>>,
        task: tokio::task::JoinHandle<()>,
    }

    impl StubServer {
        pub async fn start(responses: Vec<(u16, String)>) -> Self {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
            let recorded = requests.clone();
            let task = tokio::spawn(async move {
                for (status, body) in responses {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let mut raw = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        raw.extend_from_slice(&chunk[..n]);
                        if request_complete(&raw) {
                            break;
                        }
                    }
                    recorded.lock().unwrap().push(String::from_utf8_lossy(&raw).into_owned());
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            Self { base_url, requests, task }
        }

        /// Recorded request `index`, lowercased for header matching.
        pub fn request(&self, index: usize) -> String {
            self.requests.lock().unwrap()[index].to_lowercase()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Drop for StubServer {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }
}

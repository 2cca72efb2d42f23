use super::*;
use crate::provider::test_helpers::{MockProvider, session_for};
use std::sync::Mutex;
use std::time::Duration;

fn router_with(provider: Arc<MockProvider>) -> Router {
    Router::new(default_routes(), RouteGuard::new(provider))
}

// =============================================================================
// RouteGuard
// =============================================================================

#[tokio::test]
async fn protected_route_without_session_redirects_to_landing() {
    let provider = Arc::new(MockProvider::new());
    let guard = RouteGuard::new(provider.clone());
    let admin = &default_routes()[1];
    assert_eq!(guard.before_each(admin).await, Navigation::Redirect(LANDING_PATH));
}

#[tokio::test]
async fn protected_route_with_session_proceeds() {
    let provider = Arc::new(MockProvider::new());
    provider.seed_session(session_for("admin@x.com"));
    let guard = RouteGuard::new(provider);
    let admin = &default_routes()[1];
    assert_eq!(guard.before_each(admin).await, Navigation::Proceed);
}

#[tokio::test]
async fn public_route_skips_user_lookup() {
    let provider = Arc::new(MockProvider::new());
    let guard = RouteGuard::new(provider.clone());
    let landing = &default_routes()[0];
    assert_eq!(guard.before_each(landing).await, Navigation::Proceed);
    assert_eq!(*provider.get_user_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn guard_looks_up_user_on_every_navigation() {
    let provider = Arc::new(MockProvider::new());
    let guard = RouteGuard::new(provider.clone());
    let admin = &default_routes()[1];

    assert_eq!(guard.before_each(admin).await, Navigation::Redirect(LANDING_PATH));
    provider.seed_session(session_for("admin@x.com"));
    assert_eq!(guard.before_each(admin).await, Navigation::Proceed);
    assert_eq!(*provider.get_user_calls.lock().unwrap(), 2);
}

// =============================================================================
// Router
// =============================================================================

#[tokio::test]
async fn navigate_to_admin_without_session_lands_on_root() {
    let router = router_with(Arc::new(MockProvider::new()));
    let route = router.navigate("/admin").await.unwrap();
    assert_eq!(route.path, "/");
    assert_eq!(route.name, "Login");
}

#[tokio::test]
async fn navigate_to_admin_with_session_renders_admin() {
    let provider = Arc::new(MockProvider::new());
    provider.seed_session(session_for("admin@x.com"));
    let router = router_with(provider);
    let route = router.navigate("/admin/?tab=products").await.unwrap();
    assert_eq!(route.name, "AdminPanel");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let router = router_with(Arc::new(MockProvider::new()));
    assert_eq!(router.navigate("/nope").await, Err(RouteError::NotFound("/nope".into())));
}

#[tokio::test]
async fn route_redirect_is_followed() {
    let provider = Arc::new(MockProvider::new());
    provider.seed_session(session_for("admin@x.com"));
    let mut routes = default_routes();
    routes.push(Route { path: "/panel", name: "Panel", requires_auth: false, redirect: Some(ADMIN_PATH) });
    let router = Router::new(routes, RouteGuard::new(provider));
    assert_eq!(router.navigate("/panel").await.unwrap().name, "AdminPanel");
}

#[tokio::test]
async fn protected_landing_is_a_redirect_loop() {
    let routes = vec![Route { path: LANDING_PATH, name: "Home", requires_auth: true, redirect: None }];
    let router = Router::new(routes, RouteGuard::new(Arc::new(MockProvider::new())));
    assert!(matches!(router.navigate("/").await, Err(RouteError::RedirectLoop(_))));
}

#[test]
fn normalize_strips_query_and_trailing_slash() {
    assert_eq!(normalize(""), "/");
    assert_eq!(normalize("/"), "/");
    assert_eq!(normalize("/admin/"), "/admin");
    assert_eq!(normalize("/admin#top"), "/admin");
}

// =============================================================================
// should_redirect_unauth
// =============================================================================

#[test]
fn should_redirect_unauth_when_not_loading_and_user_missing() {
    let state = AuthState { loading: false, ..AuthState::default() };
    assert!(should_redirect_unauth(&state));
}

#[test]
fn should_not_redirect_while_loading() {
    let state = AuthState { loading: true, ..AuthState::default() };
    assert!(!should_redirect_unauth(&state));
}

#[test]
fn should_not_redirect_when_user_exists() {
    let state = AuthState {
        user: Some(session_for("admin@x.com").user),
        is_authenticated: true,
        ..AuthState::default()
    };
    assert!(!should_redirect_unauth(&state));
}

#[tokio::test]
async fn unauth_redirect_fires_when_user_drops() {
    let store = AuthStore::new();
    store.set_user(Some(session_for("admin@x.com").user));

    let hits = Arc::new(Mutex::new(Vec::<String>::new()));
    let handle = spawn_unauth_redirect(&store, {
        let hits = hits.clone();
        move |path| hits.lock().unwrap().push(path.to_string())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(hits.lock().unwrap().is_empty());

    store.set_user(None);
    tokio::time::timeout(Duration::from_secs(2), async {
        while hits.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(hits.lock().unwrap()[0], LANDING_PATH);
    handle.abort();
}

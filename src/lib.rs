//! Catalog admin — session lifecycle, route guarding and catalog plumbing
//! for a product admin panel backed by a hosted Supabase project.
//!
//! ARCHITECTURE
//! ============
//! `SessionController` is the only writer of the shared `AuthStore`;
//! `RouteGuard` reads the provider directly on each navigation. Everything
//! remote sits behind the `AuthProvider` / `ObjectStorage` traits, with
//! `SupabaseClient` as the HTTP implementation.

pub mod admin;
pub mod catalog;
pub mod config;
pub mod guard;
pub mod provider;
pub mod session;
pub mod state;
pub mod storage;

pub use config::{ConfigError, ProviderConfig};
pub use guard::{RouteGuard, Router};
pub use provider::{AuthProvider, ObjectStorage, ProviderError, SupabaseClient};
pub use session::{AuthSubscription, SessionController, SessionFailure};
pub use state::{AuthState, AuthStore};

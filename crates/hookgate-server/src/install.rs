//! Extension points run during bootstrap.
//!
//! Each has a no-op implementation, used when nothing is supplied.

use async_trait::async_trait;
use axum::Router;

use crate::config::ServerConfig;
use crate::error::Result;

/// Setup that must finish before any route is registered.
#[async_trait]
pub trait Configurable: Send + Sync {
    async fn configure(&self, config: &ServerConfig) -> Result<()>;
}

/// Additional routes, registered after the webhook routes.
pub trait RouteRegistrar: Send + Sync {
    fn routes(&self, config: &ServerConfig) -> Router;
}

/// Installs the push channel (e.g. server-sent events) onto the router.
pub trait PushServerInstaller: Send + Sync {
    fn install(&self, router: Router) -> Router;
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl Configurable for Noop {
    async fn configure(&self, _config: &ServerConfig) -> Result<()> {
        Ok(())
    }
}

impl RouteRegistrar for Noop {
    fn routes(&self, _config: &ServerConfig) -> Router {
        Router::new()
    }
}

impl PushServerInstaller for Noop {
    fn install(&self, router: Router) -> Router {
        router
    }
}

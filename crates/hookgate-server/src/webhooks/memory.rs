//! In-memory registries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    Lifecycle, TestWebhookRegistry, WebhookError, WebhookHandler, WebhookRegistry, WebhookReply,
    WebhookRequest, normalize_path,
};

/// Path and optional suffix, kept apart so `77/resume` with no suffix never
/// matches path `77` with suffix `resume`.
type RoutePath = (String, Option<String>);

fn route_path(path: &str, suffix: Option<&str>) -> RoutePath {
    (normalize_path(path), suffix.map(normalize_path))
}

fn request_route(request: &WebhookRequest) -> RoutePath {
    (request.path.clone(), request.suffix.clone())
}

fn display_route((path, suffix): &RoutePath) -> String {
    match suffix {
        Some(suffix) => format!("{}/{}", path, suffix),
        None => path.clone(),
    }
}

/// Handlers keyed by path and suffix, then method.
pub struct InMemoryRegistry {
    lifecycle: Lifecycle,
    routes: RwLock<HashMap<RoutePath, HashMap<Method, Arc<dyn WebhookHandler>>>>,
}

impl InMemoryRegistry {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Register a handler. Fails if `method path` is already taken.
    pub fn register(
        &self,
        method: Method,
        path: &str,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<(), WebhookError> {
        self.insert(method, route_path(path, None), handler)
    }

    /// Register a handler for `path` followed by a separate `suffix` segment,
    /// as used by waiting webhooks.
    pub fn register_suffixed(
        &self,
        method: Method,
        path: &str,
        suffix: &str,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<(), WebhookError> {
        self.insert(method, route_path(path, Some(suffix)), handler)
    }

    fn insert(
        &self,
        method: Method,
        route: RoutePath,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<(), WebhookError> {
        let route_display = display_route(&route);
        let mut routes = self.routes.write();
        let methods = routes.entry(route).or_default();
        if methods.contains_key(&method) {
            return Err(WebhookError::Conflict(format!(
                "webhook \"{} {}\" is already registered",
                method, route_display
            )));
        }
        tracing::debug!(lifecycle = %self.lifecycle, method = %method, path = %route_display, "webhook registered");
        methods.insert(method, handler);
        Ok(())
    }

    /// Returns `true` if something was removed.
    pub fn unregister(&self, method: &Method, path: &str) -> bool {
        self.remove(method, &route_path(path, None))
    }

    pub fn unregister_suffixed(&self, method: &Method, path: &str, suffix: &str) -> bool {
        self.remove(method, &route_path(path, Some(suffix)))
    }

    fn remove(&self, method: &Method, route: &RoutePath) -> bool {
        let mut routes = self.routes.write();
        let Some(methods) = routes.get_mut(route) else {
            return false;
        };
        let removed = methods.remove(method).is_some();
        if methods.is_empty() {
            routes.remove(route);
        }
        removed
    }

    /// Number of registered (method, path) pairs.
    pub fn len(&self) -> usize {
        self.routes.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, request: &WebhookRequest) -> Result<Arc<dyn WebhookHandler>, WebhookError> {
        let route = request_route(request);
        let path = display_route(&route);
        let routes = self.routes.read();
        let Some(methods) = routes.get(&route) else {
            return Err(WebhookError::NotFound {
                method: request.method.clone(),
                path,
            });
        };
        match methods.get(&request.method) {
            Some(handler) => Ok(handler.clone()),
            None => {
                let mut allowed: Vec<Method> = methods.keys().cloned().collect();
                allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                Err(WebhookError::MethodNotAllowed {
                    method: request.method.clone(),
                    path,
                    allowed,
                })
            }
        }
    }
}

#[async_trait]
impl WebhookRegistry for InMemoryRegistry {
    async fn handle(&self, request: WebhookRequest) -> Result<WebhookReply, WebhookError> {
        let handler = self.find(&request)?;
        handler.handle(request).await
    }
}

struct TestRegistration {
    method: Method,
    path: String,
    handler: Arc<dyn WebhookHandler>,
}

/// Pending test webhooks. Each registration answers exactly one request.
#[derive(Default)]
pub struct InMemoryTestRegistry {
    pending: Mutex<HashMap<Uuid, TestRegistration>>,
}

impl InMemoryTestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for one call to `method path`. Returns the session id that
    /// cancels it.
    pub fn register(
        &self,
        method: Method,
        path: &str,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<Uuid, WebhookError> {
        let path = normalize_path(path);
        let mut pending = self.pending.lock();
        if pending
            .values()
            .any(|r| r.method == method && r.path == path)
        {
            return Err(WebhookError::Conflict(format!(
                "a test webhook for \"{} {}\" is already waiting",
                method, path
            )));
        }

        let id = Uuid::new_v4();
        tracing::debug!(id = %id, method = %method, path = %path, "test webhook registered");
        pending.insert(
            id,
            TestRegistration {
                method,
                path,
                handler,
            },
        );
        Ok(id)
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Remove and return the registration matching `request`.
    fn take(&self, request: &WebhookRequest) -> Result<Arc<dyn WebhookHandler>, WebhookError> {
        let route = request_route(request);
        let path = display_route(&route);
        let matches = |r: &TestRegistration| route.1.is_none() && r.path == route.0;
        let mut pending = self.pending.lock();

        let id = pending
            .iter()
            .find(|(_, r)| matches(*r) && r.method == request.method)
            .map(|(id, _)| *id);
        if let Some(registration) = id.and_then(|id| pending.remove(&id)) {
            return Ok(registration.handler);
        }

        let mut allowed: Vec<Method> = pending
            .values()
            .filter(|r| matches(*r))
            .map(|r| r.method.clone())
            .collect();
        if allowed.is_empty() {
            return Err(WebhookError::NotFound {
                method: request.method.clone(),
                path,
            });
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Err(WebhookError::MethodNotAllowed {
            method: request.method.clone(),
            path,
            allowed,
        })
    }
}

#[async_trait]
impl WebhookRegistry for InMemoryTestRegistry {
    async fn handle(&self, request: WebhookRequest) -> Result<WebhookReply, WebhookError> {
        let handler = self.take(&request)?;
        handler.handle(request).await
    }
}

#[async_trait]
impl TestWebhookRegistry for InMemoryTestRegistry {
    async fn cancel(&self, id: &str) -> bool {
        let Ok(id) = Uuid::parse_str(id) else {
            return false;
        };
        let removed = self.pending.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(id = %id, "test webhook cancelled");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::{WebhookResponse, handler_fn};
    use axum::http::StatusCode;

    fn echo() -> Arc<dyn WebhookHandler> {
        handler_fn(|request: WebhookRequest| async move {
            Ok::<_, WebhookError>(WebhookReply::Immediate(
                WebhookResponse::ok().with_body(request.body),
            ))
        })
    }

    fn request(method: Method, path: &str) -> WebhookRequest {
        WebhookRequest::new(Lifecycle::Active, method, path)
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_method_and_path() {
        let registry = InMemoryRegistry::new(Lifecycle::Active);
        registry.register(Method::POST, "/orders", echo()).unwrap();
        assert_eq!(registry.len(), 1);

        let reply = registry
            .handle(request(Method::POST, "orders").with_body("hi"))
            .await
            .unwrap();
        let WebhookReply::Immediate(response) = reply else {
            panic!("expected an immediate reply");
        };
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"hi");
    }

    #[tokio::test]
    async fn test_registry_unknown_path_and_method() {
        let registry = InMemoryRegistry::new(Lifecycle::Active);
        registry.register(Method::POST, "orders", echo()).unwrap();

        let err = registry
            .handle(request(Method::POST, "nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = registry
            .handle(request(Method::GET, "orders"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookError::MethodNotAllowed { ref allowed, .. } if allowed == &[Method::POST]
        ));
    }

    #[test]
    fn test_registry_rejects_duplicates_and_unregisters() {
        let registry = InMemoryRegistry::new(Lifecycle::Active);
        registry.register(Method::POST, "orders", echo()).unwrap();
        assert!(matches!(
            registry.register(Method::POST, "/orders/", echo()),
            Err(WebhookError::Conflict(_))
        ));
        registry.register(Method::GET, "orders", echo()).unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(&Method::POST, "orders"));
        assert!(!registry.unregister(&Method::POST, "orders"));
        assert!(registry.unregister(&Method::GET, "orders"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_registry_matches_suffix() {
        let registry = InMemoryRegistry::new(Lifecycle::Waiting);
        registry
            .register_suffixed(Method::POST, "42", "approve", echo())
            .unwrap();

        let with_suffix = WebhookRequest::new(Lifecycle::Waiting, Method::POST, "42")
            .with_suffix("approve");
        assert!(registry.handle(with_suffix).await.is_ok());

        let without = WebhookRequest::new(Lifecycle::Waiting, Method::POST, "42");
        assert!(registry.handle(without).await.is_err());
    }

    #[tokio::test]
    async fn test_slash_in_path_does_not_match_suffix() {
        let registry = InMemoryRegistry::new(Lifecycle::Waiting);
        registry
            .register_suffixed(Method::POST, "77", "resume", echo())
            .unwrap();

        let joined = WebhookRequest::new(Lifecycle::Waiting, Method::POST, "77/resume");
        let err = registry.handle(joined).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        registry.register(Method::POST, "77/resume", echo()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.unregister_suffixed(&Method::POST, "77", "resume"));
        assert!(registry.unregister(&Method::POST, "77/resume"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_test_registration_is_one_shot() {
        let registry = InMemoryTestRegistry::new();
        registry.register(Method::GET, "sample", echo()).unwrap();
        assert_eq!(registry.pending(), 1);

        let first = WebhookRequest::new(Lifecycle::Test, Method::GET, "sample");
        assert!(registry.handle(first).await.is_ok());
        assert_eq!(registry.pending(), 0);

        let second = WebhookRequest::new(Lifecycle::Test, Method::GET, "sample");
        let err = registry.handle(second).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_test_registration() {
        let registry = InMemoryTestRegistry::new();
        let id = registry.register(Method::GET, "sample", echo()).unwrap();

        assert!(registry.cancel(&id.to_string()).await);
        assert!(!registry.cancel(&id.to_string()).await);
        assert!(!registry.cancel("not-a-uuid").await);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_duplicate_test_registration_conflicts() {
        let registry = InMemoryTestRegistry::new();
        registry.register(Method::GET, "sample", echo()).unwrap();
        assert!(registry.register(Method::GET, "sample", echo()).is_err());
        assert!(registry.register(Method::POST, "sample", echo()).is_ok());
    }
}

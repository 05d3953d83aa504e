//! Route registration and request routing.
//!
//! Routes are declared against a [`RouterBuilder`]; `build` resolves every
//! route into an immutable [`RequestDispatcher`] exactly once, so no filter
//! lookup, parameter metadata or codec setup happens per request. Requests
//! that match no route or no method fall through to a fixed 404 response.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, SERVER};
use http::{HeaderValue, Method, Request, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::bind::{BinderRegistry, ParamSpec, ParamTag};
use crate::body::ResponseBody;
use crate::config::Config;
use crate::dispatcher::{Handler, RequestDispatcher, RouteMetadata};
use crate::filter::{Filter, FilterChain};
use crate::i18n::Messages;
use crate::render::{error_page, JsonRenderer, Renderer};
use crate::state::StateCodec;

/// A route registration error, surfaced at build time.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("conflicting route path '{path}': {source}")]
    Conflict {
        path: String,
        source: matchit::InsertError,
    },
    #[error("duplicate route {method} {path}")]
    Duplicate { method: Method, path: String },
}

/// One route under construction.
pub struct Route {
    method: Method,
    path: String,
    controller: String,
    action: String,
    params: Vec<ParamSpec>,
    controller_filters: Vec<Arc<dyn Filter>>,
    handler_filters: Vec<Arc<dyn Filter>>,
    handler: Box<dyn Handler>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("controller", &self.controller)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

fn route(method: Method, path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    Route {
        method,
        path: path.into(),
        controller: String::new(),
        action: String::new(),
        params: Vec::new(),
        controller_filters: Vec::new(),
        handler_filters: Vec::new(),
        handler: Box::new(handler),
    }
}

pub fn get(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::GET, path, handler)
}

pub fn post(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::POST, path, handler)
}

pub fn put(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::PUT, path, handler)
}

pub fn delete(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::DELETE, path, handler)
}

pub fn patch(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::PATCH, path, handler)
}

pub fn head(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::HEAD, path, handler)
}

pub fn options(path: impl Into<String>, handler: impl Handler + 'static) -> Route {
    route(Method::OPTIONS, path, handler)
}

impl Route {
    /// Names the controller and action this route belongs to. The action
    /// name doubles as the default template name.
    pub fn named(mut self, controller: impl Into<String>, action: impl Into<String>) -> Self {
        self.controller = controller.into();
        self.action = action.into();
        self
    }

    /// Declares one handler parameter; order of declaration is the order
    /// of the bound [`Args`](crate::bind::Args).
    pub fn param(mut self, name: impl Into<String>, tag: ParamTag) -> Self {
        self.params.push(ParamSpec::new(name, tag));
        self
    }

    /// Adds a controller-level filter, running before handler filters.
    pub fn controller_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.controller_filters.push(Arc::new(filter));
        self
    }

    /// Adds a handler-level filter, running last in the chain.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.handler_filters.push(Arc::new(filter));
        self
    }
}

/// Collects routes and shared services, then freezes them into a [`Router`].
pub struct RouterBuilder {
    config: Arc<Config>,
    renderer: Arc<dyn Renderer>,
    messages: Arc<Messages>,
    binders: Arc<BinderRegistry>,
    global_filter: Option<Arc<dyn Filter>>,
    routes: Vec<Route>,
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    pub fn new(config: Config) -> Self {
        let default_language = config.default_language().to_owned();
        Self {
            config: Arc::new(config),
            renderer: Arc::new(JsonRenderer),
            messages: Arc::new(Messages::new(default_language)),
            binders: Arc::new(BinderRegistry::default()),
            global_filter: None,
            routes: Vec::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = Arc::new(messages);
        self
    }

    pub fn with_binders(mut self, binders: BinderRegistry) -> Self {
        self.binders = Arc::new(binders);
        self
    }

    /// Installs the filter running first for every route.
    pub fn with_global_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.global_filter = Some(Arc::new(filter));
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Resolves every registered route into its dispatcher.
    pub fn build(self) -> Result<Router, RouterError> {
        let codec = Arc::new(StateCodec::new(Arc::clone(&self.config)));

        let mut by_path: HashMap<String, Vec<RouteEntry>> = HashMap::new();
        for route in self.routes {
            let entries = by_path.entry(route.path.clone()).or_default();
            if entries.iter().any(|entry| entry.method == route.method) {
                return Err(RouterError::Duplicate { method: route.method, path: route.path });
            }
            let dispatcher = RequestDispatcher::new(
                RouteMetadata::new(route.controller, route.action, route.params),
                route.handler,
                FilterChain::new(
                    self.global_filter.clone(),
                    route.controller_filters,
                    route.handler_filters,
                ),
                Arc::clone(&self.binders),
                Arc::clone(&codec),
                Arc::clone(&self.config),
                Arc::clone(&self.renderer),
                Arc::clone(&self.messages),
            );
            entries.push(RouteEntry { method: route.method, dispatcher });
        }

        let mut inner = matchit::Router::new();
        for (path, entries) in by_path {
            inner
                .insert(path.clone(), entries)
                .map_err(|source| RouterError::Conflict { path, source })?;
        }

        Ok(Router { inner, config: self.config })
    }
}

struct RouteEntry {
    method: Method,
    dispatcher: RequestDispatcher,
}

/// The frozen routing table; the single entry point for requests.
pub struct Router {
    inner: matchit::Router<Vec<RouteEntry>>,
    config: Arc<Config>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl Router {
    /// Routes one request to its dispatcher, or answers 404 when no route
    /// matches the path and method.
    pub async fn dispatch(&self, request: Request<Bytes>) -> http::Response<ResponseBody> {
        let path = request.uri().path().to_owned();
        if let Ok(matched) = self.inner.at(&path) {
            if let Some(entry) =
                matched.value.iter().find(|entry| entry.method == *request.method())
            {
                let params: HashMap<String, String> = matched
                    .params
                    .iter()
                    .map(|(name, value)| (name.to_owned(), value.to_owned()))
                    .collect();
                return entry.dispatcher.dispatch(request, params).await;
            }
        }
        debug!(%path, "no route matched");
        self.not_found()
    }

    fn not_found(&self) -> http::Response<ResponseBody> {
        let body = error_page(StatusCode::NOT_FOUND, "The requested resource could not be found");
        let mut response = http::Response::new(ResponseBody::from(body));
        *response.status_mut() = StatusCode::NOT_FOUND;

        let headers = response.headers_mut();
        headers.insert(http::header::X_XSS_PROTECTION, HeaderValue::from_static("1"));
        headers.insert(http::header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(http::header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=UTF-8"));
        if let Ok(server) = HeaderValue::from_str(self.config.server_token()) {
            headers.insert(SERVER, server);
        }
        response
    }
}

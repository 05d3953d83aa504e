//! Per-route request dispatch.
//!
//! A [`RequestDispatcher`] orchestrates one full request/response cycle:
//! restore cookie state, run the filter chain, bind parameters, invoke the
//! handler, render, persist mutated state, write the response. Dispatchers
//! hold only registration-time data and shared services; everything
//! per-request travels in the [`Context`] value, so one dispatcher safely
//! serves concurrent requests to its route.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cookie::Cookie;
use http::header::{CONTENT_TYPE, LOCATION, SERVER, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use tracing::{debug, error, warn};

use crate::bind::{Args, BinderRegistry, Body, Form, ParamSpec};
use crate::body::ResponseBody;
use crate::config::Config;
use crate::context::{merge_params, parse_query, Context};
use crate::error::{DispatchError, HandlerError};
use crate::filter::FilterChain;
use crate::i18n::{resolve_locale, Messages};
use crate::render::{error_page, RenderContext, Renderer};
use crate::response::Response;
use crate::state::StateCodec;

/// The application logic behind one route.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, ctx: &mut Context, args: Args) -> Result<Response, HandlerError>;
}

/// Boxed future returned by function handlers; borrows the request context.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Response, HandlerError>> + Send + 'a>>;

/// Holder adapting a plain function to [`Handler`].
pub struct FnHandler<F>(F);

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FnHandler").finish()
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, Args) -> HandlerFuture<'a> + Send + Sync,
{
    async fn invoke(&self, ctx: &mut Context, args: Args) -> Result<Response, HandlerError> {
        (self.0)(ctx, args).await
    }
}

/// Wraps a function returning a [`HandlerFuture`] as a [`Handler`].
///
/// ```no_run
/// # use satchel::{handler_fn, Args, Context, HandlerFuture, Response};
/// fn index(_ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
///     Box::pin(async move { Ok(Response::ok().and_body("hello")) })
/// }
/// let handler = handler_fn(index);
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, Args) -> HandlerFuture<'a> + Send + Sync,
{
    FnHandler(f)
}

/// Immutable per-route data, resolved once at registration time and safely
/// shared between concurrent requests.
#[derive(Debug, Clone)]
pub struct RouteMetadata {
    controller: String,
    action: String,
    params: Vec<ParamSpec>,
}

impl RouteMetadata {
    pub(crate) fn new(controller: String, action: String, params: Vec<ParamSpec>) -> Self {
        Self { controller, action, params }
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
}

/// Dispatches requests for exactly one route.
pub struct RequestDispatcher {
    metadata: RouteMetadata,
    handler: Box<dyn Handler>,
    filters: FilterChain,
    binders: Arc<BinderRegistry>,
    codec: Arc<StateCodec>,
    config: Arc<Config>,
    renderer: Arc<dyn Renderer>,
    messages: Arc<Messages>,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher").field("metadata", &self.metadata).finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        metadata: RouteMetadata,
        handler: Box<dyn Handler>,
        filters: FilterChain,
        binders: Arc<BinderRegistry>,
        codec: Arc<StateCodec>,
        config: Arc<Config>,
        renderer: Arc<dyn Renderer>,
        messages: Arc<Messages>,
    ) -> Self {
        Self { metadata, handler, filters, binders, codec, config, renderer, messages }
    }

    pub fn metadata(&self) -> &RouteMetadata {
        &self.metadata
    }

    /// Runs one full request/response cycle.
    pub async fn dispatch(
        &self,
        request: Request<Bytes>,
        path_params: HashMap<String, String>,
    ) -> http::Response<ResponseBody> {
        let (parts, payload) = request.into_parts();

        let locale = resolve_locale(&parts.headers, self.config.default_language());
        let cookies = request_cookies(&parts.headers);

        let session = self
            .codec
            .decode_session(cookies.get(self.config.session_cookie_name()).map(String::as_str));
        let authentication = self
            .codec
            .decode_authentication(cookies.get(self.config.auth_cookie_name()).map(String::as_str));
        let flash_cookie = cookies.get(self.config.flash_cookie_name());
        let had_flash_cookie = flash_cookie.is_some();
        let flash = self.codec.decode_flash(flash_cookie.map(String::as_str));

        let (form, body) = parse_payload(&parts.method, &parts.headers, &payload);
        let params = merge_params(parse_query(&parts.uri), path_params);

        let mut ctx = Context::new(
            parts.method,
            parts.uri,
            parts.headers,
            params,
            session,
            authentication,
            flash,
            form,
            body,
            locale,
        );

        if !self.filters.run(&mut ctx) {
            debug!(
                controller = self.metadata.controller(),
                action = self.metadata.action(),
                "filter chain rejected request"
            );
            let reply = ctx.take_reply().unwrap_or_else(Response::forbidden);
            // reject branch: no state cookies beyond what the filter set
            return self.finalize(reply, Vec::new());
        }

        let args = match self.binders.bind(self.metadata.params(), &ctx) {
            Ok(args) => args,
            Err(e) => {
                let error = DispatchError::from(e);
                error!(action = self.metadata.action(), "{error}");
                return self.finalize(self.server_error(&error), Vec::new());
            }
        };

        let mut response = match self.handler.invoke(&mut ctx, args).await {
            Ok(response) => response,
            Err(e) => {
                let error = DispatchError::from(e);
                error!(action = self.metadata.action(), "{error}");
                // a failed request persists no state mutations
                return self.finalize(self.server_error(&error), Vec::new());
            }
        };

        response.template_or(self.metadata.action());
        if !response.is_rendered() && !response.is_redirect() && !response.is_binary() {
            response.merge_content(ctx.content());
            let rendered = self.renderer.render(RenderContext {
                flash: ctx.flash(),
                session: ctx.session(),
                form: ctx.form(),
                messages: self.messages.bundle(ctx.locale()),
                controller: self.metadata.controller(),
                template: response.template().unwrap_or_else(|| self.metadata.action()),
                content: response.content(),
            });
            match rendered {
                Ok(body) => response.set_rendered_body(body),
                Err(e) => {
                    let error = DispatchError::from(e);
                    error!(action = self.metadata.action(), "{error}");
                    return self.finalize(self.server_error(&error), Vec::new());
                }
            }
        }

        let (session, authentication, flash) = ctx.into_state();
        let mut cookies = Vec::new();
        if let Some(cookie) = self.codec.encode_session(&session) {
            cookies.push(cookie);
        }
        if let Some(cookie) = self.codec.encode_flash(&flash, had_flash_cookie) {
            cookies.push(cookie);
        }
        if let Some(cookie) = self.codec.encode_authentication(&authentication) {
            cookies.push(cookie);
        }

        self.finalize(response, cookies)
    }

    /// Hardened failure path: fixed markup, no renderer involved, so a
    /// broken template engine cannot make error reporting recurse.
    fn server_error(&self, error: &DispatchError) -> Response {
        Response::internal_server_error()
            .and_body(error_page(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string()))
    }

    /// Shapes the final HTTP response from the model: redirect, binary
    /// stream or normal body with the fixed security headers.
    fn finalize(
        &self,
        mut response: Response,
        cookies: Vec<Cookie<'static>>,
    ) -> http::Response<ResponseBody> {
        let mut http_response = if response.is_redirect() {
            let mut redirect = http::Response::new(ResponseBody::empty());
            *redirect.status_mut() = StatusCode::FOUND;
            if let Some(location) = response.redirect_to().and_then(|to| HeaderValue::from_str(to).ok())
            {
                redirect.headers_mut().insert(LOCATION, location);
            }
            redirect
        } else if let Some(bytes) = response.take_binary() {
            let mut binary = http::Response::new(ResponseBody::binary(bytes));
            *binary.status_mut() = response.status_code();
            let content_type = response
                .content_type()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
                .unwrap_or_else(|| {
                    HeaderValue::from_static(mime::APPLICATION_OCTET_STREAM.as_ref())
                });
            binary.headers_mut().insert(CONTENT_TYPE, content_type);
            binary
        } else {
            let body = response.take_body().map(ResponseBody::from).unwrap_or_else(ResponseBody::empty);
            let mut normal = http::Response::new(body);
            *normal.status_mut() = response.status_code();

            let headers = normal.headers_mut();
            headers.insert(http::header::X_XSS_PROTECTION, HeaderValue::from_static("1"));
            headers.insert(http::header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            headers.insert(http::header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
            let content_type = format!(
                "{}; charset={}",
                response.content_type().unwrap_or_else(|| self.config.content_type()),
                response.charset().unwrap_or_else(|| self.config.charset()),
            );
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
            for (name, value) in response.headers() {
                match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => {
                        headers.append(name, value);
                    }
                    _ => warn!("dropping invalid response header '{name}'"),
                }
            }
            normal
        };

        let headers = http_response.headers_mut();
        if let Ok(server) = HeaderValue::from_str(self.config.server_token()) {
            headers.insert(SERVER, server);
        }
        for cookie in &cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                headers.append(SET_COOKIE, value);
            }
        }

        http_response
    }
}

fn parse_payload(method: &Method, headers: &HeaderMap, payload: &Bytes) -> (Form, Body) {
    if method != Method::POST && method != Method::PUT {
        return (Form::default(), Body::empty());
    }
    let content_type = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok());
    let form = Form::parse(content_type, payload);
    let body = Body::new(String::from_utf8_lossy(payload).into_owned());
    (form, body)
}

fn request_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers.get_all(http::header::COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for cookie in Cookie::split_parse(raw.to_string()) {
            match cookie {
                Ok(cookie) => {
                    cookies.insert(cookie.name().to_string(), cookie.value().to_string());
                }
                Err(e) => debug!("skipping unparsable request cookie: {e}"),
            }
        }
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_cookies_splits_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(http::header::COOKIE, "a=1; b=2".parse().unwrap());
        headers.append(http::header::COOKIE, "c=3".parse().unwrap());

        let cookies = request_cookies(&headers);
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("2"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("3"));
    }

    #[test]
    fn payload_is_parsed_for_post_and_put_only() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/x-www-form-urlencoded".parse().unwrap());
        let payload = Bytes::from_static(b"name=alex");

        let (form, body) = parse_payload(&Method::POST, &headers, &payload);
        assert!(form.is_submitted());
        assert_eq!(form.get("name"), Some("alex"));
        assert_eq!(body.content(), "name=alex");

        let (form, body) = parse_payload(&Method::GET, &headers, &payload);
        assert!(!form.is_submitted());
        assert!(body.is_empty());
    }
}

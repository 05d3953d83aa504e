//! The handler's declared response intent.
//!
//! A [`Response`] captures status, body or template, redirect target, binary
//! payload and extra headers; the dispatcher consumes it to shape the final
//! HTTP response. Redirect, binary and rendered-body responses are mutually
//! exclusive shapes.

use std::collections::HashMap;

use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct Response {
    status: StatusCode,
    content_type: Option<String>,
    charset: Option<String>,
    body: Option<String>,
    template: Option<String>,
    content: HashMap<String, Value>,
    headers: Vec<(String, String)>,
    redirect_to: Option<String>,
    binary: Option<Bytes>,
    rendered: bool,
}

impl Response {
    pub fn status(status: StatusCode) -> Self {
        Self { status, ..Self::default() }
    }

    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    pub fn created() -> Self {
        Self::status(StatusCode::CREATED)
    }

    pub fn bad_request() -> Self {
        Self::status(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::status(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::status(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND)
    }

    pub fn internal_server_error() -> Self {
        Self::status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// A 302 redirect to the given location. Carries no body and skips
    /// rendering entirely.
    pub fn redirect(to: impl Into<String>) -> Self {
        Self { status: StatusCode::FOUND, redirect_to: Some(to.into()), ..Self::default() }
    }

    /// A binary payload, streamed to the client off the request worker.
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Self { status: StatusCode::OK, binary: Some(bytes.into()), ..Self::default() }
    }

    /// Sets a pre-rendered body, bypassing the template renderer.
    pub fn and_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.rendered = true;
        self
    }

    /// Serializes the value as the JSON body of this response.
    pub fn and_json(self, value: &impl serde::Serialize) -> Self {
        let body = serde_json::to_string(value).unwrap_or_default();
        self.and_content_type(mime::APPLICATION_JSON.as_ref()).and_body(body)
    }

    /// Overrides the template; by default the dispatcher uses the action
    /// name of the matched route.
    pub fn and_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Adds a value to the content map handed to the renderer.
    pub fn and_content(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn and_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn and_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn and_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_to.is_some()
    }

    pub fn is_binary(&self) -> bool {
        self.binary.is_some()
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn redirect_to(&self) -> Option<&str> {
        self.redirect_to.as_deref()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn content(&self) -> &HashMap<String, Value> {
        &self.content
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub(crate) fn take_binary(&mut self) -> Option<Bytes> {
        self.binary.take()
    }

    pub(crate) fn take_body(&mut self) -> Option<String> {
        self.body.take()
    }

    pub(crate) fn set_rendered_body(&mut self, body: String) {
        self.body = Some(body);
        self.rendered = true;
    }

    pub(crate) fn template_or(&mut self, default: &str) {
        if self.template.is_none() {
            self.template = Some(default.to_string());
        }
    }

    /// Exchange content wins over model content on key collisions; filters
    /// feed the exchange map and expect their values to reach the template.
    pub(crate) fn merge_content(&mut self, extra: &HashMap<String, Value>) {
        for (key, value) in extra {
            self.content.insert(key.clone(), value.clone());
        }
    }
}

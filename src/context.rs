//! Per-request context.
//!
//! One [`Context`] exists per in-flight request and is threaded explicitly
//! through filter execution, parameter binding and rendering. Dispatchers
//! themselves hold no per-request state, so a single route can serve any
//! number of concurrent requests.

use std::collections::HashMap;

use http::{HeaderMap, Method, Uri};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::debug;

use crate::bind::{Body, Form};
use crate::response::Response;
use crate::state::{Authentication, Flash, Session};

/// Request parameter carrying the same-origin token of form submissions.
pub const AUTHENTICITY_TOKEN: &str = "authenticityToken";

/// The state of one request: transport data, decoded cookie state, parsed
/// payloads and the resolved locale.
#[derive(Debug)]
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    session: Session,
    authentication: Authentication,
    flash: Flash,
    form: Form,
    body: Body,
    locale: String,
    content: HashMap<String, Value>,
    reply: Option<Response>,
    authenticity_token: OnceCell<Option<String>>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        params: HashMap<String, String>,
        session: Session,
        authentication: Authentication,
        flash: Flash,
        form: Form,
        body: Body,
        locale: String,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            params,
            session,
            authentication,
            flash,
            form,
            body,
            locale,
            content: HashMap::new(),
            reply: None,
            authenticity_token: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Looks up a request parameter. Path parameters shadow query
    /// parameters of the same name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    pub fn authentication_mut(&mut self) -> &mut Authentication {
        &mut self.authentication
    }

    pub fn flash(&self) -> &Flash {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut Flash {
        &mut self.flash
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// The authenticity token sent with the request, from the query or path
    /// parameters first, the form fields second. Resolved once per request.
    pub fn authenticity_token(&self) -> Option<&str> {
        self.authenticity_token
            .get_or_init(|| {
                self.param(AUTHENTICITY_TOKEN)
                    .filter(|token| !token.trim().is_empty())
                    .map(str::to_string)
                    .or_else(|| {
                        self.form
                            .get(AUTHENTICITY_TOKEN)
                            .filter(|token| !token.trim().is_empty())
                            .map(str::to_string)
                    })
            })
            .as_deref()
    }

    /// Builds the filter-facing view over this context. The chain executor
    /// builds it once and hands it to every filter in turn.
    pub(crate) fn exchange(&mut self) -> Exchange<'_> {
        // resolve the cached token before splitting the borrows
        self.authenticity_token();
        Exchange {
            method: &self.method,
            uri: &self.uri,
            headers: &self.headers,
            session: &self.session,
            authentication: &self.authentication,
            authenticity_token: self
                .authenticity_token
                .get()
                .and_then(|token| token.as_deref()),
            content: &mut self.content,
            reply: &mut self.reply,
        }
    }

    pub(crate) fn take_reply(&mut self) -> Option<Response> {
        self.reply.take()
    }

    pub(crate) fn content(&self) -> &HashMap<String, Value> {
        &self.content
    }

    pub(crate) fn into_state(self) -> (Session, Authentication, Flash) {
        (self.session, self.authentication, self.flash)
    }
}

/// The request-scoped aggregate every filter receives: transport data, the
/// current session and authentication, and the resolved authenticity token.
#[derive(Debug)]
pub struct Exchange<'r> {
    method: &'r Method,
    uri: &'r Uri,
    headers: &'r HeaderMap,
    session: &'r Session,
    authentication: &'r Authentication,
    authenticity_token: Option<&'r str>,
    content: &'r mut HashMap<String, Value>,
    reply: &'r mut Option<Response>,
}

impl Exchange<'_> {
    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn authentication(&self) -> &Authentication {
        self.authentication
    }

    pub fn authenticity_token(&self) -> Option<&str> {
        self.authenticity_token
    }

    /// True when the request token matches the session's token.
    pub fn valid_authenticity_token(&self) -> bool {
        self.authenticity_token
            .is_some_and(|token| token == self.session.authenticity_token())
    }

    /// Adds a value to the content map merged into the response model before
    /// rendering.
    pub fn put_content(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.content.insert(key.into(), value.into());
    }

    /// Stores the response a rejecting filter wants written, e.g. a 401.
    pub fn respond(&mut self, response: Response) {
        *self.reply = Some(response);
    }
}

/// Parses the query string into a parameter map; for repeated keys the first
/// value wins.
pub(crate) fn parse_query(uri: &Uri) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = uri.query() else {
        return params;
    };
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => {
            for (key, value) in pairs {
                params.entry(key).or_insert(value);
            }
        }
        Err(e) => debug!("unparsable query string: {e}"),
    }
    params
}

/// Merges path parameters over query parameters; path wins on collisions.
pub(crate) fn merge_params(
    mut query: HashMap<String, String>,
    path: HashMap<String, String>,
) -> HashMap<String, String> {
    query.extend(path);
    query
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn context(uri: &str, params: HashMap<String, String>) -> Context {
        Context::new(
            Method::GET,
            uri.parse().unwrap(),
            HeaderMap::new(),
            params,
            Session::create(60),
            Authentication::create(60),
            Flash::new(),
            Form::default(),
            Body::empty(),
            "en".to_string(),
        )
    }
}

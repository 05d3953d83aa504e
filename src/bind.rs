//! Typed parameter binding.
//!
//! Routes declare their handler parameters as an ordered list of
//! [`ParamSpec`]s; at dispatch time the [`BinderRegistry`] converts request
//! data into a positional [`Args`] array matching that order. Binder rules
//! live in a `tag -> conversion function` map and can be extended with
//! [`BinderRegistry::register`] instead of branching on types at call sites.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::BindError;

/// Parsed request payload for form submissions: url-encoded fields and
/// uploaded-file references. Never persists across requests.
#[derive(Debug, Clone, Default)]
pub struct Form {
    values: HashMap<String, String>,
    files: Vec<PathBuf>,
    submitted: bool,
}

impl Form {
    /// Parses an `application/x-www-form-urlencoded` payload. Any other
    /// content type yields an unsubmitted, empty form.
    pub(crate) fn parse(content_type: Option<&str>, payload: &[u8]) -> Self {
        let is_form = content_type
            .is_some_and(|ct| ct.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()));
        if !is_form {
            return Self::default();
        }
        let values = match serde_urlencoded::from_bytes::<Vec<(String, String)>>(payload) {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => {
                debug!("unparsable form payload: {e}");
                HashMap::new()
            }
        };
        Self { values, files: Vec::new(), submitted: true }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn add_file(&mut self, file: PathBuf) {
        self.files.push(file);
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }
}

/// The raw request payload as text. Never persists across requests.
#[derive(Debug, Clone, Default)]
pub struct Body {
    content: String,
}

impl Body {
    pub(crate) fn new(content: String) -> Self {
        Self { content }
    }

    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// The declared type of a handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamTag {
    Str,
    Int,
    Long,
    Float,
    Double,
    Form,
    Body,
    Json,
}

impl ParamTag {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ParamTag::Str => "str",
            ParamTag::Int => "int",
            ParamTag::Long => "long",
            ParamTag::Float => "float",
            ParamTag::Double => "double",
            ParamTag::Form => "form",
            ParamTag::Body => "body",
            ParamTag::Json => "json",
        }
    }
}

/// One declared handler parameter: its name (matched against request data)
/// and its tag.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    tag: ParamTag,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, tag: ParamTag) -> Self {
        Self { name: name.into(), tag }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> ParamTag {
        self.tag
    }
}

/// A bound argument value.
#[derive(Debug, Clone)]
pub enum BoundValue {
    Str(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Form(Form),
    Body(Body),
    Json(Value),
}

/// The positional argument array handed to a handler; indexes follow the
/// route's declared parameter order.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<BoundValue>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BoundValue> {
        self.0.get(index)
    }

    /// # Panics
    /// Panics when the argument at `index` was not bound as a string; the
    /// route declaration and the handler body disagree in that case.
    pub fn str(&self, index: usize) -> &str {
        match &self.0[index] {
            BoundValue::Str(value) => value,
            other => panic!("argument {index} is {other:?}, expected Str"),
        }
    }

    pub fn int(&self, index: usize) -> i32 {
        match self.0[index] {
            BoundValue::Int(value) => value,
            ref other => panic!("argument {index} is {other:?}, expected Int"),
        }
    }

    pub fn long(&self, index: usize) -> i64 {
        match self.0[index] {
            BoundValue::Long(value) => value,
            ref other => panic!("argument {index} is {other:?}, expected Long"),
        }
    }

    pub fn float(&self, index: usize) -> f32 {
        match self.0[index] {
            BoundValue::Float(value) => value,
            ref other => panic!("argument {index} is {other:?}, expected Float"),
        }
    }

    pub fn double(&self, index: usize) -> f64 {
        match self.0[index] {
            BoundValue::Double(value) => value,
            ref other => panic!("argument {index} is {other:?}, expected Double"),
        }
    }

    pub fn form(&self, index: usize) -> &Form {
        match &self.0[index] {
            BoundValue::Form(form) => form,
            other => panic!("argument {index} is {other:?}, expected Form"),
        }
    }

    pub fn body(&self, index: usize) -> &Body {
        match &self.0[index] {
            BoundValue::Body(body) => body,
            other => panic!("argument {index} is {other:?}, expected Body"),
        }
    }

    /// Deserializes a JSON-bound argument into a concrete type.
    pub fn json<T: DeserializeOwned>(&self, index: usize) -> Result<T, serde_json::Error> {
        match &self.0[index] {
            BoundValue::Json(value) => serde_json::from_value(value.clone()),
            other => panic!("argument {index} is {other:?}, expected Json"),
        }
    }
}

/// A conversion rule: request data + parameter name in, bound value out.
pub type BinderFn = fn(&Context, &str) -> Result<BoundValue, BindError>;

/// The binder rule table, shared by every route.
pub struct BinderRegistry {
    binders: HashMap<ParamTag, BinderFn>,
}

impl std::fmt::Debug for BinderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinderRegistry").field("tags", &self.binders.len()).finish()
    }
}

impl Default for BinderRegistry {
    fn default() -> Self {
        let mut registry = Self { binders: HashMap::new() };
        registry.register(ParamTag::Str, bind_str);
        registry.register(ParamTag::Int, bind_int);
        registry.register(ParamTag::Long, bind_long);
        registry.register(ParamTag::Float, bind_float);
        registry.register(ParamTag::Double, bind_double);
        registry.register(ParamTag::Form, bind_form);
        registry.register(ParamTag::Body, bind_body);
        registry.register(ParamTag::Json, bind_json);
        registry
    }
}

impl BinderRegistry {
    /// Registers or replaces the conversion rule for a tag.
    pub fn register(&mut self, tag: ParamTag, binder: BinderFn) {
        self.binders.insert(tag, binder);
    }

    /// Produces the positional argument array for the declared parameters.
    pub fn bind(&self, specs: &[ParamSpec], ctx: &Context) -> Result<Args, BindError> {
        let mut values = Vec::with_capacity(specs.len());
        for spec in specs {
            let binder = self.binders.get(&spec.tag()).ok_or_else(|| BindError::UnknownTag {
                name: spec.name().to_string(),
                tag: spec.tag().name(),
            })?;
            values.push(binder(ctx, spec.name())?);
        }
        Ok(Args(values))
    }
}

fn param_or_empty<'c>(ctx: &'c Context, name: &str) -> &'c str {
    ctx.param(name).map(str::trim).filter(|value| !value.is_empty()).unwrap_or("")
}

fn bind_str(ctx: &Context, name: &str) -> Result<BoundValue, BindError> {
    Ok(BoundValue::Str(param_or_empty(ctx, name).to_string()))
}

macro_rules! numeric_binder {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        fn $fn_name(ctx: &Context, name: &str) -> Result<BoundValue, BindError> {
            let raw = param_or_empty(ctx, name);
            if raw.is_empty() {
                return Ok(BoundValue::$variant(<$ty>::default()));
            }
            raw.parse::<$ty>().map(BoundValue::$variant).map_err(|_| BindError::Parse {
                name: name.to_string(),
                value: raw.to_string(),
                target: stringify!($ty),
            })
        }
    };
}

numeric_binder!(bind_int, Int, i32);
numeric_binder!(bind_long, Long, i64);
numeric_binder!(bind_float, Float, f32);
numeric_binder!(bind_double, Double, f64);

fn bind_form(ctx: &Context, _name: &str) -> Result<BoundValue, BindError> {
    Ok(BoundValue::Form(ctx.form().clone()))
}

fn bind_body(ctx: &Context, _name: &str) -> Result<BoundValue, BindError> {
    Ok(BoundValue::Body(ctx.body().clone()))
}

fn bind_json(ctx: &Context, name: &str) -> Result<BoundValue, BindError> {
    let is_json = ctx
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with(mime::APPLICATION_JSON.as_ref()));
    if !is_json {
        return Err(BindError::NotJson { name: name.to_string() });
    }
    serde_json::from_str(ctx.body().content())
        .map(BoundValue::Json)
        .map_err(|e| BindError::Json { name: name.to_string(), reason: e.to_string() })
}

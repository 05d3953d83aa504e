use thiserror::Error;

/// Failure raised while converting request data into handler arguments.
///
/// Binding errors abort the request with a server error response; they are
/// never retried.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("parameter '{name}': cannot parse '{value}' as {target}")]
    Parse { name: String, value: String, target: &'static str },

    #[error("parameter '{name}': request content-type is not application/json")]
    NotJson { name: String },

    #[error("parameter '{name}': json deserialization failed: {reason}")]
    Json { name: String, reason: String },

    #[error("parameter '{name}': no binder registered for {tag}")]
    UnknownTag { name: String, tag: &'static str },
}

/// Failure raised by a handler body.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct HandlerError {
    reason: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    pub fn msg(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), source: None }
    }

    pub fn caused_by(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self { reason: source.to_string(), source: Some(Box::new(source)) }
    }
}

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self::msg(reason)
    }
}

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self::msg(reason)
    }
}

/// Failure raised by the renderer seam.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("render failed: {reason}")]
    Failed { reason: String },
}

/// Top-level dispatch failure. Anything not deliberately absorbed by the
/// pipeline ends up here and becomes a 5xx response.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("parameter binding failed: {0}")]
    Bind(#[from] BindError),

    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),
}

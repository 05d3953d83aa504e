//! Renderer seam.
//!
//! Template semantics are out of scope; the dispatcher only needs
//! `render(context) -> body`. The [`JsonRenderer`] default serializes the
//! render context, which is enough for apis and for exercising the pipeline
//! in tests.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::bind::Form;
use crate::error::RenderError;
use crate::state::{Flash, Session};

/// Everything a template engine gets to see for one response.
#[derive(Debug)]
pub struct RenderContext<'r> {
    pub flash: &'r Flash,
    pub session: &'r Session,
    pub form: &'r Form,
    pub messages: &'r HashMap<String, String>,
    pub controller: &'r str,
    pub template: &'r str,
    pub content: &'r HashMap<String, Value>,
}

pub trait Renderer: Send + Sync {
    fn render(&self, ctx: RenderContext<'_>) -> Result<String, RenderError>;
}

/// Serializes the content map, flash and messages as a JSON document.
#[derive(Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, ctx: RenderContext<'_>) -> Result<String, RenderError> {
        let document = json!({
            "controller": ctx.controller,
            "template": ctx.template,
            "flash": ctx.flash.values(),
            "session": ctx.session.values(),
            "form": ctx.form.values(),
            "messages": ctx.messages,
            "content": ctx.content,
        });
        serde_json::to_string(&document)
            .map_err(|e| RenderError::Failed { reason: e.to_string() })
    }
}

/// Fixed markup for failure responses. Deliberately renderer-free so a
/// broken template engine cannot make error reporting recurse.
pub(crate) fn error_page(status: http::StatusCode, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {reason}</title></head>\
         <body><h1>{code} {reason}</h1><p>{message}</p></body></html>",
        code = status.as_u16(),
        reason = status.canonical_reason().unwrap_or("error"),
    )
}

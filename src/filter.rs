//! Filters veto request processing before the handler runs.
//!
//! A route's chain is resolved once at registration time: the process-wide
//! global filter (if any), then controller-level filters, then
//! handler-level filters, each level in declaration order. The first filter
//! returning `false` short-circuits the chain; a rejecting filter may write
//! the response itself through [`Exchange::respond`].

use std::sync::Arc;

use http::StatusCode;

use crate::context::{Context, Exchange};
use crate::response::Response;

pub trait Filter: Send + Sync {
    fn filter(&self, exchange: &mut Exchange<'_>) -> bool;
}

struct FnFilter<F: Fn(&mut Exchange<'_>) -> bool>(F);

impl<F: Fn(&mut Exchange<'_>) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn filter(&self, exchange: &mut Exchange<'_>) -> bool {
        (self.0)(exchange)
    }
}

/// Wraps a plain function as a [`Filter`].
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&mut Exchange<'_>) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Rejects with a 401 when the request carries no authenticated user.
pub fn authenticated() -> impl Filter {
    fn_filter(|exchange| {
        if exchange.authentication().has_authenticated_user() {
            true
        } else {
            exchange.respond(Response::status(StatusCode::UNAUTHORIZED));
            false
        }
    })
}

/// Rejects with a 403 when the request token does not match the session's
/// authenticity token. Guards state-changing form submissions.
pub fn authenticity() -> impl Filter {
    fn_filter(|exchange| {
        if exchange.valid_authenticity_token() {
            true
        } else {
            exchange.respond(Response::status(StatusCode::FORBIDDEN));
            false
        }
    })
}

/// The resolved, immutable filter chain of one route.
#[derive(Default)]
pub struct FilterChain {
    global: Option<Arc<dyn Filter>>,
    controller: Vec<Arc<dyn Filter>>,
    handler: Vec<Arc<dyn Filter>>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("global", &self.global.is_some())
            .field("controller", &self.controller.len())
            .field("handler", &self.handler.len())
            .finish()
    }
}

impl FilterChain {
    pub fn new(
        global: Option<Arc<dyn Filter>>,
        controller: Vec<Arc<dyn Filter>>,
        handler: Vec<Arc<dyn Filter>>,
    ) -> Self {
        Self { global, controller, handler }
    }

    /// Evaluates the chain against a single exchange built from the context.
    /// Returns `false` as soon as one filter rejects.
    pub fn run(&self, ctx: &mut Context) -> bool {
        let mut exchange = ctx.exchange();
        if let Some(global) = &self.global {
            if !global.filter(&mut exchange) {
                return false;
            }
        }
        for filter in self.controller.iter().chain(self.handler.iter()) {
            if !filter.filter(&mut exchange) {
                return false;
            }
        }
        true
    }
}

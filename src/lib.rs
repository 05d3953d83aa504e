//! satchel is a per-route HTTP request dispatcher with signed-cookie state.
//!
//! All application state travels in three client-side cookies: a signed
//! session map, a signed authentication marker and an unsigned one-shot
//! flash scope. The server keeps nothing between requests, so instances
//! scale horizontally without session affinity.
//!
//! Routes are declared up front and frozen into an immutable [`Router`];
//! each route resolves its filter chain and parameter metadata exactly once
//! at registration time. A request then flows through one
//! [`RequestDispatcher`]: cookie state is restored, filters run, declared
//! parameters are bound positionally, the handler produces a [`Response`]
//! model, templates render, and mutated state is re-signed into cookies.
//!
//! ```no_run
//! use bytes::Bytes;
//! use satchel::{get, handler_fn, Args, Config, Context, HandlerFuture, Response, RouterBuilder};
//!
//! fn index(_ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
//!     Box::pin(async move { Ok(Response::ok().and_body("hello")) })
//! }
//!
//! # async fn run() {
//! let router = RouterBuilder::new(Config::new("change-this-32-byte-app-secret!!"))
//!     .route(get("/", handler_fn(index)).named("Application", "index"))
//!     .build()
//!     .unwrap();
//!
//! let response = router
//!     .dispatch(http::Request::get("/").body(Bytes::new()).unwrap())
//!     .await;
//! # let _ = response;
//! # }
//! ```

pub mod bind;
pub mod config;
pub mod error;
pub mod filter;
pub mod i18n;
pub mod render;
pub mod state;

mod body;
mod context;
mod dispatcher;
mod response;
mod router;

pub use bind::{Args, BinderRegistry, Body, Form, ParamTag};
pub use body::ResponseBody;
pub use config::Config;
pub use context::{Context, Exchange, AUTHENTICITY_TOKEN};
pub use dispatcher::{handler_fn, FnHandler, Handler, HandlerFuture, RequestDispatcher, RouteMetadata};
pub use error::{BindError, DispatchError, HandlerError, RenderError};
pub use filter::{authenticated, authenticity, fn_filter, Filter, FilterChain};
pub use i18n::Messages;
pub use render::{JsonRenderer, RenderContext, Renderer};
pub use response::Response;
pub use router::{delete, get, head, options, patch, post, put, Route, Router, RouterBuilder, RouterError};
pub use state::{hash_password, verify_password, Authentication, Flash, Session};

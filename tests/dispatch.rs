//! End-to-end dispatch scenarios driven through the public router API:
//! cookie state round trips, filter rejections, parameter binding and the
//! response shapes a client actually observes.

use bytes::Bytes;
use cookie::Cookie;
use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;

use satchel::{
    authenticated, authenticity, get, handler_fn, post, Args, Config, Context, HandlerError,
    HandlerFuture, ParamTag, Response, ResponseBody, Router, RouterBuilder,
};

const SECRET: &str = "an-integration-test-secret-of-32b";

fn visit(ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.session_mut().put("seen", "yes");
        Ok(Response::ok().and_body("welcome"))
    })
}

fn login(ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        let user = ctx.form().get("user").unwrap_or_default().to_owned();
        ctx.authentication_mut().login(&user, false);
        Ok(Response::redirect("/secret"))
    })
}

fn logout(ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.authentication_mut().logout();
        Ok(Response::redirect("/"))
    })
}

fn secret(_ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Response::ok().and_body("classified")) })
}

fn flash_set(ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.flash_mut().success("stored");
        Ok(Response::ok().and_body("set"))
    })
}

fn flash_read(ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        let message = ctx.flash().get("success").unwrap_or("none").to_owned();
        Ok(Response::ok().and_body(message))
    })
}

fn show_user(_ctx: &mut Context, args: Args) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Response::ok().and_body(args.str(0).to_owned())) })
}

fn echo_json(_ctx: &mut Context, args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        let payload: serde_json::Value =
            args.json(0).map_err(|e| HandlerError::msg(e.to_string()))?;
        Ok(Response::ok().and_json(&json!({ "received": payload })))
    })
}

fn submit(_ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Response::ok().and_body("submitted")) })
}

fn boom(_ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move { Err(HandlerError::msg("kaput")) })
}

fn mutate_then_fail(ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.session_mut().put("draft", "half-written");
        ctx.flash_mut().error("oops");
        ctx.authentication_mut().login("alex", false);
        Err(HandlerError::msg("gave up halfway"))
    })
}

fn download(_ctx: &mut Context, _args: Args) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Response::binary(Bytes::from_static(b"\x89raw-bytes"))) })
}

fn router() -> Router {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RouterBuilder::new(Config::new(SECRET))
        .route(get("/visit", handler_fn(visit)).named("Application", "visit"))
        .route(post("/login", handler_fn(login)).named("Auth", "login"))
        .route(get("/logout", handler_fn(logout)).named("Auth", "logout"))
        .route(get("/secret", handler_fn(secret)).named("Auth", "secret").filter(authenticated()))
        .route(get("/flash/set", handler_fn(flash_set)).named("Flash", "set"))
        .route(get("/flash/read", handler_fn(flash_read)).named("Flash", "read"))
        .route(
            get("/users/{id}", handler_fn(show_user))
                .named("Users", "show")
                .param("id", ParamTag::Str),
        )
        .route(
            post("/api/echo", handler_fn(echo_json))
                .named("Api", "echo")
                .param("payload", ParamTag::Json),
        )
        .route(post("/submit", handler_fn(submit)).named("Forms", "submit").filter(authenticity()))
        .route(get("/boom", handler_fn(boom)).named("Application", "boom"))
        .route(get("/download", handler_fn(download)).named("Files", "download"))
        .route(get("/abort", handler_fn(mutate_then_fail)).named("Application", "abort"))
        .build()
        .expect("route table builds")
}

fn set_cookies(response: &http::Response<ResponseBody>) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw.to_owned()).ok())
        .collect()
}

fn find_cookie<'c>(cookies: &'c [Cookie<'static>], name: &str) -> Option<&'c Cookie<'static>> {
    cookies.iter().find(|cookie| cookie.name() == name)
}

fn cookie_header(cookies: &[Cookie<'static>]) -> String {
    cookies
        .iter()
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn body_text(response: http::Response<ResponseBody>) -> String {
    let collected = response.into_body().collect().await.expect("body collects");
    String::from_utf8(collected.to_bytes().to_vec()).expect("body is utf-8")
}

#[tokio::test]
async fn first_visit_issues_a_signed_session_cookie() {
    let response = router()
        .dispatch(Request::get("/visit").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(response.headers().get("x-xss-protection").unwrap(), "1");
    assert_eq!(response.headers().get("server").unwrap(), "satchel");

    let cookies = set_cookies(&response);
    let session = find_cookie(&cookies, "SATCHEL-SESSION").expect("session cookie is set");
    // sign|token|expires#data with a 16 character token
    let token = session.value().split('|').nth(1).expect("token segment");
    assert_eq!(token.len(), 16);
    assert!(session.http_only().unwrap_or(false));
    assert!(find_cookie(&cookies, "SATCHEL-FLASH").is_none());
    assert!(find_cookie(&cookies, "SATCHEL-AUTH").is_none());
}

#[tokio::test]
async fn session_values_survive_a_round_trip() {
    let router = router();
    let first = router
        .dispatch(Request::get("/visit").body(Bytes::new()).unwrap())
        .await;
    let cookies = set_cookies(&first);

    let second = router
        .dispatch(
            Request::get("/visit")
                .header(COOKIE, cookie_header(&cookies))
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    // same value written again still counts as a change
    let cookies = set_cookies(&second);
    let session = find_cookie(&cookies, "SATCHEL-SESSION").expect("session cookie re-issued");
    assert!(session.value().ends_with("seen:yes"));
}

#[tokio::test]
async fn login_then_logout_controls_access_to_protected_routes() {
    let router = router();

    let anonymous = router
        .dispatch(Request::get("/secret").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let login = router
        .dispatch(
            Request::post("/login")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Bytes::from_static(b"user=alex"))
                .unwrap(),
        )
        .await;
    assert_eq!(login.status(), StatusCode::FOUND);
    assert_eq!(login.headers().get("location").unwrap(), "/secret");
    let cookies = set_cookies(&login);
    let auth = find_cookie(&cookies, "SATCHEL-AUTH").expect("auth cookie is set").clone();

    let allowed = router
        .dispatch(
            Request::get("/secret")
                .header(COOKIE, format!("{}={}", auth.name(), auth.value()))
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(body_text(allowed).await, "classified");

    let logout = router
        .dispatch(
            Request::get("/logout")
                .header(COOKIE, format!("{}={}", auth.name(), auth.value()))
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    let cookies = set_cookies(&logout);
    let removal = find_cookie(&cookies, "SATCHEL-AUTH").expect("removal cookie is set");
    assert!(removal.value().is_empty());
    assert_eq!(removal.max_age(), Some(cookie::time::Duration::ZERO));

    let denied = router
        .dispatch(Request::get("/secret").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_auth_cookie_is_treated_as_anonymous() {
    let router = router();
    let login = router
        .dispatch(
            Request::post("/login")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Bytes::from_static(b"user=alex"))
                .unwrap(),
        )
        .await;
    let cookies = set_cookies(&login);
    let auth = find_cookie(&cookies, "SATCHEL-AUTH").expect("auth cookie is set");

    let mut tampered = auth.value().to_owned();
    let last = tampered.pop().expect("non-empty value");
    tampered.push(if last == 'a' { 'b' } else { 'a' });

    let denied = router
        .dispatch(
            Request::get("/secret")
                .header(COOKIE, format!("SATCHEL-AUTH={tampered}"))
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn flash_messages_live_for_exactly_one_following_request() {
    let router = router();

    let set = router
        .dispatch(Request::get("/flash/set").body(Bytes::new()).unwrap())
        .await;
    let cookies = set_cookies(&set);
    let flash = find_cookie(&cookies, "SATCHEL-FLASH").expect("flash cookie is set").clone();
    assert_eq!(flash.value(), "success:stored");

    let read = router
        .dispatch(
            Request::get("/flash/read")
                .header(COOKIE, format!("{}={}", flash.name(), flash.value()))
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    let cookies = set_cookies(&read);
    let removal = find_cookie(&cookies, "SATCHEL-FLASH").expect("flash removal cookie");
    assert!(removal.value().is_empty());
    assert_eq!(removal.max_age(), Some(cookie::time::Duration::ZERO));
    assert_eq!(body_text(read).await, "stored");

    let again = router
        .dispatch(Request::get("/flash/read").body(Bytes::new()).unwrap())
        .await;
    let cookies = set_cookies(&again);
    assert!(find_cookie(&cookies, "SATCHEL-FLASH").is_none());
    assert_eq!(body_text(again).await, "none");
}

#[tokio::test]
async fn path_parameters_shadow_query_parameters() {
    let response = router()
        .dispatch(Request::get("/users/7?id=99").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(body_text(response).await, "7");
}

#[tokio::test]
async fn json_payloads_bind_into_handler_arguments() {
    let response = router()
        .dispatch(
            Request::post("/api/echo")
                .header(CONTENT_TYPE, "application/json")
                .body(Bytes::from_static(br#"{"name":"alex"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, json!({ "received": { "name": "alex" } }));
}

#[tokio::test]
async fn form_posts_without_a_valid_token_are_rejected() {
    let router = router();

    let bare = router
        .dispatch(
            Request::post("/submit")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Bytes::from_static(b"comment=hi"))
                .unwrap(),
        )
        .await;
    assert_eq!(bare.status(), StatusCode::FORBIDDEN);
    // the rejection still carries the hardened headers but no state cookies
    assert_eq!(bare.headers().get("x-frame-options").unwrap(), "SAMEORIGIN");
    assert!(set_cookies(&bare).is_empty());

    // establish a session and lift its token out of the signed cookie value
    let visit = router
        .dispatch(Request::get("/visit").body(Bytes::new()).unwrap())
        .await;
    let cookies = set_cookies(&visit);
    let session = find_cookie(&cookies, "SATCHEL-SESSION").expect("session cookie").clone();
    let token = session.value().split('|').nth(1).expect("token segment").to_owned();

    let accepted = router
        .dispatch(
            Request::post("/submit")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(COOKIE, format!("{}={}", session.name(), session.value()))
                .body(Bytes::from(format!("comment=hi&authenticityToken={token}")))
                .unwrap(),
        )
        .await;
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(body_text(accepted).await, "submitted");
}

#[tokio::test]
async fn handler_errors_become_a_server_error_page() {
    let response = router()
        .dispatch(Request::get("/boom").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "text/html; charset=UTF-8"
    );
    assert!(body_text(response).await.contains("kaput"));
}

#[tokio::test]
async fn failed_handlers_persist_no_state_cookies() {
    let response = router()
        .dispatch(Request::get("/abort").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // mutations made before the failure must not reach the client
    assert!(set_cookies(&response).is_empty());
    assert!(body_text(response).await.contains("gave up halfway"));
}

#[tokio::test]
async fn binary_responses_stream_raw_bytes() {
    let response = router()
        .dispatch(Request::get("/download").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    let collected = response.into_body().collect().await.unwrap();
    assert_eq!(collected.to_bytes().as_ref(), b"\x89raw-bytes");
}

#[tokio::test]
async fn unmatched_requests_get_the_hardened_not_found_page() {
    let response = router()
        .dispatch(Request::get("/nowhere").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers().get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(response.headers().get("server").unwrap(), "satchel");
}

//! HTTP surface: router, session middleware, and the login endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Form, Router};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::client::{discovery, HostClient};
use crate::config::SiteConfig;
use crate::dialback::{Dialback, DialbackQuery};
use crate::error::{FedError, Result};
use crate::login::LoginService;
use crate::middleware::{self, Authenticator};
use crate::session::{SessionManager, SESSION_COOKIE};
use crate::store::{DialbackStore, TokenStore, UserStore};
use crate::user::LocalUser;

pub const REMEMBERME_COOKIE: &str = "rememberme";

/// Identity resolved for the current request, stashed as a request extension
/// by the session middleware.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<LocalUser>);

#[derive(Debug, Clone)]
pub struct SessionId(pub String);

pub struct AppState {
    pub config: SiteConfig,
    pub sessions: SessionManager,
    pub auth: Authenticator,
    pub login: LoginService,
    pub dialback: Dialback,
}

impl AppState {
    pub fn new(
        config: SiteConfig,
        client: Arc<HostClient>,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        dialbacks: Arc<dyn DialbackStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: SessionManager::new(config.session_secret.clone()),
            auth: Authenticator::new(users.clone(), tokens.clone()),
            login: LoginService::new(client, tokens, users),
            dialback: Dialback::new(config.hostname.clone(), dialbacks),
            config,
        })
    }
}

/// Build the site router with the session middleware applied.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_form).post(login_submit))
        .route("/authorized/{hostname}", get(authorized))
        .route("/logout", post(logout))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            user_auth,
        ))
        // No session handling for the machine-facing endpoints.
        .route("/dialback", post(dialback))
        .route("/.well-known/host-meta.json", get(hostmeta))
        .with_state(state)
}

/// Bind and serve the router until the task is cancelled.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, site = %state.config.name, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Session middleware: opens the signed session, resolves the current user
/// (redeeming the remember-me cookie when needed), and writes back the
/// session and any cookie changes after the handler runs.
async fn user_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, FedError> {
    let presented = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (session_id, mut data, is_new_session) = state.sessions.open(presented.as_deref());
    let rememberme = jar.get(REMEMBERME_COOKIE).map(|c| c.value().to_string());

    let resolution = state
        .auth
        .resolve(data.user_id.as_deref(), rememberme.as_deref())
        .await?;

    if let Some(id) = &resolution.established_user_id {
        data.user_id = Some(id.clone());
    }
    state.sessions.save(&session_id, data);

    request
        .extensions_mut()
        .insert(CurrentUser(resolution.user));
    request.extensions_mut().insert(SessionId(session_id.clone()));

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    if is_new_session {
        append_cookie(headers, &session_cookie(&state.sessions.cookie_value(&session_id)))?;
    }
    if let Some(fresh) = &resolution.rotated {
        append_cookie(headers, &rememberme_cookie(&fresh.uuid))?;
    } else if resolution.clear_cookie {
        append_cookie(headers, &clear_rememberme_cookie())?;
    }
    Ok(response)
}

async fn home(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Html<String> {
    let body = match middleware::optional(user.as_ref()) {
        Some(user) => format!(
            "<p>Logged in as {}.</p><form method=\"post\" action=\"/logout\">\
             <button type=\"submit\">Logout</button></form>",
            user.name.as_deref().unwrap_or(&user.id)
        ),
        None => "<p><a href=\"/login\">Login</a></p>".to_string(),
    };
    Html(format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{body}</body></html>",
        state.config.name, state.config.name
    ))
}

async fn login_form(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Html<&'static str>> {
    middleware::require_anonymous(user.as_ref())?;
    Ok(Html(
        "<html><body><form method=\"post\" action=\"/login\">\
         <input name=\"webfinger\" placeholder=\"you@your.server\" autofocus>\
         <label><input type=\"checkbox\" name=\"rememberme\" value=\"on\"> Remember me</label>\
         <button type=\"submit\">Login</button>\
         </form></body></html>",
    ))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    webfinger: String,
    #[serde(default)]
    rememberme: Option<String>,
}

async fn login_submit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    middleware::require_anonymous(user.as_ref())?;
    let remember = form.rememberme.as_deref() == Some("on");
    state
        .sessions
        .update(&session_id, |data| data.rememberme_checked = remember);
    let authorize_url = state.login.begin(&form.webfinger).await?;
    found(&authorize_url)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    oauth_token: String,
    oauth_verifier: String,
}

// Deliberately unguarded: a callback that races an established session
// still completes and the new login wins.
async fn authorized(
    State(state): State<Arc<AppState>>,
    Path(hostname): Path<String>,
    Query(query): Query<CallbackQuery>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Response> {
    let remember = state.sessions.get(&session_id).rememberme_checked;
    let outcome = state
        .login
        .complete(&hostname, &query.oauth_token, &query.oauth_verifier, remember)
        .await?;
    state.sessions.update(&session_id, |data| {
        data.user_id = Some(outcome.user.id.clone());
        data.rememberme_checked = false;
    });

    let mut response = found("/")?;
    if let Some(token) = &outcome.rememberme {
        append_cookie(response.headers_mut(), &rememberme_cookie(&token.uuid))?;
    }
    Ok(response)
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Response> {
    let user = middleware::require_user(user.as_ref())?;
    tracing::info!(user_id = %user.id, "logout");
    state.sessions.update(&session_id, |data| {
        data.user_id = None;
        data.rememberme_checked = false;
    });
    let mut response = found("/")?;
    append_cookie(response.headers_mut(), &clear_rememberme_cookie())?;
    Ok(response)
}

async fn dialback(
    State(state): State<Arc<AppState>>,
    Form(query): Form<DialbackQuery>,
) -> Result<StatusCode> {
    state.dialback.verify(&query).await?;
    Ok(StatusCode::OK)
}

async fn hostmeta(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "links": [
            {
                "rel": discovery::REL_DIALBACK,
                "href": state.config.url("/dialback"),
            }
        ]
    }))
}

/// A `302 Found` redirect. The stock axum redirect helpers answer `303`,
/// which interoperates badly with clients that replay the original method.
fn found(location: &str) -> Result<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|_| FedError::Validation(format!("invalid redirect target: {location}")))?;
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

fn append_cookie(headers: &mut axum::http::HeaderMap, cookie: &str) -> Result<()> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| FedError::Validation(format!("invalid cookie: {cookie}")))?;
    headers.append(header::SET_COOKIE, value);
    Ok(())
}

fn session_cookie(value: &str) -> String {
    format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly")
}

fn http_date(when: chrono::DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn rememberme_cookie(value: &str) -> String {
    let expires = http_date(Utc::now() + Duration::days(180));
    format!("{REMEMBERME_COOKIE}={value}; Path=/; Expires={expires}; HttpOnly")
}

fn clear_rememberme_cookie() -> String {
    let expires = http_date(chrono::DateTime::<Utc>::UNIX_EPOCH);
    format!("{REMEMBERME_COOKIE}=; Path=/; Expires={expires}; HttpOnly")
}

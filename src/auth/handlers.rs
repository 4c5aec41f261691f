use hyper::{Body, StatusCode};
use serde::Deserialize;

use crate::{db, http::{self, Context, Request, Response}, prelude::*};
use super::{SessionId, User};


/// Maximum size of the login request body. Login data is tiny; this is just to
/// avoid reading arbitrarily large bodies.
const MAX_LOGIN_BODY_SIZE: u64 = 16 * 1024;

#[derive(Deserialize)]
struct LoginData {
    /// Username or email address.
    login: String,
    password: String,
}

/// Handles POST requests to `/~login`.
///
/// Expects a JSON body with `login` (username or email) and `password`. On
/// success, a new session is persisted in the DB and its ID is sent back as
/// session cookie. Replies 403 to bad credentials; deliberately the same
/// response for "no such user" and "wrong password".
pub(crate) async fn handle_login(req: Request<Body>, ctx: &Context) -> Result<Response, Response> {
    if hyper::body::HttpBody::size_hint(req.body()).lower() > MAX_LOGIN_BODY_SIZE {
        return Err(http::response::bad_request(Some("login request body too large")));
    }

    let body = hyper::body::to_bytes(req.into_body()).await.map_err(|e| {
        error!("Failed to read login request body: {e}");
        http::response::bad_request(None)
    })?;
    let data: LoginData = serde_json::from_slice(&body)
        .map_err(|_| http::response::bad_request(Some("invalid login request body")))?;

    debug!("Login attempt for '{}'", data.login);

    let db = db::get_conn_or_service_unavailable(&ctx.db_pool).await?;
    let user = User::load_by_login(&data.login, &**db).await.map_err(|e| {
        error!("DB query failed when loading user for login: {e}");
        http::response::internal_server_error()
    })?;

    let (user, password_hash) = match user {
        Some(found) => found,
        None => {
            debug!("Login failed: unknown user '{}'", data.login);
            return Err(forbidden());
        }
    };

    // Verifying bcrypt hashes is intentionally slow, so move it to a blocking
    // thread.
    let password_matches = tokio::task::spawn_blocking(move || {
        bcrypt::verify(&data.password, &password_hash)
    })
        .await
        .map_err(|e| {
            error!("Panic while verifying password: {e}");
            http::response::internal_server_error()
        })?
        .map_err(|e| {
            error!("Failed to verify password hash: {e}");
            http::response::internal_server_error()
        })?;

    if !password_matches {
        debug!("Login failed: wrong password for '{}'", user.username);
        return Err(forbidden());
    }

    let session_id = user.persist_new_session(&**db).await.map_err(|e| {
        error!("DB query failed when adding new user session: {e}");
        http::response::internal_server_error()
    })?;
    debug!("Persisted new session for '{}'", user.username);

    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(
            "set-cookie",
            session_id.set_cookie(ctx.config.auth.session_duration).to_string(),
        )
        .body(Body::empty())
        .unwrap()
        .pipe(Ok)
}

/// Handles POST requests to `/~logout`.
///
/// This checks for the session cookie. If it exists, tries to remove that
/// session from the DB. If it does not exist in the DB, this is ignored. DB
/// errors are also ignored. So in any case, the session cookie is then removed
/// by responding with a fitting `set-cookie` header.
///
/// Consider someone on a public computer: they want to delete the local
/// session cookie when they leave. That's the important thing, not whether the
/// session is still in the DB. Also, if someone already has your session ID,
/// you have bigger problems.
pub(crate) async fn handle_logout(req: Request<Body>, ctx: &Context) -> Response {
    let response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("set-cookie", SessionId::unset_cookie().to_string())
        .body(Body::empty())
        .unwrap();

    let session_id = match SessionId::from_headers(req.headers()) {
        None => {
            warn!("POST request to /~logout without session cookie");
            return response;
        }
        Some(id) => id,
    };

    let db = match db::get_conn_or_service_unavailable(&ctx.db_pool).await {
        Err(_) => return response,
        Ok(db) => db,
    };

    match session_id.remove_from_db(&**db).await {
        Ok(Some(username)) => debug!("Removed session for '{}' from DB", username),
        Ok(None) => warn!("Session not found in DB during logout"),
        Err(e) => error!("DB error when removing session from DB: {}", e),
    }

    response
}

fn forbidden() -> Response {
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .body("Invalid login credentials".into())
        .unwrap()
}

use std::time::Duration;

use deadpool_postgres::Pool;
use hyper::HeaderMap;
use tokio_postgres::{Error as PgError, GenericClient, Row};

use crate::{model::Key, prelude::*};


mod handlers;
mod session_id;

pub(crate) use self::{
    session_id::SessionId,
    handlers::{handle_login, handle_logout},
};


const SESSION_COOKIE: &str = "agora-session";


/// Authentication and authorization.
#[derive(Debug, Clone, confique::Config)]
pub(crate) struct AuthConfig {
    /// Duration of a login session. Sessions are not automatically renewed:
    /// after this duration, users have to log in again.
    #[config(default = "30d", deserialize_with = crate::config::deserialize_duration)]
    pub(crate) session_duration: Duration,
}

/// Information about whether or not, and if so as whom, someone talking to
/// Agora is authenticated.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AuthContext {
    Anonymous,
    User(User),
}

/// Data about a logged-in user. This is deliberately minimal: everything else
/// (display name, email, ...) lives in the API's `User` model and is loaded on
/// demand.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct User {
    pub(crate) key: Key,
    pub(crate) username: String,
    pub(crate) superadmin: bool,
}

impl AuthContext {
    /// Obtains the current auth context from the given request headers, by
    /// validating the session cookie against the DB (if any).
    pub(crate) async fn new(
        headers: &HeaderMap,
        auth_config: &AuthConfig,
        db: &impl GenericClient,
    ) -> Result<Self, PgError> {
        User::from_session(headers, db, auth_config.session_duration)
            .await?
            .map_or(Self::Anonymous, Self::User)
            .pipe(Ok)
    }

    /// Returns a representation of the optional username useful for logging.
    pub(crate) fn debug_log_username(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".into(),
            Self::User(user) => format!("'{}'", user.username),
        }
    }

    pub(crate) fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }
}

impl User {
    const SQL_COLS: &'static str = "users.id, users.username, users.superadmin";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            username: row.get(1),
            superadmin: row.get(2),
        }
    }

    /// Tries to load user data from the DB session referred to in the session
    /// cookie. Returns `None` if there is no such cookie, or no such session,
    /// or if the session is expired.
    async fn from_session(
        headers: &HeaderMap,
        db: &impl GenericClient,
        session_duration: Duration,
    ) -> Result<Option<Self>, PgError> {
        let session_id = match SessionId::from_headers(headers) {
            None => return Ok(None),
            Some(id) => id,
        };

        let query = format!(
            "select {} from user_sessions \
                inner join users on users.id = user_sessions.user_id \
                where user_sessions.id = $1 \
                and extract(epoch from now() - user_sessions.created) < $2::double precision",
            Self::SQL_COLS,
        );
        db.query_opt(&query, &[&session_id, &session_duration.as_secs_f64()])
            .await?
            .map(|row| Self::from_row(&row))
            .pipe(Ok)
    }

    /// Loads the user with the given login name (username or email address).
    pub(crate) async fn load_by_login(
        login: &str,
        db: &impl GenericClient,
    ) -> Result<Option<(Self, String)>, PgError> {
        let query = format!(
            "select {}, users.password_hash from users \
                where users.username = $1 or users.email = $1",
            Self::SQL_COLS,
        );
        db.query_opt(&query, &[&login])
            .await?
            .map(|row| (Self::from_row(&row), row.get(3)))
            .pipe(Ok)
    }

    /// Creates a new session for this user and persists it in the database.
    pub(crate) async fn persist_new_session(
        &self,
        db: &impl GenericClient,
    ) -> Result<SessionId, PgError> {
        let session_id = SessionId::new();

        // A collision is so unfathomably unlikely that we don't check for it
        // here. We just pass the error up and respond with 500. Note that
        // Postgres will always error in case of collision, so security is
        // never compromised.
        db.execute(
            "insert into user_sessions (id, user_id) values ($1, $2)",
            &[&session_id, &self.key],
        ).await?;

        Ok(session_id)
    }
}


/// A marker type that serves to prove *some* user authorization has been done.
///
/// The goal of this is to prevent devs from forgetting to do authorization at
/// all. Since the token does not contain any information about what was
/// authorized, it cannot protect against anything else.
///
/// Has a private field so the only way to obtain one is [`Self::some_if`],
/// which makes the authorization condition explicit at the call site.
pub(crate) struct AuthToken(());

impl AuthToken {
    pub(crate) fn some_if(v: bool) -> Option<Self> {
        if v { Some(Self(())) } else { None }
    }
}

// Our base64 de/encoding with the URL safe character set.
fn base64decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine as _;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input)
}

fn base64encode(input: impl AsRef<[u8]>) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

/// Long running task to perform various DB maintenance.
pub(crate) async fn db_maintenance(pool: Pool, config: AuthConfig) {
    /// Delete outdated user sessions every hour. Note that the session
    /// expiration time is still checked whenever the session is validated. So
    /// this duration is not about correctness, just about how often to clean
    /// up.
    const RUN_PERIOD: Duration = Duration::from_secs(60 * 60);

    loop {
        match pool.get().await {
            Err(e) => error!("Could not obtain DB connection for session cleanup: {e}"),
            Ok(db) => {
                let sql = "delete from user_sessions \
                    where extract(epoch from now() - created) > $1::double precision";
                match db.execute(sql, &[&config.session_duration.as_secs_f64()]).await {
                    Err(e) => error!("Error deleting outdated user sessions: {}", e),
                    Ok(0) => debug!("No outdated user sessions found in DB"),
                    Ok(num) => info!("Deleted {num} outdated user sessions from DB"),
                }
            }
        }

        tokio::time::sleep(RUN_PERIOD).await;
    }
}

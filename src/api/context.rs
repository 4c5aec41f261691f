use std::sync::Arc;

use crate::{
    api::err::{ApiError, ApiErrorKind, ApiResult},
    auth::{AuthContext, AuthToken, User},
    config::Config,
    db::Transaction,
};


/// The context that is accessible to every resolver in our API.
pub(crate) struct Context {
    pub(crate) db: Transaction,
    pub(crate) auth: AuthContext,
    pub(crate) config: Arc<Config>,
}

impl juniper::Context for Context {}

impl Context {
    /// Returns a connection to the DB. Requires an auth token to prove the
    /// endpoint somehow handled authorization.
    pub(crate) fn db(&self, _: AuthToken) -> &Transaction {
        &self.db
    }

    /// Returns the current user, or a "not logged in" error for anonymous
    /// requests. Almost all mutations start with this.
    pub(crate) fn require_user(&self) -> ApiResult<&User> {
        self.auth.user().ok_or_else(|| ApiError {
            msg: "user is not logged in".into(),
            kind: ApiErrorKind::NotAuthorized,
            key: Some("mutation.not-logged-in"),
        })
    }
}

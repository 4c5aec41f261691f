use chrono::{DateTime, Utc};
use juniper::graphql_object;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_postgres::Row;

use crate::{
    api::{
        Context, Id, Node, NodeValue,
        err::{ApiResult, internal_server_error, invalid_input, map_db_err, not_authorized},
    },
    db::util::dbargs,
    model::Key,
    prelude::*,
};
use super::organization::Organization;


/// A platform user account.
pub(crate) struct User {
    pub(crate) key: Key,
    pub(crate) username: String,
    pub(crate) display_name: String,
    email: String,
    created: DateTime<Utc>,
}

impl Node for User {
    fn id(&self) -> Id {
        Id::user(self.key)
    }
}

#[graphql_object(Context = Context, impl = NodeValue)]
impl User {
    fn id(&self) -> Id {
        Node::id(self)
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The email address. Only visible to the user themselves and to
    /// superadmins; `null` for everyone else.
    fn email(&self, context: &Context) -> Option<&str> {
        let viewer = context.auth.user()?;
        if viewer.key == self.key || viewer.superadmin {
            Some(&self.email)
        } else {
            None
        }
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// All organizations this user is a member of. Only the user themselves
    /// and superadmins can see this list.
    async fn organizations(&self, context: &Context) -> ApiResult<Vec<Organization>> {
        let viewer = context.require_user()?;
        if viewer.key != self.key && !viewer.superadmin {
            return Err(not_authorized!(
                key = "user.organizations-hidden",
                "only the user themselves can list their organizations",
            ));
        }

        let query = format!(
            "select {} from organizations \
                inner join memberships on memberships.organization = organizations.id \
                where memberships.member = $1 \
                order by organizations.name",
            Organization::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&self.key], |row| Organization::from_row(&row))
            .await?
            .pipe(Ok)
    }
}

impl User {
    pub(crate) const COL_NAMES: &'static str = "id, username, display_name, email, created";

    pub(crate) fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            username: row.get(1),
            display_name: row.get(2),
            email: row.get(3),
            created: row.get(4),
        }
    }

    pub(crate) async fn load_by_id(id: Id, context: &Context) -> ApiResult<Option<Self>> {
        match id.key_for(Id::USER_KIND) {
            None => Ok(None),
            Some(key) => Self::load_by_key(key, context).await,
        }
    }

    pub(crate) async fn load_by_key(key: Key, context: &Context) -> ApiResult<Option<Self>> {
        let query = format!("select {} from users where id = $1", Self::COL_NAMES);
        context.db
            .query_opt(&query, &[&key])
            .await?
            .map(|row| Self::from_row(&row))
            .pipe(Ok)
    }

    /// Loads the user the request is authenticated as, if any.
    pub(crate) async fn load_current(context: &Context) -> ApiResult<Option<Self>> {
        match context.auth.user() {
            None => Ok(None),
            Some(user) => {
                let loaded = Self::load_by_key(user.key, context).await?
                    .ok_or_else(|| internal_server_error!(
                        "user '{}' has a session but no DB row", user.username,
                    ))?;
                Ok(Some(loaded))
            }
        }
    }

    /// Registers a new user account. This is the only mutation that is
    /// available to anonymous requests.
    pub(crate) async fn register(account: NewAccount, context: &Context) -> ApiResult<Self> {
        if !context.config.general.allow_registration {
            return Err(not_authorized!(
                key = "register.disabled",
                "account registration is disabled on this instance",
            ));
        }

        account.validate(context)?;

        // Hashing bcrypt is intentionally slow, so it's moved off the
        // executor threads.
        let password = account.password;
        let password_hash = tokio::task::spawn_blocking(move || {
            bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        })
            .await
            .map_err(|e| internal_server_error!("password hashing task panicked: {e}"))??;

        let query = format!(
            "insert into users (username, display_name, email, password_hash) \
                values ($1, $2, $3, $4) \
                returning {}",
            Self::COL_NAMES,
        );
        let result = context.db
            .query_one(&query, &[
                &account.username,
                &account.display_name,
                &account.email,
                &password_hash,
            ])
            .await;

        let row = map_db_err!(result, {
            if constraint == "users_username_key" => invalid_input!(
                key = "register.username-taken",
                "username '{}' is already taken", account.username,
            ),
            if constraint == "users_email_key" => invalid_input!(
                key = "register.email-taken",
                "email address is already in use",
            ),
        })?;

        info!("Registered new user account '{}'", account.username);
        Ok(Self::from_row(&row))
    }
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct NewAccount {
    pub(crate) username: String,
    pub(crate) display_name: String,
    pub(crate) email: String,
    pub(crate) password: String,
}

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9._-]{2,29}$").unwrap()
});

impl NewAccount {
    fn validate(&self, context: &Context) -> ApiResult<()> {
        if !USERNAME_REGEX.is_match(&self.username) {
            return Err(invalid_input!(
                key = "register.invalid-username",
                "usernames must be 3-30 characters of lowercase letters, digits, '.', '_' or '-', \
                    starting with a letter or digit",
            ));
        }
        if context.config.general.reserved_usernames().any(|r| r == self.username) {
            return Err(invalid_input!(
                key = "register.reserved-username",
                "username '{}' is reserved", self.username,
            ));
        }
        if self.display_name.trim().is_empty() || self.display_name.len() > 128 {
            return Err(invalid_input!("display name must be between 1 and 128 characters"));
        }
        if !self.email.contains('@') || self.email.len() > 254 {
            return Err(invalid_input!("invalid email address"));
        }
        if self.password.len() < 8 {
            return Err(invalid_input!(
                key = "register.weak-password",
                "passwords must be at least 8 characters long",
            ));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::USERNAME_REGEX;

    #[test]
    fn username_regex_accepts_normal_names() {
        for name in ["anna", "b0b", "jo.doe", "my_name", "x-y-z", "0day"] {
            assert!(USERNAME_REGEX.is_match(name), "'{name}' should be valid");
        }
    }

    #[test]
    fn username_regex_rejects_invalid_names() {
        for name in ["", "ab", "Uppercase", "with space", "-leading", ".leading",
            "way.too.long.username.way.too.long.username", "emoji🦀"]
        {
            assert!(!USERNAME_REGEX.is_match(name), "'{name}' should be invalid");
        }
    }
}

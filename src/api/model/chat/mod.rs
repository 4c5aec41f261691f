use chrono::{DateTime, Utc};
use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{
        Context, Id,
        err::{ApiResult, internal_server_error},
    },
    db::util::dbargs,
    model::Key,
    prelude::*,
};
use super::user::User;

mod direct;
mod group;

pub(crate) use self::{
    direct::{DirectChat, NewDirectChat},
    group::{GroupChat, NewGroupChat},
};


/// A single message in a group or direct chat.
pub(crate) struct ChatMessage {
    key: Key,
    sender_key: Key,
    body: String,
    sent: DateTime<Utc>,
}

#[graphql_object(Context = Context)]
impl ChatMessage {
    fn id(&self) -> Id {
        Id::chat_message(self.key)
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn sent(&self) -> DateTime<Utc> {
        self.sent
    }

    async fn sender(&self, context: &Context) -> ApiResult<Option<User>> {
        User::load_by_key(self.sender_key, context).await
    }
}

impl ChatMessage {
    const COL_NAMES: &'static str = "id, sender, body, sent";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            sender_key: row.get(1),
            body: row.get(2),
            sent: row.get(3),
        }
    }

    pub(crate) async fn load_for_group_chat(
        chat: Key,
        context: &Context,
    ) -> ApiResult<Vec<Self>> {
        let query = format!(
            "select {} from chat_messages where group_chat = $1 order by sent",
            Self::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&chat], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    pub(crate) async fn load_for_direct_chat(
        chat: Key,
        context: &Context,
    ) -> ApiResult<Vec<Self>> {
        let query = format!(
            "select {} from chat_messages where direct_chat = $1 order by sent",
            Self::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&chat], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    pub(super) async fn insert_group_message(
        chat: Key,
        sender: Key,
        body: &str,
        context: &Context,
    ) -> ApiResult<Self> {
        let query = format!(
            "insert into chat_messages (group_chat, sender, body) \
                values ($1, $2, $3) \
                returning {}",
            Self::COL_NAMES,
        );
        let row = context.db.query_one(&query, &[&chat, &sender, &body]).await?;
        Ok(Self::from_row(&row))
    }

    pub(super) async fn insert_direct_message(
        chat: Key,
        sender: Key,
        body: &str,
        context: &Context,
    ) -> ApiResult<Self> {
        let query = format!(
            "insert into chat_messages (direct_chat, sender, body) \
                values ($1, $2, $3) \
                returning {}",
            Self::COL_NAMES,
        );
        let row = context.db.query_one(&query, &[&chat, &sender, &body]).await?;
        Ok(Self::from_row(&row))
    }
}

/// Shared validation for chat message bodies.
pub(super) fn validate_message_body(body: &str) -> ApiResult<()> {
    use crate::api::err::invalid_input;

    if body.trim().is_empty() {
        return Err(invalid_input!("chat messages must not be empty"));
    }
    if body.len() > 4096 {
        return Err(invalid_input!("chat messages must not be longer than 4096 bytes"));
    }

    Ok(())
}

/// Loads the organization of a chat, which must still exist.
pub(super) async fn organization_of_chat(
    organization_key: Key,
    context: &Context,
) -> ApiResult<super::organization::Organization> {
    super::organization::Organization::load_by_key(organization_key, context)
        .await?
        .ok_or_else(|| internal_server_error!("organization of chat is gone"))
}


#[cfg(test)]
mod tests {
    use super::validate_message_body;

    #[test]
    fn message_body_validation() {
        assert!(validate_message_body("hello").is_ok());
        assert!(validate_message_body(&"x".repeat(4096)).is_ok());

        assert!(validate_message_body("").is_err());
        assert!(validate_message_body("   \n\t ").is_err());
        assert!(validate_message_body(&"x".repeat(4097)).is_err());
    }
}

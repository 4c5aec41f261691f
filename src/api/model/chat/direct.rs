use chrono::{DateTime, Utc};
use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{
        Context, Id, Node, NodeValue,
        err::{ApiResult, internal_server_error, invalid_input, map_db_err, not_authorized,
            not_found},
    },
    db::util::dbargs,
    model::Key,
    prelude::*,
};
use super::{ChatMessage, organization_of_chat, validate_message_body};
use crate::api::model::{organization::Organization, user::User};


/// A private conversation between two members of an organization.
pub(crate) struct DirectChat {
    pub(crate) key: Key,
    pub(crate) organization_key: Key,
    pub(crate) creator_key: Key,
    pub(crate) partner_key: Key,
    created: DateTime<Utc>,
}

impl Node for DirectChat {
    fn id(&self) -> Id {
        Id::direct_chat(self.key)
    }
}

#[graphql_object(Context = Context, impl = NodeValue)]
impl DirectChat {
    fn id(&self) -> Id {
        Node::id(self)
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    async fn organization(&self, context: &Context) -> ApiResult<Organization> {
        organization_of_chat(self.organization_key, context).await
    }

    /// The user who started the conversation.
    async fn creator(&self, context: &Context) -> ApiResult<User> {
        User::load_by_key(self.creator_key, context)
            .await?
            .ok_or_else(|| internal_server_error!("creator of direct chat is gone"))
    }

    /// The other party of the conversation.
    async fn partner(&self, context: &Context) -> ApiResult<User> {
        User::load_by_key(self.partner_key, context)
            .await?
            .ok_or_else(|| internal_server_error!("partner of direct chat is gone"))
    }

    /// The messages of this chat, oldest first. Only the two parties can read
    /// them.
    async fn messages(&self, context: &Context) -> ApiResult<Vec<ChatMessage>> {
        let user = context.require_user()?;
        if !self.is_party(user.key) {
            return Err(not_authorized!(
                key = "chat.messages-hidden",
                "only the two parties can read a direct chat",
            ));
        }

        ChatMessage::load_for_direct_chat(self.key, context).await
    }
}

impl DirectChat {
    const COL_NAMES: &'static str = "id, organization, creator, partner, created";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            organization_key: row.get(1),
            creator_key: row.get(2),
            partner_key: row.get(3),
            created: row.get(4),
        }
    }

    fn is_party(&self, user: Key) -> bool {
        self.creator_key == user || self.partner_key == user
    }

    pub(crate) async fn load_by_id(id: Id, context: &Context) -> ApiResult<Option<Self>> {
        let key = match id.key_for(Id::DIRECT_CHAT_KIND) {
            None => return Ok(None),
            Some(key) => key,
        };

        let query = format!("select {} from direct_chats where id = $1", Self::COL_NAMES);
        context.db
            .query_opt(&query, &[&key])
            .await?
            .map(|row| Self::from_row(&row))
            .pipe(Ok)
    }

    pub(crate) async fn load_for_organization(
        organization: Key,
        context: &Context,
    ) -> ApiResult<Vec<Self>> {
        let query = format!(
            "select {} from direct_chats where organization = $1 order by created",
            Self::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&organization], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    /// Starts a direct chat with another member of the same organization.
    pub(crate) async fn create(chat: NewDirectChat, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let org = Organization::load_by_id(chat.organization, context).await?
            .ok_or_else(|| not_found!("`organization` does not refer to an existing organization"))?;
        let token = org.require_member(context).await?;

        let partner = chat.partner.key_for(Id::USER_KIND)
            .ok_or_else(|| invalid_input!("`partner` does not refer to a user"))?;
        if partner == user.key {
            return Err(invalid_input!("cannot start a direct chat with yourself"));
        }
        if org.role_of(partner, context).await?.is_none() {
            return Err(invalid_input!(
                "the chat partner has to be a member of the organization",
            ));
        }

        // The unique constraint only covers (creator, partner), so the
        // reversed pair has to be checked manually.
        let existing = context.db
            .query_opt(
                "select 1 from direct_chats \
                    where organization = $1 \
                    and ((creator = $2 and partner = $3) or (creator = $3 and partner = $2))",
                &[&org.key, &user.key, &partner],
            )
            .await?;
        if existing.is_some() {
            return Err(invalid_input!(
                key = "chat.already-exists",
                "a direct chat between these two users already exists",
            ));
        }

        let query = format!(
            "insert into direct_chats (organization, creator, partner) \
                values ($1, $2, $3) \
                returning {}",
            Self::COL_NAMES,
        );
        let result = context.db(token).query_one(&query, &[&org.key, &user.key, &partner]).await;
        let row = map_db_err!(result, {
            if constraint == "one_chat_per_pair" => invalid_input!(
                key = "chat.already-exists",
                "a direct chat between these two users already exists",
            ),
        })?;

        Ok(Self::from_row(&row))
    }

    /// Sends a message to this chat. Only the two parties can send messages.
    pub(crate) async fn send_message(
        chat: Id,
        body: String,
        context: &Context,
    ) -> ApiResult<ChatMessage> {
        let user = context.require_user()?;
        let chat = Self::load_by_id(chat, context).await?
            .ok_or_else(|| not_found!("`chat` does not refer to an existing direct chat"))?;

        validate_message_body(&body)?;
        if !chat.is_party(user.key) {
            return Err(not_authorized!(
                key = "chat.not-a-participant",
                "only the two parties can send messages to a direct chat",
            ));
        }

        ChatMessage::insert_direct_message(chat.key, user.key, &body, context).await
    }

    /// Removes a direct chat with all its messages. Organization admins only.
    pub(crate) async fn remove(id: Id, context: &Context) -> ApiResult<Self> {
        let chat = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing direct chat"))?;
        let org = chat.organization(context).await?;
        let token = org.require_admin(context).await?;

        // Cascade: messages first, then the chat itself.
        let db = context.db(token);
        db.execute("delete from chat_messages where direct_chat = $1", &[&chat.key]).await?;
        db.execute("delete from direct_chats where id = $1", &[&chat.key]).await?;

        info!("Removed direct chat {:?} of '{}'", chat.key, org.name);
        Ok(chat)
    }
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct NewDirectChat {
    pub(crate) organization: Id,
    pub(crate) partner: Id,
}

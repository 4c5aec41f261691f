use chrono::{DateTime, Utc};
use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{
        Context, Id, Node, NodeValue,
        err::{ApiResult, invalid_input, map_db_err, not_authorized, not_found},
    },
    db::util::dbargs,
    model::Key,
    prelude::*,
};
use super::{ChatMessage, organization_of_chat, validate_message_body};
use crate::api::model::{organization::Organization, user::User};


/// A group chat within an organization.
pub(crate) struct GroupChat {
    pub(crate) key: Key,
    pub(crate) organization_key: Key,
    pub(crate) creator_key: Key,
    title: String,
    created: DateTime<Utc>,
}

impl Node for GroupChat {
    fn id(&self) -> Id {
        Id::group_chat(self.key)
    }
}

#[graphql_object(Context = Context, impl = NodeValue)]
impl GroupChat {
    fn id(&self) -> Id {
        Node::id(self)
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    async fn organization(&self, context: &Context) -> ApiResult<Organization> {
        organization_of_chat(self.organization_key, context).await
    }

    async fn creator(&self, context: &Context) -> ApiResult<Option<User>> {
        User::load_by_key(self.creator_key, context).await
    }

    /// All participants of this chat. Visible to organization members.
    async fn participants(&self, context: &Context) -> ApiResult<Vec<User>> {
        let org = self.organization(context).await?;
        org.require_member(context).await?;

        let query = format!(
            "select {} from users \
                inner join group_chat_participants on group_chat_participants.participant = users.id \
                where group_chat_participants.chat = $1 \
                order by group_chat_participants.added",
            User::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&self.key], |row| User::from_row(&row))
            .await?
            .pipe(Ok)
    }

    /// The messages of this chat, oldest first. Only participants and
    /// organization admins can read them.
    async fn messages(&self, context: &Context) -> ApiResult<Vec<ChatMessage>> {
        self.require_read_access(context).await?;
        ChatMessage::load_for_group_chat(self.key, context).await
    }
}

impl GroupChat {
    const COL_NAMES: &'static str = "id, organization, creator, title, created";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            organization_key: row.get(1),
            creator_key: row.get(2),
            title: row.get(3),
            created: row.get(4),
        }
    }

    pub(crate) async fn load_by_id(id: Id, context: &Context) -> ApiResult<Option<Self>> {
        let key = match id.key_for(Id::GROUP_CHAT_KIND) {
            None => return Ok(None),
            Some(key) => key,
        };

        let query = format!("select {} from group_chats where id = $1", Self::COL_NAMES);
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
            "select {} from group_chats where organization = $1 order by created",
            Self::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&organization], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    /// Creates a new group chat. The creator is always a participant; the
    /// given additional participants all have to be members of the
    /// organization.
    pub(crate) async fn create(chat: NewGroupChat, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let org = Organization::load_by_id(chat.organization, context).await?
            .ok_or_else(|| not_found!("`organization` does not refer to an existing organization"))?;
        let token = org.require_member(context).await?;

        if chat.title.trim().is_empty() || chat.title.len() > 100 {
            return Err(invalid_input!("chat title must be 1-100 characters"));
        }

        let mut participant_keys = vec![user.key];
        for id in &chat.participants {
            let key = id.key_for(Id::USER_KIND)
                .ok_or_else(|| invalid_input!("`participants` contains a non-user ID"))?;
            if org.role_of(key, context).await?.is_none() {
                return Err(invalid_input!(
                    "all chat participants have to be members of the organization",
                ));
            }
            if !participant_keys.contains(&key) {
                participant_keys.push(key);
            }
        }

        let query = format!(
            "insert into group_chats (organization, creator, title) \
                values ($1, $2, $3) \
                returning {}",
            Self::COL_NAMES,
        );
        let row = context.db(token)
            .query_one(&query, &[&org.key, &user.key, &chat.title])
            .await?;
        let out = Self::from_row(&row);

        for key in participant_keys {
            context.db
                .execute(
                    "insert into group_chat_participants (chat, participant) values ($1, $2)",
                    &[&out.key, &key],
                )
                .await?;
        }

        debug!("User '{}' created group chat '{}' in '{}'", user.username, out.title, org.name);
        Ok(out)
    }

    /// Adds another organization member to this chat. Allowed for the chat
    /// creator and organization admins.
    pub(crate) async fn add_participant(
        chat: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Self> {
        let acting = context.require_user()?;
        let chat = Self::load_by_id(chat, context).await?
            .ok_or_else(|| not_found!("`chat` does not refer to an existing group chat"))?;
        let org = chat.organization(context).await?;

        if acting.key != chat.creator_key {
            org.require_admin(context).await?;
        }

        let new_key = user.key_for(Id::USER_KIND)
            .ok_or_else(|| invalid_input!("`user` does not refer to a user"))?;
        if org.role_of(new_key, context).await?.is_none() {
            return Err(invalid_input!(
                "chat participants have to be members of the organization",
            ));
        }

        let result = context.db
            .execute(
                "insert into group_chat_participants (chat, participant) values ($1, $2)",
                &[&chat.key, &new_key],
            )
            .await;
        map_db_err!(result, {
            if constraint == "group_chat_participants_pkey" => invalid_input!(
                "user is already a participant of this chat",
            ),
        })?;

        Ok(chat)
    }

    /// Sends a message to this chat. Only participants can send messages.
    pub(crate) async fn send_message(
        chat: Id,
        body: String,
        context: &Context,
    ) -> ApiResult<ChatMessage> {
        let user = context.require_user()?;
        let chat = Self::load_by_id(chat, context).await?
            .ok_or_else(|| not_found!("`chat` does not refer to an existing group chat"))?;

        validate_message_body(&body)?;
        if !chat.is_participant(user.key, context).await? {
            return Err(not_authorized!(
                key = "chat.not-a-participant",
                "only participants can send messages to a group chat",
            ));
        }

        ChatMessage::insert_group_message(chat.key, user.key, &body, context).await
    }

    /// Removes a group chat with all its messages and participant links.
    /// Organization admins only.
    pub(crate) async fn remove(id: Id, context: &Context) -> ApiResult<Self> {
        let chat = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing group chat"))?;
        let org = chat.organization(context).await?;
        let token = org.require_admin(context).await?;

        // Cascade: messages and participant back-references first, then the
        // chat itself.
        let db = context.db(token);
        db.execute("delete from chat_messages where group_chat = $1", &[&chat.key]).await?;
        db.execute("delete from group_chat_participants where chat = $1", &[&chat.key]).await?;
        db.execute("delete from group_chats where id = $1", &[&chat.key]).await?;

        info!("Removed group chat '{}' ({:?}) of '{}'", chat.title, chat.key, org.name);
        Ok(chat)
    }

    async fn is_participant(&self, user: Key, context: &Context) -> ApiResult<bool> {
        context.db
            .query_opt(
                "select 1 from group_chat_participants where chat = $1 and participant = $2",
                &[&self.key, &user],
            )
            .await?
            .is_some()
            .pipe(Ok)
    }

    async fn require_read_access(&self, context: &Context) -> ApiResult<()> {
        let user = context.require_user()?;
        if self.is_participant(user.key, context).await? {
            return Ok(());
        }

        let org = self.organization(context).await?;
        org.require_admin(context).await.map(|_| ()).map_err(|_| not_authorized!(
            key = "chat.messages-hidden",
            "only participants and organization admins can read a group chat",
        ))
    }
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct NewGroupChat {
    pub(crate) organization: Id,
    pub(crate) title: String,
    /// Initial participants besides the creator.
    #[graphql(default = vec![])]
    pub(crate) participants: Vec<Id>,
}

use chrono::{DateTime, Utc};
use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{
        Context, Id, Node, NodeValue,
        err::{ApiError, ApiErrorKind, ApiResult},
    },
    auth::AuthToken,
    db::{types::MembershipRole, util::dbargs},
    model::Key,
    prelude::*,
};
use super::{
    chat::{DirectChat, GroupChat},
    event::Event,
    membership::MembershipRequest,
    user::User,
};

mod mutations;

pub(crate) use self::mutations::{NewOrganization, UpdateOrganization};


/// An organization: the central grouping unit of the platform. Users are
/// members of organizations, organizations run events and host chats.
pub(crate) struct Organization {
    pub(crate) key: Key,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) public: bool,
    pub(crate) creator_key: Key,
    pub(crate) created: DateTime<Utc>,
}

impl Node for Organization {
    fn id(&self) -> Id {
        Id::organization(self.key)
    }
}

#[graphql_object(Context = Context, impl = NodeValue)]
impl Organization {
    fn id(&self) -> Id {
        Node::id(self)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether this organization can be joined directly. Non-public
    /// organizations require a membership request.
    fn public(&self) -> bool {
        self.public
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    async fn creator(&self, context: &Context) -> ApiResult<Option<User>> {
        User::load_by_key(self.creator_key, context).await
    }

    /// Whether the current user is a member of this organization.
    async fn is_member(&self, context: &Context) -> ApiResult<bool> {
        match context.auth.user() {
            None => Ok(false),
            Some(user) => Ok(self.role_of(user.key, context).await?.is_some()),
        }
    }

    /// Whether the current user is an administrator of this organization.
    async fn is_admin(&self, context: &Context) -> ApiResult<bool> {
        match context.auth.user() {
            None => Ok(false),
            Some(_) => Ok(self.admin_token(context).await?.is_some()),
        }
    }

    /// All members of this organization. Only visible to members.
    async fn members(&self, context: &Context) -> ApiResult<Vec<Member>> {
        self.require_member(context).await?;
        self.load_members(context, None).await
    }

    /// All administrators of this organization. Only visible to members.
    async fn admins(&self, context: &Context) -> ApiResult<Vec<Member>> {
        self.require_member(context).await?;
        self.load_members(context, Some(MembershipRole::Admin)).await
    }

    /// All events of this organization. For non-public organizations, this is
    /// only visible to members.
    async fn events(&self, context: &Context) -> ApiResult<Vec<Event>> {
        if !self.public {
            self.require_member(context).await?;
        }
        Event::load_for_organization(self.key, context).await
    }

    /// Pending membership requests. Only visible to administrators.
    async fn membership_requests(&self, context: &Context) -> ApiResult<Vec<MembershipRequest>> {
        self.require_admin(context).await?;
        MembershipRequest::load_for_organization(self.key, context).await
    }

    /// All group chats of this organization. Only visible to members.
    async fn group_chats(&self, context: &Context) -> ApiResult<Vec<GroupChat>> {
        self.require_member(context).await?;
        GroupChat::load_for_organization(self.key, context).await
    }

    /// All direct chats within this organization. Only visible to
    /// administrators; the parties of a chat access it via `directChatById`.
    async fn direct_chats(&self, context: &Context) -> ApiResult<Vec<DirectChat>> {
        self.require_admin(context).await?;
        DirectChat::load_for_organization(self.key, context).await
    }
}

impl Organization {
    pub(crate) const COL_NAMES: &'static str =
        "id, name, description, public, creator, created";

    pub(crate) fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            name: row.get(1),
            description: row.get(2),
            public: row.get(3),
            creator_key: row.get(4),
            created: row.get(5),
        }
    }

    pub(crate) async fn load_by_id(id: Id, context: &Context) -> ApiResult<Option<Self>> {
        match id.key_for(Id::ORGANIZATION_KIND) {
            None => Ok(None),
            Some(key) => Self::load_by_key(key, context).await,
        }
    }

    pub(crate) async fn load_by_key(key: Key, context: &Context) -> ApiResult<Option<Self>> {
        let query = format!("select {} from organizations where id = $1", Self::COL_NAMES);
        context.db
            .query_opt(&query, &[&key])
            .await?
            .map(|row| Self::from_row(&row))
            .pipe(Ok)
    }

    /// Loads all organizations visible to the current user: public ones plus
    /// the ones the user is a member of.
    pub(crate) async fn load_all_visible(context: &Context) -> ApiResult<Vec<Self>> {
        let query = format!(
            "select {} from organizations \
                where public \
                or exists ( \
                    select 1 from memberships \
                    where memberships.organization = organizations.id \
                    and memberships.member = $1 \
                ) \
                order by name",
            Self::COL_NAMES,
        );
        let viewer = context.auth.user().map(|u| u.key).unwrap_or(Key(0));
        context.db
            .query_mapped(&query, dbargs![&viewer], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    async fn load_members(
        &self,
        context: &Context,
        role: Option<MembershipRole>,
    ) -> ApiResult<Vec<Member>> {
        let query = format!(
            "select {}, memberships.role, memberships.joined from users \
                inner join memberships on memberships.member = users.id \
                where memberships.organization = $1 \
                and ($2::membership_role is null or memberships.role = $2) \
                order by users.display_name",
            User::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&self.key, &role], |row| Member {
                role: row.get(5),
                joined: row.get(6),
                user: User::from_row(&row),
            })
            .await?
            .pipe(Ok)
    }

    /// Returns the role the given user has in this organization, or `None` if
    /// they are not a member.
    pub(crate) async fn role_of(
        &self,
        user: Key,
        context: &Context,
    ) -> ApiResult<Option<MembershipRole>> {
        context.db
            .query_opt(
                "select role from memberships where organization = $1 and member = $2",
                &[&self.key, &user],
            )
            .await?
            .map(|row| row.get(0))
            .pipe(Ok)
    }

    /// Returns an auth token if the current user is an administrator of this
    /// organization (or its creator, or a platform superadmin), `None`
    /// otherwise. Anonymous requests get an error.
    async fn admin_token(&self, context: &Context) -> ApiResult<Option<AuthToken>> {
        let user = context.require_user()?;
        let is_admin = user.superadmin
            || user.key == self.creator_key
            || self.role_of(user.key, context).await?.is_some_and(|r| r.is_admin());

        Ok(AuthToken::some_if(is_admin))
    }

    /// Like [`Self::admin_token`], but with "not an admin" turned into an
    /// error. Nearly every mutation on organization-owned entities starts
    /// with this check.
    pub(crate) async fn require_admin(&self, context: &Context) -> ApiResult<AuthToken> {
        self.admin_token(context).await?.ok_or_else(|| ApiError {
            msg: format!("user is not an administrator of organization '{}'", self.name),
            kind: ApiErrorKind::NotAuthorized,
            key: Some("org.not-an-admin"),
        })
    }

    /// Returns an auth token if the current user is a member (or creator, or
    /// superadmin), an error otherwise.
    pub(crate) async fn require_member(&self, context: &Context) -> ApiResult<AuthToken> {
        let user = context.require_user()?;
        let is_member = user.superadmin
            || user.key == self.creator_key
            || self.role_of(user.key, context).await?.is_some();

        AuthToken::some_if(is_member).ok_or_else(|| ApiError {
            msg: format!("user is not a member of organization '{}'", self.name),
            kind: ApiErrorKind::NotAuthorized,
            key: Some("org.not-a-member"),
        })
    }
}


/// A user's membership in one organization.
pub(crate) struct Member {
    user: User,
    role: MembershipRole,
    joined: DateTime<Utc>,
}

#[graphql_object(Context = Context)]
impl Member {
    fn user(&self) -> &User {
        &self.user
    }

    fn role(&self) -> MembershipRole {
        self.role
    }

    fn joined(&self) -> DateTime<Utc> {
        self.joined
    }
}

use crate::{
    api::{
        Context, Id,
        err::{ApiResult, invalid_input, map_db_err, not_authorized, not_found},
    },
    db::types::MembershipRole,
    model::Key,
    prelude::*,
};
use super::Organization;


impl Organization {
    pub(crate) async fn create(org: NewOrganization, context: &Context) -> ApiResult<Organization> {
        let user = context.require_user()?;
        org.validate()?;

        let query = format!(
            "insert into organizations (name, description, public, creator) \
                values ($1, $2, $3, $4) \
                returning {}",
            Self::COL_NAMES,
        );
        let row = context.db
            .query_one(&query, &[&org.name, &org.description, &org.public, &user.key])
            .await?;
        let out = Self::from_row(&row);

        // The creator immediately becomes an admin member.
        context.db
            .execute(
                "insert into memberships (organization, member, role) values ($1, $2, 'admin')",
                &[&out.key, &user.key],
            )
            .await?;

        info!("User '{}' created organization '{}' ({:?})", user.username, out.name, out.key);
        Ok(out)
    }

    pub(crate) async fn update(
        id: Id,
        set: UpdateOrganization,
        context: &Context,
    ) -> ApiResult<Organization> {
        let org = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing organization"))?;
        let token = org.require_admin(context).await?;

        if let Some(name) = &set.name {
            if name.trim().is_empty() || name.len() > 100 {
                return Err(invalid_input!("organization name must be 1-100 characters"));
            }
        }

        let affected_rows = context.db(token)
            .execute(
                "update organizations set \
                    name = coalesce($2, name), \
                    description = coalesce($3, description), \
                    public = coalesce($4, public) \
                    where id = $1",
                &[&org.key, &set.name, &set.description, &set.public],
            )
            .await?;

        if affected_rows != 1 {
            return Err(not_found!("`id` does not refer to an existing organization"));
        }

        Self::load_by_key(org.key, context).await.map(Option::unwrap)
    }

    /// Removes an organization and everything it owns. Only the creator and
    /// superadmins can do this.
    pub(crate) async fn remove(id: Id, context: &Context) -> ApiResult<Organization> {
        let user = context.require_user()?;
        let org = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing organization"))?;

        if user.key != org.creator_key && !user.superadmin {
            return Err(not_authorized!(
                key = "org.not-the-creator",
                "only the creator can remove an organization",
            ));
        }

        // Cascade, children before parents. Every row referencing the
        // organization (directly or transitively) has to go before the
        // organization row itself, as the foreign keys are not `on delete
        // cascade` on purpose.
        let db = &context.db;
        db.execute(
            "delete from chat_messages \
                where group_chat in (select id from group_chats where organization = $1) \
                or direct_chat in (select id from direct_chats where organization = $1)",
            &[&org.key],
        ).await?;
        db.execute(
            "delete from group_chat_participants \
                where chat in (select id from group_chats where organization = $1)",
            &[&org.key],
        ).await?;
        db.execute("delete from group_chats where organization = $1", &[&org.key]).await?;
        db.execute("delete from direct_chats where organization = $1", &[&org.key]).await?;
        db.execute(
            "delete from event_attendances \
                where event in (select id from events where organization = $1)",
            &[&org.key],
        ).await?;
        db.execute("delete from events where organization = $1", &[&org.key]).await?;
        db.execute("delete from membership_requests where organization = $1", &[&org.key]).await?;
        db.execute("delete from memberships where organization = $1", &[&org.key]).await?;
        db.execute("delete from organizations where id = $1", &[&org.key]).await?;

        info!(
            "User '{}' removed organization '{}' ({:?})",
            user.username, org.name, org.key,
        );
        Ok(org)
    }

    /// Directly joins a public organization.
    pub(crate) async fn join(id: Id, context: &Context) -> ApiResult<Organization> {
        let user = context.require_user()?;
        let org = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing organization"))?;

        if !org.public {
            return Err(not_authorized!(
                key = "org.requires-request",
                "organization '{}' can only be joined via membership request", org.name,
            ));
        }

        let result = context.db
            .execute(
                "insert into memberships (organization, member) values ($1, $2)",
                &[&org.key, &user.key],
            )
            .await;
        map_db_err!(result, {
            if constraint == "memberships_pkey" => invalid_input!(
                key = "org.already-member",
                "user is already a member of this organization",
            ),
        })?;

        // A pending membership request would now be meaningless.
        context.db
            .execute(
                "delete from membership_requests where organization = $1 and requester = $2",
                &[&org.key, &user.key],
            )
            .await?;

        info!("User '{}' joined organization '{}'", user.username, org.name);
        Ok(org)
    }

    /// Leaves an organization. The creator cannot leave their own
    /// organization.
    pub(crate) async fn leave(id: Id, context: &Context) -> ApiResult<Organization> {
        let user = context.require_user()?;
        let org = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing organization"))?;

        if user.key == org.creator_key {
            return Err(invalid_input!(
                key = "org.creator-cannot-leave",
                "the creator cannot leave their own organization",
            ));
        }

        org.remove_membership(user.key, context).await?;
        info!("User '{}' left organization '{}'", user.username, org.name);
        Ok(org)
    }

    /// Removes a member from an organization. Requires admin rights. Admins
    /// can only be removed by the creator (or a superadmin); the creator
    /// cannot be removed at all.
    pub(crate) async fn remove_member(
        organization: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Organization> {
        let acting = context.require_user()?;
        let org = Self::load_by_id(organization, context).await?
            .ok_or_else(|| not_found!("`organization` does not refer to an existing organization"))?;
        org.require_admin(context).await?;

        let target = user.key_for(Id::USER_KIND)
            .ok_or_else(|| invalid_input!("`user` does not refer to a user"))?;

        if target == org.creator_key {
            return Err(invalid_input!(
                key = "org.cannot-remove-creator",
                "the creator cannot be removed from their organization",
            ));
        }

        let role = org.role_of(target, context).await?
            .ok_or_else(|| not_found!("user is not a member of this organization"))?;
        if role.is_admin() && acting.key != org.creator_key && !acting.superadmin {
            return Err(not_authorized!(
                key = "org.cannot-remove-admin",
                "only the creator can remove an administrator",
            ));
        }

        org.remove_membership(target, context).await?;
        info!(
            "User '{}' removed member {:?} from organization '{}'",
            acting.username, target, org.name,
        );
        Ok(org)
    }

    /// Promotes a member to administrator. Only the creator and superadmins
    /// can do this.
    pub(crate) async fn make_admin(
        organization: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Organization> {
        Self::change_role(organization, user, MembershipRole::Admin, context).await
    }

    /// Demotes an administrator back to a regular member. Only the creator and
    /// superadmins can do this. The creator cannot be demoted.
    pub(crate) async fn remove_admin(
        organization: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Organization> {
        Self::change_role(organization, user, MembershipRole::Member, context).await
    }

    async fn change_role(
        organization: Id,
        user: Id,
        role: MembershipRole,
        context: &Context,
    ) -> ApiResult<Organization> {
        let acting = context.require_user()?;
        let org = Self::load_by_id(organization, context).await?
            .ok_or_else(|| not_found!("`organization` does not refer to an existing organization"))?;

        if acting.key != org.creator_key && !acting.superadmin {
            return Err(not_authorized!(
                key = "org.not-the-creator",
                "only the creator can change administrator roles",
            ));
        }

        let target = user.key_for(Id::USER_KIND)
            .ok_or_else(|| invalid_input!("`user` does not refer to a user"))?;
        if target == org.creator_key && role == MembershipRole::Member {
            return Err(invalid_input!("the creator cannot be demoted"));
        }

        let affected_rows = context.db
            .execute(
                "update memberships set role = $3 where organization = $1 and member = $2",
                &[&org.key, &target, &role],
            )
            .await?;
        if affected_rows != 1 {
            return Err(not_found!("user is not a member of this organization"));
        }

        Ok(org)
    }

    /// Deletes one membership including all back-references the member has in
    /// this organization (event attendances and group chat participations).
    /// Used by `leave` and `remove_member`.
    async fn remove_membership(&self, member: Key, context: &Context) -> ApiResult<()> {
        let db = &context.db;
        db.execute(
            "delete from event_attendances \
                where attendee = $2 \
                and event in (select id from events where organization = $1)",
            &[&self.key, &member],
        ).await?;
        db.execute(
            "delete from group_chat_participants \
                where participant = $2 \
                and chat in (select id from group_chats where organization = $1)",
            &[&self.key, &member],
        ).await?;
        let affected_rows = db.execute(
            "delete from memberships where organization = $1 and member = $2",
            &[&self.key, &member],
        ).await?;

        if affected_rows != 1 {
            return Err(not_found!("user is not a member of this organization"));
        }

        Ok(())
    }
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct NewOrganization {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    /// Defaults to `true`, i.e. everyone can join.
    #[graphql(default = true)]
    pub(crate) public: bool,
}

impl NewOrganization {
    fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() || self.name.len() > 100 {
            return Err(invalid_input!("organization name must be 1-100 characters"));
        }
        Ok(())
    }
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct UpdateOrganization {
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) public: Option<bool>,
}

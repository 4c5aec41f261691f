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
use super::{organization::Organization, user::User};


/// A pending request by a user to join an organization.
pub(crate) struct MembershipRequest {
    pub(crate) key: Key,
    pub(crate) organization_key: Key,
    pub(crate) requester_key: Key,
    created: DateTime<Utc>,
}

impl Node for MembershipRequest {
    fn id(&self) -> Id {
        Id::membership_request(self.key)
    }
}

#[graphql_object(Context = Context, impl = NodeValue)]
impl MembershipRequest {
    fn id(&self) -> Id {
        Node::id(self)
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    async fn organization(&self, context: &Context) -> ApiResult<Organization> {
        Organization::load_by_key(self.organization_key, context)
            .await?
            .ok_or_else(|| internal_server_error!("organization of request is gone"))
    }

    async fn requester(&self, context: &Context) -> ApiResult<User> {
        User::load_by_key(self.requester_key, context)
            .await?
            .ok_or_else(|| internal_server_error!("requester of request is gone"))
    }
}

impl MembershipRequest {
    const COL_NAMES: &'static str = "id, organization, requester, created";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            organization_key: row.get(1),
            requester_key: row.get(2),
            created: row.get(3),
        }
    }

    pub(crate) async fn load_by_id(id: Id, context: &Context) -> ApiResult<Option<Self>> {
        let key = match id.key_for(Id::MEMBERSHIP_REQUEST_KIND) {
            None => return Ok(None),
            Some(key) => key,
        };

        let query = format!(
            "select {} from membership_requests where id = $1",
            Self::COL_NAMES,
        );
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
            "select {} from membership_requests where organization = $1 order by created",
            Self::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&organization], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    /// Sends a membership request for the given organization.
    pub(crate) async fn send(organization: Id, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let org = Organization::load_by_id(organization, context).await?
            .ok_or_else(|| not_found!("`organization` does not refer to an existing organization"))?;

        if org.role_of(user.key, context).await?.is_some() {
            return Err(invalid_input!(
                key = "request.already-member",
                "user is already a member of organization '{}'", org.name,
            ));
        }

        let query = format!(
            "insert into membership_requests (organization, requester) \
                values ($1, $2) \
                returning {}",
            Self::COL_NAMES,
        );
        let result = context.db.query_one(&query, &[&org.key, &user.key]).await;
        let row = map_db_err!(result, {
            if constraint == "one_request_per_user" => invalid_input!(
                key = "request.duplicate",
                "user has already requested membership in organization '{}'", org.name,
            ),
        })?;

        debug!("User '{}' requested membership in organization '{}'", user.username, org.name);
        Ok(Self::from_row(&row))
    }

    /// Accepts a membership request: the requester becomes a member and the
    /// request is deleted. Admin only.
    pub(crate) async fn accept(id: Id, context: &Context) -> ApiResult<Self> {
        let request = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing membership request"))?;
        let org = request.organization(context).await?;
        let token = org.require_admin(context).await?;

        let result = context.db(token)
            .execute(
                "insert into memberships (organization, member) values ($1, $2)",
                &[&org.key, &request.requester_key],
            )
            .await;
        map_db_err!(result, {
            if constraint == "memberships_pkey" => invalid_input!(
                key = "request.already-member",
                "requester is already a member of this organization",
            ),
        })?;

        request.delete(context).await?;
        info!(
            "Membership request {:?} for organization '{}' accepted",
            request.key, org.name,
        );
        Ok(request)
    }

    /// Rejects a membership request: the request is deleted without any
    /// further effect. Admin only.
    pub(crate) async fn reject(id: Id, context: &Context) -> ApiResult<Self> {
        let request = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing membership request"))?;
        let org = request.organization(context).await?;
        org.require_admin(context).await?;

        request.delete(context).await?;
        info!(
            "Membership request {:?} for organization '{}' rejected",
            request.key, org.name,
        );
        Ok(request)
    }

    /// Cancels one's own membership request.
    pub(crate) async fn cancel(id: Id, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let request = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing membership request"))?;

        if request.requester_key != user.key {
            return Err(not_authorized!(
                key = "request.not-the-requester",
                "only the requester can cancel a membership request",
            ));
        }

        request.delete(context).await?;
        Ok(request)
    }

    async fn delete(&self, context: &Context) -> ApiResult<()> {
        let affected_rows = context.db
            .execute("delete from membership_requests where id = $1", &[&self.key])
            .await?;
        if affected_rows != 1 {
            return Err(internal_server_error!("membership request vanished mid-request"));
        }

        Ok(())
    }
}

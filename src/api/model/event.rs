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


/// An event run by an organization.
pub(crate) struct Event {
    pub(crate) key: Key,
    pub(crate) organization_key: Key,
    pub(crate) creator_key: Key,
    title: String,
    description: Option<String>,
    location: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    all_day: bool,
    created: DateTime<Utc>,
}

impl Node for Event {
    fn id(&self) -> Id {
        Id::event(self.key)
    }
}

#[graphql_object(Context = Context, impl = NodeValue)]
impl Event {
    fn id(&self) -> Id {
        Node::id(self)
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    fn all_day(&self) -> bool {
        self.all_day
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    async fn organization(&self, context: &Context) -> ApiResult<Organization> {
        Organization::load_by_key(self.organization_key, context)
            .await?
            .ok_or_else(|| internal_server_error!("organization of event is gone"))
    }

    async fn creator(&self, context: &Context) -> ApiResult<Option<User>> {
        User::load_by_key(self.creator_key, context).await
    }

    /// Whether the current user can edit or remove this event.
    async fn can_edit(&self, context: &Context) -> ApiResult<bool> {
        match context.auth.user() {
            None => Ok(false),
            Some(_) => Ok(self.edit_check(context).await.is_ok()),
        }
    }

    /// All users registered for this event. Only visible to members of the
    /// organization.
    async fn attendees(&self, context: &Context) -> ApiResult<Vec<User>> {
        let org = self.organization(context).await?;
        org.require_member(context).await?;

        let query = format!(
            "select {} from users \
                inner join event_attendances on event_attendances.attendee = users.id \
                where event_attendances.event = $1 \
                order by event_attendances.registered",
            User::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&self.key], |row| User::from_row(&row))
            .await?
            .pipe(Ok)
    }
}

impl Event {
    const COL_NAMES: &'static str = "id, organization, creator, title, description, \
        location, starts_at, ends_at, all_day, created";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            organization_key: row.get(1),
            creator_key: row.get(2),
            title: row.get(3),
            description: row.get(4),
            location: row.get(5),
            starts_at: row.get(6),
            ends_at: row.get(7),
            all_day: row.get(8),
            created: row.get(9),
        }
    }

    pub(crate) async fn load_by_id(id: Id, context: &Context) -> ApiResult<Option<Self>> {
        let key = match id.key_for(Id::EVENT_KIND) {
            None => return Ok(None),
            Some(key) => key,
        };

        let query = format!("select {} from events where id = $1", Self::COL_NAMES);
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
            "select {} from events where organization = $1 order by starts_at",
            Self::COL_NAMES,
        );
        context.db
            .query_mapped(&query, dbargs![&organization], |row| Self::from_row(&row))
            .await?
            .pipe(Ok)
    }

    pub(crate) async fn create(event: NewEvent, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let org = Organization::load_by_id(event.organization, context).await?
            .ok_or_else(|| not_found!("`organization` does not refer to an existing organization"))?;
        let token = org.require_member(context).await?;

        if event.title.trim().is_empty() || event.title.len() > 200 {
            return Err(invalid_input!("event title must be 1-200 characters"));
        }
        if event.ends_at < event.starts_at {
            return Err(invalid_input!("event must not end before it starts"));
        }

        let query = format!(
            "insert into events \
                (organization, creator, title, description, location, starts_at, ends_at, all_day) \
                values ($1, $2, $3, $4, $5, $6, $7, $8) \
                returning {}",
            Self::COL_NAMES,
        );
        let row = context.db(token)
            .query_one(&query, &[
                &org.key,
                &user.key,
                &event.title,
                &event.description,
                &event.location,
                &event.starts_at,
                &event.ends_at,
                &event.all_day,
            ])
            .await?;
        let out = Self::from_row(&row);

        debug!("User '{}' created event '{}' in '{}'", user.username, out.title, org.name);
        Ok(out)
    }

    pub(crate) async fn update(id: Id, set: UpdateEvent, context: &Context) -> ApiResult<Self> {
        let event = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing event"))?;
        event.edit_check(context).await?;

        if let Some(title) = &set.title {
            if title.trim().is_empty() || title.len() > 200 {
                return Err(invalid_input!("event title must be 1-200 characters"));
            }
        }

        let result = context.db
            .execute(
                "update events set \
                    title = coalesce($2, title), \
                    description = coalesce($3, description), \
                    location = coalesce($4, location), \
                    starts_at = coalesce($5, starts_at), \
                    ends_at = coalesce($6, ends_at), \
                    all_day = coalesce($7, all_day) \
                    where id = $1",
                &[
                    &event.key,
                    &set.title,
                    &set.description,
                    &set.location,
                    &set.starts_at,
                    &set.ends_at,
                    &set.all_day,
                ],
            )
            .await;
        // The DB re-checks the time ordering with the updated values.
        map_db_err!(result, {
            if constraint == "ends_after_start" => invalid_input!(
                "event must not end before it starts",
            ),
        })?;

        Self::load_by_id(id, context).await.map(Option::unwrap)
    }

    /// Removes an event, including all attendance records. Allowed for
    /// organization admins and the event's creator.
    pub(crate) async fn remove(id: Id, context: &Context) -> ApiResult<Self> {
        let event = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing event"))?;
        event.edit_check(context).await?;

        // Cascade: attendance back-references first, then the event itself.
        context.db.execute("delete from event_attendances where event = $1", &[&event.key]).await?;
        context.db.execute("delete from events where id = $1", &[&event.key]).await?;

        info!("Removed event '{}' ({:?})", event.title, event.key);
        Ok(event)
    }

    /// Registers the current user as attendee of this event.
    pub(crate) async fn register(id: Id, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let event = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing event"))?;
        let org = event.organization(context).await?;
        let token = org.require_member(context).await?;

        let result = context.db(token)
            .execute(
                "insert into event_attendances (event, attendee) values ($1, $2)",
                &[&event.key, &user.key],
            )
            .await;
        map_db_err!(result, {
            if constraint == "event_attendances_pkey" => invalid_input!(
                key = "event.already-registered",
                "user is already registered for this event",
            ),
        })?;

        Ok(event)
    }

    /// Removes the current user from the attendee list of this event.
    pub(crate) async fn unregister(id: Id, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let event = Self::load_by_id(id, context).await?
            .ok_or_else(|| not_found!("`id` does not refer to an existing event"))?;

        let affected_rows = context.db
            .execute(
                "delete from event_attendances where event = $1 and attendee = $2",
                &[&event.key, &user.key],
            )
            .await?;
        if affected_rows != 1 {
            return Err(invalid_input!(
                key = "event.not-registered",
                "user is not registered for this event",
            ));
        }

        Ok(event)
    }

    /// Checks that the current user may edit/remove this event: organization
    /// admins and the event creator can.
    async fn edit_check(&self, context: &Context) -> ApiResult<()> {
        let user = context.require_user()?;
        if user.key == self.creator_key {
            return Ok(());
        }

        let org = self.organization(context).await?;
        org.require_admin(context).await.map(|_| ()).map_err(|_| not_authorized!(
            key = "event.cannot-edit",
            "only organization admins and the event creator can modify an event",
        ))
    }
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct NewEvent {
    pub(crate) organization: Id,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) location: Option<String>,
    pub(crate) starts_at: DateTime<Utc>,
    pub(crate) ends_at: DateTime<Utc>,
    #[graphql(default = false)]
    pub(crate) all_day: bool,
}

#[derive(juniper::GraphQLInputObject)]
pub(crate) struct UpdateEvent {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) location: Option<String>,
    pub(crate) starts_at: Option<DateTime<Utc>>,
    pub(crate) ends_at: Option<DateTime<Utc>>,
    pub(crate) all_day: Option<bool>,
}

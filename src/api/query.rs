use juniper::graphql_object;

use super::{
    Context,
    Id,
    NodeValue,
    err::ApiResult,
    model::{
        chat::{DirectChat, GroupChat},
        event::Event,
        membership::MembershipRequest,
        organization::Organization,
        user::User,
    },
};


/// The root query object.
pub(crate) struct Query;

#[graphql_object(Context = Context)]
impl Query {
    /// Returns the current API version.
    fn api_version() -> &'static str {
        "1.0"
    }

    /// Returns the currently logged-in user, or `null` for anonymous requests.
    async fn current_user(context: &Context) -> ApiResult<Option<User>> {
        User::load_current(context).await
    }

    /// Returns the user with the given ID or `None` if the ID does not refer
    /// to a user.
    async fn user_by_id(id: Id, context: &Context) -> ApiResult<Option<User>> {
        User::load_by_id(id, context).await
    }

    /// Returns the organization with the given ID or `None` if the ID does
    /// not refer to an organization.
    async fn organization_by_id(id: Id, context: &Context) -> ApiResult<Option<Organization>> {
        Organization::load_by_id(id, context).await
    }

    /// Returns all organizations visible to the current user: all public ones
    /// plus the ones the user is a member of.
    async fn all_organizations(context: &Context) -> ApiResult<Vec<Organization>> {
        Organization::load_all_visible(context).await
    }

    /// Returns an event by its ID.
    async fn event_by_id(id: Id, context: &Context) -> ApiResult<Option<Event>> {
        Event::load_by_id(id, context).await
    }

    /// Returns a group chat by its ID.
    async fn group_chat_by_id(id: Id, context: &Context) -> ApiResult<Option<GroupChat>> {
        GroupChat::load_by_id(id, context).await
    }

    /// Returns a direct chat by its ID.
    async fn direct_chat_by_id(id: Id, context: &Context) -> ApiResult<Option<DirectChat>> {
        DirectChat::load_by_id(id, context).await
    }

    /// Returns a membership request by its ID.
    async fn membership_request_by_id(
        id: Id,
        context: &Context,
    ) -> ApiResult<Option<MembershipRequest>> {
        MembershipRequest::load_by_id(id, context).await
    }

    /// Retrieve a node by globally unique ID. Mostly useful for relay.
    async fn node(id: Id, context: &Context) -> ApiResult<Option<NodeValue>> {
        match id.kind() {
            Id::USER_KIND =>
                Ok(User::load_by_id(id, context).await?.map(NodeValue::from)),
            Id::ORGANIZATION_KIND =>
                Ok(Organization::load_by_id(id, context).await?.map(NodeValue::from)),
            Id::EVENT_KIND =>
                Ok(Event::load_by_id(id, context).await?.map(NodeValue::from)),
            Id::GROUP_CHAT_KIND =>
                Ok(GroupChat::load_by_id(id, context).await?.map(NodeValue::from)),
            Id::DIRECT_CHAT_KIND =>
                Ok(DirectChat::load_by_id(id, context).await?.map(NodeValue::from)),
            Id::MEMBERSHIP_REQUEST_KIND =>
                Ok(MembershipRequest::load_by_id(id, context).await?.map(NodeValue::from)),
            _ => Ok(None),
        }
    }
}

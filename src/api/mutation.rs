use juniper::graphql_object;

use super::{
    Context,
    err::ApiResult,
    id::Id,
    model::{
        chat::{ChatMessage, DirectChat, GroupChat, NewDirectChat, NewGroupChat},
        event::{Event, NewEvent, UpdateEvent},
        membership::MembershipRequest,
        organization::{NewOrganization, Organization, UpdateOrganization},
        user::{NewAccount, User},
    },
};


/// The root mutation object.
pub(crate) struct Mutation;

#[graphql_object(Context = Context)]
impl Mutation {
    // ----- Accounts ---------------------------------------------------------

    /// Registers a new user account. Logging in happens outside of the
    /// GraphQL API (`POST /~login`).
    async fn register_account(account: NewAccount, context: &Context) -> ApiResult<User> {
        User::register(account, context).await
    }


    // ----- Organizations ----------------------------------------------------

    /// Creates a new organization. The current user becomes its creator and
    /// an admin member.
    async fn create_organization(
        organization: NewOrganization,
        context: &Context,
    ) -> ApiResult<Organization> {
        Organization::create(organization, context).await
    }

    /// Updates an organization's data. Admins only.
    async fn update_organization(
        id: Id,
        set: UpdateOrganization,
        context: &Context,
    ) -> ApiResult<Organization> {
        Organization::update(id, set, context).await
    }

    /// Removes an organization including all its events, chats, memberships
    /// and membership requests. Only the creator (or a superadmin) can do
    /// this. Returns the removed organization.
    async fn remove_organization(id: Id, context: &Context) -> ApiResult<Organization> {
        Organization::remove(id, context).await
    }

    /// Joins a public organization directly.
    async fn join_organization(id: Id, context: &Context) -> ApiResult<Organization> {
        Organization::join(id, context).await
    }

    /// Leaves an organization. The creator cannot leave.
    async fn leave_organization(id: Id, context: &Context) -> ApiResult<Organization> {
        Organization::leave(id, context).await
    }

    /// Removes a member from an organization. Admins only; admins themselves
    /// can only be removed by the creator.
    async fn remove_member(
        organization: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Organization> {
        Organization::remove_member(organization, user, context).await
    }

    /// Promotes a member of an organization to admin. Creator only.
    async fn make_admin(
        organization: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Organization> {
        Organization::make_admin(organization, user, context).await
    }

    /// Demotes an admin of an organization to a regular member. Creator only.
    async fn remove_admin(
        organization: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<Organization> {
        Organization::remove_admin(organization, user, context).await
    }


    // ----- Membership requests ----------------------------------------------

    /// Requests membership in an organization.
    async fn send_membership_request(
        organization: Id,
        context: &Context,
    ) -> ApiResult<MembershipRequest> {
        MembershipRequest::send(organization, context).await
    }

    /// Accepts a membership request: the requester becomes a member. Admins
    /// only. Returns the accepted (and thereby deleted) request.
    async fn accept_membership_request(
        id: Id,
        context: &Context,
    ) -> ApiResult<MembershipRequest> {
        MembershipRequest::accept(id, context).await
    }

    /// Rejects a membership request. Admins only. Returns the rejected (and
    /// thereby deleted) request.
    async fn reject_membership_request(
        id: Id,
        context: &Context,
    ) -> ApiResult<MembershipRequest> {
        MembershipRequest::reject(id, context).await
    }

    /// Cancels one's own pending membership request.
    async fn cancel_membership_request(
        id: Id,
        context: &Context,
    ) -> ApiResult<MembershipRequest> {
        MembershipRequest::cancel(id, context).await
    }


    // ----- Events -----------------------------------------------------------

    /// Creates a new event in an organization. Members only.
    async fn create_event(event: NewEvent, context: &Context) -> ApiResult<Event> {
        Event::create(event, context).await
    }

    /// Updates an event's data. Allowed for organization admins and the
    /// event's creator.
    async fn update_event(id: Id, set: UpdateEvent, context: &Context) -> ApiResult<Event> {
        Event::update(id, set, context).await
    }

    /// Removes an event including all attendance registrations. Allowed for
    /// organization admins and the event's creator. Returns the removed
    /// event.
    async fn remove_event(id: Id, context: &Context) -> ApiResult<Event> {
        Event::remove(id, context).await
    }

    /// Registers the current user as attendee of an event.
    async fn register_for_event(id: Id, context: &Context) -> ApiResult<Event> {
        Event::register(id, context).await
    }

    /// Removes the current user from the attendee list of an event.
    async fn unregister_from_event(id: Id, context: &Context) -> ApiResult<Event> {
        Event::unregister(id, context).await
    }


    // ----- Chats ------------------------------------------------------------

    /// Creates a new group chat in an organization. Members only.
    async fn create_group_chat(chat: NewGroupChat, context: &Context) -> ApiResult<GroupChat> {
        GroupChat::create(chat, context).await
    }

    /// Adds an organization member to a group chat. Allowed for the chat's
    /// creator and organization admins.
    async fn add_chat_participant(
        chat: Id,
        user: Id,
        context: &Context,
    ) -> ApiResult<GroupChat> {
        GroupChat::add_participant(chat, user, context).await
    }

    /// Sends a message to a group chat. Participants only.
    async fn send_group_chat_message(
        chat: Id,
        body: String,
        context: &Context,
    ) -> ApiResult<ChatMessage> {
        GroupChat::send_message(chat, body, context).await
    }

    /// Removes a group chat with all its messages. Organization admins only.
    /// Returns the removed chat.
    async fn remove_group_chat(id: Id, context: &Context) -> ApiResult<GroupChat> {
        GroupChat::remove(id, context).await
    }

    /// Starts a direct chat with another member of the same organization.
    async fn create_direct_chat(
        chat: NewDirectChat,
        context: &Context,
    ) -> ApiResult<DirectChat> {
        DirectChat::create(chat, context).await
    }

    /// Sends a message to a direct chat. Only the two parties can do this.
    async fn send_direct_chat_message(
        chat: Id,
        body: String,
        context: &Context,
    ) -> ApiResult<ChatMessage> {
        DirectChat::send_message(chat, body, context).await
    }

    /// Removes a direct chat with all its messages. Organization admins only.
    /// Returns the removed chat.
    async fn remove_direct_chat(id: Id, context: &Context) -> ApiResult<DirectChat> {
        DirectChat::remove(id, context).await
    }
}

use crate::api::{
    Context, Id,
    model::{
        chat::{DirectChat, GroupChat},
        event::Event,
        membership::MembershipRequest,
        organization::Organization,
        user::User,
    },
};


/// A node with a globally unique ID. Mostly useful for relay.
#[juniper::graphql_interface(
    Context = Context,
    for = [Organization, User, Event, GroupChat, DirectChat, MembershipRequest],
)]
pub(crate) trait Node {
    fn id(&self) -> Id;
}

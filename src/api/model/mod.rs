//! The domain model types of the API: organizations, users, events, chats and
//! membership requests.

pub(crate) mod chat;
pub(crate) mod event;
pub(crate) mod membership;
pub(crate) mod organization;
pub(crate) mod user;

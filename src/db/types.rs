use juniper::GraphQLEnum;
use postgres_types::{FromSql, ToSql};


/// Represents the `membership_role` type defined in `04-memberships.sql`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSql, ToSql, GraphQLEnum)]
#[postgres(name = "membership_role")]
#[graphql(description = "The role a user has within one organization")]
pub(crate) enum MembershipRole {
    #[postgres(name = "member")]
    Member,
    #[postgres(name = "admin")]
    Admin,
}

impl MembershipRole {
    pub(crate) fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

//! Basic types shared by the whole application.

mod key;

pub(crate) use self::key::Key;

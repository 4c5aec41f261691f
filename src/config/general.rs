#[derive(Debug, confique::Config)]
pub(crate) struct GeneralConfig {
    /// The name of this Agora instance. Used in a few user-facing places, e.g.
    /// the GraphiQL page title.
    #[config(default = "Agora")]
    pub(crate) site_title: String,

    /// Whether new accounts can be registered via the API. You might want to
    /// disable this for closed instances where accounts are created by an
    /// administrator.
    #[config(default = true)]
    pub(crate) allow_registration: bool,

    /// A list of usernames that cannot be registered. Useful to avoid
    /// confusing account names. Agora also has some additional built-in
    /// reserved usernames (e.g. `admin`).
    ///
    /// Example: ["moderator", "agora-team"]
    #[config(default = [])]
    pub(crate) reserved_usernames: Vec<String>,
}

const INTERNAL_RESERVED_USERNAMES: &[&str] = &["admin", "administrator", "root", "system"];

impl GeneralConfig {
    /// Returns an iterator over all reserved usernames, lowercase.
    pub(crate) fn reserved_usernames(&self) -> impl Iterator<Item = &str> {
        self.reserved_usernames
            .iter()
            .map(|s| s.as_str())
            .chain(INTERNAL_RESERVED_USERNAMES.iter().copied())
    }
}

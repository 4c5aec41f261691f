use std::fmt;

use cookie::Cookie;
use hyper::{HeaderMap, header};
use postgres_types::ToSql;
use rand::{CryptoRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use tokio_postgres::{Error as PgError, GenericClient};

use super::{SESSION_COOKIE, base64decode, base64encode};


/// A session ID (random bytes).
///
/// We use 18 bytes = 144 bits of entropy. Most guides recommend using at least
/// 64 bits. 128 bits is more than enough, but we round up to have a number of
/// bytes that can perfectly be encoded as base64 (a multiple of 6).
pub(crate) struct SessionId(pub(crate) Secret<[u8; 18]>);

impl SessionId {
    /// Creates a new, random session ID.
    pub(crate) fn new() -> Self {
        // We use this extra function here to make sure we use a
        // cryptographically secure RNG, even after updating to newer `rand`
        // versions. Right now, we use `thread_rng` and it is cryptographically
        // secure. But if the `rand` authors make `thread_rng` return a
        // non-cryptographically secure RNG in a future major version (a
        // dangerous API decision in my opinion) and if the Agora dev updating
        // the library does not check the changelog, then we would have a
        // problem. This explicit `CryptoRng` bound makes sure that such a
        // change would not silently compile.
        fn generate(mut rng: impl RngCore + CryptoRng) -> [u8; 18] {
            let mut bytes = [0; 18];
            rng.fill_bytes(&mut bytes);
            bytes
        }

        Self(Secret::new(generate(rand::thread_rng())))
    }

    /// Tries to read the session ID from the session cookie. Malformed cookie
    /// values are treated like a missing cookie.
    pub(crate) fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers.get_all(header::COOKIE)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value.trim()))
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .and_then(|cookie| {
                let bytes = base64decode(cookie.value()).ok()?;
                let bytes = <[u8; 18]>::try_from(bytes).ok()?;
                Some(Self(Secret::new(bytes)))
            })
    }

    pub(crate) fn set_cookie(&self, session_duration: std::time::Duration) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, base64encode(self.0.expose_secret())))
            .secure(true)
            .http_only(true)
            .same_site(cookie::SameSite::Lax)
            .path("/")
            .max_age(cookie::time::Duration::try_from(session_duration)
                .unwrap_or(cookie::time::Duration::days(30)))
            .build()
    }

    /// Returns a cookie that, when sent to a browser, removes the session
    /// cookie.
    pub(crate) fn unset_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .secure(true)
            .http_only(true)
            .same_site(cookie::SameSite::Lax)
            .path("/")
            .max_age(cookie::time::Duration::ZERO)
            .build()
    }

    /// Removes this session from the DB. Returns the username of the session's
    /// user if the session existed.
    pub(crate) async fn remove_from_db(
        &self,
        db: &impl GenericClient,
    ) -> Result<Option<String>, PgError> {
        let sql = "delete from user_sessions \
            using users \
            where user_sessions.user_id = users.id \
            and user_sessions.id = $1 \
            returning users.username";
        db.query_opt(sql, &[self as &(dyn ToSql + Sync)])
            .await
            .map(|row| row.map(|row| row.get(0)))
    }
}

impl ToSql for SessionId {
    fn to_sql(
        &self,
        ty: &postgres_types::Type,
        out: &mut bytes::BytesMut,
    ) -> Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        (self.0.expose_secret() as &[u8]).to_sql(ty, out)
    }

    fn accepts(ty: &postgres_types::Type) -> bool {
        <&[u8] as ToSql>::accepts(ty)
    }

    postgres_types::to_sql_checked!();
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("SessionId(REDACTED)")
    }
}


#[cfg(test)]
mod tests {
    use hyper::{HeaderMap, header::{HeaderValue, COOKIE}};
    use secrecy::ExposeSecret;
    use super::{SessionId, base64encode};

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn roundtrip_through_cookie_header() {
        let id = SessionId::new();
        let headers = headers_with_cookie(
            &format!("foo=bar; agora-session={}", base64encode(id.0.expose_secret())),
        );

        let read_back = SessionId::from_headers(&headers).expect("session cookie not found");
        assert_eq!(read_back.0.expose_secret(), id.0.expose_secret());
    }

    #[test]
    fn missing_or_malformed_cookie() {
        assert!(SessionId::from_headers(&HeaderMap::new()).is_none());
        assert!(SessionId::from_headers(&headers_with_cookie("foo=bar")).is_none());

        // Not valid base64.
        assert!(SessionId::from_headers(&headers_with_cookie("agora-session=???")).is_none());

        // Valid base64, but wrong length.
        assert!(SessionId::from_headers(&headers_with_cookie("agora-session=AAAA")).is_none());
    }
}

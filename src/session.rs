use chrono::Utc;
use crypto::sha2::Sha256;
use diesel::sqlite::SqliteConnection;
use jwt::{Header, Registered, Token};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use std::convert::Infallible;
use crate::types::ApiError;
use crate::users::models::User;

pub static SESSION_COOKIE: &str = "session";
static TOKEN_SCHEME: &str = "Token ";

/// Who a request is acting as. Mutating operations go through [`Identity::user`].
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn user(&self) -> Result<&User, ApiError> {
        match *self {
            Identity::Authenticated(ref user) => Ok(user),
            Identity::Anonymous => Err(ApiError::Unauthorized),
        }
    }

    pub fn into_user(self) -> Result<User, ApiError> {
        match self {
            Identity::Authenticated(user) => Ok(user),
            Identity::Anonymous => Err(ApiError::Unauthorized),
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        self.user().ok()
    }

    /// On failure the identity is left as it was.
    pub fn login(
        &mut self,
        email: &str,
        password: &str,
        conn: &mut SqliteConnection,
    ) -> Result<&User, ApiError> {
        let user = User::authenticate(email, password, conn)?;
        info!("user {} logged in", user.username);
        *self = Identity::Authenticated(user);
        self.user()
    }

    pub fn logout(self) -> Result<Identity, ApiError> {
        let user = self.into_user()?;
        info!("user {} logged out", user.username);
        Ok(Identity::Anonymous)
    }
}

/// Signs a session token with the user's password hash, so changing the
/// password invalidates every token issued before.
pub fn issue_token(user: &User, ttl_secs: u64) -> Result<String, ApiError> {
    let now = Utc::now().timestamp() as u64;
    let header = Header::default();
    let claims = Registered {
        iss: Some(user.email.clone()),
        sub: Some(user.id.to_string()),
        iat: Some(now),
        exp: Some(now + ttl_secs),
        ..Default::default()
    };
    let token = Token::new(header, claims);
    token
        .signed(user.password.as_bytes(), Sha256::new())
        .map_err(|_| ApiError::Internal)
}

/// The raw session token a request carried, if any. Resolving it needs the store.
#[derive(Debug, Default, Clone)]
pub struct Session(Option<String>);

impl Session {
    pub fn from_token(token: Option<String>) -> Session {
        Session(token)
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_ref().map(|t| t.as_str())
    }

    /// A valid token resolves to its user; a missing, malformed, forged or
    /// expired one resolves to `Anonymous`.
    pub fn resolve(&self, conn: &mut SqliteConnection) -> Result<Identity, ApiError> {
        let identity = match self.token() {
            Some(token) => match load_from_token(token, conn)? {
                Some(user) => Identity::Authenticated(user),
                None => Identity::Anonymous,
            },
            None => Identity::Anonymous,
        };
        Ok(identity)
    }
}

fn load_from_token(raw: &str, conn: &mut SqliteConnection) -> Result<Option<User>, ApiError> {
    let token = match Token::<Header, Registered>::parse(raw) {
        Ok(token) => token,
        Err(_) => {
            debug!("rejecting unparseable session token");
            return Ok(None);
        }
    };

    let user_id = match token.claims.sub.as_ref().and_then(|sub| sub.parse::<i32>().ok()) {
        Some(user_id) => user_id,
        None => {
            debug!("rejecting session token without a subject");
            return Ok(None);
        }
    };

    let user = match User::load_by_id(user_id, conn) {
        Ok(user) => user,
        Err(ApiError::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };

    if token.claims.iss.as_ref() != Some(&user.email)
        || !token.verify(user.password.as_bytes(), Sha256::new())
    {
        debug!("rejecting session token with a bad signature for user {}", user.id);
        return Ok(None);
    }

    let now = Utc::now().timestamp() as u64;
    match token.claims.exp {
        Some(exp) if exp > now => Ok(Some(user)),
        _ => {
            debug!("rejecting expired session token for user {}", user.id);
            Ok(None)
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let header = request
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix(TOKEN_SCHEME))
            .map(|token| token.trim().to_owned());
        let token = header.or_else(|| {
            request
                .cookies()
                .get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned())
        });
        Outcome::Success(Session::from_token(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::TestDb;

    #[test]
    fn anonymous_cannot_act_or_log_out() {
        assert!(matches!(Identity::Anonymous.user(), Err(ApiError::Unauthorized)));
        assert!(matches!(Identity::Anonymous.logout(), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn login_then_logout() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = User::create("alice", "a@x.com", "pw1", false, &mut conn).unwrap();

        let mut identity = Identity::Anonymous;
        assert!(matches!(
            identity.login("a@x.com", "wrong", &mut conn),
            Err(ApiError::InvalidCredentials)
        ));
        assert_eq!(identity, Identity::Anonymous);

        assert_eq!(identity.login("a@x.com", "pw1", &mut conn).unwrap(), &alice);
        assert_eq!(identity, Identity::Authenticated(alice));

        assert_eq!(identity.logout().unwrap(), Identity::Anonymous);
    }

    #[test]
    fn failed_login_keeps_the_current_user() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = User::create("alice", "a@x.com", "pw1", false, &mut conn).unwrap();

        let mut identity = Identity::Authenticated(alice.clone());
        assert!(identity.login("nobody@x.com", "pw1", &mut conn).is_err());
        assert_eq!(identity.as_user(), Some(&alice));
    }

    #[test]
    fn issued_token_resolves_to_its_user() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = User::create("alice", "a@x.com", "pw1", false, &mut conn).unwrap();

        let token = issue_token(&alice, 60).unwrap();
        let identity = Session::from_token(Some(token)).resolve(&mut conn).unwrap();
        assert_eq!(identity, Identity::Authenticated(alice));
    }

    #[test]
    fn missing_and_garbage_tokens_are_anonymous() {
        let db = TestDb::new();
        let mut conn = db.conn();

        let none = Session::default().resolve(&mut conn).unwrap();
        assert_eq!(none, Identity::Anonymous);

        let garbage = Session::from_token(Some("not.a.jwt".to_owned()))
            .resolve(&mut conn)
            .unwrap();
        assert_eq!(garbage, Identity::Anonymous);
    }

    #[test]
    fn expired_token_is_anonymous() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = User::create("alice", "a@x.com", "pw1", false, &mut conn).unwrap();

        let token = issue_token(&alice, 0).unwrap();
        let identity = Session::from_token(Some(token)).resolve(&mut conn).unwrap();
        assert_eq!(identity, Identity::Anonymous);
    }

    #[test]
    fn token_for_another_subject_does_not_verify() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = User::create("alice", "a@x.com", "pw1", false, &mut conn).unwrap();
        let bob = User::create("bob", "b@x.com", "pw2", false, &mut conn).unwrap();

        let claims = Registered {
            iss: Some(bob.email.clone()),
            sub: Some(bob.id.to_string()),
            exp: Some(Utc::now().timestamp() as u64 + 60),
            ..Default::default()
        };
        let forged = Token::new(Header::default(), claims)
            .signed(alice.password.as_bytes(), Sha256::new())
            .unwrap();

        let identity = Session::from_token(Some(forged)).resolve(&mut conn).unwrap();
        assert_eq!(identity, Identity::Anonymous);
    }
}

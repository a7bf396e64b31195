use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use crate::config::AppConfig;
use crate::db::DbConnection;
use crate::session::{self, Session, SESSION_COOKIE};
use crate::types::{ApiError, ApiResult, Validate, ValidationError};
use crate::utils::serialize_date;
use chrono::NaiveDateTime;

pub mod models;
pub mod password;
mod utils;

use self::models::User;
use self::utils::*;

#[derive(Debug, Deserialize)]
struct RegistrationDetails {
    username: String,
    email: String,
    password: String,
    password_confirmation: String,
}

#[derive(Debug, Deserialize)]
pub struct Registration {
    user: RegistrationDetails,
}

impl Validate for Registration {
    type Error = ValidationError;
    fn validate(self) -> Result<Self, Self::Error> {
        let mut errors = ValidationError::default();

        if let Err(e) = validate_username_re(&self.user.username) {
            errors.merge(e);
        }
        if let Err(e) = validate_email_re(&self.user.email) {
            errors.merge(e);
        }
        if let Err(e) = validate_password(
            &self.user.password,
            &self.user.password_confirmation,
        ) {
            errors.merge(e);
        }

        errors.into_result().map(|_| self)
    }
}

#[derive(Debug, Serialize)]
pub struct UserView {
    username: String,
    email: String,
    #[serde(serialize_with = "serialize_date")]
    joined_at: NaiveDateTime,
    is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl UserView {
    fn new(user: &User, token: Option<String>) -> Self {
        UserView {
            username: user.username.clone(),
            email: user.email.clone(),
            joined_at: user.joined_at,
            is_admin: user.is_admin,
            token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    user: UserView,
}

#[post("/", format = "json", data = "<registration>")]
pub fn register(
    mut connection: DbConnection,
    registration: Json<Registration>,
) -> Result<(Status, Json<UserResponse>), ApiError> {
    let registration = registration.validate()?.into_inner();
    let user = User::create(
        &registration.user.username,
        &registration.user.email,
        &registration.user.password,
        false,
        &mut connection,
    )?;
    let body = UserResponse {
        user: UserView::new(&user, None),
    };
    Ok((Status::Created, Json(body)))
}

#[derive(Debug, Deserialize)]
struct LoginDetails {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    user: LoginDetails,
}

impl Validate for Login {
    type Error = ValidationError;
    fn validate(self) -> Result<Self, Self::Error> {
        let mut errors = ValidationError::default();
        if let Err(e) = validate_email_re(&self.user.email) {
            errors.merge(e);
        }
        if self.user.password.is_empty() {
            errors.add_error("password", "This field is required.");
        }
        errors.into_result().map(|_| self)
    }
}

#[post("/login", format = "json", data = "<login>")]
pub fn login(
    mut connection: DbConnection,
    session: Session,
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    login: Json<Login>,
) -> ApiResult<UserResponse> {
    let login = login.validate()?.into_inner();
    let mut identity = session.resolve(&mut connection)?;
    let user = identity.login(&login.user.email, &login.user.password, &mut connection)?;
    let token = session::issue_token(user, config.session_ttl_secs)?;
    cookies.add(Cookie::build((SESSION_COOKIE, token.clone())).http_only(true));

    let body = UserResponse {
        user: UserView::new(user, Some(token)),
    };
    Ok(Json(body))
}

#[post("/logout")]
pub fn logout(
    mut connection: DbConnection,
    session: Session,
    cookies: &CookieJar<'_>,
) -> Result<Status, ApiError> {
    let identity = session.resolve(&mut connection)?;
    identity.logout()?;
    cookies.remove(Cookie::from(SESSION_COOKIE));
    Ok(Status::NoContent)
}

#[get("/user")]
pub fn current(mut connection: DbConnection, session: Session) -> ApiResult<UserResponse> {
    let identity = session.resolve(&mut connection)?;
    let user = identity.user()?;
    let body = UserResponse {
        user: UserView::new(user, None),
    };
    Ok(Json(body))
}

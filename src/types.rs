use diesel::result::Error as DieselError;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::{json, Json};
use std::collections::HashMap;
use std::io::Error as IoError;
use crate::utils::{try_redirect, try_respond};

/// Path clients are sent to when a mutating operation needs a session.
pub static LOGIN_PATH: &str = "/api/users/login";

pub trait Validate
where
    Self: Sized,
{
    type Error;
    fn validate(self) -> Result<Self, Self::Error>;
}

/// Which unique column a registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Email,
}

impl DuplicateField {
    pub fn key(&self) -> &'static str {
        match *self {
            DuplicateField::Username => "username",
            DuplicateField::Email => "email",
        }
    }

    pub fn message(&self) -> &'static str {
        match *self {
            DuplicateField::Username => "User with given name already exists.",
            DuplicateField::Email => "User with given email already exists.",
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Diesel(DieselError),
    Validation(ValidationError),
    DuplicateUser(Vec<DuplicateField>),
    NotFound,
    InvalidCredentials,
    EmptyContent,
    SelfFollow,
    Internal,
    Unauthorized,
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        match err {
            DieselError::NotFound => ApiError::NotFound,
            err => ApiError::Diesel(err),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> ApiError {
        ApiError::Validation(err)
    }
}

impl From<IoError> for ApiError {
    fn from(_: IoError) -> ApiError {
        ApiError::Internal
    }
}

impl ApiError {
    /// The field-level form of the errors that render inline on a form.
    pub fn validation(&self) -> Option<ValidationError> {
        match *self {
            ApiError::Validation(ref error) => Some(error.clone()),
            ApiError::DuplicateUser(ref fields) => {
                let mut error = ValidationError::default();
                for field in fields {
                    error.add_error(field.key(), field.message());
                }
                Some(error)
            }
            ApiError::InvalidCredentials => Some(ValidationError::from(
                "credentials",
                "Given credential does not exist",
            )),
            ApiError::EmptyContent => Some(ValidationError::from("content", "Post content is empty")),
            ApiError::SelfFollow => Some(ValidationError::from("username", "You cannot follow yourself")),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Default, Clone, PartialEq)]
pub struct ValidationError(HashMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self, key: &str) -> &[String] {
        self.0.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        if let Some(error) = self.validation() {
            let body = json!({ "errors": error });
            return try_respond(req, &body, Status::UnprocessableEntity);
        }

        match self {
            ApiError::NotFound => Err(Status::NotFound),

            ApiError::Unauthorized => {
                let body = json!({
                    "errors": { "session": ["login required"] },
                    "login": LOGIN_PATH,
                });
                try_redirect(req, &body, LOGIN_PATH)
            }

            ApiError::Diesel(error) => {
                error!("storage error: {}", error);
                Err(Status::InternalServerError)
            }

            _ => Err(Status::InternalServerError),
        }
    }
}

impl<T> Validate for Json<T>
where
    T: Validate,
{
    type Error = <T as Validate>::Error;
    fn validate(self) -> Result<Self, Self::Error> {
        let inner = self.into_inner();
        let validated = inner.validate()?;
        Ok(Json(validated))
    }
}

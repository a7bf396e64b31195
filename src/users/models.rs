use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::select;
use diesel::sqlite::SqliteConnection;
use crate::db::schema::users;
use crate::types::{ApiError, DuplicateField};
use crate::utils::serialize_date;

use super::password;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(serialize_with = "serialize_date")]
    pub joined_at: NaiveDateTime,
    pub is_admin: bool,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    username: &'a str,
    email: &'a str,
    password: String,
    joined_at: NaiveDateTime,
    is_admin: bool,
}

impl User {
    /// Registers an account. The uniqueness checks, the insert and the read-back
    /// run in one write transaction, and the table's UNIQUE constraints back them
    /// up, so a collision never leaves a half-written row.
    pub fn create(
        name: &str,
        mail: &str,
        password_raw: &str,
        admin: bool,
        conn: &mut SqliteConnection,
    ) -> Result<User, ApiError> {
        let new_user = NewUser {
            username: name,
            email: mail,
            password: password::hash(password_raw)?,
            joined_at: Utc::now().naive_utc(),
            is_admin: admin,
        };

        let user = conn.immediate_transaction::<_, ApiError, _>(|conn| {
            use crate::db::schema::users::dsl::*;

            let mut taken = Vec::new();
            if select(exists(users.filter(username.eq(name)))).get_result::<bool>(conn)? {
                taken.push(DuplicateField::Username);
            }
            if select(exists(users.filter(email.eq(mail)))).get_result::<bool>(conn)? {
                taken.push(DuplicateField::Email);
            }
            if !taken.is_empty() {
                return Err(ApiError::DuplicateUser(taken));
            }

            diesel::insert_into(users)
                .values(&new_user)
                .execute(conn)
                .map_err(duplicate_user)?;

            Ok(users
                .filter(username.eq(name))
                .select(User::as_select())
                .get_result(conn)?)
        })?;

        info!("registered user {} (id {})", user.username, user.id);
        Ok(user)
    }

    pub fn load_by_id(user_id: i32, conn: &mut SqliteConnection) -> Result<User, ApiError> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .get_result(conn)
            .map_err(|e| e.into())
    }

    pub fn load_by_email(mail: &str, conn: &mut SqliteConnection) -> Result<User, ApiError> {
        use crate::db::schema::users::dsl::*;
        users
            .filter(email.eq(mail))
            .select(User::as_select())
            .get_result(conn)
            .map_err(|e| e.into())
    }

    /// Exact-match username lookup.
    pub fn load_by_name(name: &str, conn: &mut SqliteConnection) -> Result<User, ApiError> {
        use crate::db::schema::users::dsl::*;
        users
            .filter(username.eq(name))
            .select(User::as_select())
            .get_result(conn)
            .map_err(|e| e.into())
    }

    /// Unknown email and wrong password both come back as `InvalidCredentials`.
    pub fn authenticate(
        mail: &str,
        password_raw: &str,
        conn: &mut SqliteConnection,
    ) -> Result<User, ApiError> {
        let user = match User::load_by_email(mail, conn) {
            Ok(user) => user,
            Err(ApiError::NotFound) => {
                password::verify_dummy(password_raw);
                return Err(ApiError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if password::verify(password_raw, &user.password)? {
            Ok(user)
        } else {
            Err(ApiError::InvalidCredentials)
        }
    }
}

// A UNIQUE violation that slipped past the pre-checks still names its column in
// SQLite's message, e.g. "UNIQUE constraint failed: users.email".
fn duplicate_user(err: DieselError) -> ApiError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
            warn!("unique violation on insert: {}", info.message());
            if info.message().contains("users.email") {
                ApiError::DuplicateUser(vec![DuplicateField::Email])
            } else {
                ApiError::DuplicateUser(vec![DuplicateField::Username])
            }
        }
        err => err.into(),
    }
}

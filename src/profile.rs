use crate::db::schema::{relationships, users};
use crate::db::DbConnection;
use crate::session::Session;
use crate::types::*;
use crate::users::models::User;
use crate::utils::serialize_date;
use chrono::NaiveDateTime;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::select;
use diesel::sqlite::SqliteConnection;
use rocket::serde::json::Json;
use rocket::{delete, get, post};
use std::borrow::Cow;

#[derive(Debug, Serialize)]
pub struct ProfileResponse<'a> {
    profile: Profile<'a>,
}

#[derive(Debug, Serialize)]
pub struct Profile<'a> {
    pub username: Cow<'a, str>,
    #[serde(serialize_with = "serialize_date")]
    pub joined_at: NaiveDateTime,
    pub following: bool,
    pub followers_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub username: String,
    #[serde(serialize_with = "serialize_date")]
    pub joined_at: NaiveDateTime,
}

impl From<User> for ProfileSummary {
    fn from(user: User) -> Self {
        ProfileSummary {
            username: user.username,
            joined_at: user.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfilesResponse {
    profiles: Vec<ProfileSummary>,
}

/// Adds the edge `from -> to`. Following someone twice is a no-op, and the
/// conflict is resolved by the store rather than by checking first.
pub fn follow(from: &User, to: &User, conn: &mut SqliteConnection) -> Result<(), ApiError> {
    use crate::db::schema::relationships::dsl::*;

    if from.id == to.id {
        return Err(ApiError::SelfFollow);
    }
    let inserted = diesel::insert_into(relationships)
        .values((from_user_id.eq(from.id), to_user_id.eq(to.id)))
        .on_conflict((from_user_id, to_user_id))
        .do_nothing()
        .execute(conn)?;
    if inserted > 0 {
        info!("{} now follows {}", from.username, to.username);
    }
    Ok(())
}

/// Removes the edge `from -> to` if there is one.
pub fn unfollow(from: &User, to: &User, conn: &mut SqliteConnection) -> Result<(), ApiError> {
    use crate::db::schema::relationships::dsl::*;

    let deleted = diesel::delete(
        relationships
            .filter(from_user_id.eq(from.id))
            .filter(to_user_id.eq(to.id)),
    ).execute(conn)?;
    if deleted > 0 {
        info!("{} unfollowed {}", from.username, to.username);
    }
    Ok(())
}

pub fn is_following(from: &User, to: &User, conn: &mut SqliteConnection) -> Result<bool, ApiError> {
    use crate::db::schema::relationships::dsl::*;

    let query = select(exists(
        relationships
            .filter(from_user_id.eq(from.id))
            .filter(to_user_id.eq(to.id)),
    ));
    Ok(query.get_result::<bool>(conn)?)
}

/// Everyone `user` follows, most recently joined first.
pub fn following(user: &User, conn: &mut SqliteConnection) -> Result<Vec<User>, ApiError> {
    Ok(users::table
        .inner_join(relationships::table.on(relationships::to_user_id.eq(users::id)))
        .filter(relationships::from_user_id.eq(user.id))
        .order((users::joined_at.desc(), users::id.desc()))
        .select(User::as_select())
        .load(conn)?)
}

/// Everyone following `user`, most recently joined first.
pub fn followers(user: &User, conn: &mut SqliteConnection) -> Result<Vec<User>, ApiError> {
    Ok(users::table
        .inner_join(relationships::table.on(relationships::from_user_id.eq(users::id)))
        .filter(relationships::to_user_id.eq(user.id))
        .order((users::joined_at.desc(), users::id.desc()))
        .select(User::as_select())
        .load(conn)?)
}

fn counts(user: &User, conn: &mut SqliteConnection) -> Result<(i64, i64), ApiError> {
    use crate::db::schema::relationships::dsl::*;

    let followers_count = relationships
        .filter(to_user_id.eq(user.id))
        .count()
        .get_result::<i64>(conn)?;
    let following_count = relationships
        .filter(from_user_id.eq(user.id))
        .count()
        .get_result::<i64>(conn)?;
    Ok((followers_count, following_count))
}

fn full_profile(
    viewer: Option<&User>,
    user: User,
    conn: &mut SqliteConnection,
) -> Result<Profile<'static>, ApiError> {
    let following = match viewer {
        Some(current) => is_following(current, &user, conn)?,
        None => false,
    };
    let (followers_count, following_count) = counts(&user, conn)?;
    Ok(Profile {
        username: Cow::Owned(user.username),
        joined_at: user.joined_at,
        following,
        followers_count,
        following_count,
    })
}

#[get("/profiles/<name>")]
pub fn profile(
    mut connection: DbConnection,
    session: Session,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let identity = session.resolve(&mut connection)?;
    let user = User::load_by_name(name, &mut connection)?;
    let profile = full_profile(identity.as_user(), user, &mut connection)?;
    Ok(Json(ProfileResponse { profile }))
}

#[get("/profiles/<name>/following")]
pub fn following_list(mut connection: DbConnection, name: &str) -> ApiResult<ProfilesResponse> {
    let user = User::load_by_name(name, &mut connection)?;
    let list = following(&user, &mut connection)?;
    let profiles = list.into_iter().map(ProfileSummary::from).collect();
    Ok(Json(ProfilesResponse { profiles }))
}

#[get("/profiles/<name>/followers")]
pub fn followers_list(mut connection: DbConnection, name: &str) -> ApiResult<ProfilesResponse> {
    let user = User::load_by_name(name, &mut connection)?;
    let list = followers(&user, &mut connection)?;
    let profiles = list.into_iter().map(ProfileSummary::from).collect();
    Ok(Json(ProfilesResponse { profiles }))
}

#[delete("/profiles/<name>/follow")]
pub fn unfollow_route(
    mut connection: DbConnection,
    session: Session,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let identity = session.resolve(&mut connection)?;
    let current = identity.user()?;
    let target = User::load_by_name(name, &mut connection)?;
    unfollow(current, &target, &mut connection)?;
    let profile = full_profile(Some(current), target, &mut connection)?;
    Ok(Json(ProfileResponse { profile }))
}

#[post("/profiles/<name>/follow")]
pub fn follow_route(
    mut connection: DbConnection,
    session: Session,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let identity = session.resolve(&mut connection)?;
    let current = identity.user()?;
    let target = User::load_by_name(name, &mut connection)?;
    follow(current, &target, &mut connection)?;
    let profile = full_profile(Some(current), target, &mut connection)?;
    Ok(Json(ProfileResponse { profile }))
}

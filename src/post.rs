use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rocket::serde::json::Json;
use rocket::{get, post};
use crate::db::schema::posts;
use crate::db::DbConnection;
use crate::feed;
use crate::session::Session;
use crate::types::*;
use crate::users::models::User;
use crate::utils::serialize_date;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations, Selectable)]
#[diesel(belongs_to(User))]
#[diesel(table_name = posts)]
pub struct Post {
    pub id: i32,
    pub user_id: i32,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = posts)]
struct NewPost<'a> {
    user_id: i32,
    content: &'a str,
    timestamp: NaiveDateTime,
}

impl Post {
    pub fn create(author: &User, content_raw: &str, conn: &mut SqliteConnection) -> Result<Post, ApiError> {
        Post::create_at(author, content_raw, Utc::now().naive_utc(), conn)
    }

    /// Stores trimmed `content_raw` under `author`, stamped with `at`.
    pub fn create_at(
        author: &User,
        content_raw: &str,
        at: NaiveDateTime,
        conn: &mut SqliteConnection,
    ) -> Result<Post, ApiError> {
        let content = content_raw.trim();
        if content.is_empty() {
            return Err(ApiError::EmptyContent);
        }
        let new_post = NewPost {
            user_id: author.id,
            content,
            timestamp: at,
        };

        let post = conn.transaction::<_, ApiError, _>(|conn| {
            diesel::insert_into(posts::table).values(&new_post).execute(conn)?;
            Ok(posts::table
                .filter(posts::user_id.eq(author.id))
                .order(posts::id.desc())
                .select(Post::as_select())
                .first(conn)?)
        })?;
        info!("{} posted {}", author.username, post.id);
        Ok(post)
    }

    /// Everything `author` wrote, newest first.
    pub fn by_user(author: &User, conn: &mut SqliteConnection) -> Result<Vec<Post>, ApiError> {
        Ok(Post::belonging_to(author)
            .order((posts::timestamp.desc(), posts::id.desc()))
            .select(Post::as_select())
            .load(conn)?)
    }
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: i32,
    pub content: String,
    #[serde(serialize_with = "serialize_date")]
    pub timestamp: NaiveDateTime,
    pub author: String,
}

impl From<(Post, User)> for PostView {
    fn from(post_and_author: (Post, User)) -> Self {
        let (post, author) = post_and_author;
        PostView {
            id: post.id,
            content: post.content,
            timestamp: post.timestamp,
            author: author.username,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub post: PostView,
}

#[derive(Debug, Deserialize)]
pub struct PostDetails {
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePost {
    post: PostDetails,
}

#[post("/posts", format = "json", data = "<create>")]
pub fn create(
    mut connection: DbConnection,
    session: Session,
    create: Json<CreatePost>,
) -> ApiResult<PostResponse> {
    let identity = session.resolve(&mut connection)?;
    let author = identity.into_user()?;
    let create = create.into_inner();
    let post = Post::create(&author, &create.post.content, &mut connection)?;
    Ok(Json(PostResponse {
        post: (post, author).into(),
    }))
}

#[get("/posts/<id>")]
pub fn view(mut connection: DbConnection, id: i32) -> ApiResult<PostResponse> {
    let post = feed::single_post(id, &mut connection)?;
    let author = User::load_by_id(post.user_id, &mut connection)?;
    Ok(Json(PostResponse {
        post: (post, author).into(),
    }))
}

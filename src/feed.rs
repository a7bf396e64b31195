//! Read paths over posts: the home stream, a single user's timeline, one post,
//! and the most recent posts overall. Every list is ordered newest first with
//! the post id breaking timestamp ties, and capped at a caller-supplied limit.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rocket::serde::json::Json;
use rocket::{get, State};
use std::collections::HashMap;
use crate::config::AppConfig;
use crate::db::schema::{posts, relationships, users};
use crate::db::DbConnection;
use crate::post::{Post, PostView};
use crate::session::Session;
use crate::types::*;
use crate::users::models::User;

/// `user`'s own posts together with those of everyone they follow.
pub fn personal_stream(user: &User, limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Post>, ApiError> {
    let followed = relationships::table
        .filter(relationships::from_user_id.eq(user.id))
        .select(relationships::to_user_id);

    Ok(posts::table
        .filter(posts::user_id.eq(user.id).or(posts::user_id.eq_any(followed)))
        .order((posts::timestamp.desc(), posts::id.desc()))
        .limit(limit)
        .select(Post::as_select())
        .load(conn)?)
}

pub fn user_timeline(user: &User, limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Post>, ApiError> {
    Ok(posts::table
        .filter(posts::user_id.eq(user.id))
        .order((posts::timestamp.desc(), posts::id.desc()))
        .limit(limit)
        .select(Post::as_select())
        .load(conn)?)
}

pub fn single_post(post_id: i32, conn: &mut SqliteConnection) -> Result<Post, ApiError> {
    posts::table
        .find(post_id)
        .select(Post::as_select())
        .get_result(conn)
        .map_err(|e| e.into())
}

pub fn global_recent(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Post>, ApiError> {
    Ok(posts::table
        .order((posts::timestamp.desc(), posts::id.desc()))
        .limit(limit)
        .select(Post::as_select())
        .load(conn)?)
}

/// Pairs each post with its author using one lookup for all of them.
pub fn with_authors(list: Vec<Post>, conn: &mut SqliteConnection) -> Result<Vec<(Post, User)>, ApiError> {
    let mut author_ids = list.iter().map(|post| post.user_id).collect::<Vec<i32>>();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors = users::table
        .filter(users::id.eq_any(author_ids))
        .select(User::as_select())
        .load(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect::<HashMap<_, _>>();

    list.into_iter()
        .map(|post| match authors.get(&post.user_id) {
            Some(author) => Ok((post, author.clone())),
            None => Err(ApiError::Internal),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub posts: Vec<PostView>,
}

fn render(list: Vec<Post>, conn: &mut SqliteConnection) -> ApiResult<StreamResponse> {
    let posts = with_authors(list, conn)?
        .into_iter()
        .map(PostView::from)
        .collect();
    Ok(Json(StreamResponse { posts }))
}

#[get("/")]
pub fn index(mut connection: DbConnection, config: &State<AppConfig>) -> ApiResult<StreamResponse> {
    let list = global_recent(config.stream_limit, &mut connection)?;
    render(list, &mut connection)
}

#[get("/stream")]
pub fn stream(
    mut connection: DbConnection,
    session: Session,
    config: &State<AppConfig>,
) -> ApiResult<StreamResponse> {
    let identity = session.resolve(&mut connection)?;
    let user = identity.user()?;
    let list = personal_stream(user, config.stream_limit, &mut connection)?;
    render(list, &mut connection)
}

/// Someone else's name shows their timeline; your own shows your stream.
#[get("/stream/<name>")]
pub fn user_stream(
    mut connection: DbConnection,
    session: Session,
    config: &State<AppConfig>,
    name: &str,
) -> ApiResult<StreamResponse> {
    let identity = session.resolve(&mut connection)?;
    let list = match identity.as_user() {
        Some(current) if current.username == name => {
            personal_stream(current, config.stream_limit, &mut connection)?
        }
        _ => {
            let user = User::load_by_name(name, &mut connection)?;
            user_timeline(&user, config.stream_limit, &mut connection)?
        }
    };
    render(list, &mut connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STREAM_LIMIT as DEFAULT_LIMIT;
    use crate::db::testing::TestDb;
    use crate::profile::{follow, unfollow};
    use chrono::NaiveDate;

    fn user(name: &str, conn: &mut SqliteConnection) -> User {
        User::create(name, &format!("{}@x.com", name), "pw", false, conn).unwrap()
    }

    fn at(second: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|day| day.and_hms_opt(12, 0, second))
            .unwrap()
    }

    fn ids(list: &[Post]) -> Vec<i32> {
        list.iter().map(|post| post.id).collect()
    }

    #[test]
    fn equal_timestamps_fall_back_to_newest_id() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);

        let p1 = Post::create_at(&alice, "p1", at(1), &mut conn).unwrap();
        let p2 = Post::create_at(&alice, "p2", at(2), &mut conn).unwrap();
        let p3 = Post::create_at(&alice, "p3", at(2), &mut conn).unwrap();

        let timeline = user_timeline(&alice, DEFAULT_LIMIT, &mut conn).unwrap();
        assert_eq!(ids(&timeline), vec![p3.id, p2.id, p1.id]);
        assert_eq!(Post::by_user(&alice, &mut conn).unwrap(), timeline);
    }

    #[test]
    fn personal_stream_is_own_plus_followed_and_nothing_else() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);
        let bob = user("bob", &mut conn);
        let carol = user("carol", &mut conn);
        let dave = user("dave", &mut conn);
        follow(&alice, &bob, &mut conn).unwrap();
        follow(&alice, &carol, &mut conn).unwrap();
        follow(&dave, &alice, &mut conn).unwrap();

        let a = Post::create_at(&alice, "a", at(1), &mut conn).unwrap();
        let b = Post::create_at(&bob, "b", at(2), &mut conn).unwrap();
        let c = Post::create_at(&carol, "c", at(3), &mut conn).unwrap();
        Post::create_at(&dave, "d", at(4), &mut conn).unwrap();

        let stream = personal_stream(&alice, DEFAULT_LIMIT, &mut conn).unwrap();
        assert_eq!(ids(&stream), vec![c.id, b.id, a.id]);

        unfollow(&alice, &carol, &mut conn).unwrap();
        let stream = personal_stream(&alice, DEFAULT_LIMIT, &mut conn).unwrap();
        assert_eq!(ids(&stream), vec![b.id, a.id]);
    }

    #[test]
    fn stream_of_someone_following_nobody_is_their_own_posts() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);
        let bob = user("bob", &mut conn);
        let mine = Post::create_at(&alice, "mine", at(1), &mut conn).unwrap();
        Post::create_at(&bob, "theirs", at(2), &mut conn).unwrap();

        assert_eq!(personal_stream(&alice, DEFAULT_LIMIT, &mut conn).unwrap(), vec![mine]);
    }

    #[test]
    fn lists_are_capped_at_the_limit() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);
        let bob = user("bob", &mut conn);
        follow(&alice, &bob, &mut conn).unwrap();
        for second in 0..6 {
            Post::create_at(&alice, "a", at(second), &mut conn).unwrap();
            Post::create_at(&bob, "b", at(second), &mut conn).unwrap();
        }

        let stream = personal_stream(&alice, 5, &mut conn).unwrap();
        assert_eq!(stream.len(), 5);
        assert_eq!(stream[0].timestamp, at(5));

        assert_eq!(user_timeline(&bob, 3, &mut conn).unwrap().len(), 3);
        assert_eq!(global_recent(4, &mut conn).unwrap().len(), 4);
        assert_eq!(global_recent(DEFAULT_LIMIT, &mut conn).unwrap().len(), 12);
    }

    #[test]
    fn global_recent_spans_all_users() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);
        let bob = user("bob", &mut conn);
        let a = Post::create_at(&alice, "a", at(1), &mut conn).unwrap();
        let b = Post::create_at(&bob, "b", at(2), &mut conn).unwrap();

        assert_eq!(global_recent(DEFAULT_LIMIT, &mut conn).unwrap(), vec![b, a]);
    }

    #[test]
    fn single_post_by_id() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);
        let post = Post::create(&alice, "hello", &mut conn).unwrap();

        assert_eq!(single_post(post.id, &mut conn).unwrap(), post);
        assert!(matches!(single_post(post.id + 1, &mut conn), Err(ApiError::NotFound)));
    }

    #[test]
    fn authors_are_attached_in_order() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let alice = user("alice", &mut conn);
        let bob = user("bob", &mut conn);
        Post::create_at(&alice, "a1", at(1), &mut conn).unwrap();
        Post::create_at(&bob, "b", at(2), &mut conn).unwrap();
        Post::create_at(&alice, "a2", at(3), &mut conn).unwrap();

        let list = global_recent(DEFAULT_LIMIT, &mut conn).unwrap();
        let names: Vec<_> = with_authors(list, &mut conn)
            .unwrap()
            .into_iter()
            .map(|(post, author)| format!("{}:{}", author.username, post.content))
            .collect();
        assert_eq!(names, vec!["alice:a2", "bob:b", "alice:a1"]);
    }
}

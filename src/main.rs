#[macro_use]
extern crate diesel;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod config;
mod db;
mod feed;
mod post;
mod profile;
mod session;
mod types;
mod users;
mod utils;


use config::AppConfig;
use rocket::fairing::AdHoc;
use rocket::request::Request;
use rocket::{catch, catchers, launch, routes, Build, Rocket};
use serde_json::{json, Value};

#[catch(400)]
fn bad_request(_req: &Request) -> Value {
    json!({
        "errors": [
            "bad request"
        ]
    })
}

#[catch(422)]
fn handle_422(_req: &Request) -> Value {
    json!({
        "errors": [
            "unprocessable entity"
        ]
    })
}

#[catch(404)]
fn not_found(_req: &Request) -> Value {
    json!({
        "errors": [
            "entity not found"
        ]
    })
}

#[catch(503)]
fn unavailable(_req: &Request) -> Value {
    json!({
        "errors": [
            "service unavailable"
        ]
    })
}

/// Routes and catchers; the caller supplies the managed pool and config.
fn app(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/users", routes![users::register, users::login, users::logout])
        .mount("/api", routes![users::current])
        .mount("/api", routes![feed::index, feed::stream, feed::user_stream])
        .mount("/api", routes![post::create, post::view])
        .mount(
            "/api",
            routes![
                profile::profile,
                profile::following_list,
                profile::followers_list,
                profile::follow_route,
                profile::unfollow_route
            ],
        )
        .register("/", catchers![bad_request, not_found, handle_422, unavailable])
}

#[launch]
fn rocket() -> _ {
    dotenv::dotenv().ok();
    app(rocket::custom(config::figment()))
        .attach(AdHoc::config::<AppConfig>())
        .attach(AdHoc::try_on_ignite("Database", db::stage))
}

use chrono::{NaiveDateTime, SecondsFormat};
use rocket::http::{Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::{Json, Value};
use serde::Serializer;

pub fn try_respond(req: &Request, json: &Value, status: Status) -> response::Result<'static> {
    Json(json.clone())
        .respond_to(req)
        .and_then(|resp| Response::build_from(resp).status(status).ok())
}

/// A `303 See Other` to `location`, still carrying a JSON body for API clients.
pub fn try_redirect(req: &Request, json: &Value, location: &'static str) -> response::Result<'static> {
    Json(json.clone()).respond_to(req).and_then(|resp| {
        Response::build_from(resp)
            .status(Status::SeeOther)
            .header(Header::new("Location", location))
            .ok()
    })
}

pub fn serialize_date<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = date.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true);
    serializer.serialize_str(&s)
}

//! PostgREST-backed [`RecordTable`] and the email one-time-password sign-in
//! that produces a [`Session`] for it.

use log::{debug, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::app_response::{AppResponse, AppResult};
use crate::config::RemoteConfig;
use crate::remote_db::{NewRow, RecordTable, RemoteRow, RowPatch, Session};

const SELECT_COLUMNS: &str = "id,created_at,collection,date,data";
const LIST_ORDER: &str = "date.desc,created_at.desc";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct RestTable {
    config: RemoteConfig,
    client: Client,
}

impl RestTable {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn request(&self, method: Method, session: &Session) -> RequestBuilder {
        self.client
            .request(method, self.config.rest_url())
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
    }
}

impl RecordTable for RestTable {
    fn select(&self, session: &Session, collection: &str) -> AppResult<Vec<RemoteRow>> {
        let collection_filter = format!("eq.{collection}");
        let user_filter = format!("eq.{}", session.user_id);
        let response = self
            .request(Method::GET, session)
            .query(&[
                ("select", SELECT_COLUMNS),
                ("collection", collection_filter.as_str()),
                ("user_id", user_filter.as_str()),
                ("order", LIST_ORDER),
            ])
            .send()?;
        read_json(response)
    }

    fn insert(&self, session: &Session, rows: &[NewRow]) -> AppResult<Vec<RemoteRow>> {
        debug!("Inserting {} row(s)", rows.len());
        let response = self
            .request(Method::POST, session)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()?;
        read_json(response)
    }

    fn update(&self, session: &Session, id: &str, patch: &RowPatch) -> AppResult<RemoteRow> {
        let id_filter = format!("eq.{id}");
        let response = self
            .request(Method::PATCH, session)
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT)
            .json(patch)
            .send()?;
        read_json(response)
    }

    fn delete(&self, session: &Session, id: &str) -> AppResult<()> {
        let id_filter = format!("eq.{id}");
        let response = self
            .request(Method::DELETE, session)
            .query(&[("id", id_filter.as_str())])
            .send()?;
        check_status(response).map(|_| ())
    }
}

/// Passwordless email sign-in against the hosted auth service.
pub struct RestAuth {
    config: RemoteConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    access_token: String,
    user: AuthUser,
}

impl RestAuth {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Emails a sign-in link/code. `redirect_to` is where the link lands.
    pub fn send_magic_link(&self, email: &str, redirect_to: Option<&str>) -> AppResult<()> {
        let mut request = self
            .client
            .post(self.config.auth_url("otp"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "create_user": true }));
        if let Some(redirect) = redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }
        check_status(request.send()?)?;
        debug!("Sign-in link sent");
        Ok(())
    }

    /// Exchanges the emailed one-time code for a session.
    pub fn verify_otp(&self, email: &str, token: &str) -> AppResult<Session> {
        let response = self
            .client
            .post(self.config.auth_url("verify"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "type": "email", "email": email, "token": token }))
            .send()?;
        let verified: VerifyResponse = read_json(response)?;
        Ok(Session {
            user_id: verified.user.id,
            access_token: verified.access_token,
            email: verified.user.email.or_else(|| Some(email.to_string())),
        })
    }
}

fn read_json<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    let response = check_status(response)?;
    let body = response.text()?;
    serde_json::from_str(&body).map_err(AppResponse::from)
}

fn check_status(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<JsonValue>(&body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(JsonValue::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));

    warn!("Backend rejected request with {status}: {message}");
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> AppResponse {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppResponse::Unauthorized(message),
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => AppResponse::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppResponse::ValidationError(message)
        }
        _ => AppResponse::DatabaseError(message),
    }
}

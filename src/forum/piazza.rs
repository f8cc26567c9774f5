//! HTTP client for the forum's JSON-RPC API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::models::{FeedPage, RawContent, RpcEnvelope, UserStatus};
use super::{Course, ForumClient, ForumError, Post};
use crate::constants::{HTTP_TIMEOUT, USER_AGENT};
use crate::thread::ThreadNode;

/// Cookie set at login whose value doubles as the CSRF token.
const SESSION_COOKIE: &str = "session_id";

/// Forum client speaking `POST <api_url>?method=<name>` with a JSON body.
pub struct PiazzaClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    api_url: url::Url,
    logged_in: AtomicBool,
}

impl PiazzaClient {
    /// Build a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(api_url: &str) -> Result<Self, ForumError> {
        let api_url = url::Url::parse(api_url).map_err(|e| ForumError::Api {
            method: "client setup".to_string(),
            message: format!("invalid API URL {api_url}: {e}"),
        })?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            jar,
            api_url,
            logged_in: AtomicBool::new(false),
        })
    }

    /// Sign in with email and password. The session lives in the cookie jar.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the credentials are rejected.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ForumError> {
        let _: Value = self
            .call("user.login", json!({ "email": email, "pass": password }))
            .await?;
        self.logged_in.store(true, Ordering::SeqCst);
        info!(email = %email, "Logged in");
        Ok(())
    }

    fn ensure_logged_in(&self) -> Result<(), ForumError> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ForumError::NotLoggedIn)
        }
    }

    fn csrf_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.api_url)?;
        let cookies = cookies.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ForumError> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut().append_pair("method", method);

        let mut request = self
            .client
            .post(url)
            .json(&json!({ "method": method, "params": params }));
        if let Some(token) = self.csrf_token() {
            request = request.header("CSRF-Token", token);
        }

        debug!(method, "Calling forum API");
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ForumError::Status(response.status()));
        }

        let body = response.text().await?;
        let envelope: RpcEnvelope<T> =
            serde_json::from_str(&body).map_err(|source| ForumError::Decode {
                method: method.to_string(),
                source,
            })?;

        if let Some(message) = envelope.error {
            return Err(ForumError::Api {
                method: method.to_string(),
                message,
            });
        }
        envelope.result.ok_or_else(|| ForumError::Api {
            method: method.to_string(),
            message: "response had no result".to_string(),
        })
    }

    async fn fetch_content(&self, course: &Course, nr: u64) -> Result<RawContent, ForumError> {
        self.ensure_logged_in()?;
        self.call(
            "content.get",
            json!({ "cid": nr.to_string(), "nid": course.nid }),
        )
        .await
    }
}

#[async_trait]
impl ForumClient for PiazzaClient {
    async fn list_courses(&self) -> Result<Vec<Course>, ForumError> {
        self.ensure_logged_in()?;
        let status: UserStatus = self.call("user.status", json!({})).await?;
        Ok(status.networks.into_iter().map(Course::from).collect())
    }

    async fn get_page(
        &self,
        course: &Course,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, ForumError> {
        self.ensure_logged_in()?;
        let page: FeedPage = self
            .call(
                "network.get_my_feed",
                json!({
                    "nid": course.nid,
                    "limit": limit,
                    "offset": offset,
                    "sort": "updated",
                }),
            )
            .await?;
        Ok(page.feed.into_iter().map(Post::from).collect())
    }

    async fn get_post_tree(&self, course: &Course, nr: u64) -> Result<ThreadNode, ForumError> {
        Ok(self.fetch_content(course, nr).await?.into_thread())
    }

    async fn post_reply(&self, course: &Course, nr: u64, text: &str) -> Result<(), ForumError> {
        let post = self.fetch_content(course, nr).await?;
        let _: Value = self
            .call(
                "content.create",
                json!({
                    "cid": post.id,
                    "nid": course.nid,
                    "type": "followup",
                    "subject": text,
                    "content": "",
                    "anonymous": "no",
                }),
            )
            .await?;
        info!(course = %course.nid, nr, "Posted followup");
        Ok(())
    }
}

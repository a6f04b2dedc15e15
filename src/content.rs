//! Blog-content API client.
//!
//! SYSTEM CONTEXT
//! ==============
//! The public listing and detail views read `GET /blogs`, `GET /blog/{slug}`
//! and `GET /about` anonymously. The admin view creates posts with
//! `POST /blogs`, which the API gateway guards with the id-token bearer
//! header taken from the [`SessionStore`].
//!
//! DESIGN
//! ======
//! The client refuses to send a protected request without a valid session,
//! so an expired session fails locally instead of as a 401 round trip.
//! Response bodies are parsed by pure functions for testability.

#[cfg(test)]
#[path = "content_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigError, HttpTimeouts};
use crate::session::SessionStore;

const CREATE_FAILED: &str = "Failed to create blog post";

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("{0}")]
    Invalid(String),
    #[error("blog api request failed: {0}")]
    Request(String),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("blog api response parse failed: {0}")]
    Parse(String),
}

// =============================================================================
// TYPES
// =============================================================================

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogCard {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publish_date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
}

/// Full post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    #[serde(flatten)]
    pub card: BlogCard,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct About {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub social: BTreeMap<String, String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "draft",
            Self::Published => "published",
        })
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(format!("unknown post status '{other}' (expected 'draft' or 'published')")),
        }
    }
}

/// Admin draft for `POST /blogs`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub slug: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub content: String,
    pub tags: Vec<String>,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
}

impl NewPost {
    /// Add a trimmed tag unless it is blank or already present.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_owned());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    /// Fill an empty slug from the title.
    pub fn ensure_slug(&mut self) {
        if self.slug.trim().is_empty() {
            self.slug = slugify(&self.title);
        }
    }

    /// Local checks the API would otherwise reject.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Invalid`] naming the missing fields or the
    /// bad slug.
    pub fn validate(&self) -> Result<(), ContentError> {
        let missing: Vec<&str> = [
            ("slug", &self.slug),
            ("title", &self.title),
            ("author", &self.author),
            ("summary", &self.summary),
            ("content", &self.content),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ContentError::Invalid(format!("Missing required fields: {}", missing.join(", "))));
        }
        if !is_valid_slug(&self.slug) {
            return Err(ContentError::Invalid(
                "Invalid slug format. Use only alphanumeric characters and hyphens.".into(),
            ));
        }
        Ok(())
    }
}

/// `POST /blogs` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPost {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// URL-friendly slug from a title: `"Hello, World!"` -> `"hello-world"`.
#[must_use]
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    let mut slug = String::with_capacity(kept.len());
    for c in kept.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_owned()
}

#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().all(|c| c.is_alphanumeric() || c == '-')
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ContentClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ContentClient {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, ConfigError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ConfigError::Parse(format!("invalid blog api url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Parse(format!("blog api url '{base_url}' must be an http(s) base url")));
        }
        Ok(Self { http: timeouts.client()?, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ContentError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ContentError::Request(format!("'{}' cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<(u16, String), ContentError> {
        let url = self.endpoint(segments)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ContentError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ContentError::Request(e.to_string()))?;
        Ok((status, text))
    }

    /// `GET /blogs`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or an
    /// undecodable body.
    pub async fn list_cards(&self) -> Result<Vec<BlogCard>, ContentError> {
        let (status, text) = self.get(&["blogs"]).await?;
        ensure_success(status, &text)?;
        parse_cards(&text)
    }

    /// `GET /blog/{slug}`. `Ok(None)` for an unknown slug.
    ///
    /// # Errors
    ///
    /// Same as [`Self::list_cards`].
    pub async fn fetch_post(&self, slug: &str) -> Result<Option<BlogPost>, ContentError> {
        let (status, text) = self.get(&["blog", slug]).await?;
        if status == 404 {
            tracing::debug!(slug, "blog post not found");
            return Ok(None);
        }
        ensure_success(status, &text)?;
        parse_json(&text).map(Some)
    }

    /// `GET /about`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::list_cards`].
    pub async fn fetch_about(&self) -> Result<About, ContentError> {
        let (status, text) = self.get(&["about"]).await?;
        ensure_success(status, &text)?;
        parse_json(&text)
    }

    /// `POST /blogs` with the session's bearer header.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Invalid`] before any request for a bad draft,
    /// [`ContentError::NotAuthenticated`] without a valid session, and
    /// [`ContentError::Rejected`] carrying the API's `error` message for a
    /// non-2xx response.
    pub async fn create_post(&self, store: &dyn SessionStore, post: &NewPost) -> Result<CreatedPost, ContentError> {
        post.validate()?;
        let Some(auth_header) = store.auth_header().await else {
            tracing::info!("refusing to create post without a session");
            return Err(ContentError::NotAuthenticated);
        };

        let url = self.endpoint(&["blogs"])?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .json(post)
            .send()
            .await
            .map_err(|e| ContentError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ContentError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            let message = rejection_message(&text);
            tracing::warn!(status, slug = %post.slug, %message, "blog api rejected post");
            return Err(ContentError::Rejected { status, message });
        }
        let created: CreatedPost = parse_json(&text)?;
        tracing::info!(slug = %post.slug, status = %created.status, "blog post created");
        Ok(created)
    }
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Deserialize)]
struct CardsResponse {
    #[serde(default)]
    posts: Vec<BlogCard>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

fn ensure_success(status: u16, body: &str) -> Result<(), ContentError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(ContentError::Request(format!("HTTP {status}: {}", body.trim())))
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ContentError> {
    serde_json::from_str(text).map_err(|e| ContentError::Parse(e.to_string()))
}

fn parse_cards(text: &str) -> Result<Vec<BlogCard>, ContentError> {
    parse_json::<CardsResponse>(text).map(|r| r.posts)
}

fn rejection_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error: Some(message) }) if !message.trim().is_empty() => message,
        _ => CREATE_FAILED.to_owned(),
    }
}

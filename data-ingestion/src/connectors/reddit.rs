use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::config::RedditConfig;
use common::feedback::datetime_from_epoch;
use common::DELETED_AUTHOR;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ContentSource, SourceComment};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const PERMALINK_BASE: &str = "https://www.reddit.com";

/// Refresh the bearer token this long before Reddit expires it
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Reddit comments connector (OAuth2 script-app password grant)
pub struct RedditConnector {
    client: Client,
    credentials: RedditConfig,
    token_url: String,
    api_base: String,
    token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    3600
}

/// `GET /r/{sub}/comments` response
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: CommentData,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
    created_utc: f64,
    permalink: String,
}

impl CommentData {
    fn into_comment(self) -> Option<SourceComment> {
        let created_at = datetime_from_epoch(self.created_utc)?;
        let author = self.author.filter(|name| name != DELETED_AUTHOR);

        Some(SourceComment {
            external_id: self.id,
            author,
            body: self.body,
            created_at,
            permalink: format!("{}{}", PERMALINK_BASE, self.permalink),
        })
    }
}

impl RedditConnector {
    pub fn new(credentials: RedditConfig) -> Result<Self> {
        Self::with_endpoints(credentials, TOKEN_URL, API_BASE)
    }

    /// Connector against a non-default token endpoint and API host
    pub fn with_endpoints(
        credentials: RedditConfig,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            credentials,
            token_url: token_url.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let creds = &self.credentials;
        debug!("Requesting Reddit access token for {}", creds.username);

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", creds.username.as_str()),
                ("password", creds.password.as_str()),
            ])
            .send()
            .await
            .context("Reddit token request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Reddit token endpoint returned {}", response.status()));
        }

        let body: TokenResponse = response.json().await.context("Invalid Reddit token response")?;
        let token = AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        };

        info!("✅ Authenticated with Reddit");
        let value = token.value.clone();
        *self.token.write().await = Some(token);
        Ok(value)
    }
}

#[async_trait]
impl ContentSource for RedditConnector {
    fn source_tag(&self) -> &str {
        "reddit"
    }

    fn source_name(&self) -> &str {
        "Reddit"
    }

    async fn fetch_recent(&self, collection: &str, limit: usize) -> Result<Vec<SourceComment>> {
        let token = self.access_token().await?;
        let url = format!("{}/r/{}/comments", self.api_base, collection);

        info!("Fetching latest {} comments from r/{}...", limit, collection);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .with_context(|| format!("Reddit request to {} failed", url))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next run
            *self.token.write().await = None;
        }
        if !response.status().is_success() {
            return Err(anyhow!("Reddit API error: {}", response.status()));
        }

        let listing: Listing = response.json().await.context("Invalid Reddit listing")?;
        let comments = comments_from_listing(listing, limit);

        info!("✅ Fetched {} comments from r/{}", comments.len(), collection);
        Ok(comments)
    }
}

fn comments_from_listing(listing: Listing, limit: usize) -> Vec<SourceComment> {
    listing
        .data
        .children
        .into_iter()
        .filter_map(|thing| {
            let id = thing.data.id.clone();
            let comment = thing.data.into_comment();
            if comment.is_none() {
                warn!("Skipping Reddit comment {} with unusable timestamp", id);
            }
            comment
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t1_k9z",
            "children": [
                {
                    "kind": "t1",
                    "data": {
                        "id": "k9x",
                        "author": "notion_fan",
                        "body": "The new database view is great",
                        "created_utc": 1708627200.0,
                        "permalink": "/r/Notion/comments/1az/some_post/k9x/",
                        "score": 4
                    }
                },
                {
                    "kind": "t1",
                    "data": {
                        "id": "k9y",
                        "author": "[deleted]",
                        "body": "[removed]",
                        "created_utc": 1708627300,
                        "permalink": "/r/Notion/comments/1az/some_post/k9y/"
                    }
                },
                {
                    "kind": "t1",
                    "data": {
                        "id": "k9z",
                        "body": "Sync is broken again",
                        "created_utc": 1708627400.0,
                        "permalink": "/r/Notion/comments/1az/some_post/k9z/"
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_comment_listing() {
        let listing: Listing = serde_json::from_str(LISTING).unwrap();
        let comments = comments_from_listing(listing, 25);

        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].external_id, "k9x");
        assert_eq!(comments[0].author.as_deref(), Some("notion_fan"));
        assert_eq!(comments[0].created_at.timestamp(), 1_708_627_200);
        assert_eq!(
            comments[0].permalink,
            "https://www.reddit.com/r/Notion/comments/1az/some_post/k9x/"
        );
    }

    #[test]
    fn test_deleted_and_missing_authors_are_none() {
        let listing: Listing = serde_json::from_str(LISTING).unwrap();
        let comments = comments_from_listing(listing, 25);

        assert_eq!(comments[1].author, None);
        assert_eq!(comments[2].author, None);
    }

    #[test]
    fn test_listing_respects_limit() {
        let listing: Listing = serde_json::from_str(LISTING).unwrap();
        let comments = comments_from_listing(listing, 2);
        assert_eq!(comments.len(), 2);
    }

    #[test]
    fn test_parse_token_response() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "token_type": "bearer", "expires_in": 86400}"#)
                .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 86400);
    }

    /// Read headers plus the declared body so the socket closes cleanly
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Local stand-in for the token endpoint and the comments API.
    ///
    /// The first `rejections` listing requests answer 401.
    struct FakeReddit {
        base: String,
        token_requests: Arc<AtomicUsize>,
    }

    async fn fake_reddit(rejections: usize) -> FakeReddit {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token_requests = Arc::new(AtomicUsize::new(0));
        let rejections_left = Arc::new(AtomicUsize::new(rejections));

        let tokens = token_requests.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;

                let (status, body) = if request.starts_with("POST /api/v1/access_token") {
                    let n = tokens.fetch_add(1, Ordering::SeqCst) + 1;
                    (
                        "200 OK",
                        format!(r#"{{"access_token": "token-{}", "expires_in": 3600}}"#, n),
                    )
                } else if rejections_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                    .is_ok()
                {
                    ("401 Unauthorized", r#"{"message": "Unauthorized"}"#.to_string())
                } else {
                    ("200 OK", LISTING.to_string())
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        FakeReddit {
            base,
            token_requests,
        }
    }

    fn connector(fake: &FakeReddit) -> RedditConnector {
        let credentials = RedditConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "bot".to_string(),
            password: "hunter2".to_string(),
            ..RedditConfig::default()
        };
        RedditConnector::with_endpoints(
            credentials,
            format!("{}/api/v1/access_token", fake.base),
            fake.base.clone(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_is_cached_between_fetches() {
        let fake = fake_reddit(0).await;
        let reddit = connector(&fake);

        let first = reddit.fetch_recent("Notion", 25).await.unwrap();
        let second = reddit.fetch_recent("Notion", 2).await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_listing_forces_new_token() {
        let fake = fake_reddit(1).await;
        let reddit = connector(&fake);

        assert!(reddit.fetch_recent("Notion", 25).await.is_err());
        assert!(reddit.token.read().await.is_none());

        let comments = reddit.fetch_recent("Notion", 25).await.unwrap();
        assert_eq!(comments.len(), 3);
        assert_eq!(fake.token_requests.load(Ordering::SeqCst), 2);
    }
}

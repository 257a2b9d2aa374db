//! Gazelle AJAX client for the tracker.
//!
//! All traffic goes through [`RedactedApi`]: one authenticated reqwest
//! client, one [`rate_limit::RateLimiter`] in front of it, and typed
//! decoding of every payload the pipeline consumes. Envelope handling
//! follows one rule everywhere except upload: a well-formed failure
//! envelope means "no result" and the current candidate is abandoned,
//! while a body that cannot be decoded at all means the session is broken
//! and the whole run stops. Upload has its own three-way triage because
//! its response decides what gets written to the outcome cache.

pub mod rate_limit;
pub mod types;

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::formats::Format;
use crate::utils::html_unescape;
use async_trait::async_trait;
use rate_limit::RateLimiter;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use types::{
    AccountInfo, Encoding, Envelope, NotificationsPage, Release, ReleaseGroup, RequestsPage,
    SeedingPage, UploadResponse, UserTorrentItem,
};
use url::Url;

/// Extra delay after a torrent-file download; the tracker throttles that
/// endpoint harder than plain AJAX actions.
const DOWNLOAD_PENALTY: Duration = Duration::from_secs(2);

/// Everything the upload action needs from the caller.
#[derive(Debug)]
pub struct UploadRequest<'a> {
    /// Release the new torrent belongs to
    pub group: &'a Release,
    /// Source edition; supplies media and remaster identity
    pub edition: &'a Encoding,
    /// Target format of the transcode being published
    pub format: Format,
    /// Release description (transcode provenance, source permalink)
    pub description: String,
    /// Path of the built .torrent file
    pub torrent_path: &'a Path,
}

/// Triaged result of an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The tracker accepted the torrent
    Uploaded {
        /// Id assigned to the new torrent
        torrent_id: u64,
        /// Group it landed in
        group_id: u64,
    },
    /// The tracker refused with a recognizable failure envelope
    Rejected {
        /// The tracker's stated reason
        message: String,
    },
    /// The response matched neither success nor failure shape
    Unrecognized {
        /// Raw body, kept for the log
        body: String,
    },
}

/// The slice of the tracker API the pipeline depends on. Kept as a trait
/// so tests can drive the pipeline without a network.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Account details established at connect time.
    fn account(&self) -> &AccountInfo;

    /// Every torrent the account currently seeds, fully paged.
    async fn seeding(&self) -> Result<Vec<UserTorrentItem>>;

    /// A release with all of its encodings, or `None` if the tracker
    /// refused the id.
    async fn release_group(&self, group_id: u64) -> Result<Option<ReleaseGroup>>;

    /// Publish a built torrent.
    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadOutcome>;

    /// Correct a 16-bit-labelled listing to 24-bit Lossless. Returns
    /// whether the tracker accepted the edit.
    async fn mark_24bit(&self, edition: &Encoding) -> Result<bool>;

    /// Stable link to a single torrent.
    fn permalink(&self, torrent_id: u64) -> String;

    /// Link to a torrent within its release page.
    fn release_url(&self, group_id: u64, torrent_id: u64) -> String;

    /// Announce URL carrying the account's passkey.
    fn announce_url(&self) -> String;
}

/// Authenticated client for the tracker's AJAX endpoint.
#[derive(Debug)]
pub struct RedactedApi {
    client: reqwest::Client,
    base_url: Url,
    ajax_url: Url,
    announce_base: String,
    limiter: RateLimiter,
    account: AccountInfo,
    page_size: u32,
}

impl RedactedApi {
    /// Build a client from tracker settings and verify the API key by
    /// fetching the account index.
    pub async fn connect(config: &TrackerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url: {}", e),
            key: Some("tracker.base_url".to_string()),
        })?;
        let ajax_url = base_url.join("ajax.php").map_err(|e| Error::Config {
            message: format!("invalid base_url: {}", e),
            key: Some("tracker.base_url".to_string()),
        })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&config.api_key).map_err(|_| Error::Config {
            message: "api_key contains characters not valid in a header".to_string(),
            key: Some("tracker.api_key".to_string()),
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("redbetter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut api = Self {
            client,
            base_url,
            ajax_url,
            announce_base: config.announce_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(Duration::from_millis(config.rate_limit_ms)),
            account: AccountInfo {
                id: 0,
                username: String::new(),
                passkey: String::new(),
            },
            page_size: config.page_size,
        };

        let value = api
            .request("index", &[])
            .await?
            .ok_or(Error::NotAuthenticated)?;
        api.account = decode("index", value)?;
        tracing::info!(
            username = %api.account.username,
            user_id = api.account.id,
            "connected to tracker"
        );
        Ok(api)
    }

    /// One rate-limited GET against ajax.php.
    ///
    /// `Ok(Some(value))` is the success payload, `Ok(None)` a well-formed
    /// failure envelope (logged, candidate-scoped). A body that is not an
    /// envelope at all is a fatal [`Error::MalformedResponse`].
    async fn request(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Option<serde_json::Value>> {
        self.limiter.acquire().await;
        let mut url = self.ajax_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        tracing::debug!(action, "tracker request");
        let body = self.client.get(url).send().await?.text().await?;
        triage(action, &body)
    }

    /// Fetch the raw .torrent file for a torrent id.
    pub async fn download_torrent(&self, torrent_id: u64) -> Result<Vec<u8>> {
        self.limiter.acquire().await;
        let mut url = self.ajax_url.clone();
        url.query_pairs_mut()
            .append_pair("action", "download")
            .append_pair("id", &torrent_id.to_string());
        let response = self.client.get(url).send().await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().await?;
        self.limiter.penalize(DOWNLOAD_PENALTY).await;

        if content_type.contains("application/x-bittorrent") {
            Ok(bytes.to_vec())
        } else {
            Err(Error::MalformedResponse {
                action: "download".to_string(),
                message: format!("expected a torrent file, got content type '{}'", content_type),
            })
        }
    }

    /// One page of the requests browse feed, or `None` on refusal.
    pub async fn requests(&self, page: u32) -> Result<Option<RequestsPage>> {
        let params = [("page", page.to_string())];
        match self.request("requests", &params).await? {
            Some(value) => Ok(Some(decode("requests", value)?)),
            None => Ok(None),
        }
    }

    /// One page of the notifications feed, or `None` on refusal.
    pub async fn notifications(&self, page: u32) -> Result<Option<NotificationsPage>> {
        let params = [("page", page.to_string())];
        match self.request("notifications", &params).await? {
            Some(value) => Ok(Some(decode("notifications", value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TrackerApi for RedactedApi {
    fn account(&self) -> &AccountInfo {
        &self.account
    }

    async fn seeding(&self) -> Result<Vec<UserTorrentItem>> {
        let mut all = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let params = [
                ("id", self.account.id.to_string()),
                ("type", "seeding".to_string()),
                ("limit", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            // a refusal here leaves us with no candidate source at all
            let value = self
                .request("user_torrents", &params)
                .await?
                .ok_or_else(|| {
                    Error::Other(format!(
                        "tracker refused the seeding listing at offset {}",
                        offset
                    ))
                })?;
            let page: SeedingPage = decode("user_torrents", value)?;
            if page.seeding.is_empty() {
                break;
            }
            offset += page.seeding.len() as u64;
            all.extend(page.seeding);
        }
        tracing::info!(torrents = all.len(), "seeding listing fetched");
        Ok(all)
    }

    async fn release_group(&self, group_id: u64) -> Result<Option<ReleaseGroup>> {
        let params = [("id", group_id.to_string())];
        match self.request("torrentgroup", &params).await? {
            Some(value) => Ok(Some(decode("torrentgroup", value)?)),
            None => Ok(None),
        }
    }

    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadOutcome> {
        let torrent_bytes = tokio::fs::read(request.torrent_path).await?;
        let file_name = request
            .torrent_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.torrent".to_string());

        let mut form = Form::new()
            .part(
                "file_input",
                Part::bytes(torrent_bytes)
                    .file_name(file_name)
                    .mime_str("application/x-bittorrent")?,
            )
            .text("type", "0")
            .text("groupid", request.group.id.to_string())
            .text("title", html_unescape(&request.group.name))
            .text("year", request.group.year.to_string())
            .text("remaster_year", request.edition.remaster_year.to_string())
            .text(
                "remaster_title",
                html_unescape(&request.edition.remaster_title),
            )
            .text(
                "remaster_record_label",
                html_unescape(&request.edition.remaster_record_label),
            )
            .text(
                "remaster_catalogue_number",
                request.edition.remaster_catalogue_number.clone(),
            )
            .text("format", request.format.container().to_string())
            .text("bitrate", request.format.encoding_label().to_string())
            .text("media", request.edition.media.clone())
            .text("release_desc", request.description);
        for artist in &request.group.music_info.artists {
            form = form
                .text("artists[]", html_unescape(&artist.name))
                .text("importance[]", "1");
        }
        if let Some(tag) = request.group.tags.first() {
            form = form.text("tags", tag.clone());
        }
        if request.format.is_vbr() {
            form = form.text("vbr", "on");
        }

        self.limiter.acquire().await;
        let mut url = self.ajax_url.clone();
        url.query_pairs_mut().append_pair("action", "upload");
        let body = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .text()
            .await?;

        match serde_json::from_str::<Envelope>(&body) {
            Ok(envelope) if envelope.status == "success" => {
                let parsed = envelope
                    .response
                    .and_then(|v| serde_json::from_value::<UploadResponse>(v).ok());
                match parsed {
                    Some(r) => Ok(UploadOutcome::Uploaded {
                        torrent_id: r.torrent_id,
                        group_id: r.group_id,
                    }),
                    None => Ok(UploadOutcome::Unrecognized { body }),
                }
            }
            Ok(envelope) if envelope.status == "failure" => Ok(UploadOutcome::Rejected {
                message: envelope
                    .error
                    .unwrap_or_else(|| "no reason given".to_string()),
            }),
            _ => Ok(UploadOutcome::Unrecognized { body }),
        }
    }

    async fn mark_24bit(&self, edition: &Encoding) -> Result<bool> {
        self.limiter.acquire().await;
        let mut url = self.ajax_url.clone();
        url.query_pairs_mut()
            .append_pair("action", "torrentedit")
            .append_pair("id", &edition.id.to_string());
        let form = [
            ("format", "FLAC".to_string()),
            ("bitrate", "24bit Lossless".to_string()),
            ("media", edition.media.clone()),
        ];
        let body = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await?
            .text()
            .await?;
        match triage("torrentedit", &body)? {
            Some(_) => {
                tracing::info!(torrent_id = edition.id, "listing corrected to 24bit Lossless");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn permalink(&self, torrent_id: u64) -> String {
        format!("{}torrents.php?torrentid={}", self.base_url, torrent_id)
    }

    fn release_url(&self, group_id: u64, torrent_id: u64) -> String {
        format!(
            "{}torrents.php?id={}&torrentid={}#torrent{}",
            self.base_url, group_id, torrent_id, torrent_id
        )
    }

    fn announce_url(&self) -> String {
        format!("{}/{}/announce", self.announce_base, self.account.passkey)
    }
}

/// Split a raw body into the envelope rule's three cases.
fn triage(action: &str, body: &str) -> Result<Option<serde_json::Value>> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| Error::MalformedResponse {
            action: action.to_string(),
            message: e.to_string(),
        })?;
    if envelope.status == "success" {
        let response = envelope.response.ok_or_else(|| Error::MalformedResponse {
            action: action.to_string(),
            message: "success envelope without a response payload".to_string(),
        })?;
        Ok(Some(response))
    } else {
        tracing::warn!(
            action,
            error = envelope.error.as_deref().unwrap_or("unspecified"),
            "tracker returned failure"
        );
        Ok(None)
    }
}

fn decode<T: DeserializeOwned>(action: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::MalformedResponse {
        action: action.to_string(),
        message: e.to_string(),
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker_config(server: &MockServer) -> TrackerConfig {
        TrackerConfig {
            api_key: "test-key".to_string(),
            base_url: format!("{}/", server.uri()),
            announce_url: "https://flacsfor.me/".to_string(),
            rate_limit_ms: 0,
            page_size: 2,
        }
    }

    async fn mount_index(server: &MockServer) {
        Mock::given(method("GET"))
            .and(query_param("action", "index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "response": {"id": 42, "username": "tester", "passkey": "pk123"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_connect_reads_account() {
        let server = MockServer::start().await;
        mount_index(&server).await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        assert_eq!(api.account().id, 42);
        assert_eq!(api.account().username, "tester");
        assert_eq!(api.announce_url(), "https://flacsfor.me/pk123/announce");
        assert_eq!(
            api.permalink(17),
            format!("{}/torrents.php?torrentid=17", server.uri())
        );
        assert_eq!(
            api.release_url(4, 17),
            format!("{}/torrents.php?id=4&torrentid=17#torrent17", server.uri())
        );
    }

    #[tokio::test]
    async fn test_connect_failure_envelope_is_not_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failure",
                "error": "This resource requires an api token"
            })))
            .mount(&server)
            .await;

        let err = RedactedApi::connect(&tracker_config(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "index"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
            .mount(&server)
            .await;

        let err = RedactedApi::connect(&tracker_config(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_seeding_pages_until_empty() {
        let server = MockServer::start().await;
        mount_index(&server).await;

        Mock::given(method("GET"))
            .and(query_param("action", "user_torrents"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "response": {"seeding": [
                    {"groupId": "1", "torrentId": "10"},
                    {"groupId": "2", "torrentId": "20"}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("action", "user_torrents"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "response": {"seeding": []}
            })))
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        let seeding = api.seeding().await.unwrap();
        assert_eq!(seeding.len(), 2);
        assert_eq!(seeding[0].torrent_id, 10);
        assert_eq!(seeding[1].group_id, 2);
    }

    #[tokio::test]
    async fn test_requests_page_decodes() {
        let server = MockServer::start().await;
        mount_index(&server).await;
        Mock::given(method("GET"))
            .and(query_param("action", "requests"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "response": {
                    "currentPage": 2,
                    "pages": 3,
                    "results": [{
                        "requestId": 185971,
                        "requestorName": "Satan",
                        "title": "Fear Not",
                        "isFilled": false
                    }]
                }
            })))
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        let page = api.requests(2).await.unwrap().unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.pages, 3);
        assert_eq!(page.results[0].request_id, 185971);
    }

    #[tokio::test]
    async fn test_notifications_refusal_is_none() {
        let server = MockServer::start().await;
        mount_index(&server).await;
        Mock::given(method("GET"))
            .and(query_param("action", "notifications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failure",
                "error": "bad page parameter"
            })))
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        assert!(api.notifications(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_group_refusal_is_none() {
        let server = MockServer::start().await;
        mount_index(&server).await;
        Mock::given(method("GET"))
            .and(query_param("action", "torrentgroup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failure",
                "error": "bad id parameter"
            })))
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        assert!(api.release_group(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_triage() {
        let server = MockServer::start().await;
        mount_index(&server).await;
        Mock::given(method("POST"))
            .and(query_param("action", "upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "response": {"torrentid": 3084789, "groupid": 1444084}
            })))
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();

        let tmp = tempfile::TempDir::new().unwrap();
        let torrent_path = tmp.path().join("release.torrent");
        std::fs::write(&torrent_path, b"d8:announce0:e").unwrap();

        let group = types::test_support::group_with(vec![]).group;
        let edition = types::test_support::encoding(1, "FLAC", "Lossless");
        let outcome = api
            .upload(UploadRequest {
                group: &group,
                edition: &edition,
                format: Format::V0,
                description: "desc".to_string(),
                torrent_path: &torrent_path,
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Uploaded {
                torrent_id: 3084789,
                group_id: 1444084
            }
        );
    }

    #[tokio::test]
    async fn test_upload_rejection_and_unrecognized() {
        let server = MockServer::start().await;
        mount_index(&server).await;
        Mock::given(method("POST"))
            .and(query_param("action", "upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failure",
                "error": "The torrent contained one or more 0 byte files"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(query_param("action", "upload"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        let tmp = tempfile::TempDir::new().unwrap();
        let torrent_path = tmp.path().join("release.torrent");
        std::fs::write(&torrent_path, b"d8:announce0:e").unwrap();

        let group = types::test_support::group_with(vec![]).group;
        let edition = types::test_support::encoding(1, "FLAC", "Lossless");
        let make_request = || UploadRequest {
            group: &group,
            edition: &edition,
            format: Format::Mp3320,
            description: "desc".to_string(),
            torrent_path: &torrent_path,
        };

        match api.upload(make_request()).await.unwrap() {
            UploadOutcome::Rejected { message } => assert!(message.contains("0 byte")),
            other => panic!("expected rejection, got {:?}", other),
        }
        match api.upload(make_request()).await.unwrap() {
            UploadOutcome::Unrecognized { body } => assert!(body.contains("Bad Gateway")),
            other => panic!("expected unrecognized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_checks_content_type() {
        let server = MockServer::start().await;
        mount_index(&server).await;
        Mock::given(method("GET"))
            .and(query_param("action", "download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-bittorrent")
                    .set_body_bytes(b"d8:announce0:e".to_vec()),
            )
            .mount(&server)
            .await;

        let api = RedactedApi::connect(&tracker_config(&server)).await.unwrap();
        let bytes = api.download_torrent(7).await.unwrap();
        assert_eq!(bytes, b"d8:announce0:e");
    }
}

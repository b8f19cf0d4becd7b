//! Remote playlist/video metadata source and image download seams, plus the
//! YouTube implementation of both.

use std::io::Read;
use std::time::Duration;

use log::debug;
use serde_json::{json, Value};

use crate::catalog::watch_url_for;
use crate::config::SourceConfig;
use crate::error::SourceError;

const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";
const INNERTUBE_CLIENT_NAME: &str = "WEB";
const INNERTUBE_CLIENT_VERSION: &str = "2.20240726.00.00";
const INITIAL_DATA_MARKERS: [&str; 2] = ["var ytInitialData = ", "window[\"ytInitialData\"] = "];

/// Attributes of one video as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub author: String,
    pub publish_date: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub channel_url: String,
    pub watch_url: String,
    /// Raw descriptor of the first progressive stream, e.g. `video/mp4; codecs="..."`.
    pub first_stream_mime_type: Option<String>,
}

/// Raw result of an image GET. Non-success statuses are returned, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub bytes: Vec<u8>,
}

impl ImageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Declared length, or the body length when the header is missing.
    pub fn effective_length(&self) -> u64 {
        self.content_length.unwrap_or(self.bytes.len() as u64)
    }
}

/// Playlist listing and per-video metadata.
pub trait MetadataSource {
    fn fetch_playlist_video_ids(&self, playlist_url: &str) -> Result<Vec<String>, SourceError>;
    fn fetch_video_metadata(&self, video_id: &str) -> Result<VideoMetadata, SourceError>;
}

/// Single image download.
pub trait ImageFetcher {
    fn fetch_image_bytes(&self, url: &str) -> Result<ImageResponse, SourceError>;
}

/// YouTube web client over a blocking `ureq` agent.
pub struct YoutubeClient {
    http_client: ureq::Agent,
    user_agent: String,
    max_playlist_pages: u32,
}

impl YoutubeClient {
    pub fn new(config: &SourceConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .timeout_write(Duration::from_secs(config.read_timeout_secs))
            .build();

        Self {
            http_client,
            user_agent: config.user_agent.clone(),
            max_playlist_pages: config.max_playlist_pages,
        }
    }

    fn innertube_context() -> Value {
        json!({
            "client": {
                "clientName": INNERTUBE_CLIENT_NAME,
                "clientVersion": INNERTUBE_CLIENT_VERSION,
                "hl": "en",
            }
        })
    }

    fn innertube_post(&self, endpoint: &str, body: Value) -> Result<Value, SourceError> {
        let url = format!("{YOUTUBE_BASE_URL}/youtubei/v1/{endpoint}?prettyPrint=false");
        let response = self
            .http_client
            .post(&url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .send_json(body)
            .map_err(|error| SourceError::Transport {
                url: url.clone(),
                reason: format!("Request failed: {error}"),
            })?;
        response
            .into_json::<Value>()
            .map_err(|error| SourceError::Transport {
                url,
                reason: format!("Invalid JSON response: {error}"),
            })
    }

    fn fetch_playlist_page(&self, playlist_url: &str) -> Result<String, SourceError> {
        let unavailable = |reason: String| SourceError::PlaylistUnavailable {
            url: playlist_url.to_string(),
            reason,
        };
        let response = self
            .http_client
            .get(playlist_url)
            .set("User-Agent", &self.user_agent)
            .set("Accept-Language", "en")
            .call()
            .map_err(|error| unavailable(format!("Request failed: {error}")))?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| unavailable(format!("Failed to read response: {error}")))?;
        Ok(body)
    }
}

impl MetadataSource for YoutubeClient {
    fn fetch_playlist_video_ids(&self, playlist_url: &str) -> Result<Vec<String>, SourceError> {
        let html = self.fetch_playlist_page(playlist_url)?;
        let initial_data =
            extract_initial_data(&html).ok_or_else(|| SourceError::PlaylistUnavailable {
                url: playlist_url.to_string(),
                reason: "page has no ytInitialData".to_string(),
            })?;

        let mut page = collect_playlist_page(&initial_data);
        let mut video_ids = page.video_ids;
        let mut pages_fetched = 1u32;
        while let Some(token) = page.continuation.take() {
            if pages_fetched >= self.max_playlist_pages {
                debug!(
                    "Playlist page cap {} reached; stopping at {} ids",
                    self.max_playlist_pages,
                    video_ids.len()
                );
                break;
            }
            let body = json!({
                "context": Self::innertube_context(),
                "continuation": token,
            });
            let next = self.innertube_post("browse", body)?;
            page = collect_playlist_page(&next);
            video_ids.extend(page.video_ids.drain(..));
            pages_fetched += 1;
        }

        Ok(dedup_keep_first(video_ids))
    }

    fn fetch_video_metadata(&self, video_id: &str) -> Result<VideoMetadata, SourceError> {
        let body = json!({
            "context": Self::innertube_context(),
            "videoId": video_id,
        });
        let response = self
            .innertube_post("player", body)
            .map_err(|error| SourceError::MetadataUnavailable {
                video_id: video_id.to_string(),
                reason: error.to_string(),
            })?;
        parse_player_response(video_id, &response)
    }
}

impl ImageFetcher for YoutubeClient {
    fn fetch_image_bytes(&self, url: &str) -> Result<ImageResponse, SourceError> {
        let response = match self
            .http_client
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(SourceError::Transport {
                    url: url.to_string(),
                    reason: transport.to_string(),
                })
            }
        };

        let status = response.status();
        let content_length = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|error| SourceError::Transport {
                url: url.to_string(),
                reason: format!("Failed to read response: {error}"),
            })?;
        Ok(ImageResponse {
            status,
            content_length,
            bytes,
        })
    }
}

/// Thumbnail download URL from a `{id}` template.
pub fn thumbnail_url(template: &str, video_id: &str) -> String {
    template.replace("{id}", urlencoding::encode(video_id).as_ref())
}

fn dedup_keep_first(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Pulls the `ytInitialData` JSON object out of a playlist page.
pub fn extract_initial_data(html: &str) -> Option<Value> {
    let start = INITIAL_DATA_MARKERS
        .iter()
        .find_map(|marker| html.find(marker).map(|index| index + marker.len()))?;
    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

/// Video ids and the next continuation token found in one playlist payload.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlaylistPage {
    pub video_ids: Vec<String>,
    pub continuation: Option<String>,
}

pub fn collect_playlist_page(payload: &Value) -> PlaylistPage {
    let mut page = PlaylistPage::default();
    let mut stack = vec![payload];
    // Depth-first, children pushed in reverse so document order is preserved.
    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if let Some(video_id) = map
                    .get("playlistVideoRenderer")
                    .and_then(|renderer| renderer.get("videoId"))
                    .and_then(Value::as_str)
                {
                    page.video_ids.push(video_id.to_string());
                    continue;
                }
                if let Some(token) = map
                    .get("continuationCommand")
                    .and_then(|command| command.get("token"))
                    .and_then(Value::as_str)
                {
                    page.continuation.get_or_insert_with(|| token.to_string());
                    continue;
                }
                let children: Vec<&Value> = map.values().collect();
                stack.extend(children.into_iter().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    page
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or("")
}

/// Maps an innertube `player` response to `VideoMetadata`.
pub fn parse_player_response(video_id: &str, response: &Value) -> Result<VideoMetadata, SourceError> {
    let unavailable = |reason: String| SourceError::MetadataUnavailable {
        video_id: video_id.to_string(),
        reason,
    };

    let status = str_at(response, "/playabilityStatus/status");
    if status != "OK" {
        let reason = str_at(response, "/playabilityStatus/reason");
        return Err(unavailable(format!(
            "playability status {}{}",
            if status.is_empty() { "missing" } else { status },
            if reason.is_empty() {
                String::new()
            } else {
                format!(": {reason}")
            }
        )));
    }

    let details = response
        .get("videoDetails")
        .ok_or_else(|| unavailable("response has no videoDetails".to_string()))?;
    let title = str_at(details, "/title");
    if title.is_empty() {
        return Err(unavailable("video has no title".to_string()));
    }

    let keywords = details
        .get("keywords")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let channel_id = str_at(details, "/channelId");
    let channel_url = if channel_id.is_empty() {
        String::new()
    } else {
        format!("{YOUTUBE_BASE_URL}/channel/{channel_id}")
    };
    let first_stream_mime_type = response
        .pointer("/streamingData/formats/0/mimeType")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(VideoMetadata {
        video_id: video_id.to_string(),
        title: title.to_string(),
        author: str_at(details, "/author").to_string(),
        publish_date: str_at(response, "/microformat/playerMicroformatRenderer/publishDate")
            .to_string(),
        description: str_at(details, "/shortDescription").to_string(),
        keywords,
        channel_url,
        watch_url: watch_url_for(video_id),
        first_stream_mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        collect_playlist_page, extract_initial_data, parse_player_response, thumbnail_url,
        ImageResponse,
    };
    use crate::error::SourceError;
    use serde_json::json;

    #[test]
    fn test_extract_initial_data_reads_embedded_object() {
        let html = r#"<script>var ytInitialData = {"a":{"b":"};</script>"}};</script><div></div>"#;
        let data = extract_initial_data(html).expect("initial data should parse");
        assert_eq!(data["a"]["b"], "};</script>");
    }

    #[test]
    fn test_extract_initial_data_missing_marker_is_none() {
        assert!(extract_initial_data("<html></html>").is_none());
    }

    #[test]
    fn test_collect_playlist_page_preserves_order_and_finds_continuation() {
        let payload = json!({
            "contents": [
                {"playlistVideoRenderer": {"videoId": "first"}},
                {"wrapper": {"items": [
                    {"playlistVideoRenderer": {"videoId": "second"}},
                    {"playlistVideoRenderer": {"videoId": "third"}}
                ]}},
                {"continuationItemRenderer": {"continuationEndpoint": {
                    "continuationCommand": {"token": "NEXT"}
                }}}
            ]
        });

        let page = collect_playlist_page(&payload);
        assert_eq!(page.video_ids, vec!["first", "second", "third"]);
        assert_eq!(page.continuation.as_deref(), Some("NEXT"));
    }

    #[test]
    fn test_parse_player_response_maps_fields() {
        let response = json!({
            "playabilityStatus": {"status": "OK"},
            "videoDetails": {
                "videoId": "abc123",
                "title": "Concierto",
                "author": "Archivo",
                "shortDescription": "desc",
                "keywords": ["official", "concert"],
                "channelId": "UC42"
            },
            "microformat": {"playerMicroformatRenderer": {"publishDate": "2023-03-09"}},
            "streamingData": {"formats": [{"mimeType": "video/mp4; codecs=\"avc1\""}]}
        });

        let metadata = parse_player_response("abc123", &response).expect("metadata should parse");
        assert_eq!(metadata.title, "Concierto");
        assert_eq!(metadata.author, "Archivo");
        assert_eq!(metadata.publish_date, "2023-03-09");
        assert_eq!(metadata.keywords, vec!["official", "concert"]);
        assert_eq!(metadata.channel_url, "https://www.youtube.com/channel/UC42");
        assert_eq!(metadata.watch_url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(
            metadata.first_stream_mime_type.as_deref(),
            Some("video/mp4; codecs=\"avc1\"")
        );
    }

    #[test]
    fn test_parse_player_response_without_streams_has_no_mime_descriptor() {
        let response = json!({
            "playabilityStatus": {"status": "OK"},
            "videoDetails": {"title": "Sin formatos"}
        });
        let metadata = parse_player_response("x", &response).expect("metadata should parse");
        assert!(metadata.first_stream_mime_type.is_none());
        assert!(metadata.keywords.is_empty());
    }

    #[test]
    fn test_parse_player_response_unplayable_is_metadata_unavailable() {
        let response = json!({
            "playabilityStatus": {"status": "ERROR", "reason": "Video unavailable"}
        });
        let error = parse_player_response("gone", &response).expect_err("should fail");
        match error {
            SourceError::MetadataUnavailable { video_id, reason } => {
                assert_eq!(video_id, "gone");
                assert!(reason.contains("Video unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_thumbnail_url_substitutes_encoded_id() {
        assert_eq!(
            thumbnail_url("https://i.ytimg.com/vi/{id}/maxresdefault.jpg", "a b"),
            "https://i.ytimg.com/vi/a%20b/maxresdefault.jpg"
        );
    }

    #[test]
    fn test_image_response_effective_length_prefers_declared_length() {
        let declared = ImageResponse {
            status: 404,
            content_length: Some(1_097),
            bytes: Vec::new(),
        };
        assert_eq!(declared.effective_length(), 1_097);
        assert!(!declared.is_success());

        let undeclared = ImageResponse {
            status: 200,
            content_length: None,
            bytes: vec![0; 12],
        };
        assert_eq!(undeclared.effective_length(), 12);
        assert!(undeclared.is_success());
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_core::ReleaseId;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::ResolverError;

const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Deserialize)]
pub struct ReleaseXml {
    #[serde(rename = "title", default)]
    pub title: String,
    #[serde(rename = "date", default)]
    pub date: String,
    #[serde(rename = "medium-list", default)]
    pub medium_list: MediumListXml,
}

#[derive(Debug, Deserialize, Default)]
pub struct MediumListXml {
    #[serde(rename = "medium", default)]
    pub mediums: Vec<MediumXml>,
}

#[derive(Debug, Deserialize)]
pub struct MediumXml {
    #[serde(default)]
    pub position: u32,
    #[serde(rename = "track-list", default)]
    pub track_list: TrackListXml,
}

#[derive(Debug, Deserialize, Default)]
pub struct TrackListXml {
    #[serde(rename = "track", default)]
    pub tracks: Vec<TrackXml>,
}

#[derive(Debug, Deserialize)]
pub struct TrackXml {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub recording: RecordingXml,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecordingXml {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: ArtistCreditXml,
}

#[derive(Debug, Deserialize, Default)]
pub struct ArtistCreditXml {
    #[serde(rename = "name-credit", default)]
    pub name_credits: Vec<NameCreditXml>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NameCreditXml {
    #[serde(default)]
    pub name: String,
}

impl ArtistCreditXml {
    pub fn names(&self) -> Vec<String> {
        self.name_credits.iter().map(|nc| nc.name.clone()).collect()
    }
}

/// Client for the release-lookup catalogue endpoint (§4.3, §6). One request in
/// flight at a time, paced by a minimum inter-request interval, matching the
/// corpus's own external-API rate limiter shape.
pub struct MusicBrainzClient {
    http: reqwest::Client,
    base_url: String,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl MusicBrainzClient {
    pub fn new(http: reqwest::Client) -> Self {
        MusicBrainzClient {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn enforce_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < RATE_LIMIT_INTERVAL {
                tokio::time::sleep(RATE_LIMIT_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn lookup_release(&self, release_id: &ReleaseId) -> Result<ReleaseXml, ResolverError> {
        self.enforce_rate_limit().await;

        let url = format!(
            "{}/release/{}?inc=recordings+artist-credits&fmt=xml",
            self.base_url, release_id.0
        );
        let body = self.http.get(url).send().await?.text().await?;
        quick_xml::de::from_str(&body).map_err(|e| ResolverError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_credit_collects_names() {
        let credit = ArtistCreditXml {
            name_credits: vec![
                NameCreditXml { name: "A".into() },
                NameCreditXml { name: "B".into() },
            ],
        };
        assert_eq!(credit.names(), vec!["A".to_string(), "B".to_string()]);
    }
}

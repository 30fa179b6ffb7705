use serde::Deserialize;

use crate::error::ResolverError;

const DEFAULT_BASE_URL: &str = "https://api.acoustid.org/v2/lookup";

#[derive(Debug, Deserialize)]
pub struct AcousticMatchResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<AcousticResult>,
}

#[derive(Debug, Deserialize)]
pub struct AcousticResult {
    pub id: String,
    #[serde(default)]
    pub recordings: Vec<AcousticRecording>,
}

#[derive(Debug, Deserialize)]
pub struct AcousticRecording {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub artists: Vec<AcousticArtist>,
    #[serde(default)]
    pub releases: Vec<AcousticRelease>,
}

#[derive(Debug, Deserialize)]
pub struct AcousticArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AcousticRelease {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: Option<AcousticDate>,
    #[serde(default)]
    pub artists: Vec<AcousticArtist>,
    #[serde(default)]
    pub mediums: Vec<AcousticMedium>,
}

#[derive(Debug, Deserialize)]
pub struct AcousticDate {
    #[serde(default)]
    pub year: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AcousticMedium {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub track_count: Option<u32>,
    #[serde(default)]
    pub tracks: Vec<AcousticTrackPosition>,
}

#[derive(Debug, Deserialize)]
pub struct AcousticTrackPosition {
    #[serde(default)]
    pub position: Option<u32>,
}

/// Client for the acoustic-match endpoint (§4.3, §6): client key, fingerprint and
/// duration in, recordings/releases/mediums/tracks out. Grounded on the same
/// simple POST-and-parse shape as the corpus's own fingerprint-lookup client.
pub struct AcoustidClient {
    http: reqwest::Client,
    base_url: String,
    client_key: String,
}

impl AcoustidClient {
    pub fn new(http: reqwest::Client, client_key: impl Into<String>) -> Self {
        AcoustidClient {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            client_key: client_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn lookup(
        &self,
        fingerprint: &str,
        duration_secs: u32,
    ) -> Result<AcousticMatchResponse, ResolverError> {
        let params = [
            ("client", self.client_key.as_str()),
            ("fingerprint", fingerprint),
            ("duration", &duration_secs.to_string()),
            ("meta", "recordings+releases+tracks"),
        ];

        let response = self
            .http
            .post(&self.base_url)
            .form(&params)
            .send()
            .await?
            .json::<AcousticMatchResponse>()
            .await?;

        Ok(response)
    }
}

use kiln_core::ReleaseId;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ResolverError;

const DEFAULT_ARCHIVE_HOST: &str = "https://coverartarchive.org";
const DEFAULT_RELEASE_PAGE_HOST: &str = "https://musicbrainz.org";

static FRONT_COVER_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^"'\s]+?(?:front|cover)[^"'\s]*\.(?:jpe?g|png)"#)
        .expect("static cover-url regex is valid")
});

pub struct CoverArtClient {
    http: reqwest::Client,
    archive_host: String,
    release_page_host: String,
}

impl CoverArtClient {
    pub fn new(http: reqwest::Client) -> Self {
        CoverArtClient {
            http,
            archive_host: DEFAULT_ARCHIVE_HOST.to_string(),
            release_page_host: DEFAULT_RELEASE_PAGE_HOST.to_string(),
        }
    }

    /// Primary endpoint `<archive-host>/release/<releaseID>/front`; falls back to
    /// parsing the release page HTML for an embedded cover URL. Both expect a 2xx
    /// response; anything else is treated as missing (`Ok(None)`, not an error —
    /// the caller writes a cover-cache tombstone).
    pub async fn fetch_front_cover(&self, release_id: &ReleaseId) -> Result<Option<Vec<u8>>, ResolverError> {
        let primary = format!("{}/release/{}/front", self.archive_host, release_id.0);
        let response = self.http.get(&primary).send().await?;
        if response.status().is_success() {
            return Ok(Some(response.bytes().await?.to_vec()));
        }

        let page_url = format!("{}/release/{}", self.release_page_host, release_id.0);
        let page = self.http.get(&page_url).send().await?;
        if !page.status().is_success() {
            return Ok(None);
        }
        let html = page.text().await?;
        let Some(found) = FRONT_COVER_URL_RE.find(&html) else {
            return Ok(None);
        };
        let cover_url = found.as_str().to_string();

        let cover = self.http.get(&cover_url).send().await?;
        if !cover.status().is_success() {
            return Ok(None);
        }
        Ok(Some(cover.bytes().await?.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_front_cover_url_in_html() {
        let html = r#"<html><a href="https://example.org/img/front-1200.jpg">cover</a></html>"#;
        let found = FRONT_COVER_URL_RE.find(html).unwrap();
        assert_eq!(found.as_str(), "https://example.org/img/front-1200.jpg");
    }
}

use std::sync::Arc;

use kiln_core::{AlbumKey, ReleaseId, TagMap};

use crate::acoustid::AcoustidClient;
use crate::cache::SingleFlightCache;
use crate::coverart::CoverArtClient;
use crate::error::ResolverError;
use crate::musicbrainz::MusicBrainzClient;
use crate::normalize::{stringnorm, stringrel};
use crate::score::{self, Candidate, LocalTrack};

const FUZZY_THRESHOLD: f64 = 0.7;

/// Everything the resolver needs to identify an album via fingerprinting, kept
/// separate from `kiln-core::InputInfo` so this crate doesn't need to know the
/// whole pipeline token shape.
#[derive(Debug, Clone)]
pub struct AlbumContext {
    pub fingerprint: String,
    pub duration_secs: u32,
    pub local: LocalTrack,
}

/// The online metadata resolver (§4.3): three memoized caches, fuzzy key
/// matching, and the weighted acoustic scorer threaded through.
pub struct Resolver {
    musicbrainz: MusicBrainzClient,
    acoustid: AcoustidClient,
    coverart: CoverArtClient,
    release_cache: SingleFlightCache<AlbumKey, ReleaseId>,
    tags_cache: SingleFlightCache<ReleaseId, TagMap>,
    cover_cache: SingleFlightCache<ReleaseId, Arc<Vec<u8>>>,
}

impl Resolver {
    pub fn new(musicbrainz: MusicBrainzClient, acoustid: AcoustidClient, coverart: CoverArtClient) -> Self {
        Resolver {
            musicbrainz,
            acoustid,
            coverart,
            release_cache: SingleFlightCache::new(),
            tags_cache: SingleFlightCache::new(),
            cover_cache: SingleFlightCache::new(),
        }
    }

    /// `GetTags` half one: resolves a `ReleaseId` for `key`, performing at most one
    /// fingerprint + catalogue lookup per album-key across all concurrent callers.
    pub async fn resolve_release_id(&self, key: &AlbumKey, ctx: &AlbumContext) -> ReleaseId {
        if let Some(id) = self.release_cache.peek(key).await {
            return id;
        }

        if let Some(fuzzy) = self.fuzzy_lookup(key).await {
            self.release_cache.alias(key.clone(), fuzzy.clone()).await;
            return fuzzy;
        }

        let acoustid = &self.acoustid;
        let fingerprint = ctx.fingerprint.clone();
        let duration_secs = ctx.duration_secs;
        let local = ctx.local.clone();

        self.release_cache
            .get_or_init(key.clone(), || async move {
                match acoustid.lookup(&fingerprint, duration_secs).await {
                    Ok(response) => {
                        let candidates = flatten_candidates(&response);
                        match score::best_match(&local, &candidates) {
                            Some((candidate, _)) => candidate.release_id.clone(),
                            None => ReleaseId::unknown(),
                        }
                    }
                    Err(_) => ReleaseId::unknown(),
                }
            })
            .await
    }

    /// Three-pass fuzzy lookup against already-published release-cache keys:
    /// album similarity, then album-artist similarity among survivors, then date
    /// similarity among those (§4.3).
    async fn fuzzy_lookup(&self, key: &AlbumKey) -> Option<ReleaseId> {
        let candidates = self.release_cache.published_keys().await;

        let album_norm = stringnorm(&key.album);
        let by_album: Vec<&AlbumKey> = candidates
            .iter()
            .filter(|k| stringrel(&stringnorm(&k.album), &album_norm) >= FUZZY_THRESHOLD)
            .collect();
        if by_album.is_empty() {
            return None;
        }

        let artist_norm = stringnorm(&key.album_artist);
        let by_artist: Vec<&AlbumKey> = by_album
            .into_iter()
            .filter(|k| stringrel(&stringnorm(&k.album_artist), &artist_norm) >= FUZZY_THRESHOLD)
            .collect();
        if by_artist.is_empty() {
            return None;
        }

        let date_norm = stringnorm(&key.date);
        let best = by_artist
            .into_iter()
            .filter(|k| stringrel(&stringnorm(&k.date), &date_norm) >= FUZZY_THRESHOLD)
            .max_by(|a, b| {
                let score_a = stringrel(&stringnorm(&a.date), &date_norm);
                let score_b = stringrel(&stringnorm(&b.date), &date_norm);
                score_a.partial_cmp(&score_b).unwrap()
            })?;

        self.release_cache.peek(best).await
    }

    /// `GetTags`: catalogue lookup for a resolved release. A populated entry with
    /// no tags is a tombstone marking a previously unidentifiable release.
    pub async fn get_tags(&self, release_id: &ReleaseId) -> Result<TagMap, ResolverError> {
        if release_id.is_unknown() {
            return Ok(TagMap::new());
        }

        let musicbrainz = &self.musicbrainz;
        let release_id_owned = release_id.clone();
        Ok(self
            .tags_cache
            .get_or_init(release_id.clone(), || async move {
                match musicbrainz.lookup_release(&release_id_owned).await {
                    Ok(release) => release_to_tags(&release),
                    Err(_) => TagMap::new(),
                }
            })
            .await)
    }

    /// `GetCover`: cover-archive lookup, falling back to the release page. A
    /// populated zero-length entry is a tombstone.
    pub async fn get_cover(&self, release_id: &ReleaseId) -> Result<Arc<Vec<u8>>, ResolverError> {
        if release_id.is_unknown() {
            return Ok(Arc::new(Vec::new()));
        }

        let coverart = &self.coverart;
        let release_id_owned = release_id.clone();
        Ok(self
            .cover_cache
            .get_or_init(release_id.clone(), || async move {
                match coverart.fetch_front_cover(&release_id_owned).await {
                    Ok(Some(bytes)) => Arc::new(bytes),
                    _ => Arc::new(Vec::new()),
                }
            })
            .await)
    }
}

fn release_to_tags(release: &crate::musicbrainz::ReleaseXml) -> TagMap {
    let mut tags = TagMap::new();
    tags.set("album", release.title.clone());
    tags.set("date", release.date.clone());
    tags
}

fn flatten_candidates(response: &crate::acoustid::AcousticMatchResponse) -> Vec<Candidate> {
    let mut out = Vec::new();
    for result in &response.results {
        for recording in &result.recordings {
            let artists: Vec<String> = recording.artists.iter().map(|a| a.name.clone()).collect();
            if recording.releases.is_empty() {
                out.push(Candidate {
                    recording_id: kiln_core::RecordingId(recording.id.clone()),
                    release_id: ReleaseId::unknown(),
                    recording_title: recording.title.clone(),
                    recording_artists: artists.clone(),
                    release_title: String::new(),
                    release_artists: Vec::new(),
                    disc_number: None,
                    track_number: None,
                    track_count: None,
                    year: None,
                    duration_secs: recording.length,
                });
                continue;
            }
            for release in &recording.releases {
                for medium in &release.mediums {
                    let track_number = medium.tracks.first().and_then(|t| t.position);
                    out.push(Candidate {
                        recording_id: kiln_core::RecordingId(recording.id.clone()),
                        release_id: ReleaseId(release.id.clone()),
                        recording_title: recording.title.clone(),
                        recording_artists: artists.clone(),
                        release_title: release.title.clone(),
                        release_artists: release.artists.iter().map(|a| a.name.clone()).collect(),
                        disc_number: medium.position,
                        track_number,
                        track_count: medium.track_count,
                        year: release.date.as_ref().and_then(|d| d.year),
                        duration_secs: recording.length,
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_release_id_short_circuits_tags_and_cover() {
        let resolver = Resolver::new(
            MusicBrainzClient::new(reqwest::Client::new()),
            AcoustidClient::new(reqwest::Client::new(), "key"),
            CoverArtClient::new(reqwest::Client::new()),
        );
        let unknown = ReleaseId::unknown();
        assert_eq!(resolver.get_tags(&unknown).await.unwrap(), TagMap::new());
        assert_eq!(*resolver.get_cover(&unknown).await.unwrap(), Vec::<u8>::new());
    }
}

pub mod acoustid;
pub mod cache;
pub mod coverart;
pub mod error;
pub mod musicbrainz;
pub mod normalize;
pub mod resolver;
pub mod score;

pub use acoustid::AcoustidClient;
pub use cache::SingleFlightCache;
pub use coverart::CoverArtClient;
pub use error::ResolverError;
pub use musicbrainz::MusicBrainzClient;
pub use normalize::{stringnorm, stringrel};
pub use resolver::{AlbumContext, Resolver};
pub use score::{best_match, select_without_recording_id, Candidate, LocalTrack};

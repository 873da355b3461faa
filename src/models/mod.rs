use serde::{Deserialize, Serialize};

mod candidate;
mod party;
mod preferences;

pub use candidate::{Candidate, SwipeOutcome};
pub use party::{Member, MemberRole, Party, PartyEvent, PartyStatus};
pub use preferences::{PreferencePayload, RecommendationRequest, Song};

// ============================================================================
// Recommendation Service Types
// ============================================================================

/// A movie as returned by the recommendation service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedMovie {
    pub title: String,
    #[serde(default)]
    pub genre: Vec<String>,
    pub expected_score: f64,
}

/// Envelope the language model is asked to produce
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendedMovieList {
    pub movies: Vec<RecommendedMovie>,
}

// ============================================================================
// Metadata Lookup Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackLookupRequest {
    pub track_reference: String,
}

/// Spotify client-credentials token response
#[derive(Debug, Deserialize)]
pub struct SpotifyToken {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyTrack {
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<SpotifyArtistRef>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyArtistRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyArtist {
    #[serde(default)]
    pub genres: Vec<String>,
}

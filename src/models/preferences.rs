use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A song a participant likes, either typed in or resolved from a track link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Song {
    pub name: String,
    pub artist: String,
    pub genre: String,
}

/// Taste preferences submitted by a participant
///
/// Doubles as the request body of the recommendation contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencePayload {
    pub preferred_genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<Song>>,
}

pub type RecommendationRequest = PreferencePayload;

impl PreferencePayload {
    pub fn validate(&self) -> AppResult<()> {
        if self.preferred_genres.is_empty() {
            return Err(AppError::Validation(
                "At least one genre is required".to_string(),
            ));
        }
        if self.preferred_genres.iter().any(|g| g.trim().is_empty()) {
            return Err(AppError::Validation("Genres cannot be blank".to_string()));
        }

        for song in self.songs.iter().flatten() {
            if song.name.trim().is_empty() {
                return Err(AppError::Validation("Song name is required".to_string()));
            }
            if song.artist.trim().is_empty() {
                return Err(AppError::Validation("Artist name is required".to_string()));
            }
            if song.genre.trim().is_empty() {
                return Err(AppError::Validation("Genre is required".to_string()));
            }
        }

        Ok(())
    }

    /// Merges several payloads into a single request
    ///
    /// Genres are de-duplicated case-insensitively keeping first-seen order;
    /// songs are concatenated.
    pub fn merge<'a>(payloads: impl IntoIterator<Item = &'a PreferencePayload>) -> Self {
        let mut preferred_genres: Vec<String> = Vec::new();
        let mut songs: Vec<Song> = Vec::new();

        for payload in payloads {
            for genre in &payload.preferred_genres {
                let genre = genre.trim();
                if !preferred_genres
                    .iter()
                    .any(|existing| existing.eq_ignore_ascii_case(genre))
                {
                    preferred_genres.push(genre.to_string());
                }
            }
            songs.extend(payload.songs.iter().flatten().cloned());
        }

        Self {
            preferred_genres,
            songs: if songs.is_empty() { None } else { Some(songs) },
        }
    }
}

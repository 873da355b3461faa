use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{error::AppResult, models::Candidate, ranking::SwipeSession};

pub type Deck = Arc<Mutex<SwipeSession>>;

/// Live decks grouped by party, then member
///
/// Each member owns exactly one deck; its mutex orders that member's swipes
/// while different members never contend.
pub struct SwipeRegistry {
    parties: RwLock<HashMap<Uuid, HashMap<Uuid, Deck>>>,
    capacity: Option<usize>,
}

impl SwipeRegistry {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            parties: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Returns the member's deck, dealing it from `slate` on first use
    ///
    /// The flag is `true` when this call dealt the deck.
    pub async fn session_for(
        &self,
        party_id: Uuid,
        member_id: Uuid,
        slate: &[Candidate],
    ) -> AppResult<(Deck, bool)> {
        if let Some(existing) = self.get(party_id, member_id).await {
            return Ok((existing, false));
        }

        let mut parties = self.parties.write().await;
        let decks = parties.entry(party_id).or_default();
        // Another request may have dealt it while we waited for the lock
        if let Some(existing) = decks.get(&member_id) {
            return Ok((existing.clone(), false));
        }

        let session = match SwipeSession::from_slate(slate, self.capacity) {
            Ok(session) => Arc::new(Mutex::new(session)),
            Err(e) => {
                if decks.is_empty() {
                    parties.remove(&party_id);
                }
                return Err(e);
            }
        };
        decks.insert(member_id, session.clone());
        tracing::debug!(
            party_id = %party_id,
            member_id = %member_id,
            candidates = slate.len(),
            "Dealt swipe deck"
        );
        Ok((session, true))
    }

    pub async fn get(&self, party_id: Uuid, member_id: Uuid) -> Option<Deck> {
        self.parties
            .read()
            .await
            .get(&party_id)
            .and_then(|decks| decks.get(&member_id))
            .cloned()
    }

    pub async fn discard(&self, party_id: Uuid, member_id: Uuid) {
        let mut parties = self.parties.write().await;
        if let Some(decks) = parties.get_mut(&party_id) {
            decks.remove(&member_id);
            if decks.is_empty() {
                parties.remove(&party_id);
            }
        }
    }

    /// Drops every deck dealt for the party
    pub async fn discard_party(&self, party_id: Uuid) {
        if let Some(decks) = self.parties.write().await.remove(&party_id) {
            tracing::debug!(party_id = %party_id, decks = decks.len(), "Released party decks");
        }
    }

    /// Number of live decks across all parties
    pub async fn len(&self) -> usize {
        self.parties.read().await.values().map(HashMap::len).sum()
    }
}

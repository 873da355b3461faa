/// Party orchestration
///
/// `PartyService` is the only path through which party state changes. Each
/// operation runs as one atomic [`PartyStore::update`], and the resulting
/// events are published to the realtime hub after the commit. External calls
/// (the recommendation provider) happen before the update, so no party is
/// ever locked while waiting on the network.
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    config::SessionSettings,
    error::{AppError, AppResult},
    models::{Candidate, Member, Party, PartyEvent, PartyStatus, PreferencePayload, SwipeOutcome},
    ranking::{top_picks, RankedCandidate, SwipeReceipt, SwipeSession},
    services::{
        providers::RecommendationProvider, recommendations::generate_slate,
        swipes::{Deck, SwipeRegistry},
        sync::RealtimeSync,
    },
};

mod results;
mod session;
mod store;

pub use results::{aggregate, GroupRanking, PartyResults};
pub use session::PartySession;
pub use store::{InMemoryPartyStore, PartyOp, PartyStore};

const SLUG_ATTEMPTS: usize = 5;

/// What a member sees when looking at their deck
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckState {
    pub next: Option<Candidate>,
    pub remaining: usize,
}

/// Outcome of a swipe request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeResult {
    /// `false` when the candidate was unknown and the swipe was ignored
    pub applied: bool,
    pub receipt: Option<SwipeReceipt>,
    pub next: Option<Candidate>,
    pub remaining: usize,
    /// Set once the deck ran out and the member's rankings were submitted
    pub completed: bool,
}

/// A member's own ranking of the slate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRankings {
    pub member_id: Uuid,
    pub rankings: Vec<RankedCandidate>,
    pub top_picks: Vec<RankedCandidate>,
}

pub struct PartyService {
    store: Arc<dyn PartyStore>,
    recommender: Arc<dyn RecommendationProvider>,
    sync: Arc<dyn RealtimeSync>,
    swipes: SwipeRegistry,
    settings: SessionSettings,
}

impl PartyService {
    pub fn new(
        store: Arc<dyn PartyStore>,
        recommender: Arc<dyn RecommendationProvider>,
        sync: Arc<dyn RealtimeSync>,
        settings: SessionSettings,
    ) -> Self {
        tracing::info!(
            store = store.name(),
            recommender = recommender.name(),
            slate_size = settings.slate_size,
            "Party service ready"
        );

        Self {
            store,
            recommender,
            sync,
            swipes: SwipeRegistry::new(settings.swipe_buffer_capacity),
            settings,
        }
    }

    async fn load(&self, slug: &str) -> AppResult<PartySession> {
        self.store
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Party {} not found", slug)))
    }

    /// Applies `op` to the party and publishes what it changed
    ///
    /// A completed party releases its decks and its event channel.
    async fn commit(&self, party_id: Uuid, op: PartyOp) -> AppResult<PartySession> {
        let (session, events) = self.store.update(party_id, op).await?;
        self.sync.publish(party_id, &events);

        if session.status() == PartyStatus::Completed {
            self.swipes.discard_party(party_id).await;
            self.sync.close(party_id);
        }
        Ok(session)
    }

    // ------------------------------------------------------------------------
    // Parties and membership
    // ------------------------------------------------------------------------

    /// Opens a new party hosted by `user_id`
    pub async fn create_party(&self, user_id: &str) -> AppResult<PartySession> {
        for attempt in 1..=SLUG_ATTEMPTS {
            let (session, events) = PartySession::create(user_id, generate_slug())?;
            if self.store.insert(&session).await? {
                tracing::info!(
                    party_id = %session.party.id,
                    slug = %session.party.slug,
                    "Party created"
                );
                self.sync.publish(session.party.id, &events);
                return Ok(session);
            }
            tracing::warn!(attempt, slug = %session.party.slug, "Party slug collision");
        }

        Err(AppError::Internal(
            "Could not allocate a unique party slug".to_string(),
        ))
    }

    pub async fn get_party(&self, slug: &str) -> AppResult<Party> {
        Ok(self.load(slug).await?.party)
    }

    pub async fn members(&self, slug: &str) -> AppResult<Vec<Member>> {
        Ok(self.load(slug).await?.members)
    }

    pub async fn membership(&self, slug: &str, user_id: &str) -> AppResult<Member> {
        self.load(slug)
            .await?
            .member_by_user(user_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("User {} is not a member of party {}", user_id, slug))
            })
    }

    pub async fn join(&self, slug: &str, user_id: &str) -> AppResult<Member> {
        let party_id = self.load(slug).await?.party.id;
        let user = user_id.to_string();
        let session = self
            .commit(party_id, Box::new(move |s: &mut PartySession| s.join(&user)))
            .await?;

        session
            .member_by_user(user_id.trim())
            .cloned()
            .ok_or_else(|| AppError::Internal("Joined member missing after commit".to_string()))
    }

    pub async fn leave(&self, slug: &str, user_id: &str) -> AppResult<Party> {
        let snapshot = self.load(slug).await?;
        let user = user_id.to_string();
        let session = self
            .commit(
                snapshot.party.id,
                Box::new(move |s: &mut PartySession| s.leave(&user)),
            )
            .await?;

        if let Some(member) = snapshot.member_by_user(user_id.trim()) {
            self.swipes.discard(snapshot.party.id, member.id).await;
        }
        Ok(session.party)
    }

    // ------------------------------------------------------------------------
    // Host transitions
    // ------------------------------------------------------------------------

    /// Host request to move the party to `target`
    pub async fn update_status(
        &self,
        slug: &str,
        user_id: &str,
        target: PartyStatus,
    ) -> AppResult<Party> {
        if target == PartyStatus::Swiping {
            return self.start_swiping(slug, user_id).await;
        }

        let party_id = self.load(slug).await?.party.id;
        let user = user_id.to_string();
        let session = self
            .commit(
                party_id,
                Box::new(move |s: &mut PartySession| s.request_transition(&user, target)),
            )
            .await?;
        Ok(session.party)
    }

    /// `collecting_preferences -> swiping`
    ///
    /// Preconditions are checked on a snapshot before the recommendation call
    /// and again inside the commit, since members may have joined meanwhile.
    /// A provider failure leaves the party in `collecting_preferences`.
    async fn start_swiping(&self, slug: &str, user_id: &str) -> AppResult<Party> {
        let snapshot = self.load(slug).await?;
        snapshot.ensure_ready_for_swiping(user_id)?;

        let request = snapshot.aggregated_preferences();
        let slate = generate_slate(
            self.recommender.as_ref(),
            &request,
            self.settings.slate_size,
            self.settings.external_timeout,
        )
        .await?;

        let user = user_id.to_string();
        let session = self
            .commit(
                snapshot.party.id,
                Box::new(move |s: &mut PartySession| s.start_swiping(&user, slate)),
            )
            .await?;
        Ok(session.party)
    }

    /// Host escape hatch for members who never finish swiping
    pub async fn force_complete(&self, slug: &str, user_id: &str) -> AppResult<Party> {
        let party_id = self.load(slug).await?.party.id;
        let user = user_id.to_string();
        let session = self
            .commit(
                party_id,
                Box::new(move |s: &mut PartySession| s.force_complete(&user)),
            )
            .await?;
        Ok(session.party)
    }

    // ------------------------------------------------------------------------
    // Member progress
    // ------------------------------------------------------------------------

    pub async fn submit_preferences(
        &self,
        slug: &str,
        user_id: &str,
        payload: PreferencePayload,
    ) -> AppResult<Member> {
        let party_id = self.load(slug).await?.party.id;
        let user = user_id.to_string();
        let session = self
            .commit(
                party_id,
                Box::new(move |s: &mut PartySession| s.submit_preferences(&user, payload)),
            )
            .await?;

        session
            .member_by_user(user_id.trim())
            .cloned()
            .ok_or_else(|| AppError::Internal("Member missing after commit".to_string()))
    }

    /// The party slate, available once swiping has started
    pub async fn movies(&self, slug: &str) -> AppResult<Vec<Candidate>> {
        let session = self.load(slug).await?;
        match session.status() {
            PartyStatus::Swiping | PartyStatus::Completed => Ok(session.slate),
            status => Err(AppError::InvalidState(format!(
                "Movies are chosen when swiping starts (party is {})",
                status
            ))),
        }
    }

    /// Finds the caller's member record and deck, dealing it on first use
    ///
    /// A freshly dealt deck is checked against the current party, since
    /// `session` may predate a completion or departure that already released
    /// the member's decks.
    async fn deck(&self, session: &PartySession, user_id: &str) -> AppResult<(Member, Deck)> {
        let member = swiping_member(session, user_id)?;
        let party_id = session.party.id;
        let (deck, dealt) = self
            .swipes
            .session_for(party_id, member.id, &session.slate)
            .await?;
        if !dealt {
            return Ok((member, deck));
        }

        let current = self.store.get(party_id).await?;
        let still_swiping = current
            .as_ref()
            .ok_or_else(|| AppError::NotFound(format!("Party {} not found", session.party.slug)))
            .and_then(|current| swiping_member(current, user_id));

        match still_swiping {
            Ok(current) if current.id == member.id => Ok((member, deck)),
            Ok(_) => {
                self.swipes.discard(party_id, member.id).await;
                Err(AppError::InvalidState(
                    "Membership changed while dealing the deck".to_string(),
                ))
            }
            Err(e) => {
                tracing::debug!(
                    party_id = %party_id,
                    member_id = %member.id,
                    "Released deck dealt from a stale snapshot"
                );
                self.swipes.discard(party_id, member.id).await;
                Err(e)
            }
        }
    }

    pub async fn next_candidate(&self, slug: &str, user_id: &str) -> AppResult<DeckState> {
        let session = self.load(slug).await?;
        let (_, deck) = self.deck(&session, user_id).await?;
        let deck = deck.lock().await;

        Ok(DeckState {
            next: deck.next().cloned(),
            remaining: deck.remaining(),
        })
    }

    /// Records a swipe on the member's top candidate
    ///
    /// Swipes for candidates outside the deck are ignored and reported with
    /// `applied: false`. The swipe that empties the deck submits the member's
    /// rankings, which may complete the party. The swipe is applied to a copy
    /// of the deck and kept only if that submission commits, so a failed
    /// final swipe can be retried.
    pub async fn swipe(
        &self,
        slug: &str,
        user_id: &str,
        candidate_id: &str,
        outcome: SwipeOutcome,
    ) -> AppResult<SwipeResult> {
        let session = self.load(slug).await?;
        let (member, deck) = self.deck(&session, user_id).await?;

        let mut live = deck.lock().await;
        let mut draft: SwipeSession = live.clone();
        let receipt = match draft.swipe(candidate_id, outcome) {
            Ok(receipt) => Some(receipt),
            Err(AppError::UnknownCandidate(id)) => {
                tracing::warn!(
                    party_id = %session.party.id,
                    member_id = %member.id,
                    candidate_id = %id,
                    "Ignoring swipe for unknown candidate"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let completed = if receipt.as_ref().is_some_and(|r| r.exhausted) {
            let rankings = draft.rankings();
            let user = user_id.to_string();
            self.commit(
                session.party.id,
                Box::new(move |s: &mut PartySession| s.complete_swiping(&user, rankings)),
            )
            .await?;
            true
        } else {
            false
        };

        let next = draft.next().cloned();
        let remaining = draft.remaining();
        *live = draft;

        Ok(SwipeResult {
            applied: receipt.is_some(),
            receipt,
            next,
            remaining,
            completed,
        })
    }

    /// Explicitly finishes the member's swiping with their current rankings
    pub async fn complete_swiping(&self, slug: &str, user_id: &str) -> AppResult<Party> {
        let session = self.load(slug).await?;
        let (_, deck) = self.deck(&session, user_id).await?;
        let rankings = deck.lock().await.rankings();

        let user = user_id.to_string();
        let session = self
            .commit(
                session.party.id,
                Box::new(move |s: &mut PartySession| s.complete_swiping(&user, rankings)),
            )
            .await?;
        Ok(session.party)
    }

    /// The member's ranking: submitted if finished, live otherwise
    pub async fn rankings(&self, slug: &str, user_id: &str) -> AppResult<MemberRankings> {
        let session = self.load(slug).await?;
        let member = session.member_by_user(user_id).cloned().ok_or_else(|| {
            AppError::NotFound(format!("User {} is not a member of party {}", user_id, slug))
        })?;

        let rankings = match session.rankings.get(&member.id) {
            Some(submitted) => submitted.clone(),
            None => {
                let (_, deck) = self.deck(&session, user_id).await?;
                let rankings = deck.lock().await.rankings();
                rankings
            }
        };

        Ok(MemberRankings {
            member_id: member.id,
            top_picks: top_picks(&rankings),
            rankings,
        })
    }

    pub async fn results(&self, slug: &str) -> AppResult<PartyResults> {
        aggregate(&self.load(slug).await?)
    }

    /// Event receiver for a party, paired with the state it starts from
    ///
    /// The receiver is created before the snapshot is read, so no change can
    /// fall between the two.
    pub async fn events(
        &self,
        slug: &str,
    ) -> AppResult<(PartySession, broadcast::Receiver<PartyEvent>)> {
        let party_id = self.load(slug).await?.party.id;
        let receiver = self.sync.receiver(party_id);
        let snapshot = self
            .store
            .get(party_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Party {} not found", slug)))?;
        Ok((snapshot, receiver))
    }
}

/// The caller's member record, if they may still swipe in `session`
fn swiping_member(session: &PartySession, user_id: &str) -> AppResult<Member> {
    let member = session.member_by_user(user_id).cloned().ok_or_else(|| {
        AppError::NotFound(format!(
            "User {} is not a member of party {}",
            user_id, session.party.slug
        ))
    })?;

    if session.status() != PartyStatus::Swiping {
        return Err(AppError::InvalidState(format!(
            "Party is {}, expected {}",
            session.status(),
            PartyStatus::Swiping
        )));
    }
    if member.has_completed_swiping {
        return Err(AppError::AlreadyCompleted);
    }
    Ok(member)
}

/// Short shareable party code: 8 lowercase hex chars
fn generate_slug() -> String {
    let mut slug = Uuid::new_v4().simple().to_string();
    slug.truncate(8);
    slug
}

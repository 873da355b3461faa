use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Candidate, Member, MemberRole, Party, PartyEvent, PartyStatus, PreferencePayload,
    },
    ranking::RankedCandidate,
};

/// Authoritative state of one party
///
/// Every mutating operation validates first and only then writes, returning
/// the change notifications to broadcast. Stores additionally apply operations
/// to a copy, so a failed operation never leaves a partial write behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartySession {
    pub party: Party,
    pub members: Vec<Member>,
    /// Accepted preference payloads keyed by member id
    #[serde(default)]
    pub preferences: HashMap<Uuid, PreferencePayload>,
    /// Candidate slate attached when swiping starts
    #[serde(default)]
    pub slate: Vec<Candidate>,
    /// Final rankings of members who finished swiping, keyed by member id
    #[serde(default)]
    pub rankings: HashMap<Uuid, Vec<RankedCandidate>>,
}

impl PartySession {
    /// Opens a party in `waiting` with its creator as the sole host
    pub fn create(host_user_id: &str, slug: String) -> AppResult<(Self, Vec<PartyEvent>)> {
        let host_user_id = normalize_user_id(host_user_id)?;
        let party = Party {
            id: Uuid::new_v4(),
            slug,
            status: PartyStatus::Waiting,
            created_by: host_user_id.clone(),
            created_at: Utc::now(),
            forced_completion: false,
        };
        let host = Member::new(party.id, host_user_id, MemberRole::Host);

        let events = vec![
            PartyEvent::PartyUpdate(party.clone()),
            PartyEvent::MemberJoin(host.clone()),
        ];

        let session = Self {
            party,
            members: vec![host],
            preferences: HashMap::new(),
            slate: Vec::new(),
            rankings: HashMap::new(),
        };

        Ok((session, events))
    }

    pub fn status(&self) -> PartyStatus {
        self.party.status
    }

    pub fn member_by_user(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member(&self, member_id: Uuid) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    fn require_member(&self, user_id: &str) -> AppResult<&Member> {
        self.member_by_user(user_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "User {} is not a member of party {}",
                user_id, self.party.slug
            ))
        })
    }

    fn require_host(&self, user_id: &str) -> AppResult<&Member> {
        match self.member_by_user(user_id) {
            Some(member) if member.is_host() => Ok(member),
            _ => Err(AppError::Forbidden(
                "Only the host can change the party status".to_string(),
            )),
        }
    }

    fn require_status(&self, expected: PartyStatus) -> AppResult<()> {
        if self.party.status != expected {
            return Err(AppError::InvalidState(format!(
                "Party is {}, expected {}",
                self.party.status, expected
            )));
        }
        Ok(())
    }

    fn member_mut(&mut self, member_id: Uuid) -> AppResult<&mut Member> {
        self.members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| AppError::Internal(format!("Member {} vanished", member_id)))
    }

    pub fn all_submitted(&self) -> bool {
        self.members.iter().all(|m| m.has_submitted_preferences)
    }

    pub fn all_completed(&self) -> bool {
        self.members.iter().all(|m| m.has_completed_swiping)
    }

    fn set_status(&mut self, status: PartyStatus) -> PartyEvent {
        tracing::info!(
            party_id = %self.party.id,
            from = %self.party.status,
            to = %status,
            "Party status changed"
        );
        self.party.status = status;
        PartyEvent::PartyUpdate(self.party.clone())
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Adds `user_id` as a guest
    pub fn join(&mut self, user_id: &str) -> AppResult<Vec<PartyEvent>> {
        let user_id = normalize_user_id(user_id)?;

        if self.member_by_user(&user_id).is_some() {
            return Err(AppError::AlreadyMember(user_id));
        }
        if self.party.status.is_terminal() {
            return Err(AppError::InvalidState(
                "This party has already finished".to_string(),
            ));
        }

        let member = Member::new(self.party.id, user_id, MemberRole::Guest);
        tracing::info!(party_id = %self.party.id, member_id = %member.id, "Member joined");
        self.members.push(member.clone());

        Ok(vec![PartyEvent::MemberJoin(member)])
    }

    /// Removes a guest
    ///
    /// A departure during swiping can satisfy the completion criterion, in
    /// which case the party completes as part of the same operation.
    pub fn leave(&mut self, user_id: &str) -> AppResult<Vec<PartyEvent>> {
        let member = self.require_member(user_id)?.clone();
        if member.is_host() {
            return Err(AppError::Forbidden(
                "The host cannot leave their own party".to_string(),
            ));
        }
        if self.party.status.is_terminal() {
            return Err(AppError::InvalidState(
                "This party has already finished".to_string(),
            ));
        }

        self.members.retain(|m| m.id != member.id);
        self.preferences.remove(&member.id);
        self.rankings.remove(&member.id);
        tracing::info!(party_id = %self.party.id, member_id = %member.id, "Member left");

        let mut events = vec![PartyEvent::MemberLeave(member)];
        if self.party.status == PartyStatus::Swiping && self.all_completed() {
            events.push(self.set_status(PartyStatus::Completed));
        }

        Ok(events)
    }

    // ------------------------------------------------------------------------
    // Host transitions
    // ------------------------------------------------------------------------

    /// `waiting -> collecting_preferences`
    pub fn start_collecting(&mut self, user_id: &str) -> AppResult<Vec<PartyEvent>> {
        self.require_host(user_id)?;
        self.require_status(PartyStatus::Waiting)?;
        Ok(vec![self.set_status(PartyStatus::CollectingPreferences)])
    }

    /// Checks everything `collecting_preferences -> swiping` needs except the slate
    pub fn ensure_ready_for_swiping(&self, user_id: &str) -> AppResult<()> {
        self.require_host(user_id)?;
        self.require_status(PartyStatus::CollectingPreferences)?;

        let pending = self
            .members
            .iter()
            .filter(|m| !m.has_submitted_preferences)
            .count();
        if pending > 0 {
            return Err(AppError::InvalidState(format!(
                "Waiting on {} member(s) to submit preferences",
                pending
            )));
        }
        Ok(())
    }

    /// Recommendation request combining every submitted payload
    pub fn aggregated_preferences(&self) -> PreferencePayload {
        let payloads = self
            .members
            .iter()
            .filter_map(|m| self.preferences.get(&m.id));
        PreferencePayload::merge(payloads)
    }

    /// `collecting_preferences -> swiping`, attaching `slate`
    pub fn start_swiping(
        &mut self,
        user_id: &str,
        slate: Vec<Candidate>,
    ) -> AppResult<Vec<PartyEvent>> {
        self.ensure_ready_for_swiping(user_id)?;
        if slate.is_empty() {
            return Err(AppError::InvalidState(
                "Cannot start swiping without candidates".to_string(),
            ));
        }

        self.slate = slate;
        Ok(vec![self.set_status(PartyStatus::Swiping)])
    }

    /// `swiping -> completed` once every member has finished
    pub fn finish(&mut self, user_id: &str) -> AppResult<Vec<PartyEvent>> {
        self.require_host(user_id)?;
        self.require_status(PartyStatus::Swiping)?;
        if !self.all_completed() {
            return Err(AppError::InvalidState(
                "Some members are still swiping".to_string(),
            ));
        }
        Ok(vec![self.set_status(PartyStatus::Completed)])
    }

    /// `swiping -> completed` regardless of stalled members
    ///
    /// Stalled members keep `has_completed_swiping == false` and contribute
    /// nothing to the results.
    pub fn force_complete(&mut self, user_id: &str) -> AppResult<Vec<PartyEvent>> {
        self.require_host(user_id)?;
        self.require_status(PartyStatus::Swiping)?;

        let stalled = self
            .members
            .iter()
            .filter(|m| !m.has_completed_swiping)
            .count();
        self.party.forced_completion = stalled > 0;
        tracing::warn!(party_id = %self.party.id, stalled, "Host forced party completion");

        Ok(vec![self.set_status(PartyStatus::Completed)])
    }

    /// Dispatches a host transition request to `target`
    ///
    /// `swiping` needs a slate, so callers go through
    /// [`start_swiping`](Self::start_swiping) for it instead.
    pub fn request_transition(
        &mut self,
        user_id: &str,
        target: PartyStatus,
    ) -> AppResult<Vec<PartyEvent>> {
        self.require_host(user_id)?;
        if self.party.status.next() != Some(target) {
            return Err(AppError::InvalidState(format!(
                "Cannot move party from {} to {}",
                self.party.status, target
            )));
        }

        match target {
            PartyStatus::CollectingPreferences => self.start_collecting(user_id),
            PartyStatus::Completed => self.finish(user_id),
            PartyStatus::Swiping => Err(AppError::InvalidState(
                "Swiping starts once a candidate slate is attached".to_string(),
            )),
            PartyStatus::Waiting => Err(AppError::InvalidState(
                "A party cannot return to waiting".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Member progress
    // ------------------------------------------------------------------------

    pub fn submit_preferences(
        &mut self,
        user_id: &str,
        payload: PreferencePayload,
    ) -> AppResult<Vec<PartyEvent>> {
        let member_id = self.require_member(user_id)?.id;
        self.require_status(PartyStatus::CollectingPreferences)?;
        if self.preferences.contains_key(&member_id) {
            return Err(AppError::AlreadySubmitted);
        }
        payload.validate()?;

        self.preferences.insert(member_id, payload);
        let member = self.member_mut(member_id)?;
        member.has_submitted_preferences = true;
        let member = member.clone();

        tracing::info!(party_id = %self.party.id, member_id = %member_id, "Preferences submitted");
        Ok(vec![PartyEvent::MemberUpdate(member)])
    }

    /// Marks a member done and completes the party if they were the last one
    pub fn complete_swiping(
        &mut self,
        user_id: &str,
        rankings: Vec<RankedCandidate>,
    ) -> AppResult<Vec<PartyEvent>> {
        let member = self.require_member(user_id)?;
        let member_id = member.id;
        let already_done = member.has_completed_swiping;
        self.require_status(PartyStatus::Swiping)?;
        if already_done {
            return Err(AppError::AlreadyCompleted);
        }

        self.rankings.insert(member_id, rankings);
        let member = self.member_mut(member_id)?;
        member.has_completed_swiping = true;
        let member = member.clone();
        tracing::info!(party_id = %self.party.id, member_id = %member_id, "Member finished swiping");

        let mut events = vec![PartyEvent::MemberUpdate(member)];
        if self.all_completed() {
            events.push(self.set_status(PartyStatus::Completed));
        }
        Ok(events)
    }
}

fn normalize_user_id(user_id: &str) -> AppResult<String> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    Ok(trimmed.to_string())
}

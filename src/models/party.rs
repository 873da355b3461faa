use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Lifecycle of a party. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    Waiting,
    CollectingPreferences,
    Swiping,
    Completed,
}

impl PartyStatus {
    /// The only status this one may advance to
    pub fn next(self) -> Option<PartyStatus> {
        match self {
            PartyStatus::Waiting => Some(PartyStatus::CollectingPreferences),
            PartyStatus::CollectingPreferences => Some(PartyStatus::Swiping),
            PartyStatus::Swiping => Some(PartyStatus::Completed),
            PartyStatus::Completed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == PartyStatus::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartyStatus::Waiting => "waiting",
            PartyStatus::CollectingPreferences => "collecting_preferences",
            PartyStatus::Swiping => "swiping",
            PartyStatus::Completed => "completed",
        }
    }
}

impl Display for PartyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multi-user session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: Uuid,
    /// Human-shareable identifier used in URLs
    pub slug: String,
    pub status: PartyStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Set when the host forced completion past stalled members
    #[serde(default)]
    pub forced_completion: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Host,
    Guest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub party_id: Uuid,
    pub user_id: String,
    pub role: MemberRole,
    pub has_submitted_preferences: bool,
    pub has_completed_swiping: bool,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(party_id: Uuid, user_id: impl Into<String>, role: MemberRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            party_id,
            user_id: user_id.into(),
            role,
            has_submitted_preferences: false,
            has_completed_swiping: false,
            joined_at: Utc::now(),
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == MemberRole::Host
    }
}

/// Change notification delivered to every subscriber of a party
///
/// Payloads carry the full record; consumers replace by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PartyEvent {
    PartyUpdate(Party),
    MemberJoin(Member),
    MemberLeave(Member),
    MemberUpdate(Member),
}

impl PartyEvent {
    pub fn party_id(&self) -> Uuid {
        match self {
            PartyEvent::PartyUpdate(party) => party.id,
            PartyEvent::MemberJoin(member)
            | PartyEvent::MemberLeave(member)
            | PartyEvent::MemberUpdate(member) => member.party_id,
        }
    }

    /// Event name used on the wire (SSE `event:` field)
    pub fn name(&self) -> &'static str {
        match self {
            PartyEvent::PartyUpdate(_) => "partyUpdate",
            PartyEvent::MemberJoin(_) => "memberJoin",
            PartyEvent::MemberLeave(_) => "memberLeave",
            PartyEvent::MemberUpdate(_) => "memberUpdate",
        }
    }
}

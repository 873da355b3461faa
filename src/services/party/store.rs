use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::PartyEvent,
};

use super::session::PartySession;

/// A mutation applied to one party under that party's write lock
pub type PartyOp = Box<dyn FnOnce(&mut PartySession) -> AppResult<Vec<PartyEvent>> + Send>;

/// Authoritative party storage
///
/// Implementations serialize [`update`](PartyStore::update) calls per party
/// and commit an operation only when it returns `Ok`, so precondition checks
/// such as "every member finished" always see a consistent snapshot.
#[async_trait::async_trait]
pub trait PartyStore: Send + Sync {
    /// Inserts a new party; returns `false` when its slug is taken
    async fn insert(&self, session: &PartySession) -> AppResult<bool>;

    async fn get(&self, party_id: Uuid) -> AppResult<Option<PartySession>>;

    async fn find_by_slug(&self, slug: &str) -> AppResult<Option<PartySession>>;

    /// Applies `op` atomically, returning the committed state and its events
    async fn update(
        &self,
        party_id: Uuid,
        op: PartyOp,
    ) -> AppResult<(PartySession, Vec<PartyEvent>)>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Process-local store used in development and tests
#[derive(Default)]
pub struct InMemoryPartyStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    parties: HashMap<Uuid, Arc<Mutex<PartySession>>>,
    slugs: HashMap<String, Uuid>,
}

impl InMemoryPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, party_id: Uuid) -> Option<Arc<Mutex<PartySession>>> {
        self.inner.read().await.parties.get(&party_id).cloned()
    }
}

#[async_trait::async_trait]
impl PartyStore for InMemoryPartyStore {
    async fn insert(&self, session: &PartySession) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.slugs.contains_key(&session.party.slug) {
            return Ok(false);
        }

        inner
            .slugs
            .insert(session.party.slug.clone(), session.party.id);
        inner
            .parties
            .insert(session.party.id, Arc::new(Mutex::new(session.clone())));
        Ok(true)
    }

    async fn get(&self, party_id: Uuid) -> AppResult<Option<PartySession>> {
        match self.entry(party_id).await {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_by_slug(&self, slug: &str) -> AppResult<Option<PartySession>> {
        let party_id = self.inner.read().await.slugs.get(slug).copied();
        match party_id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        party_id: Uuid,
        op: PartyOp,
    ) -> AppResult<(PartySession, Vec<PartyEvent>)> {
        let entry = self
            .entry(party_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Party {} not found", party_id)))?;

        let mut current = entry.lock().await;
        let mut draft = current.clone();
        let events = op(&mut draft)?;
        *current = draft;

        Ok((current.clone(), events))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartyStatus;

    fn session(slug: &str) -> PartySession {
        PartySession::create("host", slug.to_string()).unwrap().0
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryPartyStore::new();
        let party = session("aaaa0001");
        assert!(store.insert(&party).await.unwrap());

        let by_slug = store.find_by_slug("aaaa0001").await.unwrap().unwrap();
        assert_eq!(by_slug.party.id, party.party.id);
        let by_id = store.get(party.party.id).await.unwrap().unwrap();
        assert_eq!(by_id, party);
        assert!(store.find_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_rejected() {
        let store = InMemoryPartyStore::new();
        assert!(store.insert(&session("dup00001")).await.unwrap());
        assert!(!store.insert(&session("dup00001")).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_update_commits_nothing() {
        let store = InMemoryPartyStore::new();
        let party = session("fail0001");
        store.insert(&party).await.unwrap();

        let result = store
            .update(
                party.party.id,
                Box::new(|s: &mut PartySession| {
                    s.join("guest")?;
                    s.start_collecting("guest")
                }),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let stored = store.get(party.party.id).await.unwrap().unwrap();
        assert_eq!(stored.members.len(), 1);
        assert_eq!(stored.party.status, PartyStatus::Waiting);
    }

    #[tokio::test]
    async fn test_update_unknown_party() {
        let store = InMemoryPartyStore::new();
        let result = store
            .update(Uuid::new_v4(), Box::new(|_: &mut PartySession| Ok(vec![])))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryPartyStore::new());
        let party = session("race0001");
        let party_id = party.party.id;
        store.insert(&party).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(
                        party_id,
                        Box::new(move |s: &mut PartySession| s.join(&format!("guest-{i}"))),
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = store.get(party_id).await.unwrap().unwrap();
        assert_eq!(stored.members.len(), 21);
    }
}

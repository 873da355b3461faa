/// Realtime fan-out of party change notifications
///
/// Every committed party mutation is published here. Delivery is advisory:
/// subscribers refresh cached views from it, while correctness always rests
/// on the state machine checks performed by the store. Publishing never
/// blocks, and slow subscribers lose events rather than stall writers.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{Member, Party, PartyEvent};

/// Buffered events per party before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Callbacks invoked for each delivered event
///
/// Every callback defaults to a no-op so consumers only implement what they
/// display.
pub trait PartyEventHandler: Send + Sync {
    fn on_party_update(&self, _party: &Party) {}

    fn on_member_join(&self, _member: &Member) {}

    fn on_member_leave(&self, _member: &Member) {}

    fn on_member_update(&self, _member: &Member) {}

    fn dispatch(&self, event: &PartyEvent) {
        match event {
            PartyEvent::PartyUpdate(party) => self.on_party_update(party),
            PartyEvent::MemberJoin(member) => self.on_member_join(member),
            PartyEvent::MemberLeave(member) => self.on_member_leave(member),
            PartyEvent::MemberUpdate(member) => self.on_member_update(member),
        }
    }
}

/// Identifies one live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub party_id: Uuid,
}

/// Realtime delivery of party events
pub trait RealtimeSync: Send + Sync {
    /// Broadcasts `events` to everyone subscribed to `party_id`
    fn publish(&self, party_id: Uuid, events: &[PartyEvent]);

    /// Invokes `handler` for every event published to `party_id` from now on
    fn subscribe(&self, party_id: Uuid, handler: Arc<dyn PartyEventHandler>)
        -> SubscriptionHandle;

    /// Stops a subscription; returns `false` if it was already gone
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool;

    /// Raw event receiver for streaming transports (SSE)
    fn receiver(&self, party_id: Uuid) -> broadcast::Receiver<PartyEvent>;

    /// Ends delivery for a party that will not change again
    ///
    /// Receivers still get events already published, then see the stream end.
    fn close(&self, party_id: Uuid);
}

/// In-process hub backed by one tokio broadcast channel per party
pub struct BroadcastSync {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<PartyEvent>>>,
    subscriptions: Mutex<HashMap<SubscriptionHandle, JoinHandle<()>>>,
}

impl Default for BroadcastSync {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastSync {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<Uuid, broadcast::Sender<PartyEvent>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<SubscriptionHandle, JoinHandle<()>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscriptions whose forwarding task has not finished
    fn live_subscriptions(
        &self,
    ) -> MutexGuard<'_, HashMap<SubscriptionHandle, JoinHandle<()>>> {
        let mut subscriptions = self.subscriptions();
        subscriptions.retain(|_, task| !task.is_finished());
        subscriptions
    }

    /// Number of live subscriptions across all parties
    pub fn subscription_count(&self) -> usize {
        self.live_subscriptions().len()
    }
}

impl RealtimeSync for BroadcastSync {
    fn publish(&self, party_id: Uuid, events: &[PartyEvent]) {
        if events.is_empty() {
            return;
        }

        let mut channels = self.channels();
        let Some(sender) = channels.get(&party_id) else {
            tracing::debug!(party_id = %party_id, "No listeners for party events");
            return;
        };

        if sender.receiver_count() == 0 {
            channels.remove(&party_id);
            tracing::debug!(party_id = %party_id, "Dropped idle party channel");
            return;
        }

        for event in events {
            // Only fails when every receiver dropped in the meantime
            if sender.send(event.clone()).is_err() {
                break;
            }
            tracing::debug!(party_id = %party_id, event = event.name(), "Published party event");
        }
    }

    fn subscribe(
        &self,
        party_id: Uuid,
        handler: Arc<dyn PartyEventHandler>,
    ) -> SubscriptionHandle {
        let mut rx = self.receiver(party_id);
        let handle = SubscriptionHandle {
            id: Uuid::new_v4(),
            party_id,
        };

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler.dispatch(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(party_id = %party_id, skipped, "Subscriber lagged behind party events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        self.live_subscriptions().insert(handle, task);
        tracing::debug!(party_id = %party_id, subscription = %handle.id, "Subscribed to party");
        handle
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        match self.live_subscriptions().remove(handle) {
            Some(task) => {
                task.abort();
                tracing::debug!(party_id = %handle.party_id, subscription = %handle.id, "Unsubscribed from party");
                true
            }
            None => false,
        }
    }

    fn receiver(&self, party_id: Uuid) -> broadcast::Receiver<PartyEvent> {
        self.channels()
            .entry(party_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn close(&self, party_id: Uuid) {
        if self.channels().remove(&party_id).is_some() {
            tracing::debug!(party_id = %party_id, "Closed party channel");
        }
    }
}

#[derive(Debug, Default)]
struct ViewState {
    party: Option<Party>,
    members: Vec<Member>,
    /// Member ids seen leaving; a rejoin always gets a fresh id
    departed: HashSet<Uuid>,
}

/// Client-side cache of one party kept current from delivered events
///
/// Events carry full records and are applied as replace-by-id, so duplicate
/// delivery is harmless. Records for members that already left are ignored,
/// which keeps a late update from resurrecting them.
#[derive(Debug, Default)]
pub struct PartyView {
    state: Mutex<ViewState>,
}

impl PartyView {
    pub fn new(party: Party, members: Vec<Member>) -> Self {
        Self {
            state: Mutex::new(ViewState {
                party: Some(party),
                members,
                departed: HashSet::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn party(&self) -> Option<Party> {
        self.state().party.clone()
    }

    pub fn members(&self) -> Vec<Member> {
        self.state().members.clone()
    }

    fn upsert(&self, member: &Member) {
        let mut state = self.state();
        if state.departed.contains(&member.id) {
            return;
        }
        match state.members.iter_mut().find(|m| m.id == member.id) {
            Some(existing) => *existing = member.clone(),
            None => state.members.push(member.clone()),
        }
    }
}

impl PartyEventHandler for PartyView {
    fn on_party_update(&self, party: &Party) {
        self.state().party = Some(party.clone());
    }

    fn on_member_join(&self, member: &Member) {
        self.upsert(member);
    }

    fn on_member_leave(&self, member: &Member) {
        let mut state = self.state();
        state.departed.insert(member.id);
        state.members.retain(|m| m.id != member.id);
    }

    fn on_member_update(&self, member: &Member) {
        self.upsert(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemberRole, PartyStatus};
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn party() -> Party {
        Party {
            id: Uuid::new_v4(),
            slug: "abcd1234".to_string(),
            status: PartyStatus::Waiting,
            created_by: "host".to_string(),
            created_at: Utc::now(),
            forced_completion: false,
        }
    }

    /// Forwards every event into a channel the test can await
    struct Recorder(mpsc::UnboundedSender<PartyEvent>);

    impl PartyEventHandler for Recorder {
        fn dispatch(&self, event: &PartyEvent) {
            let _ = self.0.send(event.clone());
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<PartyEvent>) -> PartyEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event not delivered")
            .expect("recorder dropped")
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events_in_order() {
        let sync = BroadcastSync::new();
        let party = party();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sync.subscribe(party.id, Arc::new(Recorder(tx)));

        let guest = Member::new(party.id, "guest", MemberRole::Guest);
        sync.publish(
            party.id,
            &[
                PartyEvent::MemberJoin(guest.clone()),
                PartyEvent::PartyUpdate(party.clone()),
            ],
        );

        assert_eq!(next(&mut rx).await, PartyEvent::MemberJoin(guest));
        assert_eq!(next(&mut rx).await, PartyEvent::PartyUpdate(party));
    }

    #[tokio::test]
    async fn test_events_are_scoped_to_their_party() {
        let sync = BroadcastSync::new();
        let mine = party();
        let other = party();
        let mut rx = sync.receiver(mine.id);
        let _other_rx = sync.receiver(other.id);

        sync.publish(other.id, &[PartyEvent::PartyUpdate(other.clone())]);
        sync.publish(mine.id, &[PartyEvent::PartyUpdate(mine.clone())]);

        assert_eq!(rx.recv().await.unwrap(), PartyEvent::PartyUpdate(mine));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let sync = BroadcastSync::new();
        let party = party();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = sync.subscribe(party.id, Arc::new(Recorder(tx)));
        assert_eq!(sync.subscription_count(), 1);

        assert!(sync.unsubscribe(&handle));
        assert!(!sync.unsubscribe(&handle));
        assert_eq!(sync.subscription_count(), 0);

        sync.publish(party.id, &[PartyEvent::PartyUpdate(party.clone())]);
        // The aborted task dropped the recorder, closing the channel
        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("channel should close");
        assert!(delivered.is_none());
    }

    #[test]
    fn test_publish_without_listeners_is_a_no_op() {
        let sync = BroadcastSync::new();
        let party = party();
        sync.publish(party.id, &[PartyEvent::PartyUpdate(party.clone())]);
        drop(sync.receiver(party.id));
        sync.publish(party.id, &[PartyEvent::PartyUpdate(party)]);
    }

    #[test]
    fn test_view_applies_events_idempotently() {
        let party = party();
        let host = Member::new(party.id, "host", MemberRole::Host);
        let view = PartyView::new(party.clone(), vec![host.clone()]);

        let guest = Member::new(party.id, "guest", MemberRole::Guest);
        view.dispatch(&PartyEvent::MemberJoin(guest.clone()));
        view.dispatch(&PartyEvent::MemberJoin(guest.clone()));
        assert_eq!(view.members().len(), 2);

        let mut submitted = guest.clone();
        submitted.has_submitted_preferences = true;
        view.dispatch(&PartyEvent::MemberUpdate(submitted.clone()));
        view.dispatch(&PartyEvent::MemberUpdate(submitted));
        let members = view.members();
        assert_eq!(members.len(), 2);
        assert!(members[1].has_submitted_preferences);

        let mut collecting = party.clone();
        collecting.status = PartyStatus::CollectingPreferences;
        view.dispatch(&PartyEvent::PartyUpdate(collecting.clone()));
        view.dispatch(&PartyEvent::PartyUpdate(collecting));
        assert_eq!(
            view.party().unwrap().status,
            PartyStatus::CollectingPreferences
        );

        view.dispatch(&PartyEvent::MemberLeave(guest.clone()));
        view.dispatch(&PartyEvent::MemberLeave(guest));
        assert_eq!(view.members(), vec![host]);
    }

    #[test]
    fn test_view_ignores_updates_for_departed_members() {
        let party = party();
        let host = Member::new(party.id, "host", MemberRole::Host);
        let guest = Member::new(party.id, "guest", MemberRole::Guest);
        let view = PartyView::new(party.clone(), vec![host.clone(), guest.clone()]);

        view.dispatch(&PartyEvent::MemberLeave(guest.clone()));
        let mut finished = guest.clone();
        finished.has_completed_swiping = true;
        view.dispatch(&PartyEvent::MemberUpdate(finished));
        view.dispatch(&PartyEvent::MemberJoin(guest));
        assert_eq!(view.members(), vec![host.clone()]);

        // Rejoining mints a new member id
        let rejoined = Member::new(party.id, "guest", MemberRole::Guest);
        view.dispatch(&PartyEvent::MemberJoin(rejoined.clone()));
        assert_eq!(view.members(), vec![host, rejoined]);
    }

    #[tokio::test]
    async fn test_closed_party_subscriptions_are_pruned() {
        let sync = BroadcastSync::new();
        let done = party();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sync.subscribe(done.id, Arc::new(Recorder(tx)));

        sync.publish(done.id, &[PartyEvent::PartyUpdate(done.clone())]);
        sync.close(done.id);
        assert_eq!(next(&mut rx).await, PartyEvent::PartyUpdate(done));
        // The forwarding task ends and drops the recorder
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("subscription should end");
        assert!(closed.is_none());

        for _ in 0..50 {
            if sync.subscription_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sync.subscription_count(), 0);

        let (tx, _rx) = mpsc::unbounded_channel();
        sync.subscribe(party().id, Arc::new(Recorder(tx)));
        assert_eq!(sync.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_view_tracks_a_live_subscription() {
        let sync = BroadcastSync::new();
        let party = party();
        let view = Arc::new(PartyView::new(party.clone(), Vec::new()));
        sync.subscribe(party.id, view.clone());

        let guest = Member::new(party.id, "guest", MemberRole::Guest);
        sync.publish(party.id, &[PartyEvent::MemberJoin(guest.clone())]);

        for _ in 0..50 {
            if !view.members().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(view.members(), vec![guest]);
    }
}

//! The emergency dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    compose_message, CallReceipt, DispatchOutcome, DispatchPhase, DispatchReport, SmsGateway,
    SmsRequest, SosEvent, SosStatus,
};
use crate::config::DispatchConfig;
use crate::contacts::{load_contacts, normalize_phone, EmergencyContact};
use crate::error::{Error, Result};
use crate::location::LocationReader;
use crate::profile::UserProfile;
use crate::store::{self, collections, DocumentStore, Query};

/// Raises SOS events and notifies the user's emergency contacts.
///
/// Triggers are never deduplicated and an in-flight dispatch runs to
/// completion.
#[derive(Debug)]
pub struct EmergencyDispatcher {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn SmsGateway>,
    location: LocationReader,
    attempt_timeout: Duration,
    country_prefix: String,
    map_link_base: String,
    phase: watch::Sender<DispatchPhase>,
}

impl EmergencyDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn SmsGateway>,
        location: LocationReader,
        config: &DispatchConfig,
    ) -> Self {
        let (phase, _) = watch::channel(DispatchPhase::Idle);
        Self {
            store,
            gateway,
            location,
            attempt_timeout: config.attempt_timeout(),
            country_prefix: config.country_prefix.clone(),
            map_link_base: config.map_link_base.clone(),
            phase,
        }
    }

    /// The last phase transition made by any trigger.
    ///
    /// Every trigger on this dispatcher reports into the same slot, so while
    /// two triggers overlap this is whichever moved last.
    #[must_use]
    pub fn phase(&self) -> DispatchPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions of every trigger, as [`phase`](Self::phase)
    /// reports them.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<DispatchPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: DispatchPhase) {
        debug!(%phase, "dispatch phase");
        self.phase.send_replace(phase);
    }

    /// Raise an SOS for `user_id` and notify every contact.
    ///
    /// The event is persisted before any contact is messaged. A partial
    /// failure is reported through the outcomes of a successful report.
    ///
    /// # Errors
    ///
    /// - [`Error::LocationRequired`] if no position is known; nothing is
    ///   created.
    /// - [`Error::Persistence`] if the event cannot be recorded; no contact
    ///   is messaged.
    /// - [`Error::DispatchFailed`] if contacts exist and every attempt
    ///   failed; the event stays recorded.
    pub async fn trigger(&self, user_id: &str) -> Result<DispatchReport> {
        let sample = self.location.require("SOS trigger")?;

        self.set_phase(DispatchPhase::Triggering);
        let event = SosEvent::new(user_id, sample.coordinate, Utc::now().timestamp_millis());
        let saved =
            store::save(self.store.as_ref(), collections::SOS_EVENTS, &event.id, &event).await;
        if let Err(e) = saved {
            error!(id = %event.id, "failed to record SOS event: {e}");
            self.set_phase(DispatchPhase::Idle);
            return Err(match e {
                Error::Persistence { .. } => e,
                other => Error::persistence(collections::SOS_EVENTS, &event.id, other),
            });
        }
        info!(id = %event.id, location = %event.location, "SOS event recorded");

        self.set_phase(DispatchPhase::Dispatching);
        let contacts = match load_contacts(self.store.as_ref(), user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                self.set_phase(DispatchPhase::Completed);
                return Err(e);
            }
        };
        let profile = UserProfile::load(self.store.as_ref(), user_id)
            .await
            .unwrap_or_else(|e| {
                warn!(user = user_id, "profile unavailable, sending without it: {e}");
                UserProfile::default()
            });
        let message = compose_message(&profile, &event.location, &self.map_link_base);

        let outcomes = self.fan_out(&contacts, &message).await;
        let report = DispatchReport::new(event, outcomes);
        self.set_phase(DispatchPhase::Completed);

        info!(
            id = %report.event.id,
            sent = report.success_count,
            failed = report.failure_count,
            "SOS dispatch finished"
        );

        if report.is_delivered() {
            Ok(report)
        } else {
            Err(Error::DispatchFailed {
                failures: report.failures(),
                event_id: report.event.id,
            })
        }
    }

    /// Message every contact concurrently and collect one outcome each, in
    /// contact order. Every attempt runs to completion or timeout.
    async fn fan_out(&self, contacts: &[EmergencyContact], message: &str) -> Vec<DispatchOutcome> {
        let handles: Vec<(String, JoinHandle<DispatchOutcome>)> = contacts
            .iter()
            .map(|contact| {
                let request = SmsRequest {
                    to: normalize_phone(&contact.phone_digits, &self.country_prefix),
                    message: message.to_string(),
                };
                let handle = tokio::spawn(attempt(
                    Arc::clone(&self.gateway),
                    contact.id.clone(),
                    request,
                    self.attempt_timeout,
                ));
                (contact.id.clone(), handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (contact_id, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                DispatchOutcome::failure(contact_id, format!("attempt aborted: {e}"))
            });
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Resolve an active SOS event.
    ///
    /// The status check and the write happen as one store operation, so of
    /// several concurrent resolves of the same event exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the event does not exist or is already
    /// resolved.
    pub async fn mark_resolved(&self, sos_event_id: &str) -> Result<SosEvent> {
        let mut event: SosEvent =
            store::load(self.store.as_ref(), collections::SOS_EVENTS, sos_event_id)
                .await?
                .ok_or_else(|| Error::not_found("SOS event", sos_event_id))?;
        if !event.is_active() {
            return Err(Error::not_found("active SOS event", sos_event_id));
        }

        let resolved_at = Utc::now().timestamp_millis();
        let update = json!({
            "status": SosStatus::Resolved,
            "resolvedAt": resolved_at,
        });
        let document = store::to_document(&update)?;
        let applied = self
            .store
            .merge_if(
                collections::SOS_EVENTS,
                sos_event_id,
                "status",
                &json!(SosStatus::Active),
                document,
            )
            .await
            .map_err(|e| Error::persistence(collections::SOS_EVENTS, sos_event_id, e))?;
        if !applied {
            // Resolved by someone else since the read
            return Err(Error::not_found("active SOS event", sos_event_id));
        }

        event.status = SosStatus::Resolved;
        event.resolved_at_epoch_ms = Some(resolved_at);
        info!(id = sos_event_id, "SOS event resolved");
        Ok(event)
    }

    /// Resolve the most recent active SOS event of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the user has no active event.
    pub async fn resolve_latest(&self, user_id: &str) -> Result<SosEvent> {
        let latest = self
            .events_for(user_id)
            .await?
            .into_iter()
            .find(SosEvent::is_active)
            .ok_or_else(|| Error::not_found("active SOS event", user_id))?;
        self.mark_resolved(&latest.id).await
    }

    /// All SOS events of `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn events_for(&self, user_id: &str) -> Result<Vec<SosEvent>> {
        let query = Query::collection(collections::SOS_EVENTS).order_by("timestamp", true);
        let documents = self.store.query(&query).await?;
        Ok(documents
            .iter()
            .filter_map(|doc| match doc.decode::<SosEvent>() {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(key = %doc.key, "skipping malformed SOS event: {e}");
                    None
                }
            })
            .filter(|event| event.user_id == user_id)
            .collect())
    }

    /// Ring the user's own phone so they can excuse themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the profile has no phone number, or a
    /// gateway error if the call cannot be placed in time.
    pub async fn fake_call(&self, user_id: &str) -> Result<CallReceipt> {
        let profile = UserProfile::load(self.store.as_ref(), user_id).await?;
        let number = profile
            .phone_number
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::not_found("profile phone number", user_id))?;
        let to = normalize_phone(&number, &self.country_prefix);

        let receipt = tokio::time::timeout(self.attempt_timeout, self.gateway.initiate_call(&to))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("call to {to}"),
            })??;
        info!(call = %receipt.call_id, status = %receipt.status, "fake call placed");
        Ok(receipt)
    }
}

async fn attempt(
    gateway: Arc<dyn SmsGateway>,
    contact_id: String,
    request: SmsRequest,
    timeout: Duration,
) -> DispatchOutcome {
    match tokio::time::timeout(timeout, gateway.send_sms(&request)).await {
        Ok(Ok(receipt)) => {
            debug!(contact = %contact_id, message = %receipt.message_id, "contact notified");
            DispatchOutcome::success(contact_id)
        }
        Ok(Err(e)) => {
            warn!(contact = %contact_id, "failed to notify contact: {e}");
            DispatchOutcome::failure(contact_id, e.to_string())
        }
        Err(_) => {
            warn!(contact = %contact_id, "notification timed out after {timeout:?}");
            DispatchOutcome::failure(contact_id, format!("timed out after {timeout:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use crate::contacts::{ContactBook, ContactDetails};
    use crate::dispatch::SmsReceipt;
    use crate::geo::Coordinate;
    use crate::location::PositionSample;
    use crate::store::{Document, DocumentStream, SqliteStore, StoredDocument};

    /// Records every request and fails for selected numbers.
    #[derive(Debug, Default)]
    struct ScriptedGateway {
        sent: Mutex<Vec<SmsRequest>>,
        calls: Mutex<Vec<String>>,
        failing: HashSet<String>,
        stall: HashSet<String>,
    }

    #[async_trait]
    impl SmsGateway for ScriptedGateway {
        async fn send_sms(&self, request: &SmsRequest) -> Result<SmsReceipt> {
            self.sent.lock().unwrap().push(request.clone());
            if self.stall.contains(&request.to) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.failing.contains(&request.to) {
                return Err(Error::gateway("number unreachable"));
            }
            Ok(SmsReceipt {
                message_id: format!("SM{}", request.to),
            })
        }

        async fn initiate_call(&self, to: &str) -> Result<CallReceipt> {
            self.calls.lock().unwrap().push(to.to_string());
            Ok(CallReceipt {
                call_id: "CA1".to_string(),
                status: "queued".to_string(),
            })
        }
    }

    /// Rejects every write.
    #[derive(Debug)]
    struct ReadOnlyStore(SqliteStore);

    #[async_trait]
    impl DocumentStore for ReadOnlyStore {
        async fn get(&self, c: &str, k: &str) -> Result<Option<Document>> {
            self.0.get(c, k).await
        }
        async fn set(&self, c: &str, k: &str, _: Document, _: bool) -> Result<()> {
            Err(Error::persistence(c, k, "read-only"))
        }
        async fn merge_if(
            &self,
            c: &str,
            k: &str,
            _: &str,
            _: &serde_json::Value,
            _: Document,
        ) -> Result<bool> {
            Err(Error::persistence(c, k, "read-only"))
        }
        async fn query(&self, q: &Query) -> Result<Vec<StoredDocument>> {
            self.0.query(q).await
        }
        fn subscribe(&self, q: Query) -> Result<DocumentStream> {
            self.0.subscribe(q)
        }
    }

    /// Delays every read so concurrent callers interleave between their
    /// read and their write.
    #[derive(Debug)]
    struct SlowReadStore(SqliteStore);

    #[async_trait]
    impl DocumentStore for SlowReadStore {
        async fn get(&self, c: &str, k: &str) -> Result<Option<Document>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.get(c, k).await
        }
        async fn set(&self, c: &str, k: &str, d: Document, merge: bool) -> Result<()> {
            self.0.set(c, k, d, merge).await
        }
        async fn merge_if(
            &self,
            c: &str,
            k: &str,
            field: &str,
            expected: &serde_json::Value,
            patch: Document,
        ) -> Result<bool> {
            self.0.merge_if(c, k, field, expected, patch).await
        }
        async fn query(&self, q: &Query) -> Result<Vec<StoredDocument>> {
            self.0.query(q).await
        }
        fn subscribe(&self, q: Query) -> Result<DocumentStream> {
            self.0.subscribe(q)
        }
    }

    /// Holds every send until `parties` sends are in flight at once.
    #[derive(Debug)]
    struct RendezvousGateway {
        barrier: Barrier,
    }

    #[async_trait]
    impl SmsGateway for RendezvousGateway {
        async fn send_sms(&self, request: &SmsRequest) -> Result<SmsReceipt> {
            self.barrier.wait().await;
            Ok(SmsReceipt {
                message_id: format!("SM{}", request.to),
            })
        }

        async fn initiate_call(&self, _: &str) -> Result<CallReceipt> {
            Err(Error::gateway("calls unsupported"))
        }
    }

    fn here() -> LocationReader {
        LocationReader::pinned(Some(PositionSample::new(
            Coordinate::new(12.9716, 77.5946).unwrap(),
            5.0,
            1,
        )))
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            attempt_timeout_ms: 200,
            ..DispatchConfig::default()
        }
    }

    async fn add_contacts(store: &Arc<dyn DocumentStore>, phones: &[&str]) {
        let book = ContactBook::new(Arc::clone(store), "u1");
        for (i, phone) in phones.iter().enumerate() {
            book.add(ContactDetails {
                name: format!("contact {i}"),
                phone: (*phone).to_string(),
                relationship: String::new(),
            })
            .await
            .unwrap();
        }
    }

    fn dispatcher(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<ScriptedGateway>,
        location: LocationReader,
    ) -> EmergencyDispatcher {
        EmergencyDispatcher::new(store, gateway, location, &config())
    }

    fn sqlite() -> Arc<dyn DocumentStore> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_trigger_requires_location() {
        let store = sqlite();
        let gateway = Arc::new(ScriptedGateway::default());
        let dispatcher = dispatcher(store.clone(), gateway, LocationReader::pinned(None));

        let err = dispatcher.trigger("u1").await.unwrap_err();
        assert!(matches!(err, Error::LocationRequired { .. }));
        assert!(store
            .query(&Query::collection(collections::SOS_EVENTS))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(dispatcher.phase(), DispatchPhase::Idle);
    }

    #[tokio::test]
    async fn test_zero_contacts_is_not_an_error() {
        let store = sqlite();
        let gateway = Arc::new(ScriptedGateway::default());
        let dispatcher = dispatcher(store.clone(), gateway, here());

        let report = dispatcher.trigger("u1").await.unwrap();
        assert_eq!((report.success_count, report.failure_count), (0, 0));
        assert!(report.event.is_active());
        assert_eq!(dispatcher.phase(), DispatchPhase::Completed);

        let stored = store
            .get(collections::SOS_EVENTS, &report.event.id)
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_partial_failure_counts_every_attempt() {
        let store = sqlite();
        add_contacts(&store, &["9876543210", "9123456789", "8765432109"]).await;
        let gateway = Arc::new(ScriptedGateway {
            failing: HashSet::from(["+919123456789".to_string()]),
            ..ScriptedGateway::default()
        });
        let dispatcher = dispatcher(store, gateway.clone(), here());

        let report = dispatcher.trigger("u1").await.unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(gateway.sent.lock().unwrap().len(), 3);
        assert!(!report.outcomes[1].succeeded);
        assert!(report.outcomes[1]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("unreachable"));
    }

    #[tokio::test]
    async fn test_messages_use_prefix_and_template() {
        let store = sqlite();
        add_contacts(&store, &["9876543210"]).await;
        UserProfile {
            display_name: Some("Asha".to_string()),
            ..UserProfile::default()
        }
        .save(store.as_ref(), "u1")
        .await
        .unwrap();
        let gateway = Arc::new(ScriptedGateway::default());
        dispatcher(store, gateway.clone(), here())
            .trigger("u1")
            .await
            .unwrap();

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent[0].to, "+919876543210");
        assert!(sent[0].message.contains("Asha requires assistance."));
        assert!(sent[0].message.contains("Phone: N/A"));
        assert!(sent[0].message.contains("maps?q=12.9716,77.5946"));
    }

    #[tokio::test]
    async fn test_all_failed_reports_dispatch_failed() {
        let store = sqlite();
        add_contacts(&store, &["9876543210", "9123456789"]).await;
        let gateway = Arc::new(ScriptedGateway {
            failing: HashSet::from(["+919876543210".to_string(), "+919123456789".to_string()]),
            ..ScriptedGateway::default()
        });
        let dispatcher = dispatcher(store.clone(), gateway, here());

        let err = dispatcher.trigger("u1").await.unwrap_err();
        let Error::DispatchFailed { event_id, failures } = err else {
            panic!("expected DispatchFailed, got {err:?}");
        };
        assert_eq!(failures.len(), 2);
        assert!(store
            .get(collections::SOS_EVENTS, &event_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let store = sqlite();
        add_contacts(&store, &["9876543210", "9123456789"]).await;
        let gateway = Arc::new(ScriptedGateway {
            stall: HashSet::from(["+919876543210".to_string()]),
            ..ScriptedGateway::default()
        });
        let dispatcher = dispatcher(store, gateway, here());

        let report = dispatcher.trigger("u1").await.unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 1);
        assert!(report.outcomes[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_contacts_are_notified_concurrently() {
        let store = sqlite();
        add_contacts(&store, &["9876543210", "9123456789", "8765432109"]).await;
        // Only completes if all three sends are waiting at the same time
        let gateway = Arc::new(RendezvousGateway {
            barrier: Barrier::new(3),
        });
        let dispatcher = EmergencyDispatcher::new(
            store,
            gateway,
            here(),
            &DispatchConfig {
                attempt_timeout_ms: 2_000,
                ..DispatchConfig::default()
            },
        );

        let started = Instant::now();
        let report = dispatcher.trigger("u1").await.unwrap();
        assert_eq!(report.success_count, 3);
        assert_eq!(report.failure_count, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_persistence_failure_notifies_nobody() {
        let inner = SqliteStore::open_in_memory().unwrap();
        let writable: Arc<dyn DocumentStore> = Arc::new(inner.clone());
        add_contacts(&writable, &["9876543210"]).await;

        let gateway = Arc::new(ScriptedGateway::default());
        let dispatcher = dispatcher(Arc::new(ReadOnlyStore(inner)), gateway.clone(), here());

        let err = dispatcher.trigger("u1").await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_triggers_are_not_deduplicated() {
        let store = sqlite();
        let dispatcher = dispatcher(store, Arc::new(ScriptedGateway::default()), here());

        let a = dispatcher.trigger("u1").await.unwrap();
        let b = dispatcher.trigger("u1").await.unwrap();
        assert_ne!(a.event.id, b.event.id);
        assert_eq!(dispatcher.events_for("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_phase_reports_last_transition() {
        let store = sqlite();
        add_contacts(&store, &["9876543210"]).await;
        let dispatcher = dispatcher(store, Arc::new(ScriptedGateway::default()), here());
        let mut phases = dispatcher.watch_phase();

        let (a, b) = tokio::join!(dispatcher.trigger("u1"), dispatcher.trigger("u1"));
        assert_ne!(a.unwrap().event.id, b.unwrap().event.id);
        assert_eq!(dispatcher.phase(), DispatchPhase::Completed);
        assert!(phases.has_changed().unwrap());
        assert_eq!(*phases.borrow_and_update(), DispatchPhase::Completed);
    }

    #[tokio::test]
    async fn test_mark_resolved_once() {
        let store = sqlite();
        let dispatcher = dispatcher(store.clone(), Arc::new(ScriptedGateway::default()), here());
        let report = dispatcher.trigger("u1").await.unwrap();

        let resolved = dispatcher.mark_resolved(&report.event.id).await.unwrap();
        assert_eq!(resolved.status, SosStatus::Resolved);
        assert!(resolved.resolved_at_epoch_ms.is_some());

        let stored = store
            .get(collections::SOS_EVENTS, &report.event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["status"], "resolved");
        assert_eq!(stored["userId"], "u1");

        let err = dispatcher.mark_resolved(&report.event.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_resolves_succeed_once() {
        let inner = SqliteStore::open_in_memory().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(SlowReadStore(inner.clone()));
        let dispatcher = dispatcher(store, Arc::new(ScriptedGateway::default()), here());
        let report = dispatcher.trigger("u1").await.unwrap();
        let id = report.event.id.as_str();

        let (first, second) = tokio::join!(
            dispatcher.mark_resolved(id),
            dispatcher.mark_resolved(id)
        );
        let succeeded = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(loser.unwrap_err().is_not_found());

        let stored = inner
            .get(collections::SOS_EVENTS, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["status"], "resolved");
    }

    #[tokio::test]
    async fn test_mark_resolved_unknown_event() {
        let dispatcher = dispatcher(sqlite(), Arc::new(ScriptedGateway::default()), here());
        assert!(dispatcher
            .mark_resolved("u1_0_deadbeef")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_latest_picks_newest_active() {
        let store = sqlite();
        let dispatcher = dispatcher(store, Arc::new(ScriptedGateway::default()), here());
        let older = dispatcher.trigger("u1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let newer = dispatcher.trigger("u1").await.unwrap();

        let resolved = dispatcher.resolve_latest("u1").await.unwrap();
        assert_eq!(resolved.id, newer.event.id);

        let resolved = dispatcher.resolve_latest("u1").await.unwrap();
        assert_eq!(resolved.id, older.event.id);

        assert!(dispatcher.resolve_latest("u1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_fake_call_rings_profile_phone() {
        let store = sqlite();
        UserProfile {
            phone_number: Some("9876543210".to_string()),
            ..UserProfile::default()
        }
        .save(store.as_ref(), "u1")
        .await
        .unwrap();
        let gateway = Arc::new(ScriptedGateway::default());
        let dispatcher = dispatcher(store, gateway.clone(), LocationReader::pinned(None));

        let receipt = dispatcher.fake_call("u1").await.unwrap();
        assert_eq!(receipt.status, "queued");
        assert_eq!(*gateway.calls.lock().unwrap(), vec!["+919876543210".to_string()]);
    }

    #[tokio::test]
    async fn test_fake_call_without_phone() {
        let dispatcher = dispatcher(sqlite(), Arc::new(ScriptedGateway::default()), here());
        assert!(dispatcher.fake_call("u1").await.unwrap_err().is_not_found());
    }
}

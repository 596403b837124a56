//! Notification service implementation.
//!
//! The NotificationService is responsible for:
//! - Holding the rule table
//! - Acquiring dashboard snapshots (with mock fallback)
//! - Polling on a fixed interval and fanning results out to subscribers
//! - Forwarding read/delete acknowledgements to the remote store

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::Notification;
use super::rules::{Rule, RuleInfo, RuleTable};
use super::store::{
    HttpNotificationStore, NoopNotificationStore, RemoteNotificationStore, SideChannelOutcome,
};
use crate::auth::{LocalStorageFile, StaticToken, TokenSource};
use crate::config::EngineConfig;
use crate::snapshot::{DashboardClient, Snapshot, SnapshotSource};
use crate::utils::http_client::build_client;
use crate::{Error, Result};

/// Subscriber callback, invoked with every evaluation result.
pub type NotificationCallback = Arc<dyn Fn(&[Notification]) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: NotificationCallback,
}

type SubscriberList = RwLock<Vec<Subscriber>>;

/// Handle returned by [`NotificationService::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove exactly this subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return false;
        };
        let mut subscribers = subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != self.id);
        subscribers.len() != before
    }
}

struct PollingTask {
    interval: Duration,
    cancellation: CancellationToken,
    _handle: JoinHandle<()>,
}

/// The notification service.
pub struct NotificationService {
    rules: RwLock<RuleTable>,
    subscribers: Arc<SubscriberList>,
    next_subscriber_id: AtomicU64,
    source: SnapshotSource,
    store: Arc<dyn RemoteNotificationStore>,
    polling: Mutex<Option<PollingTask>>,
    next_sequence: AtomicU64,
    last_dispatched: AtomicU64,
    dispatch_lock: Mutex<()>,
}

impl NotificationService {
    /// Create a service seeded with the built-in rules.
    pub fn new(source: SnapshotSource, store: Arc<dyn RemoteNotificationStore>) -> Self {
        Self::with_rules(source, store, RuleTable::with_default_rules())
    }

    /// Create a service with a custom rule table.
    pub fn with_rules(
        source: SnapshotSource,
        store: Arc<dyn RemoteNotificationStore>,
        rules: RuleTable,
    ) -> Self {
        Self {
            rules: RwLock::new(rules),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(1),
            source,
            store,
            polling: Mutex::new(None),
            next_sequence: AtomicU64::new(1),
            last_dispatched: AtomicU64::new(0),
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Build the HTTP-backed service described by `config`.
    ///
    /// The token is read from `config.token_file` when set.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let tokens: Arc<dyn TokenSource> = match &config.token_file {
            Some(path) => Arc::new(LocalStorageFile::new(path)),
            None => Arc::new(StaticToken::none()),
        };
        Self::from_config_with_tokens(config, tokens)
    }

    /// Build the HTTP-backed service described by `config` with an explicit token source.
    pub fn from_config_with_tokens(
        config: &EngineConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        config.validate()?;

        if config.use_mock_data {
            info!("Notification service running on mock data");
            return Ok(Self::new(
                SnapshotSource::mock(),
                Arc::new(NoopNotificationStore),
            ));
        }

        let base_url = config.base_url()?;
        let client = build_client(config.request_timeout());
        let dashboard = DashboardClient::new(client.clone(), &base_url, tokens.clone())?;
        let store = HttpNotificationStore::new(client, base_url, tokens);

        info!(url = %dashboard.url(), "Notification service using dashboard endpoint");
        Ok(Self::new(
            SnapshotSource::new(Arc::new(dashboard)),
            Arc::new(store),
        ))
    }

    /// Register a callback. The same closure registered twice is called twice.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Notification]) + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(callback))
    }

    /// Register an already shared callback.
    pub fn subscribe_callback(&self, callback: NotificationCallback) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber { id, callback });
        debug!(subscriber_id = id, "Notification subscriber added");
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Append a rule to the table.
    pub fn add_rule(&self, rule: Rule) {
        debug!(rule_id = %rule.id, "Notification rule added");
        self.rules.write().add(rule);
    }

    /// Remove every rule with this id, returning how many were removed.
    pub fn remove_rule(&self, id: &str) -> usize {
        let removed = self.rules.write().remove(id);
        debug!(rule_id = %id, removed, "Notification rule removed");
        removed
    }

    /// Copy of the current rule table.
    pub fn get_rules(&self) -> Vec<Rule> {
        self.rules.read().rules()
    }

    pub fn rule_infos(&self) -> Vec<RuleInfo> {
        self.rules.read().rules().iter().map(Rule::info).collect()
    }

    /// Evaluate the rule table against `snapshot`.
    pub fn generate(&self, snapshot: &Snapshot) -> Vec<Notification> {
        self.rules.read().generate(snapshot)
    }

    /// Acquire a snapshot and evaluate it, without notifying subscribers.
    pub async fn get_current_notifications(&self) -> Vec<Notification> {
        let snapshot = self.source.acquire().await;
        self.generate(&snapshot)
    }

    /// Run one polling cycle immediately and return its result.
    pub async fn refresh(&self) -> Vec<Notification> {
        let sequence = self.next_sequence();
        self.run_cycle(sequence).await
    }

    /// Start polling every `interval`, replacing any running timer.
    ///
    /// The first cycle runs one interval after the call. Must be called from
    /// within a Tokio runtime.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::config("polling interval must be greater than zero"));
        }

        let mut polling = self.polling.lock();
        if let Some(previous) = polling.take() {
            previous.cancellation.cancel();
            debug!(
                previous_interval_ms = previous.interval.as_millis() as u64,
                "Replacing running notification poller"
            );
        }

        let cancellation = CancellationToken::new();
        let cancel_token = cancellation.clone();
        let service = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        debug!("Notification poller shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(service) = service.upgrade() else {
                            break;
                        };
                        let sequence = service.next_sequence();
                        // Cycles run detached so a slow fetch never delays the timer.
                        tokio::spawn(async move {
                            service.run_cycle(sequence).await;
                        });
                    }
                }
            }
        });

        *polling = Some(PollingTask {
            interval,
            cancellation,
            _handle: handle,
        });
        info!(
            interval_ms = interval.as_millis() as u64,
            "Notification polling started"
        );
        Ok(())
    }

    /// Stop the timer. Cycles already in flight still complete and dispatch.
    pub fn stop_polling(&self) -> bool {
        match self.polling.lock().take() {
            Some(task) => {
                task.cancellation.cancel();
                info!("Notification polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling.lock().is_some()
    }

    /// Forward a read acknowledgement to the remote store.
    ///
    /// Failures are logged and reported in the outcome; callers should update
    /// their local copy regardless.
    pub async fn mark_as_read(&self, id: &str) -> SideChannelOutcome {
        let outcome = SideChannelOutcome::from(self.store.mark_read(id).await);
        if let SideChannelOutcome::Failed { reason } = &outcome {
            warn!(notification_id = %id, error = %reason, "Failed to mark notification as read");
        }
        outcome
    }

    /// Forward a deletion to the remote store.
    ///
    /// Failures are logged and reported in the outcome; callers should update
    /// their local copy regardless.
    pub async fn delete_notification(&self, id: &str) -> SideChannelOutcome {
        let outcome = SideChannelOutcome::from(self.store.delete(id).await);
        if let SideChannelOutcome::Failed { reason } = &outcome {
            warn!(notification_id = %id, error = %reason, "Failed to delete notification");
        }
        outcome
    }

    fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Acquire, evaluate, then dispatch unless a newer cycle already has.
    async fn run_cycle(&self, sequence: u64) -> Vec<Notification> {
        let snapshot = self.source.acquire().await;
        let notifications = self.generate(&snapshot);

        // Check and dispatch under one lock so a stale cycle can never
        // reach subscribers after a newer one.
        let _dispatching = self.dispatch_lock.lock();
        let newest = self.last_dispatched.fetch_max(sequence, Ordering::AcqRel);
        if newest > sequence {
            debug!(
                sequence,
                newest, "Dropping stale notification cycle, a newer one was already dispatched"
            );
            return notifications;
        }

        self.dispatch(&notifications);
        notifications
    }

    fn dispatch(&self, notifications: &[Notification]) {
        // Callbacks run outside the lock so they may (un)subscribe.
        let callbacks: Vec<NotificationCallback> = self
            .subscribers
            .read()
            .iter()
            .map(|s| s.callback.clone())
            .collect();

        debug!(
            count = notifications.len(),
            subscribers = callbacks.len(),
            "Dispatching notifications"
        );
        for callback in callbacks {
            callback(notifications);
        }
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        if let Some(task) = self.polling.get_mut().take() {
            task.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::notification::{NotificationDraft, NotificationType, RuleModule, RulePriority};
    use crate::snapshot::SnapshotProvider;

    fn mock_service() -> NotificationService {
        NotificationService::new(SnapshotSource::mock(), Arc::new(NoopNotificationStore))
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl SnapshotProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch(&self) -> Result<Snapshot> {
            Err(Error::Other("network unreachable".to_string()))
        }
    }

    struct SlowProvider {
        delay: Duration,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch(&self) -> Result<Snapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Snapshot::mock())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RemoteNotificationStore for FailingStore {
        async fn mark_read(&self, _id: &str) -> Result<()> {
            Err(Error::Other("connection reset".to_string()))
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Err(Error::Other("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn current_notifications_fall_back_to_mock() {
        let service = NotificationService::new(
            SnapshotSource::new(Arc::new(FailingProvider)),
            Arc::new(NoopNotificationStore),
        );

        let notifications = service.get_current_notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Taux de conformité faible");
        assert_eq!(notifications[0].kind, NotificationType::Error);
    }

    #[tokio::test]
    async fn current_notifications_do_not_dispatch() {
        let service = mock_service();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscription = service.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.get_current_notifications().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        service.refresh().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribing_one_subscriber_keeps_the_others() {
        let service = mock_service();
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let calls = a_calls.clone();
            service.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _b = {
            let calls = b_calls.clone();
            service.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        service.refresh().await;
        assert!(a.unsubscribe());
        assert!(!a.unsubscribe());
        service.refresh().await;

        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn same_callback_twice_is_two_entries() {
        let service = mock_service();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: NotificationCallback = Arc::new(move |_: &[Notification]| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = service.subscribe_callback(callback.clone());
        let _second = service.subscribe_callback(callback);
        assert_ne!(first.id(), _second.id());

        service.refresh().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        service.refresh().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn subscribers_receive_identical_lists_even_when_unchanged() {
        let service = mock_service();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = service.subscribe(move |notifications| {
            let _ = tx.send(notifications.to_vec());
        });

        service.refresh().await;
        service.refresh().await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].title, second[0].title);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_polling_keeps_a_single_timer() {
        let service = Arc::new(mock_service());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = service.subscribe(move |notifications| {
            let _ = tx.send(notifications.len());
        });

        let interval = Duration::from_secs(30);
        service.start_polling(interval).unwrap();
        service.start_polling(interval).unwrap();
        assert!(service.is_polling());

        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(started.elapsed(), interval);

        settle().await;
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(started.elapsed(), interval * 2);
        settle().await;
        assert!(rx.try_recv().is_err());

        assert!(service.stop_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_polling_prevents_future_cycles() {
        let service = Arc::new(mock_service());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = service.subscribe(move |notifications| {
            let _ = tx.send(notifications.len());
        });

        let interval = Duration::from_millis(500);
        service.start_polling(interval).unwrap();
        assert_eq!(rx.recv().await, Some(1));

        assert!(service.stop_polling());
        assert!(!service.stop_polling());
        assert!(!service.is_polling());

        tokio::time::advance(interval * 5).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_polling_lets_in_flight_cycle_dispatch() {
        let provider = Arc::new(SlowProvider {
            delay: Duration::from_secs(1),
            fetches: AtomicUsize::new(0),
        });
        let service = Arc::new(NotificationService::new(
            SnapshotSource::new(provider.clone()),
            Arc::new(NoopNotificationStore),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = service.subscribe(move |notifications| {
            let _ = tx.send(notifications.len());
        });

        let interval = Duration::from_millis(500);
        service.start_polling(interval).unwrap();

        // First tick fired, its fetch is still pending.
        tokio::time::sleep(interval + Duration::from_millis(10)).await;
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
        assert!(service.stop_polling());

        assert_eq!(rx.recv().await, Some(1));

        tokio::time::advance(interval * 5).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let service = Arc::new(mock_service());
        let err = service.start_polling(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!service.is_polling());
    }

    #[tokio::test]
    async fn stale_cycles_are_not_dispatched() {
        let service = mock_service();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscription = service.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let newer = service.next_sequence() + 1;
        let older = newer - 1;
        service.run_cycle(newer).await;
        let result = service.run_cycle(older).await;

        assert_eq!(result.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cycles_never_dispatch_concurrently() {
        let service = Arc::new(mock_service());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let dispatched = Arc::new(AtomicUsize::new(0));
        let _subscription = {
            let (in_flight, max_in_flight, dispatched) =
                (in_flight.clone(), max_in_flight.clone(), dispatched.clone());
            service.subscribe(move |_| {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                dispatched.fetch_add(1, Ordering::SeqCst);
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        };

        let sequences: Vec<u64> = (0..8).map(|_| service.next_sequence()).collect();
        let handles: Vec<_> = sequences
            .into_iter()
            .rev()
            .map(|sequence| {
                let service = service.clone();
                tokio::spawn(async move { service.run_cycle(sequence).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert!(dispatched.load(Ordering::SeqCst) >= 1);
        assert_eq!(service.last_dispatched.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn rule_table_operations() {
        let service = mock_service();
        assert_eq!(service.get_rules().len(), 9);

        service.add_rule(Rule::simple(
            "general-demo",
            "Demo",
            RulePriority::Low,
            RuleModule::General,
            |_| true,
            |_| NotificationDraft::new(NotificationType::Success, "Démo", "Tout va bien"),
        ));
        assert_eq!(service.get_rules().len(), 10);
        assert_eq!(service.get_current_notifications().await.len(), 2);

        assert_eq!(service.remove_rule("general-demo"), 1);
        assert_eq!(service.remove_rule("general-demo"), 0);
        assert_eq!(service.rule_infos().len(), 9);
    }

    #[tokio::test]
    async fn side_channel_failures_are_reported_not_raised() {
        let service = NotificationService::new(SnapshotSource::mock(), Arc::new(FailingStore));

        let outcome = service.mark_as_read("1").await;
        assert!(matches!(outcome, SideChannelOutcome::Failed { .. }));
        let outcome = service.delete_notification("1").await;
        assert!(!outcome.is_acknowledged());

        let service = mock_service();
        assert!(service.mark_as_read("1").await.is_acknowledged());
        assert!(service.delete_notification("1").await.is_acknowledged());
    }

    #[test]
    fn from_config_mock_mode() {
        let config = EngineConfig {
            use_mock_data: true,
            ..Default::default()
        };
        let service = NotificationService::from_config(&config).unwrap();
        assert!(service.source.is_mock());
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let config = EngineConfig {
            api_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(NotificationService::from_config(&config).is_err());
    }
}

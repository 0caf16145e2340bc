//! Debounced change notification.
//!
//! Raw change events from a [`RecordSource`] arrive in bursts (an editor
//! save can produce several). [`Debouncer`] collapses a burst into one
//! signal once the source has been quiet for the configured window, and
//! [`ChangeNotifier`] drives it from an async task.
//!
//! ```text
//! Idle --event--> Armed(deadline) --event--> Armed(deadline reset)
//!                     |
//!                     +--deadline passes--> Idle, emit one signal
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::source::{ChangeStream, RecordSource};

/// Debounce timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed { deadline: Instant },
}

/// Pure debounce state machine. Time is passed in, never read.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DebounceState::Armed { .. })
    }

    /// Arm the timer, or push the deadline out if already armed.
    pub fn on_event(&mut self, now: Instant) {
        self.state = DebounceState::Armed {
            deadline: now + self.window,
        };
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Armed { deadline } => Some(deadline),
            DebounceState::Idle => None,
        }
    }

    /// Returns true exactly once per settled burst.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Armed { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Disarm without firing. Returns whether a timer was armed.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = DebounceState::Idle;
        was_armed
    }
}

/// Lifecycle of a [`ChangeNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierStatus {
    /// Subscribed and forwarding signals.
    Active,
    /// Subscription could not be established; never fires.
    Unsupported,
    /// Shut down.
    Stopped,
}

#[derive(Debug, Default)]
struct NotifierCounters {
    raw_events: AtomicU64,
    signals: AtomicU64,
}

/// Subscribes to a source's raw change events and emits one debounced
/// signal per settled burst.
pub struct ChangeNotifier {
    status: Mutex<NotifierStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<NotifierCounters>,
}

impl ChangeNotifier {
    /// Subscribe once and start forwarding.
    ///
    /// When the source cannot be watched the notifier is returned in the
    /// [`NotifierStatus::Unsupported`] state. That is reported here, once.
    pub fn spawn<F>(source: &dyn RecordSource, window: Duration, on_settled: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(NotifierCounters::default());

        let subscription = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("no async runtime: {}", e))
            .and_then(|runtime| {
                if !source.watch_supported() {
                    return Err("source does not support change watching".to_string());
                }
                source
                    .subscribe_to_changes()
                    .map(|stream| (runtime, stream))
                    .map_err(|e| e.to_string())
            });

        let (status, task) = match subscription {
            Ok((runtime, stream)) => {
                info!(window_ms = window.as_millis() as u64, "Change notifier started");
                let task = runtime.spawn(run(
                    stream,
                    window,
                    shutdown_rx,
                    Arc::clone(&counters),
                    on_settled,
                ));
                (NotifierStatus::Active, Some(task))
            }
            Err(reason) => {
                warn!(
                    reason = %reason,
                    "Change watching unavailable, cache will refresh on TTL expiry only"
                );
                (NotifierStatus::Unsupported, None)
            }
        };

        Self {
            status: Mutex::new(status),
            shutdown_tx,
            task: Mutex::new(task),
            counters,
        }
    }

    pub fn status(&self) -> NotifierStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while subscribed and forwarding.
    pub fn is_active(&self) -> bool {
        self.status() == NotifierStatus::Active
    }

    /// Raw events received, including lagged batches counted once.
    pub fn raw_events(&self) -> u64 {
        self.counters.raw_events.load(Ordering::SeqCst)
    }

    /// Debounced signals emitted.
    pub fn signals(&self) -> u64 {
        self.counters.signals.load(Ordering::SeqCst)
    }

    /// Cancel any armed timer and unsubscribe. Idempotent.
    pub fn shutdown(&self) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if *status == NotifierStatus::Stopped {
            return;
        }
        // Receiver gone means the task already exited.
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        if *status == NotifierStatus::Active {
            info!("Change notifier stopped");
        }
        *status = NotifierStatus::Stopped;
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<F>(
    mut stream: ChangeStream,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
    counters: Arc<NotifierCounters>,
    on_settled: F,
) where
    F: Fn() + Send + Sync + 'static,
{
    let mut debouncer = Debouncer::new(window);
    let emit = |debouncer: &mut Debouncer| {
        if debouncer.fire(Instant::now()) {
            counters.signals.fetch_add(1, Ordering::SeqCst);
            debug!("Change burst settled, invalidating");
            on_settled();
        }
    };

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                if debouncer.cancel() {
                    debug!("Shutdown cancelled an armed debounce timer");
                }
                break;
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                emit(&mut debouncer);
            }

            event = stream.recv() => match event {
                Ok(event) => {
                    counters.raw_events.fetch_add(1, Ordering::SeqCst);
                    debug!(origin = ?event.origin, "Raw change event");
                    debouncer.on_event(Instant::now());
                }
                Err(RecvError::Lagged(skipped)) => {
                    counters.raw_events.fetch_add(1, Ordering::SeqCst);
                    debug!(skipped, "Change stream lagged");
                    debouncer.on_event(Instant::now());
                }
                Err(RecvError::Closed) => {
                    if let Some(deadline) = debouncer.deadline() {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                debouncer.cancel();
                            }
                            _ = sleep_until(deadline) => emit(&mut debouncer),
                        }
                    }
                    info!("Change stream closed, notifier exiting");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRecordSource;
    use crate::source::ChangeOrigin;

    const WINDOW: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_state_machine() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert!(!debouncer.fire(start));

        debouncer.on_event(start);
        assert_eq!(debouncer.deadline(), Some(start + WINDOW));

        // A second event inside the window resets the deadline.
        let later = start + Duration::from_millis(60);
        debouncer.on_event(later);
        assert!(!debouncer.fire(start + WINDOW));
        assert!(debouncer.fire(later + WINDOW));
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert!(!debouncer.fire(later + WINDOW * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_cancel() {
        let mut debouncer = Debouncer::new(WINDOW);
        assert!(!debouncer.cancel());
        debouncer.on_event(Instant::now());
        assert!(debouncer.cancel());
        assert!(!debouncer.fire(Instant::now() + WINDOW));
    }

    fn counting_notifier(source: &InMemoryRecordSource) -> (ChangeNotifier, Arc<AtomicU64>) {
        let fired = Arc::new(AtomicU64::new(0));
        let hook = Arc::clone(&fired);
        let notifier = ChangeNotifier::spawn(source, WINDOW, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        });
        (notifier, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_single_signal() {
        let source = InMemoryRecordSource::default();
        let (notifier, fired) = counting_notifier(&source);
        assert!(notifier.is_active());

        for _ in 0..10 {
            source.emit(ChangeOrigin::Watcher);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(WINDOW * 3).await;

        assert_eq!(notifier.raw_events(), 10);
        assert_eq!(notifier.signals(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_bursts_emit_separately() {
        let source = InMemoryRecordSource::default();
        let (notifier, fired) = counting_notifier(&source);

        source.emit(ChangeOrigin::Watcher);
        tokio::time::sleep(WINDOW * 2).await;
        source.emit(ChangeOrigin::LocalWrite);
        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(notifier.signals(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_armed_timer() {
        let source = InMemoryRecordSource::default();
        let (notifier, fired) = counting_notifier(&source);

        source.emit(ChangeOrigin::Watcher);
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.shutdown();
        notifier.shutdown();
        tokio::time::sleep(WINDOW * 3).await;

        assert_eq!(notifier.status(), NotifierStatus::Stopped);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_notifier_runs_on_multi_thread_runtime() {
        let source = InMemoryRecordSource::default();
        let (notifier, fired) = counting_notifier(&source);
        assert!(notifier.is_active());

        source.emit(ChangeOrigin::LocalWrite);
        for _ in 0..50 {
            if fired.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(WINDOW).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        notifier.shutdown();
    }

    /// Subscribes fine but reports watching as unsupported.
    struct DeclinesWatch(InMemoryRecordSource);

    #[async_trait::async_trait]
    impl RecordSource for DeclinesWatch {
        async fn load_all(&self) -> Result<Vec<tally_core::Record>, tally_core::SourceError> {
            self.0.load_all().await
        }

        fn watch_supported(&self) -> bool {
            false
        }

        fn subscribe_to_changes(&self) -> Result<ChangeStream, tally_core::WatchError> {
            self.0.subscribe_to_changes()
        }
    }

    #[tokio::test]
    async fn test_capability_check_precedes_subscription() {
        let source = DeclinesWatch(InMemoryRecordSource::default());
        let fired = Arc::new(AtomicU64::new(0));
        let hook = Arc::clone(&fired);
        let notifier = ChangeNotifier::spawn(&source, WINDOW, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(notifier.status(), NotifierStatus::Unsupported);
        source.0.emit(ChangeOrigin::Watcher);
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_source_degrades_to_noop() {
        let source = InMemoryRecordSource::without_watch(Vec::new());
        let (notifier, fired) = counting_notifier(&source);

        assert_eq!(notifier.status(), NotifierStatus::Unsupported);
        assert!(!notifier.is_active());
        source.emit(ChangeOrigin::Watcher);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        notifier.shutdown();
        assert_eq!(notifier.status(), NotifierStatus::Stopped);
    }
}

//! Deferred cleanup.
//!
//! [`DeferredCleanup`] runs a housekeeping routine once activity has been
//! quiet for a while: every call to [`defer_cleanup`](DeferredCleanup::defer_cleanup)
//! pushes the deadline back by the configured delay. The routine may run many
//! times over the lifetime of the owner. Releasing the owner stops the timer
//! for good.
//!
//! Cleanup runs on tokio's blocking pool. Its failures have no caller to go to
//! and are logged at `debug` level. Releasing waits for a run that is already
//! under way, so the routine never runs after `release` has returned.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::{panic_message, BoxError, ReleaseError, ReleaseResult};
use crate::release::{Release, Releasable};
use crate::state::ReleaseState;

/// Timing for [`DeferredCleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredCleanupConfig {
    /// Quiet period after the last deferral before cleanup runs
    pub delay: Duration,
    /// Extra time past `delay` after which a cleanup counts as past due
    pub past_due_grace: Duration,
}

impl Default for DeferredCleanupConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(50),
            past_due_grace: Duration::from_millis(100),
        }
    }
}

impl DeferredCleanupConfig {
    /// Set the quiet period
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the past-due grace period
    #[must_use]
    pub const fn with_past_due_grace(mut self, grace: Duration) -> Self {
        self.past_due_grace = grace;
        self
    }

    /// How long after the last cleanup another one is past due
    pub fn past_due_after(&self) -> Duration {
        self.delay + self.past_due_grace
    }
}

/// How [`DeferredCleanup::set_cleanup`] should schedule the routine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CleanupMode {
    /// Run now, on the calling thread.
    ImmediateSynchronous,
    /// Run now on the calling thread if the last cleanup is past due.
    /// Arms the timer instead when it is not running.
    ImmediateSynchronousIfPastDue,
    /// Run now on the blocking pool and re-arm the timer.
    ImmediateDeferred,
    /// Like `ImmediateDeferred`, only if the last cleanup is past due.
    /// Arms the timer instead when it is not running.
    ImmediateDeferredIfPastDue,
    /// Push the deadline back.
    #[default]
    Deferred,
}

/// When the routine last ran.
#[derive(Debug, Clone, Copy)]
enum LastCleanup {
    Never,
    At {
        instant: Instant,
        wall: DateTime<Utc>,
    },
    /// A cleanup was claimed or the timer was cleared; nothing is past due.
    Suppressed,
}

struct Timer {
    running: bool,
    /// An immediate background cleanup has been spawned and not finished.
    in_flight: bool,
    last: LastCleanup,
    task: Option<JoinHandle<()>>,
}

type Cleanup = Box<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

struct Inner {
    state: ReleaseState,
    config: DeferredCleanupConfig,
    cleanup: Cleanup,
    /// Held for the whole of a run; reentrant so the routine may call back in.
    running_cleanup: ReentrantMutex<()>,
    timer: Mutex<Timer>,
}

impl Inner {
    fn run_cleanup(&self) {
        let _running = self.running_cleanup.lock();
        if !self.state.is_alive() {
            self.timer.lock().in_flight = false;
            return;
        }
        match catch_unwind(AssertUnwindSafe(|| (self.cleanup)())) {
            Ok(Ok(())) => trace!(resource = %self.state.name(), "deferred cleanup ran"),
            Ok(Err(error)) => debug!(resource = %self.state.name(), %error, "deferred cleanup failed"),
            Err(payload) => debug!(
                resource = %self.state.name(),
                panic = %panic_message(payload.as_ref()),
                "deferred cleanup panicked"
            ),
        }
        let mut timer = self.timer.lock();
        timer.in_flight = false;
        timer.last = LastCleanup::At {
            instant: Instant::now(),
            wall: Utc::now(),
        };
    }

    fn is_past_due(&self, timer: &Timer) -> bool {
        match timer.last {
            LastCleanup::Never => true,
            LastCleanup::At { instant, .. } => instant.elapsed() > self.config.past_due_after(),
            LastCleanup::Suppressed => false,
        }
    }

    /// (Re)arms the timer. Called with the timer lock held.
    fn arm(self: &Arc<Self>, timer: &mut Timer, runtime: &Handle) {
        timer.running = true;
        if let Some(previous) = timer.task.take() {
            previous.abort();
        }
        let delay = self.config.delay;
        let owner = Arc::downgrade(self);
        timer.task = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            spawn_cleanup(owner).await;
        }));
    }
}

/// Runs the routine on the blocking pool if the owner still exists.
async fn spawn_cleanup(owner: Weak<Inner>) {
    let outcome = tokio::task::spawn_blocking(move || {
        if let Some(inner) = owner.upgrade() {
            inner.run_cleanup();
        }
    })
    .await;
    if let Err(error) = outcome {
        debug!(%error, "deferred cleanup task did not complete");
    }
}

fn current_runtime() -> ReleaseResult<Handle> {
    Handle::try_current().map_err(|_| ReleaseError::NoRuntime {
        operation: "schedule deferred cleanup",
    })
}

/// Runs a cleanup routine after a period of inactivity.
pub struct DeferredCleanup {
    inner: Arc<Inner>,
}

impl DeferredCleanup {
    /// Wraps `cleanup` with the default timing.
    pub fn new<F, E>(cleanup: F) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::with_config(DeferredCleanupConfig::default(), cleanup)
    }

    /// Wraps `cleanup` with custom timing.
    pub fn with_config<F, E>(config: DeferredCleanupConfig, cleanup: F) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let cleanup: Cleanup = Box::new(move || cleanup().map_err(Into::<BoxError>::into));
        Self {
            inner: Arc::new(Inner {
                state: ReleaseState::with_label("DeferredCleanup"),
                config,
                cleanup,
                running_cleanup: ReentrantMutex::new(()),
                timer: Mutex::new(Timer {
                    running: false,
                    in_flight: false,
                    last: LastCleanup::Never,
                    task: None,
                }),
            }),
        }
    }

    /// The timing this instance was built with.
    pub fn config(&self) -> DeferredCleanupConfig {
        self.inner.config
    }

    /// Whether the timer has been armed and not cleared since.
    pub fn is_running(&self) -> bool {
        self.inner.timer.lock().running
    }

    /// Wall-clock time the routine last finished, if it has run since the
    /// last [`clear_cleanup`](Self::clear_cleanup).
    pub fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        match self.inner.timer.lock().last {
            LastCleanup::At { wall, .. } => Some(wall),
            LastCleanup::Never | LastCleanup::Suppressed => None,
        }
    }

    /// True when the routine has not run within `delay + past_due_grace`.
    ///
    /// Never true while an immediate cleanup is in flight or after the timer
    /// was cleared.
    pub fn is_cleanup_past_due(&self) -> bool {
        let timer = self.inner.timer.lock();
        self.inner.is_past_due(&timer)
    }

    /// Arms the timer, or pushes its deadline back if it is already armed.
    ///
    /// No-op once release has been requested. Fails with
    /// [`ReleaseError::NoRuntime`] outside a tokio runtime.
    pub fn defer_cleanup(&self) -> ReleaseResult<()> {
        if !self.inner.state.is_alive() {
            return Ok(());
        }
        let runtime = current_runtime()?;
        let mut timer = self.inner.timer.lock();
        if self.inner.state.is_alive() {
            self.inner.arm(&mut timer, &runtime);
            trace!(resource = %self.inner.state.name(), "deferred cleanup armed");
        }
        Ok(())
    }

    /// Schedules the routine according to `mode`.
    ///
    /// No-op once release has been requested.
    pub fn set_cleanup(&self, mode: CleanupMode) -> ReleaseResult<()> {
        if !self.inner.state.is_alive() {
            return Ok(());
        }
        match mode {
            CleanupMode::ImmediateSynchronous => {
                self.inner.run_cleanup();
                Ok(())
            }
            CleanupMode::ImmediateSynchronousIfPastDue => {
                if !self.is_running() {
                    return self.defer_cleanup();
                }
                if self.is_cleanup_past_due() {
                    self.inner.run_cleanup();
                }
                Ok(())
            }
            CleanupMode::ImmediateDeferred => self.cleanup_in_background(),
            CleanupMode::ImmediateDeferredIfPastDue => {
                if !self.is_running() {
                    return self.defer_cleanup();
                }
                if self.is_cleanup_past_due() {
                    return self.cleanup_in_background();
                }
                Ok(())
            }
            CleanupMode::Deferred => self.defer_cleanup(),
        }
    }

    /// Stops the timer. A later [`defer_cleanup`](Self::defer_cleanup)
    /// re-arms it.
    pub fn clear_cleanup(&self) {
        let mut timer = self.inner.timer.lock();
        timer.running = false;
        timer.last = LastCleanup::Suppressed;
        if let Some(task) = timer.task.take() {
            task.abort();
        }
    }

    fn cleanup_in_background(&self) -> ReleaseResult<()> {
        let runtime = current_runtime()?;
        let mut timer = self.inner.timer.lock();
        if !self.inner.state.is_alive() || timer.in_flight {
            return Ok(());
        }
        // Not past due while the claimed run is pending.
        timer.in_flight = true;
        timer.last = LastCleanup::Suppressed;
        self.inner.arm(&mut timer, &runtime);
        drop(runtime.spawn(spawn_cleanup(Arc::downgrade(&self.inner))));
        Ok(())
    }
}

impl Releasable for DeferredCleanup {
    fn release_state(&self) -> Option<&ReleaseState> {
        Some(&self.inner.state)
    }
}

impl Release for DeferredCleanup {
    fn release(&self) -> ReleaseResult<bool> {
        self.inner.state.run_release(|| {
            self.clear_cleanup();
            // Wait out a run that passed its liveness check before release began.
            drop(self.inner.running_cleanup.lock());
            Ok::<(), ReleaseError>(())
        })
    }
}

impl fmt::Debug for DeferredCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCleanup")
            .field("state", &self.inner.state.state())
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

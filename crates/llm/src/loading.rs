use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

/// Point-in-time view of generation activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingSnapshot {
    /// Generation calls that have started and not yet settled.
    pub in_flight: usize,
    /// Message of the most recent failure since the most recent call started.
    pub error: Option<String>,
}

impl LoadingSnapshot {
    pub fn busy(&self) -> bool {
        self.in_flight > 0
    }
}

/// Busy/error signal shared by every generation call.
///
/// Busy is derived from the number of outstanding calls, so one call settling
/// never hides another that is still running. The error slot is last writer
/// wins: starting a call clears it, a failing call sets it.
#[derive(Debug, Clone)]
pub struct LoadingState {
    sender: Arc<watch::Sender<LoadingSnapshot>>,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingState {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(LoadingSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> LoadingSnapshot {
        self.sender.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.sender.borrow().busy()
    }

    pub fn error(&self) -> Option<String> {
        self.sender.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingSnapshot> {
        self.sender.subscribe()
    }

    pub fn set_error(&self, message: Option<String>) {
        self.sender.send_modify(|snapshot| snapshot.error = message);
    }

    /// Marks one call as started. The returned guard releases it when dropped.
    pub fn begin(&self) -> LoadingGuard {
        self.sender.send_modify(|snapshot| {
            snapshot.in_flight += 1;
            snapshot.error = None;
        });
        LoadingGuard {
            state: self.clone(),
            released: false,
        }
    }

    fn release(&self, error: Option<String>) {
        self.sender.send_modify(|snapshot| {
            snapshot.in_flight = snapshot.in_flight.saturating_sub(1);
            if error.is_some() {
                snapshot.error = error;
            }
        });
    }
}

/// One outstanding call. Dropping it (including when the owning future is
/// dropped mid-flight) settles the call without recording an error.
#[derive(Debug)]
#[must_use = "dropping the guard immediately settles the call"]
pub struct LoadingGuard {
    state: LoadingState,
    released: bool,
}

impl LoadingGuard {
    /// Settles the call and records `message` in the same update.
    pub fn fail(mut self, message: impl Into<String>) {
        self.released = true;
        self.state.release(Some(message.into()));
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if !self.released {
            self.state.release(None);
        }
    }
}

static LOADING_STATE: OnceLock<LoadingState> = OnceLock::new();

/// Process-wide state used by clients that are not given their own.
pub fn global_loading_state() -> LoadingState {
    LOADING_STATE.get_or_init(LoadingState::new).clone()
}

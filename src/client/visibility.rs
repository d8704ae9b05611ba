use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How long the view may stay hidden before polling stops.
pub const SUSPEND_AFTER: Duration = Duration::from_secs(60);

/// Turns polling off once the view has been hidden for a grace period and
/// back on as soon as it is visible again.
///
/// Short absences never touch the flag: returning before the timer fires just
/// cancels it.
pub struct VisibilitySuspender {
    enabled: Arc<watch::Sender<bool>>,
    timer: Option<JoinHandle<()>>,
    grace: Duration,
}

impl VisibilitySuspender {
    pub fn new() -> Self {
        Self::with_grace(SUSPEND_AFTER)
    }

    pub fn with_grace(grace: Duration) -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            enabled: Arc::new(tx),
            timer: None,
            grace,
        }
    }

    pub fn requests_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.enabled.subscribe()
    }

    /// Handles a visibility change. Must be called from within a tokio runtime.
    pub fn set_visible(&mut self, visible: bool) {
        if visible {
            self.on_visible();
        } else {
            self.on_hidden();
        }
    }

    /// Follows a visibility signal until its sender goes away.
    pub async fn track(&mut self, mut visible: watch::Receiver<bool>) {
        loop {
            let now_visible = *visible.borrow_and_update();
            self.set_visible(now_visible);
            if visible.changed().await.is_err() {
                break;
            }
        }
    }

    fn timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn on_hidden(&mut self) {
        if self.timer_running() {
            return;
        }

        let enabled = Arc::clone(&self.enabled);
        let deadline = tokio::time::Instant::now() + self.grace;
        debug!(grace_secs = self.grace.as_secs(), "View hidden, suspension timer started");
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            enabled.send_replace(false);
            info!("View hidden past grace period, requests suspended");
        }));
    }

    fn on_visible(&mut self) {
        match self.timer.take() {
            Some(timer) if !timer.is_finished() => {
                timer.abort();
                debug!("View visible again, suspension timer cancelled");
            }
            _ => {
                if !self.enabled.send_replace(true) {
                    info!("View visible, requests resumed");
                }
            }
        }
    }
}

impl Default for VisibilitySuspender {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VisibilitySuspender {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

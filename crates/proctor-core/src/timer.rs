//! Cancellable countdown driving phase deadlines and auto-advance.
//!
//! One controller belongs to one session. Arming implicitly cancels any
//! prior countdown, so a session can never run two concurrent timers.
//! The countdown task only posts events over a channel; it never touches
//! session state — the owning context consumes the events and performs
//! the transitions.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Events posted by an armed countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// One second elapsed; payload is the remaining seconds.
    Tick(u32),
    /// The countdown reached zero. Fires exactly once and is the sole
    /// trigger of the forced capture-to-review advance.
    Expired,
}

/// Per-session countdown controller.
pub struct TimingController {
    tick_period: Duration,
    active: Mutex<Option<TimerHandle>>,
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingController {
    /// Controller ticking at the production 1-second granularity.
    pub fn new() -> Self {
        Self::with_tick_period(Duration::from_secs(1))
    }

    /// Controller with a custom tick period. Every "second" of the
    /// countdown lasts one period; tests run at millisecond pace.
    pub fn with_tick_period(tick_period: Duration) -> Self {
        Self {
            tick_period,
            active: Mutex::new(None),
        }
    }

    /// Arm a countdown of `seconds`, cancelling any prior one.
    ///
    /// Returns the event receiver; events arrive in order with strictly
    /// decreasing remaining values, ending in a single `Expired`.
    pub fn arm(&self, seconds: u32) -> mpsc::Receiver<TimerEvent> {
        let (tx, rx) = mpsc::channel(32);
        let remaining = Arc::new(AtomicU32::new(seconds));
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_countdown(
            seconds,
            self.tick_period,
            Arc::clone(&remaining),
            Arc::clone(&cancelled),
            tx,
        ));

        let handle = TimerHandle {
            remaining,
            cancelled,
            task,
        };
        let mut active = self.active.lock().expect("timer state poisoned");
        if let Some(prev) = active.replace(handle) {
            prev.cancel();
        }
        rx
    }

    /// Cancel the active countdown, if any. Safe mid-tick: no event is
    /// delivered after this returns.
    pub fn cancel(&self) {
        let mut active = self.active.lock().expect("timer state poisoned");
        if let Some(handle) = active.take() {
            handle.cancel();
        }
    }

    /// Remaining seconds of the active countdown.
    pub fn remaining(&self) -> Option<u32> {
        let active = self.active.lock().expect("timer state poisoned");
        active.as_ref().map(TimerHandle::remaining)
    }

    /// Whether a countdown is currently armed and running.
    pub fn is_armed(&self) -> bool {
        let active = self.active.lock().expect("timer state poisoned");
        active.as_ref().is_some_and(|h| !h.task.is_finished())
    }
}

struct TimerHandle {
    remaining: Arc<AtomicU32>,
    cancelled: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl TimerHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_countdown(
    seconds: u32,
    period: Duration,
    remaining: Arc<AtomicU32>,
    cancelled: Arc<AtomicBool>,
    tx: mpsc::Sender<TimerEvent>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick completes immediately.
    interval.tick().await;

    let mut left = seconds;
    loop {
        if left == 0 {
            if !cancelled.load(Ordering::SeqCst) {
                let _ = tx.send(TimerEvent::Expired).await;
            }
            return;
        }
        interval.tick().await;
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        left -= 1;
        remaining.store(left, Ordering::SeqCst);
        if tx.send(TimerEvent::Tick(left)).await.is_err() {
            // Receiver went away; stop counting.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_and_expires_once() {
        let controller = TimingController::new();
        let rx = controller.arm(3);

        let events = drain(rx).await;
        assert_eq!(
            events,
            vec![
                TimerEvent::Tick(2),
                TimerEvent::Tick(1),
                TimerEvent::Tick(0),
                TimerEvent::Expired,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_strictly_decreasing() {
        let controller = TimingController::new();
        let rx = controller.arm(10);

        let mut last = u32::MAX;
        for event in drain(rx).await {
            if let TimerEvent::Tick(n) = event {
                assert!(n < last, "tick {n} not below {last}");
                last = n;
            }
        }
        assert_eq!(last, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_delivery() {
        let controller = TimingController::new();
        let mut rx = controller.arm(100);

        assert_eq!(rx.recv().await, Some(TimerEvent::Tick(99)));
        controller.cancel();

        // The task is gone; the channel drains without Expired.
        let rest = drain(rx).await;
        assert!(!rest.contains(&TimerEvent::Expired));
        assert!(!controller.is_armed());
        assert_eq!(controller.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_predecessor() {
        let controller = TimingController::new();
        let first = controller.arm(100);
        let second = controller.arm(2);

        let first_events = drain(first).await;
        assert!(!first_events.contains(&TimerEvent::Expired));

        let second_events = drain(second).await;
        assert_eq!(second_events.last(), Some(&TimerEvent::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_tracks_ticks() {
        let controller = TimingController::new();
        let mut rx = controller.arm(5);

        assert_eq!(rx.recv().await, Some(TimerEvent::Tick(4)));
        assert_eq!(controller.remaining(), Some(4));
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick(3)));
        assert_eq!(controller.remaining(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_second_arm_expires_immediately() {
        let controller = TimingController::new();
        let events = drain(controller.arm(0)).await;
        assert_eq!(events, vec![TimerEvent::Expired]);
    }
}

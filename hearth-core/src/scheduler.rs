//! Timed events.
//!
//! Timers tick on the tokio runtime but never run user code there: when one
//! fires, its action is enqueued on the event queue and runs on the worker
//! like any handler, so it can never race a line dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::Dispatcher;
use crate::queue::EventQueue;
use crate::writer::Writer;

/// Shortest recurring interval accepted; zero would spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Longer periods would overflow the timer's clock.
const MAX_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Cloneable handle for scheduling work against the bot's writer.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Handle,
    queue: EventQueue<Dispatcher>,
    next_id: AtomicU64,
    events: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(runtime: Handle, queue: EventQueue<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                queue,
                next_id: AtomicU64::new(1),
                events: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `action` every `interval`, first after one interval has passed.
    pub fn schedule_recurring_event<F>(&self, interval: Duration, action: F) -> u64
    where
        F: Fn(&Writer) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        let action = Arc::new(action);
        let queue = self.inner.queue.clone();
        let id = self.spawn(move |_| async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let action = action.clone();
                if !queue.enqueue(move |d| action(d.writer())) {
                    break;
                }
            }
        });
        tracing::debug!(id, ?interval, "Recurring event scheduled");
        id
    }

    /// Run `action` once after `delay`.
    pub fn schedule_event<F>(&self, delay: Duration, action: F) -> u64
    where
        F: FnOnce(&Writer) -> anyhow::Result<()> + Send + 'static,
    {
        let queue = self.inner.queue.clone();
        let inner = Arc::downgrade(&self.inner);
        let id = self.spawn(move |id| async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(move |d| action(d.writer()));
            if let Some(inner) = inner.upgrade() {
                inner.events.lock().remove(&id);
            }
        });
        tracing::debug!(id, ?delay, "Event scheduled");
        id
    }

    /// Cancel an event. Unknown or already-finished ids are ignored.
    pub fn stop_event(&self, id: u64) {
        if let Some(task) = self.inner.events.lock().remove(&id) {
            task.abort();
            tracing::debug!(id, "Event stopped");
        }
    }

    pub fn stop_all(&self) {
        let tasks = std::mem::take(&mut *self.inner.events.lock());
        if !tasks.is_empty() {
            tracing::debug!(count = tasks.len(), "Stopping all scheduled events");
        }
        for task in tasks.into_values() {
            task.abort();
        }
    }

    pub fn is_scheduled(&self, id: u64) -> bool {
        self.inner.events.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn<M, Fut>(&self, make: M) -> u64
    where
        M: FnOnce(u64) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        // Hold the registry across spawn so a zero-delay event cannot
        // deregister itself before it is registered.
        let mut events = self.inner.events.lock();
        let task = self.inner.runtime.spawn(make(id));
        events.insert(id, task);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;
    use crate::testing;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn scheduler() -> (Scheduler, EventQueue<Dispatcher>, UnboundedReceiver<String>) {
        let (writer, wire) = testing::open_writer();
        let queue =
            EventQueue::start("test-scheduler", Dispatcher::new(testing::config(), writer), queue::log_errors())
                .unwrap();
        (Scheduler::new(Handle::current(), queue.clone()), queue, wire)
    }

    #[tokio::test]
    async fn one_shot_fires_once_through_the_queue() {
        let (scheduler, queue, mut wire) = scheduler();
        let id = scheduler.schedule_event(Duration::from_millis(10), |w| {
            w.send_command_to_channel("tick");
            Ok(())
        });
        assert!(scheduler.is_scheduled(id));

        testing::wait_until("one-shot to deregister", || !scheduler.is_scheduled(id)).await;
        queue.flush().await;
        assert_eq!(testing::drain(&mut wire), ["PRIVMSG #hearth :tick"]);

        // Stopping a finished event is a no-op.
        scheduler.stop_event(id);
        scheduler.stop_event(9999);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn recurring_fires_until_stopped() {
        let (scheduler, queue, mut wire) = scheduler();
        let id = scheduler.schedule_recurring_event(Duration::from_millis(10), |w| {
            w.send_command_to_channel("again");
            Ok(())
        });

        let mut fired = 0;
        while fired < 3 {
            assert_eq!(wire.recv().await.unwrap(), "PRIVMSG #hearth :again");
            fired += 1;
        }
        scheduler.stop_event(id);
        scheduler.stop_event(id);
        assert!(!scheduler.is_scheduled(id));

        queue.flush().await;
        testing::drain(&mut wire);
        tokio::time::sleep(Duration::from_millis(40)).await;
        queue.flush().await;
        assert!(testing::drain(&mut wire).is_empty());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn stop_all_cancels_pending_events() {
        let (scheduler, queue, mut wire) = scheduler();
        scheduler.schedule_event(Duration::from_millis(30), |w| {
            w.send_command_to_channel("late");
            Ok(())
        });
        scheduler.schedule_recurring_event(Duration::from_millis(30), |w| {
            w.send_command_to_channel("later");
            Ok(())
        });
        assert_eq!(scheduler.len(), 2);

        scheduler.stop_all();
        assert!(scheduler.is_empty());
        tokio::time::sleep(Duration::from_millis(60)).await;
        queue.flush().await;
        assert!(testing::drain(&mut wire).is_empty());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn far_future_events_stay_pending() {
        let (scheduler, queue, mut wire) = scheduler();
        let once = scheduler.schedule_event(Duration::MAX, |w| {
            w.send_command_to_channel("never");
            Ok(())
        });
        let every = scheduler.schedule_recurring_event(Duration::MAX, |w| {
            w.send_command_to_channel("never again");
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(scheduler.is_scheduled(once));
        assert!(scheduler.is_scheduled(every));
        queue.flush().await;
        assert!(testing::drain(&mut wire).is_empty());

        scheduler.stop_all();
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (scheduler, queue, _wire) = scheduler();
        let a = scheduler.schedule_event(Duration::from_secs(60), |_| Ok(()));
        let b = scheduler.schedule_event(Duration::from_secs(60), |_| Ok(()));
        assert_ne!(a, b);
        scheduler.stop_all();
        queue.shutdown().await;
    }
}

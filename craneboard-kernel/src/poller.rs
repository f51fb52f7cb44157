//! Tâches périodiques avec arrêt explicite.
//!
//! Un `PollHandle` possède sa tâche : `stop()` l'arrête exactement une fois
//! (le handle est consommé), un handle lâché sans `stop()` avorte la tâche.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub struct PollHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Arrête la boucle ; une requête en vol est abandonnée, aucun état
    /// n'est plus écrit après le retour
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("[{}] poller stopped", self.name);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Lance `tick` immédiatement puis toutes les `period`
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    spawn_loop(name, Instant::now(), period, tick)
}

/// Comme `spawn_periodic`, mais le premier `tick` attend une période
/// (l'appelant a déjà fait la requête initiale)
pub fn spawn_periodic_after<F, Fut>(name: &'static str, period: Duration, tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    spawn_loop(name, Instant::now() + period, period, tick)
}

fn spawn_loop<F, Fut>(name: &'static str, start: Instant, period: Duration, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, mut shutdown) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tick() => {}
            }
        }
    });
    debug!("[{}] poller started ({:?})", name, period);
    PollHandle { name, shutdown: Some(tx), task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(period: Duration) -> (Arc<AtomicUsize>, PollHandle) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn_periodic("test", period, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        (count, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_immediately_then_every_period() {
        let (count, handle) = counting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_start_waits_one_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn_periodic_after("test", Duration::from_secs(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_ticking() {
        let (count, handle) = counting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(handle.is_running());
        handle.stop().await;

        let before = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_task() {
        let (count, handle) = counting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(handle);

        let before = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }
}

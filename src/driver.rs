// Real-time driver for a shared session
// Advances the session clock by wall-clock elapsed time on a tokio interval.

use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::chat::ChatSession;

pub type SharedSession = Arc<TokioMutex<ChatSession>>;

pub fn shared(session: ChatSession) -> SharedSession {
    Arc::new(TokioMutex::new(session))
}

/// Spawn a task that keeps the session clock in step with real time
pub fn spawn_clock(session: SharedSession, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = now - last;
            last = now;

            let mut guard = session.lock().await;
            guard.advance(elapsed);
            if guard.pending_timers() > 0 {
                debug!("{} timer(s) pending at {:?}", guard.pending_timers(), guard.now());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;

    #[tokio::test(start_paused = true)]
    async fn test_clock_connects_session() {
        let (session, _updates) = ChatSession::new(ChatConfig::default());
        let session = shared(session);
        session.lock().await.connect("ws://localhost:3001");

        let handle = spawn_clock(session.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(session.lock().await.is_connected());
        handle.abort();
    }
}

// Virtual timer queue
// Stands in for setTimeout: tasks are plain data and fire in (due time, insertion order)
// when the owning session advances its clock.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::models::{ConversationId, MessageId};

pub type TimerId = u64;

/// Work the session performs when a timer fires
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    Connect,
    MarkSent {
        conversation_id: ConversationId,
        generation: u64,
        message_id: MessageId,
    },
    MarkDelivered {
        conversation_id: ConversationId,
        generation: u64,
        message_id: MessageId,
    },
    CounterpartTyping {
        conversation_id: ConversationId,
        generation: u64,
    },
    ScriptedReply {
        conversation_id: ConversationId,
        generation: u64,
        content: String,
    },
    TypingIdle {
        conversation_id: ConversationId,
    },
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    next_id: TimerId,
    queue: BTreeMap<(Duration, TimerId), TimerTask>,
    due_by_id: HashMap<TimerId, Duration>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        let due = self.now + delay;
        debug!("Scheduling timer {} at {:?}: {:?}", id, due, task);
        self.queue.insert((due, id), task);
        self.due_by_id.insert(id, due);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.due_by_id.remove(&id) {
            Some(due) => {
                self.queue.remove(&(due, id));
                debug!("Cancelled timer {}", id);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_by_id.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pop the earliest task due at or before `until`, moving the clock to its due time
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerId, TimerTask)> {
        let (&(due, id), _) = self.queue.iter().next()?;
        if due > until {
            return None;
        }
        let task = self.queue.remove(&(due, id))?;
        self.due_by_id.remove(&id);
        if due > self.now {
            self.now = due;
        }
        Some((id, task))
    }

    /// Move the clock forward without running anything
    pub fn set_now(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Time until the next pending timer, if any
    pub fn next_due_in(&self) -> Option<Duration> {
        self.queue
            .keys()
            .next()
            .map(|(due, _)| due.saturating_sub(self.now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(id: ConversationId) -> TimerTask {
        TimerTask::TypingIdle { conversation_id: id }
    }

    #[test]
    fn test_tasks_fire_in_due_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(300), idle(3));
        scheduler.schedule(Duration::from_millis(100), idle(1));
        scheduler.schedule(Duration::from_millis(200), idle(2));

        let until = Duration::from_millis(1000);
        let mut fired = Vec::new();
        while let Some((_, task)) = scheduler.pop_due(until) {
            fired.push(task);
        }
        assert_eq!(fired, vec![idle(1), idle(2), idle(3)]);
        assert_eq!(scheduler.now(), Duration::from_millis(300));
    }

    #[test]
    fn test_equal_due_times_keep_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(50), idle(1));
        scheduler.schedule(Duration::from_millis(50), idle(2));

        let (_, first) = scheduler.pop_due(Duration::from_millis(50)).unwrap();
        let (_, second) = scheduler.pop_due(Duration::from_millis(50)).unwrap();
        assert_eq!(first, idle(1));
        assert_eq!(second, idle(2));
    }

    #[test]
    fn test_not_due_yet() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(500), TimerTask::Connect);
        assert!(scheduler.pop_due(Duration::from_millis(499)).is_none());
        assert_eq!(scheduler.next_due_in(), Some(Duration::from_millis(500)));
        assert!(scheduler.pop_due(Duration::from_millis(500)).is_some());
        assert_eq!(scheduler.next_due_in(), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule(Duration::from_millis(10), idle(1));
        assert!(scheduler.is_pending(id));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(!scheduler.is_pending(id));
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.pop_due(Duration::from_secs(1)).is_none());
    }
}

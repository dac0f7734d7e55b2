//! Start order of transactions on one database.
//!
//! Transactions start in creation order. One waits while an earlier
//! transaction that has not finished shares a store with it and either of
//! the two writes. Read-only transactions over the same stores run side by
//! side; a version-change transaction covers every store.

use super::TransactionMode;
use parking_lot::Mutex;
use tokio::sync::watch;

struct Entry {
    id: u64,
    /// `None` covers every store.
    scope: Option<Vec<String>>,
    writes: bool,
}

impl Entry {
    fn conflicts(&self, other: &Entry) -> bool {
        if !self.writes && !other.writes {
            return false;
        }
        match (&self.scope, &other.scope) {
            (Some(ours), Some(theirs)) => ours.iter().any(|name| theirs.contains(name)),
            _ => true,
        }
    }
}

pub(crate) struct Scheduler {
    queue: Mutex<Vec<Entry>>,
    finished: watch::Sender<u64>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        let (finished, _) = watch::channel(0);
        Self {
            queue: Mutex::new(Vec::new()),
            finished,
        }
    }

    /// Queues a transaction behind every transaction created before it.
    pub(crate) fn register(&self, id: u64, scope: &[String], mode: TransactionMode) {
        let entry = match mode {
            TransactionMode::VersionChange => Entry {
                id,
                scope: None,
                writes: true,
            },
            TransactionMode::ReadWrite => Entry {
                id,
                scope: Some(scope.to_vec()),
                writes: true,
            },
            TransactionMode::ReadOnly => Entry {
                id,
                scope: Some(scope.to_vec()),
                writes: false,
            },
        };
        self.queue.lock().push(entry);
    }

    pub(crate) fn may_start(&self, id: u64) -> bool {
        let queue = self.queue.lock();
        let Some(position) = queue.iter().position(|entry| entry.id == id) else {
            return true;
        };
        let entry = &queue[position];
        !queue[..position]
            .iter()
            .any(|earlier| earlier.conflicts(entry))
    }

    /// Waits until no earlier conflicting transaction is left.
    pub(crate) async fn wait_turn(&self, id: u64) {
        let mut finished = self.finished.subscribe();
        while !self.may_start(id) {
            if finished.changed().await.is_err() {
                return;
            }
        }
    }

    /// Removes a settled transaction and wakes the ones waiting on it.
    pub(crate) fn finish(&self, id: u64) {
        self.queue.lock().retain(|entry| entry.id != id);
        self.finished.send_modify(|settled| *settled += 1);
    }

    #[cfg(test)]
    fn waiting(&self) -> usize {
        self.queue.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn overlapping_writers_wait_in_creation_order() {
        let scheduler = Scheduler::new();
        scheduler.register(1, &scope(&["a"]), TransactionMode::ReadWrite);
        scheduler.register(2, &scope(&["a", "b"]), TransactionMode::ReadWrite);
        scheduler.register(3, &scope(&["c"]), TransactionMode::ReadWrite);

        assert!(scheduler.may_start(1));
        assert!(!scheduler.may_start(2));
        assert!(scheduler.may_start(3));

        scheduler.finish(1);
        assert!(scheduler.may_start(2));
        assert_eq!(scheduler.waiting(), 2);
    }

    #[test]
    fn readers_share_but_block_later_writers() {
        let scheduler = Scheduler::new();
        scheduler.register(1, &scope(&["a"]), TransactionMode::ReadOnly);
        scheduler.register(2, &scope(&["a"]), TransactionMode::ReadOnly);
        scheduler.register(3, &scope(&["a"]), TransactionMode::ReadWrite);

        assert!(scheduler.may_start(2));
        assert!(!scheduler.may_start(3));
        scheduler.finish(1);
        scheduler.finish(2);
        assert!(scheduler.may_start(3));
    }

    #[test]
    fn version_change_covers_every_store() {
        let scheduler = Scheduler::new();
        scheduler.register(1, &[], TransactionMode::VersionChange);
        scheduler.register(2, &scope(&["anything"]), TransactionMode::ReadOnly);
        assert!(!scheduler.may_start(2));
    }

    #[tokio::test]
    async fn waiting_transaction_starts_after_finish() {
        let scheduler = std::sync::Arc::new(Scheduler::new());
        scheduler.register(1, &scope(&["a"]), TransactionMode::ReadWrite);
        scheduler.register(2, &scope(&["a"]), TransactionMode::ReadWrite);

        let waiter = std::sync::Arc::clone(&scheduler);
        let turn = tokio::spawn(async move { waiter.wait_turn(2).await });
        tokio::task::yield_now().await;
        assert!(!turn.is_finished());

        scheduler.finish(1);
        tokio::time::timeout(std::time::Duration::from_secs(5), turn)
            .await
            .expect("second transaction started")
            .expect("task");
    }
}

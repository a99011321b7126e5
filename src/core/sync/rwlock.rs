/*!
 * Reader/Writer Lock
 *
 * Explicit state-machine lock: a `parking_lot::Mutex` guards the bookkeeping
 * (holder state, waiter counts, fairness state) and blocked requests park on
 * one `parking_lot::Condvar` per access mode. The protected value lives in an
 * `UnsafeCell` and is only reachable through the RAII guards.
 *
 * # Fairness
 *
 * - **WriterPreferring**: every blocked request draws an arrival number. A
 *   reader that finds a writer waiting queues behind it and enters only after
 *   that writer has held and released the lock. A queued writer lets the
 *   readers that arrived before it go first. A writer therefore waits for the
 *   readers already inside or ahead of it, and a reader waits only for the
 *   writers that queued ahead of it.
 * - **Fifo**: blocked requests take tickets and are admitted in ticket order,
 *   consecutive readers together.
 */

use super::config::{FairnessPolicy, LockConfig};
use super::guard::{ReadGuard, WriteGuard};
use super::state::{LockMode, LockState};
use super::stats::{LockStats, LockStatsSnapshot};
use crate::core::errors::{LockError, LockResult};
use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Position of a request in the admission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Place {
    /// Fresh request, not queued yet
    Arriving,
    /// Writer-preferring arrival number
    Arrival(u64),
    /// FIFO ticket
    Ticket(u64),
}

/// Everything the lock knows about its holders and waiters
#[derive(Debug)]
struct Bookkeeping {
    policy: FairnessPolicy,
    state: LockState,
    waiting_readers: usize,
    waiting_writers: usize,
    next_arrival: u64,
    queued_readers: BTreeSet<u64>,
    queued_writers: BTreeSet<u64>,
    next_ticket: u64,
    serving: u64,
    abandoned: BTreeSet<u64>,
}

impl Bookkeeping {
    fn new(policy: FairnessPolicy) -> Self {
        Self {
            policy,
            state: LockState::Free,
            waiting_readers: 0,
            waiting_writers: 0,
            next_arrival: 0,
            queued_readers: BTreeSet::new(),
            queued_writers: BTreeSet::new(),
            next_ticket: 0,
            serving: 0,
            abandoned: BTreeSet::new(),
        }
    }

    #[inline]
    fn queue_empty(&self) -> bool {
        self.serving == self.next_ticket
    }

    #[inline]
    fn oldest_reader(&self) -> Option<u64> {
        self.queued_readers.first().copied()
    }

    #[inline]
    fn oldest_writer(&self) -> Option<u64> {
        self.queued_writers.first().copied()
    }

    fn may_enter(&self, mode: LockMode, place: Place) -> bool {
        match mode {
            LockMode::Shared => self.reader_may_enter(place),
            LockMode::Exclusive => self.writer_may_enter(place),
        }
    }

    fn reader_may_enter(&self, place: Place) -> bool {
        if !self.state.can_share() {
            return false;
        }
        match (self.policy, place) {
            (FairnessPolicy::WriterPreferring, Place::Arrival(arrival)) => {
                self.oldest_writer().map_or(true, |writer| arrival < writer)
            }
            (FairnessPolicy::WriterPreferring, _) => self.queued_writers.is_empty(),
            (FairnessPolicy::Fifo, Place::Ticket(ticket)) => self.serving == ticket,
            (FairnessPolicy::Fifo, _) => self.queue_empty(),
        }
    }

    fn writer_may_enter(&self, place: Place) -> bool {
        if !self.state.can_exclude() {
            return false;
        }
        match (self.policy, place) {
            (FairnessPolicy::WriterPreferring, Place::Arrival(arrival)) => {
                self.oldest_writer() == Some(arrival)
                    && self.oldest_reader().map_or(true, |reader| arrival < reader)
            }
            (FairnessPolicy::WriterPreferring, _) => {
                self.queued_writers.is_empty() && self.queued_readers.is_empty()
            }
            (FairnessPolicy::Fifo, Place::Ticket(ticket)) => self.serving == ticket,
            (FairnessPolicy::Fifo, _) => self.queue_empty(),
        }
    }

    /// Register a blocked request and return its place in line
    fn enqueue(&mut self, mode: LockMode) -> Place {
        match mode {
            LockMode::Shared => self.waiting_readers += 1,
            LockMode::Exclusive => self.waiting_writers += 1,
        }
        match self.policy {
            FairnessPolicy::WriterPreferring => {
                let arrival = self.next_arrival;
                self.next_arrival += 1;
                match mode {
                    LockMode::Shared => self.queued_readers.insert(arrival),
                    LockMode::Exclusive => self.queued_writers.insert(arrival),
                };
                Place::Arrival(arrival)
            }
            FairnessPolicy::Fifo => {
                let ticket = self.next_ticket;
                self.next_ticket += 1;
                Place::Ticket(ticket)
            }
        }
    }

    fn dequeue(&mut self, mode: LockMode) {
        match mode {
            LockMode::Shared => self.waiting_readers -= 1,
            LockMode::Exclusive => self.waiting_writers -= 1,
        }
    }

    fn admit(&mut self, mode: LockMode, place: Place) -> LockResult<()> {
        match mode {
            LockMode::Shared => self.state.acquire_shared()?,
            LockMode::Exclusive => self.state.acquire_exclusive()?,
        }
        self.settle(mode, place);
        Ok(())
    }

    /// Withdraw a timed-out request without leaving anything behind
    fn abandon(&mut self, mode: LockMode, place: Place) {
        match place {
            Place::Ticket(ticket) => {
                self.abandoned.insert(ticket);
                self.skip_abandoned();
            }
            _ => self.settle(mode, place),
        }
    }

    /// Consume the request's place: its arrival slot or its ticket
    fn settle(&mut self, mode: LockMode, place: Place) {
        match place {
            Place::Arrival(arrival) => {
                match mode {
                    LockMode::Shared => self.queued_readers.remove(&arrival),
                    LockMode::Exclusive => self.queued_writers.remove(&arrival),
                };
            }
            Place::Ticket(_) => {
                self.serving += 1;
                self.skip_abandoned();
            }
            Place::Arriving => {}
        }
    }

    fn skip_abandoned(&mut self) {
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

/// Reader/writer lock with explicit, fair admission
///
/// # Examples
///
/// ```
/// use guarded_counter::core::sync::RwLock;
///
/// let lock = RwLock::new(5);
/// {
///     let a = lock.read();
///     let b = lock.read();
///     assert_eq!(*a + *b, 10);
/// }
/// *lock.write() += 1;
/// assert_eq!(*lock.read(), 6);
/// ```
pub struct RwLock<T> {
    book: Mutex<Bookkeeping>,
    readers: Condvar,
    writers: Condvar,
    config: LockConfig,
    stats: LockStats,
    value: UnsafeCell<T>,
}

// Safety: shared guards hand out &T to many threads (T: Sync), the exclusive
// guard hands out &mut T to one thread at a time (T: Send).
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Create an unlocked lock with the default (writer-preferring) policy
    pub fn new(value: T) -> Self {
        Self::with_config(value, LockConfig::default())
    }

    pub fn with_config(value: T, config: LockConfig) -> Self {
        Self {
            book: Mutex::new(Bookkeeping::new(config.policy)),
            readers: Condvar::new(),
            writers: Condvar::new(),
            config,
            stats: LockStats::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire shared access, blocking while a writer holds or (by policy) precedes us
    pub fn read(&self) -> ReadGuard<'_, T> {
        match self.acquire(LockMode::Shared, None) {
            Ok(()) => ReadGuard::new(self),
            Err(err) => fatal(err),
        }
    }

    /// Acquire exclusive access, blocking until no reader or writer holds the lock
    pub fn write(&self) -> WriteGuard<'_, T> {
        match self.acquire(LockMode::Exclusive, None) {
            Ok(()) => WriteGuard::new(self),
            Err(err) => fatal(err),
        }
    }

    /// Shared access if it can be granted immediately without jumping the queue
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        self.try_acquire(LockMode::Shared)
            .then(|| ReadGuard::new(self))
    }

    /// Exclusive access if it can be granted immediately without jumping the queue
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        self.try_acquire(LockMode::Exclusive)
            .then(|| WriteGuard::new(self))
    }

    /// Shared access, giving up after `timeout`
    ///
    /// A request that times out is withdrawn completely: waiter counts,
    /// arrival numbers and tickets are restored as if it never queued.
    pub fn read_for(&self, timeout: Duration) -> LockResult<ReadGuard<'_, T>> {
        self.acquire(LockMode::Shared, Instant::now().checked_add(timeout))?;
        Ok(ReadGuard::new(self))
    }

    /// Exclusive access, giving up after `timeout`
    pub fn write_for(&self, timeout: Duration) -> LockResult<WriteGuard<'_, T>> {
        self.acquire(LockMode::Exclusive, Instant::now().checked_add(timeout))?;
        Ok(WriteGuard::new(self))
    }

    /// Current holder state
    pub fn state(&self) -> LockState {
        self.book.lock().state
    }

    pub fn waiting_readers(&self) -> usize {
        self.book.lock().waiting_readers
    }

    pub fn waiting_writers(&self) -> usize {
        self.book.lock().waiting_writers
    }

    pub fn policy(&self) -> FairnessPolicy {
        self.config.policy
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn stats(&self) -> LockStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Mutable access without locking; the borrow proves exclusivity
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    #[inline]
    pub(crate) fn data_ptr(&self) -> *mut T {
        self.value.get()
    }

    pub(crate) fn release_shared(&self) -> LockResult<()> {
        let mut book = self.book.lock();
        book.state.release_shared()?;
        self.wake_waiters(&book);
        Ok(())
    }

    pub(crate) fn release_exclusive(&self) -> LockResult<()> {
        let mut book = self.book.lock();
        book.state.release_exclusive()?;
        self.wake_waiters(&book);
        Ok(())
    }

    fn try_acquire(&self, mode: LockMode) -> bool {
        let mut book = self.book.lock();
        if !book.may_enter(mode, Place::Arriving) {
            return false;
        }
        match book.admit(mode, Place::Arriving) {
            Ok(()) => {
                self.record(mode, book.state, false);
                true
            }
            Err(err) => fatal(err),
        }
    }

    fn acquire(&self, mode: LockMode, deadline: Option<Instant>) -> LockResult<()> {
        let started = Instant::now();
        let mut book = self.book.lock();

        if book.may_enter(mode, Place::Arriving) {
            book.admit(mode, Place::Arriving)?;
            self.record(mode, book.state, false);
            return Ok(());
        }

        let place = book.enqueue(mode);
        debug!(
            mode = %mode,
            state = %book.state,
            waiting_readers = book.waiting_readers,
            waiting_writers = book.waiting_writers,
            "lock contended, parking"
        );

        let condvar = match mode {
            LockMode::Shared => &self.readers,
            LockMode::Exclusive => &self.writers,
        };

        loop {
            let timed_out = match deadline {
                Some(deadline) => condvar.wait_until(&mut book, deadline).timed_out(),
                None => {
                    condvar.wait(&mut book);
                    false
                }
            };

            // Admission wins over an expired deadline
            if book.may_enter(mode, place) {
                book.dequeue(mode);
                book.admit(mode, place)?;
                self.record(mode, book.state, true);
                if book.policy == FairnessPolicy::Fifo {
                    self.wake_waiters(&book);
                }
                return Ok(());
            }

            if timed_out {
                book.dequeue(mode);
                book.abandon(mode, place);
                self.wake_waiters(&book);
                if self.config.collect_stats {
                    self.stats.record_timeout();
                }

                let waited = started.elapsed();
                warn!(mode = %mode, ?waited, state = %book.state, "lock acquisition timed out");
                return Err(LockError::Timeout { mode, waited });
            }
        }
    }

    /// Wake whoever the current bookkeeping would admit
    fn wake_waiters(&self, book: &Bookkeeping) {
        match book.policy {
            // Several writers may be parked but only the oldest can proceed
            FairnessPolicy::WriterPreferring => {
                let oldest_reader = book.oldest_reader();
                let oldest_writer = book.oldest_writer();
                let readers_first = match (oldest_reader, oldest_writer) {
                    (Some(reader), Some(writer)) => reader < writer,
                    (reader, _) => reader.is_some(),
                };

                if readers_first && book.state.can_share() {
                    self.readers.notify_all();
                } else if !readers_first && oldest_writer.is_some() && book.state.can_exclude() {
                    self.writers.notify_all();
                }
            }
            // Only the ticket holder can proceed and we don't know its mode
            FairnessPolicy::Fifo => {
                if book.waiting_readers > 0 {
                    self.readers.notify_all();
                }
                if book.waiting_writers > 0 {
                    self.writers.notify_all();
                }
            }
        }
    }

    #[inline]
    fn record(&self, mode: LockMode, state: LockState, contended: bool) {
        if !self.config.collect_stats {
            return;
        }
        match mode {
            LockMode::Shared => self.stats.record_shared(state.readers(), contended),
            LockMode::Exclusive => self.stats.record_exclusive(contended),
        }
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let book = self.book.lock();
        f.debug_struct("RwLock")
            .field("policy", &book.policy)
            .field("state", &book.state)
            .field("waiting_readers", &book.waiting_readers)
            .field("waiting_writers", &book.waiting_writers)
            .finish_non_exhaustive()
    }
}

/// Protocol violations mean the bookkeeping is corrupt; nothing can continue
#[cold]
pub(crate) fn fatal(err: LockError) -> ! {
    tracing::error!(error = %err, "fatal lock protocol violation");
    panic!("{}", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(start.elapsed() < Duration::from_secs(5), "condition never held");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_readers_share() {
        let lock = RwLock::new(1);
        let a = lock.read();
        let b = lock.read();

        assert_eq!(lock.state(), LockState::SharedBy(2));
        assert!(lock.try_write().is_none());

        drop(a);
        drop(b);
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn test_writer_excludes() {
        let lock = RwLock::new(1);
        let mut w = lock.write();
        *w = 2;

        assert_eq!(lock.state(), LockState::ExclusiveHeld);
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());

        drop(w);
        assert_eq!(*lock.read(), 2);
    }

    #[test]
    fn test_queued_writer_blocks_new_readers() {
        let lock = Arc::new(RwLock::new(0));
        let held = lock.read();

        let writer = {
            let lock = lock.clone();
            thread::spawn(move || *lock.write() += 1)
        };
        wait_for(|| lock.waiting_writers() == 1);

        // A writer is waiting: newcomers may not overtake it
        assert!(lock.try_read().is_none());

        drop(held);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn test_fifo_try_read_respects_queue() {
        let lock = Arc::new(RwLock::with_config(0, LockConfig::fifo()));
        let held = lock.write();

        let reader = {
            let lock = lock.clone();
            thread::spawn(move || *lock.read())
        };
        wait_for(|| lock.waiting_readers() == 1);

        drop(held);
        assert_eq!(reader.join().unwrap(), 0);
        assert!(lock.try_read().is_some());
    }

    #[test]
    fn test_read_timeout_leaves_no_trace() {
        let lock = RwLock::new(0);
        let held = lock.write();

        let err = lock.read_for(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { mode: LockMode::Shared, .. }));
        assert_eq!(lock.waiting_readers(), 0);

        drop(held);
        assert_eq!(lock.state(), LockState::Free);
        assert!(lock.try_write().is_some());
        assert_eq!(lock.stats().timeouts, 1);
    }

    #[test]
    fn test_bookkeeping_admits_in_arrival_order() {
        let mut book = Bookkeeping::new(FairnessPolicy::WriterPreferring);
        book.admit(LockMode::Exclusive, Place::Arriving).unwrap();

        let r1 = book.enqueue(LockMode::Shared);
        let w1 = book.enqueue(LockMode::Exclusive);
        let r2 = book.enqueue(LockMode::Shared);

        book.state.release_exclusive().unwrap();

        // r1 came before the writer, r2 after it
        assert!(book.may_enter(LockMode::Shared, r1));
        assert!(!book.may_enter(LockMode::Exclusive, w1));
        assert!(!book.may_enter(LockMode::Shared, r2));
        assert!(!book.may_enter(LockMode::Shared, Place::Arriving));

        book.dequeue(LockMode::Shared);
        book.admit(LockMode::Shared, r1).unwrap();
        book.state.release_shared().unwrap();

        assert!(book.may_enter(LockMode::Exclusive, w1));
        assert!(!book.may_enter(LockMode::Shared, r2));

        book.dequeue(LockMode::Exclusive);
        book.admit(LockMode::Exclusive, w1).unwrap();
        book.state.release_exclusive().unwrap();
        assert!(book.may_enter(LockMode::Shared, r2));
    }

    #[test]
    fn test_bookkeeping_abandoned_writer_frees_readers_behind_it() {
        let mut book = Bookkeeping::new(FairnessPolicy::WriterPreferring);
        book.admit(LockMode::Shared, Place::Arriving).unwrap();

        let w = book.enqueue(LockMode::Exclusive);
        let r = book.enqueue(LockMode::Shared);
        assert!(!book.may_enter(LockMode::Shared, r));

        book.dequeue(LockMode::Exclusive);
        book.abandon(LockMode::Exclusive, w);
        assert!(book.may_enter(LockMode::Shared, r));
        assert!(book.queued_writers.is_empty());
    }

    #[test]
    fn test_bookkeeping_only_oldest_writer_enters() {
        let mut book = Bookkeeping::new(FairnessPolicy::WriterPreferring);
        book.admit(LockMode::Exclusive, Place::Arriving).unwrap();

        let w1 = book.enqueue(LockMode::Exclusive);
        let w2 = book.enqueue(LockMode::Exclusive);
        book.state.release_exclusive().unwrap();

        assert!(book.may_enter(LockMode::Exclusive, w1));
        assert!(!book.may_enter(LockMode::Exclusive, w2));
    }

    #[test]
    fn test_bookkeeping_skips_abandoned_tickets() {
        let mut book = Bookkeeping::new(FairnessPolicy::Fifo);
        book.admit(LockMode::Exclusive, Place::Arriving).unwrap();

        let t0 = book.enqueue(LockMode::Exclusive);
        let t1 = book.enqueue(LockMode::Shared);
        book.state.release_exclusive().unwrap();

        book.dequeue(LockMode::Exclusive);
        book.abandon(LockMode::Exclusive, t0);
        assert!(book.may_enter(LockMode::Shared, t1));

        book.dequeue(LockMode::Shared);
        book.admit(LockMode::Shared, t1).unwrap();
        assert!(book.queue_empty());
    }
}

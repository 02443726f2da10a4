//! A counting semaphore built on `Mutex` + `Condvar`, backing the
//! `DataBuffer`'s backpressure.

use std::sync::{Condvar, Mutex};

/// Blocking counting semaphore. `acquire`/`acquire_n` block while the count
/// is below the requested amount; `release`/`release_n` add to the count and
/// wake waiters.
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        self.acquire_n(1);
    }

    /// Blocks until `n` permits are available, then takes all `n` at once.
    pub fn acquire_n(&self, n: usize) {
        let mut count = self.count.lock().unwrap();
        while *count < n {
            count = self.available.wait(count).unwrap();
        }
        *count -= n;
    }

    pub fn release(&self) {
        self.release_n(1);
    }

    pub fn release_n(&self, n: usize) {
        let mut count = self.count.lock().unwrap();
        *count += n;
        self.available.notify_all();
    }

    /// Current permit count. Only meaningful for tests and invariant checks
    /// (`empty_sem + full_sem == cap` should always hold for a `DataBuffer`'s
    /// pair) — not part of the acquire/release protocol itself.
    pub fn value(&self) -> usize {
        *self.count.lock().unwrap()
    }

    /// Drains every outstanding permit back to zero, returning how many were
    /// drained. Used by `DataBuffer::clear()` to reset the `full_sem` side.
    pub fn drain(&self) -> usize {
        let mut count = self.count.lock().unwrap();
        let drained = *count;
        *count = 0;
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(0));
        let worker = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                sem.acquire();
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!worker.is_finished());
        sem.release();
        worker.join().unwrap();
    }

    #[test]
    fn acquire_n_takes_all_requested_permits_atomically() {
        let sem = Semaphore::new(5);
        sem.acquire_n(3);
        assert_eq!(sem.value(), 2);
    }

    #[test]
    fn release_then_acquire_round_trips_value() {
        let sem = Semaphore::new(0);
        sem.release_n(4);
        assert_eq!(sem.value(), 4);
        sem.acquire_n(4);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn drain_resets_to_zero_and_reports_prior_value() {
        let sem = Semaphore::new(7);
        assert_eq!(sem.drain(), 7);
        assert_eq!(sem.value(), 0);
    }
}

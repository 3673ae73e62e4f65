//! A bounded FIFO queue of jobs.
//!
//! The queue itself does no synchronization: it lives inside the pool state
//! and is only touched while the pool lock is held. Blocking on a full or an
//! empty queue is done by the pool, with condition variables tied to the
//! same lock, so a capacity check and the push that follows it are always
//! atomic with respect to other submitters.

use alloc::collections::VecDeque;

use crate::job::JobBox;

/// A bounded, strictly first-in first-out queue of jobs.
pub struct TaskQueue {
    jobs: VecDeque<JobBox>,
    capacity: usize,
}

impl TaskQueue {
    /// Creates an empty queue which holds at most `capacity` jobs.
    pub fn new(capacity: usize) -> TaskQueue {
        TaskQueue {
            jobs: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends a job to the back of the queue, or hands it back if the queue
    /// is full.
    #[inline]
    pub fn push(&mut self, job: JobBox) -> Result<(), JobBox> {
        if self.is_full() {
            return Err(job);
        }
        self.jobs.push_back(job);
        Ok(())
    }

    /// Removes the job at the head of the queue.
    #[inline]
    pub fn pop(&mut self) -> Option<JobBox> {
        self.jobs.pop_front()
    }

    /// The number of jobs waiting in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity of the queue. Jobs already queued are kept even
    /// if they exceed the new capacity; only new pushes are refused.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }
}

#[cfg(all(test, not(feature = "shuttle")))]
mod tests {
    use super::*;
    use crate::job::HeapJob;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    #[test]
    fn refuses_pushes_past_capacity() {
        let mut queue = TaskQueue::new(2);
        let (a, _ha) = HeapJob::new(|| 1);
        let (b, _hb) = HeapJob::new(|| 2);
        let (c, hc) = HeapJob::new(|| 3);
        assert!(queue.push(a).is_ok());
        assert!(queue.push(b).is_ok());
        assert!(queue.is_full());

        let refused = queue.push(c).err().unwrap();
        assert_eq!(queue.len(), 2);

        // The refused job is handed back intact.
        refused.execute();
        assert_eq!(hc.wait(), Ok(3));
    }

    #[test]
    fn pops_in_arrival_order() {
        let mut queue = TaskQueue::new(8);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            let (job, _handle) = HeapJob::new(move || order.lock().unwrap().push(i));
            assert!(queue.push(job).is_ok());
        }

        while let Some(job) = queue.pop() {
            job.execute();
        }

        assert!(queue.is_empty());
        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3, 4]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut queue = TaskQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.set_capacity(0);
        assert_eq!(queue.capacity(), 1);
    }
}

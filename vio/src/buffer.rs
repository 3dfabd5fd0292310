/*!
    Bounded queue between a pipeline worker and its caller.
*/

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use vio_types::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Status {
    Open,
    /// No more items will arrive; the remaining ones are still delivered.
    Finished,
    /// Like `Finished`, but ends with an error instead of end of stream.
    Failed(Error),
    /// Remaining items were dropped.
    Cancelled,
}

struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
    status: Status,
}

/**
    Bounded, ordered, closeable queue.

    `push` blocks while the buffer is full and `pop` while it is empty, each
    with an optional timeout. A timeout returns `Timeout` and leaves the
    buffer untouched. Closing the buffer wakes every waiter.
*/
pub struct FrameBuffer<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> FrameBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
                status: Status::Open,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /**
        Append an item, waiting for space.

        Fails with the stored error if the buffer failed, and with `Closed`
        if it was finished or cancelled.
    */
    pub fn push(&self, item: T, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        while inner.items.len() >= inner.capacity && inner.status == Status::Open {
            if !wait(&self.not_full, &mut inner, deadline)
                && inner.items.len() >= inner.capacity
                && inner.status == Status::Open
            {
                return Err(Error::Timeout);
            }
        }

        match &inner.status {
            Status::Open => {}
            Status::Failed(e) => return Err(e.clone()),
            Status::Finished | Status::Cancelled => return Err(Error::Closed),
        }

        inner.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /**
        Take the oldest item, waiting for one to arrive.

        Returns `Ok(None)` once a finished buffer is drained, and the stored
        error once a failed buffer is drained. A cancelled buffer reports
        `Closed` straight away.
    */
    pub fn pop(&self, timeout: Option<Duration>) -> Result<Option<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        while inner.items.is_empty() && inner.status == Status::Open {
            if !wait(&self.not_empty, &mut inner, deadline)
                && inner.items.is_empty()
                && inner.status == Status::Open
            {
                return Err(Error::Timeout);
            }
        }

        if let Some(item) = inner.items.pop_front() {
            self.not_full.notify_one();
            return Ok(Some(item));
        }

        match &inner.status {
            Status::Finished => Ok(None),
            Status::Failed(e) => Err(e.clone()),
            Status::Cancelled => Err(Error::Closed),
            // Unreachable: the wait loop only exits on an item or a status change
            Status::Open => Err(Error::Timeout),
        }
    }

    /**
        Mark the end of the stream. Items already queued are still delivered.
    */
    pub fn finish(&self) {
        self.close_with(Status::Finished);
    }

    /**
        End the stream with an error, delivered after the queued items.
    */
    pub fn fail(&self, error: Error) {
        self.close_with(Status::Failed(error));
    }

    /**
        Drop queued items and refuse everything from now on.
    */
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.status = Status::Cancelled;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().status != Status::Open
    }

    fn close_with(&self, status: Status) {
        let mut inner = self.inner.lock();
        // The first way of closing wins
        if inner.status == Status::Open {
            inner.status = status;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

/// Returns false if the deadline passed.
fn wait<T>(condvar: &Condvar, guard: &mut MutexGuard<'_, Inner<T>>, deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => !condvar.wait_until(guard, deadline).timed_out(),
        None => {
            condvar.wait(guard);
            true
        }
    }
}

impl<T> std::fmt::Debug for FrameBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FrameBuffer")
            .field("len", &inner.items.len())
            .field("capacity", &inner.capacity)
            .field("status", &inner.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn delivers_in_order() {
        let buffer = FrameBuffer::new(4);
        for i in 0..4 {
            buffer.push(i, None).unwrap();
        }
        assert_eq!(buffer.len(), 4);
        for i in 0..4 {
            assert_eq!(buffer.pop(None).unwrap(), Some(i));
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn timeouts_leave_state_alone() {
        let buffer = FrameBuffer::new(1);
        assert_eq!(buffer.pop(Some(Duration::from_millis(10))), Err(Error::Timeout));

        buffer.push(1, None).unwrap();
        assert_eq!(buffer.push(2, Some(Duration::from_millis(10))), Err(Error::Timeout));
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_closed());
        assert_eq!(buffer.pop(None).unwrap(), Some(1));
    }

    #[test]
    fn finished_buffer_drains_then_ends() {
        let buffer = FrameBuffer::new(4);
        buffer.push(1, None).unwrap();
        buffer.finish();
        assert_eq!(buffer.push(2, None), Err(Error::Closed));
        assert_eq!(buffer.pop(None).unwrap(), Some(1));
        assert_eq!(buffer.pop(None).unwrap(), None);
        assert_eq!(buffer.pop(None).unwrap(), None);
    }

    #[test]
    fn failed_buffer_drains_then_reports() {
        let buffer = FrameBuffer::new(4);
        buffer.push(1, None).unwrap();
        buffer.fail(Error::decode("corrupt"));
        buffer.finish();
        assert_eq!(buffer.pop(None).unwrap(), Some(1));
        assert_eq!(buffer.pop(None), Err(Error::decode("corrupt")));
        assert_eq!(buffer.push(3, None), Err(Error::decode("corrupt")));
    }

    #[test]
    fn cancel_drops_items() {
        let buffer = FrameBuffer::new(4);
        buffer.push(1, None).unwrap();
        buffer.cancel();
        assert_eq!(buffer.pop(None), Err(Error::Closed));
        assert!(buffer.is_empty());
    }

    #[test]
    fn full_buffer_blocks_producer() {
        let buffer = Arc::new(FrameBuffer::new(2));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..10 {
                    buffer.push(i, None).unwrap();
                }
                buffer.finish();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.len(), 2);

        let mut received = Vec::new();
        while let Some(item) = buffer.pop(None).unwrap() {
            assert!(buffer.len() <= 2);
            received.push(item);
        }
        producer.join().unwrap();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn closing_wakes_blocked_consumer() {
        let buffer = Arc::new(FrameBuffer::<u32>::new(2));
        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.pop(None))
        };
        thread::sleep(Duration::from_millis(20));
        buffer.cancel();
        assert_eq!(consumer.join().unwrap(), Err(Error::Closed));
    }
}

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

/// Callback used to wake an idle consumer.
pub type Wakeup = Arc<dyn Fn() + Send + Sync>;

/// A wakeup that does nothing, for consumers that poll on their own schedule.
pub fn noop_wakeup() -> Wakeup {
    Arc::new(|| {})
}

/// Wakeup backed by a [`tokio::sync::Notify`], for use with
/// [`OutboundQueue::recv_async`].
#[cfg(feature = "async")]
pub fn notify_wakeup(notify: Arc<tokio::sync::Notify>) -> Wakeup {
    Arc::new(move || notify.notify_one())
}

/// Bounded queue between message senders and one outbound lane.
///
/// `offer` never blocks: a full queue hands the item back. The consumer
/// marks itself idle when it drains the queue, and the first producer to
/// observe the idle flag clears it and invokes the wakeup, so the wakeup
/// fires at most once per idle period.
pub struct OutboundQueue<T> {
    queue: ArrayQueue<T>,
    consumer_idle: AtomicBool,
    wakeup: Wakeup,
    rejected: AtomicU64,
}

impl<T> OutboundQueue<T> {
    pub fn new(capacity: NonZeroUsize, wakeup: Wakeup) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.get()),
            consumer_idle: AtomicBool::new(false),
            wakeup,
            rejected: AtomicU64::new(0),
        }
    }

    /// Enqueue `item`, or return it if the queue is full.
    pub fn offer(&self, item: T) -> Result<(), T> {
        if let Err(item) = self.queue.push(item) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(item);
        }

        // Pairs with the fence in `poll` so that either the consumer sees the
        // item on its second poll or this producer sees the idle flag.
        fence(Ordering::SeqCst);
        if self
            .consumer_idle
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            (self.wakeup)();
        }
        Ok(())
    }

    /// Dequeue the next item.
    ///
    /// When the queue is empty the consumer is marked idle and the queue is
    /// polled once more, so an item that raced with the flag is not missed.
    pub fn poll(&self) -> Option<T> {
        if let Some(item) = self.queue.pop() {
            return Some(item);
        }

        self.consumer_idle.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        let item = self.queue.pop()?;
        self.consumer_idle.store(false, Ordering::Release);
        Some(item)
    }

    /// Wait for the next item. `notify` must be the one passed to
    /// [`notify_wakeup`] when this queue was built.
    #[cfg(feature = "async")]
    pub async fn recv_async(&self, notify: &tokio::sync::Notify) -> T {
        loop {
            if let Some(item) = self.poll() {
                return item;
            }
            notify.notified().await;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.consumer_idle.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of offers rejected because the queue was full.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl<T> fmt::Debug for OutboundQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("consumer_idle", &self.is_idle())
            .field("rejected", &self.rejected_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn counting_queue(capacity: usize) -> (OutboundQueue<u32>, Arc<AtomicUsize>) {
        let wakeups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakeups);
        let queue = OutboundQueue::new(
            NonZeroUsize::new(capacity).unwrap(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (queue, wakeups)
    }

    #[test]
    fn offer_on_full_queue_returns_item_without_blocking() {
        let (queue, _) = counting_queue(2);
        assert!(queue.offer(1).is_ok());
        assert!(queue.offer(2).is_ok());

        let started = Instant::now();
        assert_eq!(queue.offer(3), Err(3));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(queue.rejected_count(), 1);

        assert_eq!(queue.poll(), Some(1));
        assert!(queue.offer(4).is_ok());
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(4));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn wakeup_fires_once_per_idle_period() {
        let (queue, wakeups) = counting_queue(8);

        // Consumer not idle yet: no wakeup.
        queue.offer(1).unwrap();
        assert_eq!(wakeups.load(Ordering::SeqCst), 0);

        assert_eq!(queue.poll(), Some(1));
        assert_eq!(queue.poll(), None);
        assert!(queue.is_idle());

        queue.offer(2).unwrap();
        queue.offer(3).unwrap();
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);
        assert!(!queue.is_idle());

        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(3));
        assert_eq!(queue.poll(), None);
        queue.offer(4).unwrap();
        assert_eq!(wakeups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_producer_and_consumer_lose_nothing() {
        let (queue, _) = counting_queue(16);
        let queue = Arc::new(queue);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    let mut item = i;
                    while let Err(back) = queue.offer(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(10_000);
        while received.len() < 10_000 {
            match queue.poll() {
                Some(item) => received.push(item),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        assert!(received.iter().copied().eq(0..10_000));
    }

    #[test]
    fn debug_shows_occupancy() {
        let (queue, _) = counting_queue(4);
        queue.offer(1).unwrap();
        let rendered = format!("{queue:?}");
        assert!(rendered.contains("len: 1"));
        assert!(rendered.contains("capacity: 4"));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn recv_async_wakes_on_offer() {
        let notify = Arc::new(tokio::sync::Notify::new());
        let queue = Arc::new(OutboundQueue::new(
            NonZeroUsize::new(4).unwrap(),
            notify_wakeup(Arc::clone(&notify)),
        ));

        let consumer = {
            let queue = Arc::clone(&queue);
            let notify = Arc::clone(&notify);
            tokio::spawn(async move { queue.recv_async(&notify).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.offer(42).unwrap();

        let item = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, 42);
    }
}

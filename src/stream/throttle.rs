//! Stream throttling utilities

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per interval
    ///
    /// Uses "latest-wins" semantics - if multiple items arrive
    /// during an interval, only the latest is emitted. The first item
    /// passes through immediately.
    fn throttle(self, duration: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, duration)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<S::Item>,
        exhausted: bool,
    }
}

impl<S: Stream> Throttle<S> {
    /// Create a new throttled stream
    pub fn new(stream: S, duration: Duration) -> Self {
        let mut interval = interval(duration);
        // Don't burst after a quiet period
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, pending: None, exhausted: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything available, keeping only the latest
        while !*this.exhausted {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return if *this.exhausted { Poll::Ready(None) } else { Poll::Pending };
        }

        ready!(this.interval.poll_tick(cx));
        Poll::Ready(this.pending.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn keeps_latest_item_per_interval() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut throttled = UnboundedReceiverStream::new(rx).throttle(Duration::from_secs(1));

        tx.send(1).unwrap();
        assert_eq!(throttled.next().await, Some(1));

        tx.send(2).unwrap();
        tx.send(3).unwrap();
        let start = tokio::time::Instant::now();
        assert_eq!(throttled.next().await, Some(3));
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn ends_after_flushing_pending_item() {
        let throttled = futures::stream::iter(vec![1, 2, 3]).throttle(Duration::from_millis(10));
        let items: Vec<i32> = throttled.collect().await;
        assert_eq!(items, vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_quietly_for_new_items() {
        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let mut throttled = UnboundedReceiverStream::new(rx).throttle(Duration::from_millis(10));

        let next = tokio::time::timeout(Duration::from_secs(5), throttled.next()).await;
        assert!(next.is_err(), "an idle source must not end the stream");

        drop(tx);
        assert_eq!(throttled.next().await, None);
    }
}

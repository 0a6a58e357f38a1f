//! Bounded batching over a message stream.

use std::time::Duration;

use futures::{Stream, StreamExt as _};
use tokio::time::Instant;

/// Wait for the next message, then keep collecting until `max_size`
/// messages are in hand or `linger` has passed since the first one.
///
/// Returns `None` once the stream has ended and nothing was collected.
/// A `max_size` of zero behaves like one.
pub async fn collect_batch<S>(
    stream: &mut S,
    max_size: usize,
    linger: Duration,
) -> Option<Vec<S::Item>>
where
    S: Stream + Unpin,
{
    let first = stream.next().await?;
    let mut batch = Vec::with_capacity(max_size.clamp(1, 256));
    batch.push(first);

    let deadline = Instant::now()
        .checked_add(linger)
        .unwrap_or_else(Instant::now);

    while batch.len() < max_size {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Ok(Some(item)) = tokio::time::timeout(remaining, stream.next()).await else {
            break;
        };
        batch.push(item);
    }

    Some(batch)
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;
    use futures::stream;

    use super::*;

    const LINGER: Duration = Duration::from_millis(250);

    #[tokio::test]
    async fn splits_stream_into_bounded_batches() {
        let mut messages = stream::iter(0..10);

        assert_eq!(collect_batch(&mut messages, 4, LINGER).await, Some(vec![0, 1, 2, 3]));
        assert_eq!(collect_batch(&mut messages, 4, LINGER).await, Some(vec![4, 5, 6, 7]));
        assert_eq!(collect_batch(&mut messages, 4, LINGER).await, Some(vec![8, 9]));
        assert_eq!(collect_batch(&mut messages, 4, LINGER).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn linger_closes_a_partial_batch() {
        let (tx, mut rx) = mpsc::unbounded();
        assert!(tx.unbounded_send("a").is_ok());
        assert!(tx.unbounded_send("b").is_ok());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.unbounded_send("late");
        });

        let started = Instant::now();
        assert_eq!(collect_batch(&mut rx, 100, LINGER).await, Some(vec!["a", "b"]));
        assert!(started.elapsed() >= LINGER);

        assert_eq!(collect_batch(&mut rx, 100, LINGER).await, Some(vec!["late"]));
    }

    #[tokio::test]
    async fn zero_max_size_still_yields_one_message() {
        let mut messages = stream::iter([7, 8]);
        assert_eq!(collect_batch(&mut messages, 0, LINGER).await, Some(vec![7]));
    }
}

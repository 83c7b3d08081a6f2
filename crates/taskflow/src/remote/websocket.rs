//! WebSocket event channel with automatic reconnect.
//!
//! The subscription task owns the socket. It forwards decoded events to the
//! subscriber, announces connectivity changes as [`ChannelEvent::Connected`]
//! and [`ChannelEvent::Disconnected`], and after a drop waits an
//! exponentially growing delay before dialling again. It stops as soon as the
//! receiving side is dropped.

use super::{parse_event, ChannelEvent, CHANNEL_CAPACITY};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Exponential reconnect delay: doubles per failure, capped, reset on
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Starts at `initial`, never exceeds `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Spawns the subscription task for `url` and returns its receiver.
pub fn spawn_subscription(url: String, backoff: Backoff) -> mpsc::Receiver<ChannelEvent> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run_subscription(url, backoff, tx));
    rx
}

enum SessionEnd {
    Dropped(String),
    SubscriberGone,
}

async fn run_subscription(url: String, mut backoff: Backoff, tx: mpsc::Sender<ChannelEvent>) {
    // `Disconnected` is sent once per outage, not once per failed dial.
    let mut announced_down = false;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(%url, "Event channel connected");
                backoff.reset();
                if tx.send(ChannelEvent::Connected).await.is_err() {
                    return;
                }

                match pump_messages(stream, &tx).await {
                    SessionEnd::SubscriberGone => return,
                    SessionEnd::Dropped(reason) => {
                        warn!(%url, %reason, "Event channel dropped");
                        announced_down = true;
                        if tx.send(ChannelEvent::Disconnected { reason }).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "Event channel connect failed");
                if !announced_down {
                    announced_down = true;
                    let reason = e.to_string();
                    if tx.send(ChannelEvent::Disconnected { reason }).await.is_err() {
                        return;
                    }
                }
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis(), "Waiting before reconnect");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = tx.closed() => return,
        }
    }
}

async fn pump_messages<S>(mut stream: S, tx: &mpsc::Sender<ChannelEvent>) -> SessionEnd
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            () = tx.closed() => return SessionEnd::SubscriberGone,
        };

        match message {
            Some(Ok(Message::Text(text))) => match parse_event(text.as_str()) {
                Ok(Some(event)) => {
                    if tx.send(ChannelEvent::Event(event)).await.is_err() {
                        return SessionEnd::SubscriberGone;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Discarding malformed event"),
            },
            Some(Ok(Message::Close(_))) => {
                return SessionEnd::Dropped("closed by server".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
            None => return SessionEnd::Dropped("stream ended".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap_and_resets() {
        let mut backoff = Backoff::default();
        let delays: Vec<_> = (0..9).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(
            delays,
            [500, 1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn initial_above_max_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}

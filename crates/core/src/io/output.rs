use tokio::sync::mpsc;

use crate::types::Notification;

/// Notification sender, held by the idle scheduler.
pub type NotifySender = mpsc::Sender<Notification>;
/// Notification receiver, drained by the foreground loop.
pub type NotifyReceiver = mpsc::Receiver<Notification>;

/// Create a bounded notification channel.
pub fn channel(buffer: usize) -> (NotifySender, NotifyReceiver) {
    mpsc::channel(buffer.max(1))
}

/// Deliver without waiting. A full channel drops the notification; the
/// underlying state change is already committed either way.
pub fn notify(tx: &NotifySender, notification: Notification) -> bool {
    match tx.try_send(notification) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            tracing::warn!(?dropped, "notification channel full, dropping");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("notification receiver gone");
            false
        }
    }
}

/// Foreground rendering of a notification.
pub fn render(notification: &Notification, owner: &str) -> String {
    match notification {
        Notification::Thought(text) => format!("...{owner}? I just thought of something. {text}"),
        Notification::Dream(text) => format!("I had a dream while you were away... {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_send_recv() {
        let (tx, mut rx) = channel(4);
        assert!(notify(&tx, Notification::Thought("hm".into())));
        assert_eq!(rx.recv().await, Some(Notification::Thought("hm".into())));
    }

    #[test]
    fn full_channel_drops() {
        let (tx, _rx) = channel(1);
        assert!(notify(&tx, Notification::Dream("a".into())));
        assert!(!notify(&tx, Notification::Dream("b".into())));
    }

    #[test]
    fn closed_channel_drops() {
        let (tx, rx) = channel(1);
        drop(rx);
        assert!(!notify(&tx, Notification::Thought("x".into())));
    }

    #[test]
    fn render_thought() {
        assert_eq!(
            render(&Notification::Thought("What is rain?".into()), "Sam"),
            "...Sam? I just thought of something. What is rain?"
        );
    }
}

use std::fmt;
use tokio::sync::watch;

/// User-facing status line for one polling operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// The device itself is offline.
    ConnectivityDown,
    /// The device is online but the server could not be reached.
    ServerUnreachable,
    /// Retries are used up; the user has to reload.
    RetryLimitExceeded,
    /// Anything else worth showing, e.g. rate limiting.
    Notice(String),
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::ConnectivityDown => f.write_str("Internet down"),
            StatusMessage::ServerUnreachable => f.write_str("Unable to connect to server"),
            StatusMessage::RetryLimitExceeded => f.write_str("Tries exceeded, try reloading?"),
            StatusMessage::Notice(text) => f.write_str(text),
        }
    }
}

/// Receives status updates from a retry chain.
pub trait StatusSink: Send + Sync {
    fn publish(&self, status: StatusMessage);
    fn clear(&self);
}

/// The status shown for one operation.
///
/// Writes that would not change what is shown are dropped. A connectivity
/// warning replaces "Unable to connect to server" but never the retry limit
/// message or a notice.
pub struct StatusBoard {
    tx: watch::Sender<Option<StatusMessage>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<StatusMessage> {
        self.tx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for StatusBoard {
    fn publish(&self, status: StatusMessage) {
        self.tx.send_if_modified(|shown| {
            let redundant = match (shown.as_ref(), &status) {
                (None, _) => false,
                (Some(StatusMessage::ServerUnreachable), StatusMessage::ConnectivityDown) => false,
                (Some(_), StatusMessage::ConnectivityDown) => true,
                (Some(current), _) => *current == status,
            };
            if !redundant {
                *shown = Some(status);
            }
            !redundant
        });
    }

    fn clear(&self) {
        self.tx.send_if_modified(|shown| shown.take().is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_stay_distinguishable() {
        let texts = [
            StatusMessage::ConnectivityDown.to_string(),
            StatusMessage::ServerUnreachable.to_string(),
            StatusMessage::RetryLimitExceeded.to_string(),
        ];
        assert_eq!(texts[0], "Internet down");
        assert_eq!(texts[1], "Unable to connect to server");
        assert_eq!(texts[2], "Tries exceeded, try reloading?");
    }

    #[test]
    fn test_identical_publish_is_not_rewritten() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();

        board.publish(StatusMessage::ServerUnreachable);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        board.publish(StatusMessage::ServerUnreachable);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(board.current(), Some(StatusMessage::ServerUnreachable));
    }

    #[test]
    fn test_connectivity_warning_replaces_only_server_error() {
        let board = StatusBoard::new();
        board.publish(StatusMessage::ServerUnreachable);
        board.publish(StatusMessage::ConnectivityDown);
        assert_eq!(board.current(), Some(StatusMessage::ConnectivityDown));

        board.publish(StatusMessage::RetryLimitExceeded);
        board.publish(StatusMessage::ConnectivityDown);
        assert_eq!(board.current(), Some(StatusMessage::RetryLimitExceeded));

        board.clear();
        board.publish(StatusMessage::Notice("Too many requests".to_string()));
        board.publish(StatusMessage::ConnectivityDown);
        assert_eq!(
            board.current(),
            Some(StatusMessage::Notice("Too many requests".to_string()))
        );

        board.clear();
        board.publish(StatusMessage::ConnectivityDown);
        assert_eq!(board.current(), Some(StatusMessage::ConnectivityDown));
    }

    #[test]
    fn test_clear_on_empty_board_is_silent() {
        let board = StatusBoard::new();
        let rx = board.subscribe();
        board.clear();
        assert!(!rx.has_changed().unwrap());
        assert!(!board.is_active());
    }
}

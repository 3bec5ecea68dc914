//! Live transaction feed from the terminal gateway.

use crate::app::BackendEvent;
use crate::domain::{Record, value_to_key};
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("binary frame is not UTF-8")]
    Binary,
}

/// One attendance event, stored verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction(Record);

impl Transaction {
    pub fn from_message(text: &str) -> Result<Self, FeedError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(record) => Ok(Self(record)),
            _ => Err(FeedError::NotAnObject),
        }
    }

    pub fn record(&self) -> &Record {
        &self.0
    }

    pub fn user_id(&self) -> Option<String> {
        self.0.get("UserID").and_then(value_to_key)
    }

    pub fn is_invalid(&self) -> bool {
        is_invalid_record(&self.0)
    }

    pub fn time(&self) -> Option<&str> {
        self.0.get("Time").and_then(Value::as_str)
    }
}

/// Terminals report rejected punches with `IsInvalid` as a bool or 0/1.
pub fn is_invalid_record(record: &Record) -> bool {
    match record.get("IsInvalid") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

/// Bounded history of received transactions; the oldest entries are evicted.
#[derive(Debug, Clone)]
pub struct TransactionLog {
    entries: VecDeque<Transaction>,
    capacity: usize,
    evicted: u64,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl TransactionLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, transaction: Transaction) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(transaction);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Newest first.
    pub fn iter_latest(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter().rev()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Connecting,
    Connected,
    Closed,
    Failed(String),
}

impl FeedStatus {
    pub fn label(&self) -> String {
        match self {
            FeedStatus::Connecting => "connecting".to_string(),
            FeedStatus::Connected => "live".to_string(),
            FeedStatus::Closed => "closed".to_string(),
            FeedStatus::Failed(_) => "failed".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Status(FeedStatus),
    Transaction(Transaction),
    Rejected(String),
}

/// Reads the transaction socket until it closes. There is no reconnect; the
/// task ends on close, on error, or once the console stops listening.
pub async fn run_transaction_feed(url: String, event_tx: UnboundedSender<BackendEvent>) {
    let emit = |event: FeedEvent| event_tx.send(BackendEvent::Feed(event)).is_ok();

    if !emit(FeedEvent::Status(FeedStatus::Connecting)) {
        return;
    }
    let mut stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            warn!(%url, error = %err, "transaction feed connection failed");
            emit(FeedEvent::Status(FeedStatus::Failed(err.to_string())));
            return;
        }
    };
    info!(%url, "transaction feed connected");
    if !emit(FeedEvent::Status(FeedStatus::Connected)) {
        return;
    }

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("dropped binary transaction frame");
                    if !emit(FeedEvent::Rejected(FeedError::Binary.to_string())) {
                        return;
                    }
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "transaction feed close frame");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "transaction feed error");
                emit(FeedEvent::Status(FeedStatus::Failed(err.to_string())));
                return;
            }
        };

        let event = match Transaction::from_message(&text) {
            Ok(transaction) => FeedEvent::Transaction(transaction),
            Err(err) => {
                warn!(error = %err, "dropped transaction message");
                FeedEvent::Rejected(err.to_string())
            }
        };
        if !emit(event) {
            return;
        }
    }

    info!(%url, "transaction feed closed");
    emit(FeedEvent::Status(FeedStatus::Closed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    fn tx(user: u32) -> Transaction {
        Transaction::from_message(&format!(r#"{{"UserID":{user},"State":0}}"#)).expect("transaction")
    }

    #[test]
    fn only_json_objects_are_transactions() {
        assert!(matches!(
            Transaction::from_message("[1,2]"),
            Err(FeedError::NotAnObject)
        ));
        assert!(matches!(
            Transaction::from_message("hello"),
            Err(FeedError::Json(_))
        ));

        let parsed = Transaction::from_message(
            r#"{"UserID":"17","IsInvalid":1,"Time":"2024-05-02 08:00:00","Extra":true}"#,
        )
        .expect("object");
        assert_eq!(parsed.user_id().as_deref(), Some("17"));
        assert!(parsed.is_invalid());
        assert_eq!(parsed.time(), Some("2024-05-02 08:00:00"));
        assert_eq!(parsed.record().get("Extra"), Some(&Value::Bool(true)));
    }

    #[test]
    fn log_evicts_oldest_beyond_capacity() {
        let mut log = TransactionLog::with_capacity(3);
        for user in 1..=5 {
            log.push(tx(user));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
        let users: Vec<String> = log.iter_latest().filter_map(Transaction::user_id).collect();
        assert_eq!(users, vec!["5", "4", "3"]);
    }

    #[tokio::test]
    async fn feed_forwards_objects_and_rejects_the_rest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(socket).await.expect("handshake");
            for frame in [r#"{"UserID":1}"#, "not json", "[1]"] {
                ws.send(Message::Text(frame.to_string())).await.expect("send");
            }
            ws.close(None).await.expect("close");
        });

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        run_transaction_feed(format!("ws://{addr}/websocket"), event_tx).await;

        let mut seen = Vec::new();
        while let Ok(BackendEvent::Feed(event)) = event_rx.try_recv() {
            seen.push(match event {
                FeedEvent::Status(status) => status.label(),
                FeedEvent::Transaction(t) => format!("tx:{}", t.user_id().unwrap_or_default()),
                FeedEvent::Rejected(_) => "rejected".to_string(),
            });
        }
        assert_eq!(seen, vec![
            "connecting",
            "live",
            "tx:1",
            "rejected",
            "rejected",
            "closed"
        ]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_failure_without_retry() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        run_transaction_feed("ws://127.0.0.1:1/websocket".to_string(), event_tx).await;

        assert!(matches!(
            event_rx.try_recv(),
            Ok(BackendEvent::Feed(FeedEvent::Status(FeedStatus::Connecting)))
        ));
        assert!(matches!(
            event_rx.try_recv(),
            Ok(BackendEvent::Feed(FeedEvent::Status(FeedStatus::Failed(_))))
        ));
        assert!(event_rx.try_recv().is_err());
    }
}

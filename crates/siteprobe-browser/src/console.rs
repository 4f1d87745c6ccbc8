//! Bounded console capture scope.
//!
//! A capture is opened before a navigation, collects console messages in the
//! background, and is closed with [`ConsoleCapture::finish`]. The collector
//! task never outlives the capture.

use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Debug,
    Info,
    Warning,
    Error,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
}

impl ConsoleMessage {
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == ConsoleLevel::Error
    }
}

/// Open console capture. Holds at most `limit` messages.
pub struct ConsoleCapture {
    messages: Arc<Mutex<Vec<ConsoleMessage>>>,
    dropped: Arc<Mutex<usize>>,
    task: Option<JoinHandle<()>>,
}

impl ConsoleCapture {
    /// Start collecting from `stream` on a background task.
    pub fn spawn<S>(stream: S, limit: usize) -> Self
    where
        S: Stream<Item = ConsoleMessage> + Send + 'static,
    {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let dropped = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&messages);
        let overflow = Arc::clone(&dropped);

        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(message) = stream.next().await {
                let Ok(mut guard) = sink.lock() else { break };
                if guard.len() < limit {
                    guard.push(message);
                } else if let Ok(mut count) = overflow.lock() {
                    *count += 1;
                }
            }
        });

        Self {
            messages,
            dropped,
            task: Some(task),
        }
    }

    /// A closed capture holding `messages`. Used by in-process pages.
    pub fn from_messages(messages: Vec<ConsoleMessage>) -> Self {
        Self {
            messages: Arc::new(Mutex::new(messages)),
            dropped: Arc::new(Mutex::new(0)),
            task: None,
        }
    }

    /// Messages beyond the limit that were discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped.lock().map(|c| *c).unwrap_or(0)
    }

    /// Stop listening and return everything captured.
    pub fn finish(mut self) -> Vec<ConsoleMessage> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let dropped = self.dropped();
        if dropped > 0 {
            tracing::debug!("Console capture discarded {} messages over limit", dropped);
        }
        self.messages
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl Drop for ConsoleCapture {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

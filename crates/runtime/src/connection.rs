//! WebSocket CDP connection with request/response correlation.
//!
//! One connection per container. Commands get a unique id and a oneshot
//! channel; a reader task correlates inbound frames by id and hands events
//! (frames without an id) to tracing. Every send is bounded by a command
//! timeout so a wedged browser cannot block a session forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use grid_protocol::{CdpCommand, CdpMessage, CdpResponse};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::error::{Result, RuntimeError};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<CdpResponse>>>>;

pub struct CdpConnection {
	tx: mpsc::UnboundedSender<Message>,
	pending: PendingMap,
	next_id: AtomicU32,
	command_timeout: Duration,
	closed: Arc<AtomicBool>,
}

impl CdpConnection {
	/// Connects to a container's WebSocket debugger URL.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		Self::connect_with_timeout(ws_url, DEFAULT_COMMAND_TIMEOUT).await
	}

	pub async fn connect_with_timeout(ws_url: &str, command_timeout: Duration) -> Result<Self> {
		let (stream, _) = connect_async(ws_url)
			.await
			.map_err(|e| RuntimeError::Transport(format!("connect {ws_url}: {e}")))?;
		let (mut sink, mut source) = stream.split();

		let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
		tokio::spawn(async move {
			while let Some(message) = rx.recv().await {
				if sink.send(message).await.is_err() {
					break;
				}
			}
		});

		let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
		let closed = Arc::new(AtomicBool::new(false));
		let reader_pending = Arc::clone(&pending);
		let reader_closed = Arc::clone(&closed);
		tokio::spawn(async move {
			while let Some(frame) = source.next().await {
				match frame {
					Ok(Message::Text(text)) => dispatch_frame(&reader_pending, &text),
					Ok(Message::Close(_)) | Err(_) => break,
					Ok(_) => {}
				}
			}
			// Dropping the senders fails every pending oneshot, which
			// surfaces as ConnectionClosed to the callers.
			reader_closed.store(true, Ordering::SeqCst);
			reader_pending.lock().clear();
			debug!(target = "grid.cdp", "connection reader finished");
		});

		Ok(Self {
			tx,
			pending,
			next_id: AtomicU32::new(1),
			command_timeout,
			closed,
		})
	}

	/// Sends one command and awaits its correlated response.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(RuntimeError::ConnectionClosed);
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (done_tx, done_rx) = oneshot::channel();
		self.pending.lock().insert(id, done_tx);

		let command = CdpCommand::new(id, method, params);
		let payload = serde_json::to_string(&command).map_err(|e| RuntimeError::Transport(format!("serialize {method}: {e}")))?;
		trace!(target = "grid.cdp", id, method, "send");

		if self.tx.send(Message::Text(payload)).is_err() {
			self.pending.lock().remove(&id);
			return Err(RuntimeError::ConnectionClosed);
		}

		let response = match tokio::time::timeout(self.command_timeout, done_rx).await {
			Ok(Ok(response)) => response,
			Ok(Err(_)) => return Err(RuntimeError::ConnectionClosed),
			Err(_) => {
				self.pending.lock().remove(&id);
				return Err(RuntimeError::ResponseTimeout {
					method: method.to_string(),
					ms: self.command_timeout.as_millis() as u64,
				});
			}
		};

		if let Some(err) = response.error {
			return Err(RuntimeError::Cdp { code: err.code, message: err.message });
		}
		Ok(response.result.unwrap_or(Value::Null))
	}

	/// Requests a close of the underlying socket. Pending commands fail
	/// with `ConnectionClosed` once the reader observes the close.
	pub fn close(&self) {
		let _ = self.tx.send(Message::Close(None));
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
	}
}

fn dispatch_frame(pending: &PendingMap, text: &str) {
	match serde_json::from_str::<CdpMessage>(text) {
		Ok(CdpMessage::Response(response)) => {
			if let Some(sender) = pending.lock().remove(&response.id) {
				let _ = sender.send(response);
			} else {
				debug!(target = "grid.cdp", id = response.id, "response for unknown command id");
			}
		}
		Ok(CdpMessage::Event(event)) => {
			trace!(target = "grid.cdp", method = %event.method, "event");
		}
		Err(err) => {
			debug!(target = "grid.cdp", error = %err, "unparseable frame");
		}
	}
}

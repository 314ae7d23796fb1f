//! One in-flight chat stream: callbacks, cancellation and the read loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_core::{ChatRequest, StreamEvent};
use futures::StreamExt;
use reqwest::Client;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::decoder::{Decoded, EventDecoder};
use crate::error::StreamError;

/// Receives the outcome of one stream.
///
/// For a given stream, `on_event` is called once per decoded event in
/// arrival order, followed by at most one of `on_complete` or `on_error`.
/// Nothing is called once [`StreamHandle::cancel`] has returned, and
/// `cancel` waits for a callback that is already running. A handler must
/// therefore not cancel its own stream from inside a callback.
pub trait StreamHandler: Send + 'static {
    fn on_event(&mut self, event: StreamEvent);

    fn on_error(&mut self, error: StreamError);

    fn on_complete(&mut self);
}

#[derive(Debug, Default)]
struct HandleState {
    cancelled: AtomicBool,
    finished: AtomicBool,
    /// Held across a flag check and the callback it allows, and by cancel.
    gate: Mutex<()>,
}

impl HandleState {
    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        // Guards no data, so poisoning is harmless.
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.finished.load(Ordering::SeqCst)
    }

    /// Move to the finished state. Returns false if the stream was already
    /// cancelled or finished.
    fn finish(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        !self.finished.swap(true, Ordering::SeqCst)
    }
}

/// Cancellation handle returned by [`ChatClient::open`](crate::ChatClient::open).
///
/// Clones share the same stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    state: Arc<HandleState>,
    task: AbortHandle,
}

impl StreamHandle {
    /// Abort the stream.
    ///
    /// Silent: neither `on_error` nor `on_complete` fires. Calling this on a
    /// cancelled or finished stream does nothing. Returns whether this call
    /// cancelled a live stream.
    pub fn cancel(&self) -> bool {
        let _gate = self.state.lock_gate();
        if self.state.finished.load(Ordering::SeqCst) {
            return false;
        }
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.task.abort();
        info!("Chat stream cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the stream reached completion or failed.
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }
}

/// Guards handler invocation with the handle state.
struct Dispatcher<H> {
    handler: H,
    state: Arc<HandleState>,
}

impl<H: StreamHandler> Dispatcher<H> {
    /// Deliver one event. Returns false once the stream is closed.
    fn event(&mut self, event: StreamEvent) -> bool {
        let _gate = self.state.lock_gate();
        if self.state.is_closed() {
            return false;
        }
        debug!(kind = ?event.kind, "Dispatching stream event");
        self.handler.on_event(event);
        true
    }

    fn complete(&mut self) {
        let _gate = self.state.lock_gate();
        if self.state.finish() {
            info!("Chat stream complete");
            self.handler.on_complete();
        }
    }

    fn error(&mut self, error: StreamError) {
        let _gate = self.state.lock_gate();
        if self.state.finish() {
            error!("Chat stream error: {}", error);
            self.handler.on_error(error);
        }
    }
}

/// Spawn the read loop for one request on the current runtime.
pub(crate) fn spawn<H: StreamHandler>(
    http: Client,
    url: String,
    request: ChatRequest,
    handler: H,
) -> StreamHandle {
    let state = Arc::new(HandleState::default());
    let dispatcher = Dispatcher {
        handler,
        state: state.clone(),
    };

    let task = tokio::spawn(run(http, url, request, dispatcher));

    StreamHandle {
        state,
        task: task.abort_handle(),
    }
}

async fn run<H: StreamHandler>(
    http: Client,
    url: String,
    request: ChatRequest,
    mut dispatcher: Dispatcher<H>,
) {
    info!(thread_id = %request.thread_id, "Opening chat stream to {}", url);

    let response = match http.post(&url).json(&request).send().await {
        Ok(response) => response,
        Err(e) => {
            dispatcher.error(StreamError::Http(e));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        dispatcher.error(StreamError::Status {
            status: status.as_u16(),
            body,
        });
        return;
    }

    let mut decoder = EventDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                dispatcher.error(StreamError::Body(e.to_string()));
                return;
            }
        };

        if !deliver(&mut dispatcher, decoder.feed(&chunk)) {
            return;
        }
    }

    debug!("Chat stream transport ended");
    if deliver(&mut dispatcher, decoder.finish()) {
        dispatcher.complete();
    }
}

/// Hand decoded items to the dispatcher. Returns false when the stream is
/// over, either through the sentinel or because it was closed.
fn deliver<H: StreamHandler>(dispatcher: &mut Dispatcher<H>, items: Vec<Decoded>) -> bool {
    for item in items {
        match item {
            Decoded::Event(event) => {
                if !dispatcher.event(event) {
                    return false;
                }
            }
            Decoded::Done => {
                dispatcher.complete();
                return false;
            }
        }
    }
    true
}

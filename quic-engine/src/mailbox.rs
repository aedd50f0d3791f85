// SPDX-License-Identifier: Apache-2.0

//! The single-slot actor mailbox that serializes access to one cooperative
//! task's state, §5's "one cooperative task per connection owns its entire
//! state" model. Used by both the connection loop and the endpoint's
//! deferred-update consumer.
//!
//! A bounded `futures-channel::mpsc::channel(1)` gives the "producers that
//! find the slot busy fall back to an unbuffered send that blocks until the
//! loop drains the prior message" behavior for free: sending on a full
//! bounded channel is a future that resolves once a slot opens, rather than
//! an immediate error. A `oneshot` completion channel rides along with each
//! [`Message::Call`] so the caller can await the thunk's result; once the
//! owning task drops its [`Inbox`], every pending and future send resolves
//! to [`Closed`], which is exactly the "done" shutdown behavior §5 asks for.

use alloc::boxed::Box;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures_channel::{mpsc, oneshot};
use futures_core::Stream;
use futures_util::SinkExt;

/// One event queued for the owning task: either a no-op nudge (used to make
/// the loop re-evaluate its next timeout without any state change) or a
/// thunk to run against the owned state, serializing an otherwise-external
/// call onto the loop.
pub enum Message<T> {
    Wake,
    Call(Box<dyn FnOnce(&mut T) + Send>),
}

/// The loop has shut down; the caller's request was never applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Closed;

impl core::fmt::Display for Closed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("connection loop has shut down")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Closed {}

/// The producer side: cloneable, handed out to every public API caller.
pub struct Mailbox<T> {
    sender: mpsc::Sender<Message<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// The consumer side: owned exclusively by the task driving `T`.
pub struct Inbox<T> {
    receiver: mpsc::Receiver<Message<T>>,
}

/// Opens a single-slot mailbox for state of type `T`.
pub fn channel<T>() -> (Mailbox<T>, Inbox<T>) {
    let (sender, receiver) = mpsc::channel(1);
    (Mailbox { sender }, Inbox { receiver })
}

impl<T> Mailbox<T> {
    /// Nudges the loop without changing its state, e.g. to make it
    /// re-evaluate `nextTimeout` after an external event it can't see
    /// directly (a new packet for the endpoint to hand off, an expired
    /// application-level deadline).
    pub async fn wake(&mut self) -> Result<(), Closed> {
        self.sender.send(Message::Wake).await.map_err(|_| Closed)
    }

    /// Serializes `f(&mut T)` onto the owning task and returns its result,
    /// the mechanism every blocking public API call (`NewStream`, `Read`,
    /// `Write`, `Close`, ...) is built on.
    pub async fn call<F, R>(&mut self, f: F) -> Result<R, Closed>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        T: 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let thunk: Box<dyn FnOnce(&mut T) + Send> = Box::new(move |state| {
            let _ = reply_tx.send(f(state));
        });
        self.sender
            .send(Message::Call(thunk))
            .await
            .map_err(|_| Closed)?;
        reply_rx.await.map_err(|_| Closed)
    }
}

impl<T> Inbox<T> {
    /// Polls for the next queued message, for use inside a hand-rolled
    /// `select` over the mailbox and a connection-specific timer (see
    /// `connection::EventLoop::wait_for_event`).
    pub fn poll_next_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<Message<T>>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }

    /// Applies a dequeued message to the owned state.
    pub fn dispatch(message: Message<T>, state: &mut T) {
        match message {
            Message::Wake => {}
            Message::Call(thunk) => thunk(state),
        }
    }
}

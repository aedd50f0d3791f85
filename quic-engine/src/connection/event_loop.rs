// SPDX-License-Identifier: Apache-2.0

//! The per-connection cooperative task, §4.10 / §5: owns a [`Connection`]
//! exclusively, attempts `maybeSend` every iteration, and blocks on whichever
//! comes first of the mailbox or the connection's own `nextTimeout`.
//!
//! Building/encrypting outbound datagrams and sleeping until a deadline are
//! both external contracts: [`Transmit`] is the seam a concrete packet-
//! building pipeline plugs into, and [`Timer`] is the seam a concrete async
//! runtime plugs into, so this crate never hard-depends on tokio/async-std
//! or a particular AEAD/TLS stack.

use super::{Connection, LifetimeState};
use crate::key_schedule::{KeyPair, OneRttKeyPair};
use crate::mailbox::{self, Inbox, Mailbox, Message};
use core::future::{poll_fn, Future};
use core::pin::Pin;
use core::task::Poll;
use quic_core::{recovery::CongestionController, time::Timestamp};

/// Wall-clock access and a way to wait until a deadline.
pub trait Timer {
    type Sleep: Future<Output = ()> + Unpin;

    fn now(&self) -> Timestamp;
    fn sleep_until(&self, deadline: Timestamp) -> Self::Sleep;
}

/// Attempts to put as much as is currently permitted onto the wire.
/// Building, framing, and encrypting the datagram are the implementor's job;
/// the event loop only needs to know when to retry a send that was blocked
/// (by pacing, the congestion window, or anti-amplification).
pub trait Transmit<C, I, H, A>
where
    C: CongestionController,
    I: KeyPair,
    H: KeyPair,
    A: OneRttKeyPair,
{
    fn maybe_send(
        &mut self,
        conn: &mut Connection<C, I, H, A>,
        now: Timestamp,
    ) -> Option<Timestamp>;
}

enum Woken<T> {
    Message(Option<Message<T>>),
    TimedOut,
}

/// Binds a [`Connection`] to its mailbox, a [`Transmit`] pipeline, and a
/// [`Timer`], implementing §4.10's four-step iteration.
pub struct EventLoop<C, I, H, A, X, T>
where
    C: CongestionController,
    I: KeyPair,
    H: KeyPair,
    A: OneRttKeyPair,
    X: Transmit<C, I, H, A>,
    T: Timer,
{
    conn: Connection<C, I, H, A>,
    inbox: Inbox<Connection<C, I, H, A>>,
    transmit: X,
    timer: T,
}

impl<C, I, H, A, X, T> EventLoop<C, I, H, A, X, T>
where
    C: CongestionController,
    I: KeyPair + 'static,
    H: KeyPair + 'static,
    A: OneRttKeyPair + 'static,
    X: Transmit<C, I, H, A>,
    T: Timer,
{
    /// Spawns a fresh mailbox for `conn` and returns the loop alongside the
    /// [`Mailbox`] handle every public API caller gets a clone of.
    pub fn new(
        conn: Connection<C, I, H, A>,
        transmit: X,
        timer: T,
    ) -> (Self, Mailbox<Connection<C, I, H, A>>) {
        let (mailbox, inbox) = mailbox::channel();
        (
            Self {
                conn,
                inbox,
                transmit,
                timer,
            },
            mailbox,
        )
    }

    /// Runs until the connection reaches [`LifetimeState::Done`] or every
    /// [`Mailbox`] clone has been dropped, whichever comes first.
    pub async fn run(mut self) {
        loop {
            let now = self.timer.now();
            let send_timeout = self.transmit.maybe_send(&mut self.conn, now);

            if self.conn.state() == LifetimeState::Done {
                return;
            }

            let deadline = self.conn.next_timeout(send_timeout);
            let mut sleep = deadline.map(|d| self.timer.sleep_until(d));

            let woken = poll_fn(|cx| {
                if let Poll::Ready(message) = self.inbox.poll_next_message(cx) {
                    return Poll::Ready(Woken::Message(message));
                }
                if let Some(sleep) = sleep.as_mut() {
                    if Pin::new(sleep).poll(cx).is_ready() {
                        return Poll::Ready(Woken::TimedOut);
                    }
                }
                Poll::Pending
            })
            .await;

            match woken {
                Woken::Message(None) => return,
                Woken::Message(Some(message)) => {
                    Inbox::dispatch(message, &mut self.conn);
                }
                Woken::TimedOut => {}
            }

            let now = self.timer.now();
            self.conn.advance_time(now);
        }
    }
}

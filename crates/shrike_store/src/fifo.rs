//! Per-store FIFO admission: the token source/sink pair.
//!
//! `new_read_token`/`new_write_token` reserve a ticket immediately, which
//! fixes the operation's place in the issue order; the caller presents
//! the token later and blocks until admitted. Admission follows ticket
//! order strictly: reads overlap other admitted reads, a write waits for
//! every earlier ticket to exit and blocks everything behind it until it
//! exits. Dropping an un-admitted token cancels its ticket so successors
//! are not stranded.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use shrike_common::error::StoreError;
use shrike_common::order::OrderToken;
use shrike_common::Interruptor;

/// Backstop interval for the admission wait; the interruptor also wakes
/// waiters through the registered condvar.
const WAIT_BACKSTOP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketStatus {
    Waiting,
    Admitted,
}

#[derive(Debug)]
struct Ticket {
    serial: u64,
    kind: TicketKind,
    status: TicketStatus,
}

#[derive(Debug, Default)]
struct FifoState {
    next_serial: u64,
    /// Live tickets in serial order; admitted tickets stay until exit,
    /// cancelled tickets are removed eagerly.
    queue: VecDeque<Ticket>,
}

impl FifoState {
    /// A ticket may be admitted when everything ahead of it is an
    /// admitted read — and, for a write, when nothing is ahead at all.
    fn admissible(&self, serial: u64, kind: TicketKind) -> bool {
        for ticket in &self.queue {
            if ticket.serial == serial {
                return true;
            }
            match kind {
                TicketKind::Write => return false,
                TicketKind::Read => {
                    if !(ticket.kind == TicketKind::Read
                        && ticket.status == TicketStatus::Admitted)
                    {
                        return false;
                    }
                }
            }
        }
        false
    }

    fn position(&self, serial: u64) -> Option<usize> {
        self.queue.iter().position(|t| t.serial == serial)
    }
}

/// The shared ticket dispenser and admission gate for one store.
pub struct TokenFifo {
    state: Mutex<FifoState>,
    cond: Arc<Condvar>,
}

impl TokenFifo {
    pub fn new() -> Arc<TokenFifo> {
        Arc::new(TokenFifo {
            state: Mutex::new(FifoState::default()),
            cond: Arc::new(Condvar::new()),
        })
    }

    fn reserve(self: &Arc<Self>, kind: TicketKind) -> u64 {
        let mut state = self.state.lock();
        let serial = state.next_serial;
        state.next_serial += 1;
        state.queue.push_back(Ticket {
            serial,
            kind,
            status: TicketStatus::Waiting,
        });
        serial
    }

    pub fn new_read_token(self: &Arc<Self>, order: OrderToken) -> ReadToken {
        ReadToken {
            inner: Token {
                fifo: self.clone(),
                serial: self.reserve(TicketKind::Read),
                order,
                consumed: false,
            },
        }
    }

    pub fn new_write_token(self: &Arc<Self>, order: OrderToken) -> WriteToken {
        WriteToken {
            inner: Token {
                fifo: self.clone(),
                serial: self.reserve(TicketKind::Write),
                order,
                consumed: false,
            },
        }
    }

    fn await_admission(
        &self,
        serial: u64,
        kind: TicketKind,
        interruptor: &Interruptor,
    ) -> Result<(), StoreError> {
        interruptor.register_waker(&self.cond);
        let mut state = self.state.lock();
        loop {
            if interruptor.is_fired() {
                // Withdraw the ticket so successors are not stranded.
                if let Some(pos) = state.position(serial) {
                    state.queue.remove(pos);
                }
                self.cond.notify_all();
                return Err(StoreError::Interrupted);
            }
            if state.admissible(serial, kind) {
                let pos = state
                    .position(serial)
                    .expect("admissible ticket must be queued");
                state.queue[pos].status = TicketStatus::Admitted;
                // Later reads may now be admissible too.
                self.cond.notify_all();
                return Ok(());
            }
            self.cond.wait_for(&mut state, WAIT_BACKSTOP);
        }
    }

    fn exit(&self, serial: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.position(serial) {
            state.queue.remove(pos);
        }
        self.cond.notify_all();
    }

    fn cancel(&self, serial: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.position(serial) {
            debug_assert_eq!(state.queue[pos].status, TicketStatus::Waiting);
            state.queue.remove(pos);
        }
        self.cond.notify_all();
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

struct Token {
    fifo: Arc<TokenFifo>,
    serial: u64,
    order: OrderToken,
    consumed: bool,
}

impl Token {
    fn await_admission(mut self, kind: TicketKind, interruptor: &Interruptor) -> Result<AdmissionGuard, StoreError> {
        // The fifo removes the ticket itself on interruption; either way
        // this token no longer owns it.
        self.consumed = true;
        self.fifo.await_admission(self.serial, kind, interruptor)?;
        Ok(AdmissionGuard {
            fifo: self.fifo.clone(),
            serial: self.serial,
        })
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        if !self.consumed {
            self.fifo.cancel(self.serial);
        }
    }
}

/// A reserved place in the issue order for a shared-access operation.
/// Present it to superblock acquisition to await admission.
pub struct ReadToken {
    inner: Token,
}

impl ReadToken {
    pub fn order_token(&self) -> OrderToken {
        self.inner.order
    }

    pub(crate) fn await_admission(self, interruptor: &Interruptor) -> Result<AdmissionGuard, StoreError> {
        self.inner.await_admission(TicketKind::Read, interruptor)
    }
}

/// A reserved place in the issue order for an exclusive-access operation.
pub struct WriteToken {
    inner: Token,
}

impl WriteToken {
    pub fn order_token(&self) -> OrderToken {
        self.inner.order
    }

    pub(crate) fn await_admission(self, interruptor: &Interruptor) -> Result<AdmissionGuard, StoreError> {
        self.inner.await_admission(TicketKind::Write, interruptor)
    }
}

/// RAII admission: dropping it exits the ticket and unblocks successors.
pub struct AdmissionGuard {
    fifo: Arc<TokenFifo>,
    serial: u64,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.fifo.exit(self.serial);
    }
}

//! In-process mailbox broker
//!
//! The broker owns the table of live mailboxes. A `Mailbox` created through
//! the broker owns its queue and removes it on drop; one opened by key only
//! borrows it. Removing a queue wakes every waiting receiver with
//! `MailboxError::Removed`.
//!
//! A full queue either rejects the send (`send_to`) or parks the sender
//! until a receive frees a slot (`send_when_ready`), the way a blocking
//! `msgsnd` does.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::{MailboxError, MailboxKey, MailboxLimits, Message, QueueHandle, QueueProbe};

struct QueueState {
    messages: VecDeque<Message>,
    removed: bool,
}

struct Queue {
    handle: QueueHandle,
    state: Mutex<QueueState>,
    /// Signalled when a message arrives or the queue is removed
    arrived: Notify,
    /// Signalled when a message leaves or the queue is removed
    drained: Notify,
}

impl Queue {
    fn new(handle: QueueHandle) -> Self {
        Self {
            handle,
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                removed: false,
            }),
            arrived: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, message: Message, limits: &MailboxLimits) -> Result<(), MailboxError> {
        if message.tag <= 0 {
            return Err(MailboxError::InvalidTag(message.tag));
        }
        if message.payload.len() > limits.max_message_size {
            return Err(MailboxError::TooLarge {
                size: message.payload.len(),
                limit: limits.max_message_size,
            });
        }

        {
            let mut state = self.lock();
            if state.removed {
                return Err(MailboxError::Unknown(self.handle));
            }
            if state.messages.len() >= limits.max_messages {
                return Err(MailboxError::Full {
                    handle: self.handle,
                    capacity: limits.max_messages,
                });
            }
            state.messages.push_back(message);
        }

        self.arrived.notify_waiters();
        Ok(())
    }

    /// Take the first message matching `selector`, if any
    fn take(&self, max_len: usize, selector: i64) -> Result<Option<Message>, MailboxError> {
        let taken = {
            let mut state = self.lock();
            if state.removed {
                return Err(MailboxError::Removed(self.handle));
            }

            let Some(index) = select_index(&state.messages, selector) else {
                return Ok(None);
            };

            let size = state.messages[index].payload.len();
            if size > max_len {
                return Err(MailboxError::MessageTooLong { size, max_len });
            }
            state.messages.remove(index)
        };

        self.drained.notify_waiters();
        Ok(taken)
    }

    fn mark_removed(&self) {
        {
            let mut state = self.lock();
            state.removed = true;
            state.messages.clear();
        }
        self.arrived.notify_waiters();
        self.drained.notify_waiters();
    }

    fn pending(&self) -> usize {
        self.lock().messages.len()
    }
}

/// Index of the message a receive with `selector` would return
///
/// `0` picks the oldest message, a positive selector the oldest message with
/// exactly that tag, and a negative selector the oldest message among those
/// with the lowest tag not above its magnitude.
fn select_index(messages: &VecDeque<Message>, selector: i64) -> Option<usize> {
    match selector {
        0 => (!messages.is_empty()).then_some(0),
        tag if tag > 0 => messages.iter().position(|m| m.tag == tag),
        negative => {
            let ceiling = negative.unsigned_abs();
            messages
                .iter()
                .enumerate()
                .filter(|(_, m)| m.tag.unsigned_abs() <= ceiling)
                .min_by_key(|(index, m)| (m.tag, *index))
                .map(|(index, _)| index)
        }
    }
}

#[derive(Default)]
struct Table {
    by_handle: HashMap<QueueHandle, Arc<Queue>>,
    by_key: HashMap<u32, QueueHandle>,
}

struct BrokerInner {
    limits: MailboxLimits,
    next_handle: AtomicU32,
    table: Mutex<Table>,
}

/// Table of live mailboxes shared by every task of the daemon
#[derive(Clone)]
pub struct MailboxBroker {
    inner: Arc<BrokerInner>,
}

impl MailboxBroker {
    pub fn new(limits: MailboxLimits) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                limits,
                next_handle: AtomicU32::new(1),
                table: Mutex::new(Table::default()),
            }),
        }
    }

    pub fn limits(&self) -> MailboxLimits {
        self.inner.limits
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.inner.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_handle(&self) -> Result<QueueHandle, MailboxError> {
        let raw = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        if raw == u32::MAX {
            return Err(MailboxError::Exhausted);
        }
        Ok(QueueHandle::new(raw))
    }

    /// Create a mailbox, or open the existing one for a named key
    pub fn create(&self, key: MailboxKey) -> Result<Mailbox, MailboxError> {
        let mut table = self.table();

        if let MailboxKey::Named(k) = key {
            if let Some(handle) = table.by_key.get(&k).copied() {
                if let Some(queue) = table.by_handle.get(&handle) {
                    debug!("Opened existing mailbox {} for key {:#x}", handle, k);
                    return Ok(Mailbox {
                        queue: queue.clone(),
                        broker: self.clone(),
                        owner: false,
                    });
                }
            }
        }

        let handle = self.allocate_handle()?;
        let queue = Arc::new(Queue::new(handle));
        table.by_handle.insert(handle, queue.clone());
        if let MailboxKey::Named(k) = key {
            table.by_key.insert(k, handle);
        }
        debug!("Created mailbox {} ({:?})", handle, key);

        Ok(Mailbox {
            queue,
            broker: self.clone(),
            owner: true,
        })
    }

    /// Open an existing mailbox by handle without taking ownership
    pub fn open(&self, handle: QueueHandle) -> Result<Mailbox, MailboxError> {
        let table = self.table();
        let queue = table
            .by_handle
            .get(&handle)
            .cloned()
            .ok_or(MailboxError::Unknown(handle))?;
        Ok(Mailbox {
            queue,
            broker: self.clone(),
            owner: false,
        })
    }

    fn queue(&self, handle: QueueHandle) -> Result<Arc<Queue>, MailboxError> {
        self.table()
            .by_handle
            .get(&handle)
            .cloned()
            .ok_or(MailboxError::Unknown(handle))
    }

    /// Enqueue a message on the mailbox named by `handle`
    pub fn send_to(&self, handle: QueueHandle, payload: &[u8], tag: i64) -> Result<(), MailboxError> {
        self.queue(handle)?
            .push(Message::new(tag, payload), &self.inner.limits)?;
        trace!("Sent {} bytes to mailbox {} (tag {})", payload.len(), handle, tag);
        Ok(())
    }

    /// Enqueue a message, waiting while the mailbox is full
    ///
    /// Fails with `Unknown` if the mailbox is removed while waiting.
    pub async fn send_when_ready(
        &self,
        handle: QueueHandle,
        payload: &[u8],
        tag: i64,
    ) -> Result<(), MailboxError> {
        let queue = self.queue(handle)?;
        loop {
            let drained = queue.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            match queue.push(Message::new(tag, payload), &self.inner.limits) {
                Err(MailboxError::Full { .. }) => {
                    trace!("Mailbox {} is full, waiting for room", handle);
                    drained.await;
                }
                Ok(()) => {
                    trace!("Sent {} bytes to mailbox {} (tag {})", payload.len(), handle, tag);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a mailbox, aborting any receive waiting on it
    pub fn remove(&self, handle: QueueHandle) -> bool {
        let queue = {
            let mut table = self.table();
            let queue = table.by_handle.remove(&handle);
            table.by_key.retain(|_, h| *h != handle);
            queue
        };

        match queue {
            Some(queue) => {
                queue.mark_removed();
                debug!("Removed mailbox {}", handle);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: QueueHandle) -> bool {
        self.table().by_handle.contains_key(&handle)
    }
}

impl Default for MailboxBroker {
    fn default() -> Self {
        Self::new(MailboxLimits::default())
    }
}

impl QueueProbe for MailboxBroker {
    fn is_live(&self, handle: QueueHandle) -> bool {
        self.contains(handle)
    }
}

/// One mailbox of a broker
pub struct Mailbox {
    queue: Arc<Queue>,
    broker: MailboxBroker,
    owner: bool,
}

impl Mailbox {
    pub fn handle(&self) -> QueueHandle {
        self.queue.handle
    }

    /// Number of queued messages
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn send(&self, payload: &[u8], tag: i64) -> Result<(), MailboxError> {
        self.queue
            .push(Message::new(tag, payload), &self.broker.inner.limits)
    }

    /// Wait for the next message matching `selector`
    pub async fn receive(&self, max_len: usize, selector: i64) -> Result<Message, MailboxError> {
        loop {
            let notified = self.queue.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.queue.take(max_len, selector)? {
                return Ok(message);
            }

            notified.await;
        }
    }

    /// Take the next matching message without waiting
    pub fn try_receive(&self, max_len: usize, selector: i64) -> Result<Option<Message>, MailboxError> {
        self.queue.take(max_len, selector)
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        if self.owner {
            self.broker.remove(self.queue.handle);
        }
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("handle", &self.queue.handle)
            .field("owner", &self.owner)
            .finish()
    }
}

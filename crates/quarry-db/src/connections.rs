//! The per-thread connection registry.
//!
//! One thread owns the canonical connection: the one that configured the
//! [`Orm`](crate::orm::Orm). Any other thread asking for a connection gets a
//! lazily-created, dialect-identical clone from the channel factory, keyed
//! by its [`ThreadId`] under a mutex. A thread-local guard deregisters and
//! closes the clone when its thread terminates, so the table never
//! accumulates entries for dead threads.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use quarry_core::{QuarryError, QuarryResult};

use crate::channel::{ChannelFactory, ExecutionChannel};
use crate::dialect::Dialect;

/// A shareable handle to one channel. The mutex serializes statement
/// execution; in practice each handle is only ever used by its own thread.
pub(crate) type ChannelHandle = Arc<Mutex<Box<dyn ExecutionChannel>>>;

struct RegistryShared {
    owner: ThreadId,
    factory: Box<dyn ChannelFactory>,
    main: ChannelHandle,
    clones: Mutex<HashMap<ThreadId, ChannelHandle>>,
    dialect: Dialect,
}

/// Hands out the canonical connection on the owner thread and per-thread
/// clones everywhere else.
pub(crate) struct ConnectionRegistry {
    shared: Arc<RegistryShared>,
}

thread_local! {
    static CLONE_GUARDS: RefCell<Vec<CloneGuard>> = const { RefCell::new(Vec::new()) };
}

/// Dropped by the thread-local destructor when a worker thread exits;
/// removes (and thereby closes) that thread's clone.
struct CloneGuard {
    registry: Weak<RegistryShared>,
    thread: ThreadId,
}

impl Drop for CloneGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            let mut clones = shared.clones.lock().unwrap_or_else(PoisonError::into_inner);
            clones.remove(&self.thread);
        }
    }
}

impl ConnectionRegistry {
    /// Opens the canonical connection on the calling thread, which becomes
    /// the owner.
    pub(crate) fn new(factory: Box<dyn ChannelFactory>) -> QuarryResult<Self> {
        let channel = factory.open()?;
        let dialect = channel.dialect();
        Ok(Self {
            shared: Arc::new(RegistryShared {
                owner: thread::current().id(),
                factory,
                main: Arc::new(Mutex::new(channel)),
                clones: Mutex::new(HashMap::new()),
                dialect,
            }),
        })
    }

    /// The dialect of the canonical connection (clones are verified to
    /// match).
    pub(crate) fn dialect(&self) -> Dialect {
        self.shared.dialect
    }

    /// Returns the channel for the calling thread, creating a clone on
    /// first use from a non-owner thread.
    pub(crate) fn acquire(&self) -> QuarryResult<ChannelHandle> {
        let thread = thread::current().id();
        if thread == self.shared.owner {
            return Ok(self.shared.main.clone());
        }

        let mut clones = self
            .shared
            .clones
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = clones.get(&thread) {
            return Ok(handle.clone());
        }

        let channel = self.shared.factory.open()?;
        if channel.dialect() != self.shared.dialect {
            return Err(QuarryError::Configuration(format!(
                "cloned connection reported dialect {:?}, expected {:?}",
                channel.dialect(),
                self.shared.dialect
            )));
        }
        let handle: ChannelHandle = Arc::new(Mutex::new(channel));
        clones.insert(thread, handle.clone());
        drop(clones);

        CLONE_GUARDS.with(|guards| {
            guards.borrow_mut().push(CloneGuard {
                registry: Arc::downgrade(&self.shared),
                thread,
            });
        });
        Ok(handle)
    }

    /// Number of live per-thread clones (the owner connection not counted).
    pub(crate) fn clone_count(&self) -> usize {
        self.shared
            .clones
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

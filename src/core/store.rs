use tracing::{debug, info, warn};

use crate::core::message::Message;
use crate::core::persist::{
    read_snapshot, write_active, write_threads, KeyValueStore, PersistError, THREADS_KEY,
};
use crate::core::thread::{Thread, ThreadId};

/// Ordered threads plus the active pointer, mirrored to a key-value store
/// after every mutation.
///
/// Once loaded the store always holds at least one thread and the active
/// pointer always names one of them.
pub struct ThreadStore {
    threads: Vec<Thread>,
    active: Option<ThreadId>,
    backend: Box<dyn KeyValueStore>,
    clock: fn() -> u64,
    /// Highest id ever handed out, including deleted threads.
    last_allocated: Option<ThreadId>,
    /// Active pointer as last written to the backend.
    saved_active: Option<Option<ThreadId>>,
    persist_error: Option<String>,
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl ThreadStore {
    /// Restore from `backend`, or start with one empty thread when there is
    /// no usable prior state.
    pub fn load(backend: Box<dyn KeyValueStore>) -> Self {
        Self::load_with_clock(backend, now_millis)
    }

    pub(crate) fn load_with_clock(backend: Box<dyn KeyValueStore>, clock: fn() -> u64) -> Self {
        let mut store = Self {
            threads: Vec::new(),
            active: None,
            backend,
            clock,
            last_allocated: None,
            saved_active: None,
            persist_error: None,
        };

        match read_snapshot(store.backend.as_ref()) {
            Ok(Some(snapshot)) => {
                info!(threads = snapshot.threads.len(), "restored saved threads");
                store.threads = snapshot.threads;
                store.last_allocated = store.threads.iter().map(|t| t.id).max();
                store.saved_active = Some(snapshot.active);
                store.active = snapshot
                    .active
                    .filter(|id| store.threads.iter().any(|t| t.id == *id))
                    .or_else(|| store.threads.first().map(|t| t.id));
            }
            Ok(None) => {}
            Err(err @ PersistError::Corrupt { .. }) => store.set_aside_corrupt(&err),
            Err(err) => warn!(error = %err, "failed to read saved threads"),
        }

        if store.threads.is_empty() {
            store.create_thread();
        }
        store
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn active_id(&self) -> Option<ThreadId> {
        self.active
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.active.and_then(|id| self.thread(id))
    }

    pub fn position(&self, id: ThreadId) -> Option<usize> {
        self.threads.iter().position(|t| t.id == id)
    }

    pub fn thread_title(&self, id: ThreadId) -> Option<String> {
        self.thread(id).map(Thread::title)
    }

    /// Last persistence failure since the previous call, for the status line.
    pub fn take_persist_error(&mut self) -> Option<String> {
        self.persist_error.take()
    }

    pub fn create_thread(&mut self) -> ThreadId {
        let id = ThreadId::allocate((self.clock)(), self.last_allocated);
        self.last_allocated = Some(id);
        self.threads.push(Thread::new(id));
        self.active = Some(id);
        debug!(thread = %id, "created thread");
        self.persist();
        id
    }

    /// Point at `id`. Unknown ids are refused so the pointer stays valid.
    pub fn switch_active(&mut self, id: ThreadId) -> bool {
        if self.position(id).is_none() {
            warn!(thread = %id, "refusing to activate unknown thread");
            return false;
        }
        self.active = Some(id);
        self.persist();
        true
    }

    /// Remove `id`. A deleted active thread hands over to the first remaining
    /// thread; deleting the last thread replaces it with a fresh one.
    pub fn delete_thread(&mut self, id: ThreadId) {
        let Some(index) = self.position(id) else {
            return;
        };
        self.threads.remove(index);
        debug!(thread = %id, "deleted thread");

        if self.threads.is_empty() {
            self.active = None;
            self.create_thread();
            return;
        }

        if self.active == Some(id) {
            self.active = self.threads.first().map(|t| t.id);
        }
        self.persist();
    }

    /// Append to `thread_id`; a thread deleted mid-stream makes this a no-op.
    pub fn append_message(&mut self, thread_id: ThreadId, message: Message) -> bool {
        let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) else {
            return false;
        };
        thread.messages.push(message);
        self.persist();
        true
    }

    /// Replace the content of the last message in `thread_id`.
    pub fn update_last_message(&mut self, thread_id: ThreadId, content: &str) -> bool {
        let Some(last) = self
            .threads
            .iter_mut()
            .find(|t| t.id == thread_id)
            .and_then(|t| t.messages.last_mut())
        else {
            return false;
        };
        last.content.clear();
        last.content.push_str(content);
        self.persist();
        true
    }

    /// Keep an unparsable thread list for the user instead of letting the
    /// next save replace it.
    fn set_aside_corrupt(&mut self, err: &PersistError) {
        let message = match self.backend.set_aside(THREADS_KEY) {
            Ok(Some(location)) => {
                warn!(error = %err, backup = %location, "saved threads unreadable; moved aside");
                format!("Saved threads were unreadable and were moved to {location}")
            }
            Ok(None) => {
                warn!(error = %err, "saved threads unreadable");
                format!("Saved threads are unreadable: {err}")
            }
            Err(move_err) => {
                warn!(error = %err, move_error = %move_err, "could not move unreadable threads");
                format!("Saved threads are unreadable and could not be moved: {move_err}")
            }
        };
        self.persist_error = Some(message);
    }

    fn persist(&mut self) {
        if let Err(err) = self.write_changes() {
            warn!(error = %err, "failed to save threads");
            self.persist_error = Some(format!("Failed to save threads: {err}"));
        }
    }

    fn write_changes(&mut self) -> Result<(), PersistError> {
        write_threads(self.backend.as_mut(), &self.threads)?;
        if self.saved_active != Some(self.active) {
            write_active(self.backend.as_mut(), self.active)?;
            self.saved_active = Some(self.active);
        }
        Ok(())
    }
}

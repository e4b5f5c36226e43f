//! Per-invocation-chain state.
//!
//! `Context` lifetime is one logical call chain on one thread of execution.
//! It is modeled as a thread-local stack rather than passed explicitly,
//! matching the ambient nature of the upstream design; the
//! `warden-tower` adapter offers an explicit variant for call sites where a
//! logical chain may be polled from different OS threads between `.await`
//! points (see SPEC_FULL.md §5's Open Question resolution).

use std::cell::RefCell;
use std::sync::Arc;

use crate::degrade_checker::DegradeChecker;
use crate::error::BlockError;
use crate::error::EntryType;
use crate::error::ErrorEntryFreeError;
use crate::node::DefaultNode;
use crate::node::EntranceNode;
use crate::node::StatisticNode;
use crate::slots::param_flow::ThreadGuard;

/// One enter/exit pair. Pushed onto `Context::current_entry` on enter,
/// popped (and its parent restored) on matching exit.
pub struct Entry {
    pub resource: String,
    pub entry_type: EntryType,
    pub create_time_ms: u64,
    pub count: u64,
    pub current_node: Arc<DefaultNode>,
    pub origin_node: Option<Arc<StatisticNode>>,
    pub error: Option<BlockError>,
    pub traced_exception: bool,
    /// Set when a shaper granted admission only after a cooperative sleep;
    /// recorded here so `StatisticSlot::exit` knows not to double-count the
    /// pass (it was already added to `OCCUPIED_PASS` at admission time).
    pub admitted_after_wait: bool,
    /// Set when this entry is the single probe request a circuit breaker
    /// let through while Half-Open; its exit outcome decides whether the
    /// breaker closes or re-opens.
    pub degrade_probe: Option<Arc<DegradeChecker>>,
    /// THREAD-grade hot-parameter increments taken on admission, released
    /// when this entry drops (normally via `SlotChain::exit`).
    pub param_thread_guards: Vec<ThreadGuard>,
}

/// Per-logical-call-chain state: the name it entered under, the caller's
/// origin, the shared [`EntranceNode`] for that name, and the stack of open
/// entries.
pub struct Context {
    pub name: String,
    pub origin: String,
    pub entrance_node: Arc<EntranceNode>,
    entries: Vec<Entry>,
}

impl Context {
    pub fn new(name: impl Into<String>, origin: impl Into<String>, entrance_node: Arc<EntranceNode>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            entrance_node,
            entries: Vec::new(),
        }
    }

    pub fn push_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn current_entry(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn current_entry_mut(&mut self) -> Option<&mut Entry> {
        self.entries.last_mut()
    }

    pub fn parent_entry(&self) -> Option<&Entry> {
        let len = self.entries.len();
        if len >= 2 { self.entries.get(len - 2) } else { None }
    }

    /// Pop the entry matching `resource`. If it is not the top of the
    /// stack, every intermediate entry is exited first (best effort) and
    /// `ErrorEntryFreeError` is returned once the mismatch is detected.
    pub fn pop_matching(&mut self, resource: &str) -> Result<Entry, ErrorEntryFreeError> {
        match self.entries.last() {
            Some(top) if top.resource == resource => Ok(self.entries.pop().unwrap()),
            Some(top) => Err(ErrorEntryFreeError {
                expected: resource.to_string(),
                actual: top.resource.clone(),
            }),
            None => Err(ErrorEntryFreeError {
                expected: resource.to_string(),
                actual: String::new(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// Push `ctx` as the thread-local current context for the duration of `f`.
/// Reentrant: nested `with_context` calls see their own context as current.
pub fn with_context<R>(ctx: Context, f: impl FnOnce(&mut Context) -> R) -> R {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(ctx));
    let result = CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let ctx = stack.last_mut().expect("context pushed above");
        f(ctx)
    });
    CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());
    result
}

/// Access the thread-local current context, if one is active.
pub fn current_context<R>(f: impl FnOnce(&mut Context) -> R) -> Option<R> {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().last_mut().map(f))
}

//! Engines keyed by context, with a per-caller lookup cache.
//!
//! Every pool has a default engine bound to a default context that cannot be
//! removed.  Lookups for an unknown context fall back to it.  Functions
//! registered globally reach every live engine and every engine added later.
//!
//! All maps are [`DashMap`]s, so lookups and inserts may come from any
//! thread.  Engines themselves are shared as [`SharedEngine`]: one evaluation
//! at a time per engine.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::expr::define::FunctionDefinition;
use crate::expr::engine::Engine;
use crate::expr::error::{DefinitionError, VariableError};
use crate::expr::function::RegisteredFunction;
use crate::expr::value::Value;

pub type SharedEngine = Arc<Mutex<Engine>>;

/// Identity of an engine within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    pub const DEFAULT: EngineId = EngineId(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

pub struct EnginePool<C = String>
where
    C: Eq + Hash + Clone,
{
    default_context: C,
    default_engine: SharedEngine,
    engines: DashMap<EngineId, SharedEngine>,
    contexts: DashMap<C, EngineId>,
    /// caller → engine resolved for it
    callers: DashMap<String, EngineId>,
    /// Replayed into every engine added after registration.
    globals: DashMap<String, RegisteredFunction>,
    next_id: AtomicU64,
}

impl<C> std::fmt::Debug for EnginePool<C>
where
    C: Eq + Hash + Clone + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool")
            .field("default_context", &self.default_context)
            .field("engines", &self.engines.len())
            .field("callers", &self.callers.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

impl<C> EnginePool<C>
where
    C: Eq + Hash + Clone,
{
    /// A pool whose default engine is [`Engine::new`].
    pub fn new(default_context: C) -> Self {
        Self::with_default_engine(default_context, Engine::new())
    }

    pub fn with_default_engine(default_context: C, engine: Engine) -> Self {
        let default_engine = Arc::new(Mutex::new(engine));
        let pool = EnginePool {
            default_context: default_context.clone(),
            default_engine: Arc::clone(&default_engine),
            engines: DashMap::new(),
            contexts: DashMap::new(),
            callers: DashMap::new(),
            globals: DashMap::new(),
            next_id: AtomicU64::new(1),
        };
        pool.engines.insert(EngineId::DEFAULT, default_engine);
        pool.contexts.insert(default_context, EngineId::DEFAULT);
        pool
    }

    pub fn default_context(&self) -> &C {
        &self.default_context
    }

    pub fn default_engine(&self) -> SharedEngine {
        Arc::clone(&self.default_engine)
    }

    pub fn engine(&self, id: EngineId) -> Option<SharedEngine> {
        self.engines.get(&id).map(|e| Arc::clone(e.value()))
    }

    fn context_id(&self, context: &C) -> EngineId {
        self.contexts
            .get(context)
            .map(|id| *id.value())
            .unwrap_or(EngineId::DEFAULT)
    }

    /// The engine bound to `context` itself, without falling back.
    fn own_engine(&self, context: &C) -> Option<SharedEngine> {
        let id = *self.contexts.get(context)?.value();
        self.engine(id)
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// The engine bound to `context`, or the default engine.
    pub fn engine_for_context(&self, context: &C) -> SharedEngine {
        self.engine(self.context_id(context))
            .unwrap_or_else(|| self.default_engine())
    }

    /// The engine for `caller`, resolved through `context` the first time and
    /// cached afterwards.  The default context always yields the default
    /// engine without touching the cache.
    pub fn engine_for_caller(&self, caller: &str, context: &C) -> SharedEngine {
        if *context == self.default_context {
            return self.default_engine();
        }
        if let Some(engine) = self
            .callers
            .get(caller)
            .and_then(|id| self.engine(*id.value()))
        {
            return engine;
        }
        let id = self.context_id(context);
        self.callers.insert(caller.to_string(), id);
        debug!(caller, engine = %id, "cached caller engine");
        self.engine(id).unwrap_or_else(|| self.default_engine())
    }

    /// Snapshot of every live engine, ordered by id.
    pub fn engines(&self) -> Vec<(EngineId, SharedEngine)> {
        let mut all: Vec<_> = self
            .engines
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    // ── Contexts and callers ──────────────────────────────────────────────────

    /// Bind `engine` to `context`.  If the context already has an engine,
    /// `engine` is dropped and the existing id returned.  Global functions
    /// are replayed into the new engine.
    ///
    /// The engine joins the live set before the replay, so a concurrent
    /// [`register_global_function`](Self::register_global_function) reaches
    /// it either way.  The context resolves to it only once the replay is
    /// done.
    pub fn add_engine_for_context(&self, context: C, engine: Engine) -> EngineId {
        match self.contexts.entry(context) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let id = EngineId(self.next_id.fetch_add(1, Ordering::Relaxed));
                let shared = Arc::new(Mutex::new(engine));
                self.engines.insert(id, Arc::clone(&shared));
                {
                    let mut engine = shared.lock();
                    for global in self.globals.iter() {
                        engine.register(global.key(), global.value().clone());
                    }
                }
                e.insert(id);
                debug!(engine = %id, globals = self.globals.len(), "added engine for context");
                id
            }
        }
    }

    /// Point `caller` at the engine of `context`.
    pub fn update_caller_engine(&self, caller: &str, context: &C) -> EngineId {
        let id = self.context_id(context);
        self.callers.insert(caller.to_string(), id);
        id
    }

    pub fn clear_caller(&self, caller: &str) -> bool {
        self.callers.remove(caller).is_some()
    }

    /// Drop the engine bound to `context` along with any cached callers that
    /// resolved to it.  The default context is never removed.
    pub fn remove_context(&self, context: &C) -> bool {
        if *context == self.default_context {
            warn!("refusing to remove the default context");
            return false;
        }
        let Some((_, id)) = self.contexts.remove(context) else {
            return false;
        };
        self.engines.remove(&id);
        self.callers.retain(|_, cached| *cached != id);
        debug!(engine = %id, "removed context");
        true
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// Register `f` in every live engine and remember it for engines added
    /// later.  Returns how many engines accepted it.
    pub fn register_global_function(&self, name: &str, f: RegisteredFunction) -> usize {
        self.globals.insert(name.to_string(), f.clone());
        let accepted = self
            .engines()
            .into_iter()
            .filter(|(_, engine)| engine.lock().register(name, f.clone()))
            .count();
        debug!(function = name, accepted, "registered global function");
        accepted
    }

    /// Compile a `name(params) => body` definition and register it globally.
    pub fn register_global_definition(&self, definition: &str) -> Result<usize, DefinitionError> {
        let def = FunctionDefinition::parse(definition)?;
        let name = def.name.clone();
        Ok(self.register_global_function(&name, def.into_function()))
    }

    /// Register `f` in the engine bound to `context` only.  `false` if the
    /// context has no engine of its own or the name is taken.
    pub fn register_function_for_context(
        &self,
        context: &C,
        name: &str,
        f: RegisteredFunction,
    ) -> bool {
        let Some(engine) = self.own_engine(context) else {
            return false;
        };
        let mut engine = engine.lock();
        engine.register(name, f)
    }

    /// Forget a global function and remove it from every engine.  Returns how
    /// many engines held it.
    pub fn unregister_global_function(&self, name: &str) -> usize {
        self.globals.remove(name);
        self.engines()
            .into_iter()
            .filter(|(_, engine)| engine.lock().unregister_function(name))
            .count()
    }

    pub fn unregister_function_for_context(&self, context: &C, name: &str) -> bool {
        let Some(engine) = self.own_engine(context) else {
            return false;
        };
        let mut engine = engine.lock();
        engine.unregister_function(name)
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Non-consuming read from the first engine holding `name`, default
    /// engine first.
    pub fn peek_variable(&self, name: &str) -> Option<Value> {
        for (_, engine) in self.engines() {
            let engine = engine.lock();
            if let Some(v) = engine.peek_variable(name) {
                return Some(v);
            }
        }
        None
    }

    /// Consuming read from the first engine holding `name`, default engine
    /// first.
    pub fn get_variable(&self, name: &str) -> Result<Option<Value>, VariableError> {
        for (_, engine) in self.engines() {
            let mut engine = engine.lock();
            if engine.has_variable(name) {
                return engine.get_variable(name);
            }
        }
        Ok(None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

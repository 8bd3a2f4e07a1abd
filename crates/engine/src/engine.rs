//! Process engine
//!
//! The [`Engine`] owns the system context, the process registry and the lock
//! manager, and drives invocations:
//!
//! 1. Look up the process (`ProcessNotFound` if absent).
//! 2. Open an unlock scope for the duration of the call.
//! 3. Contracted: begin a transaction, build a guard, run the body, then
//!    commit on success or roll back on error. Unchecked: run the body
//!    against the raw context.
//! 4. Classify the error of a failed contracted call:
//!    - contract violations pass through,
//!    - error kinds the contract declares pass through,
//!    - anything else becomes an undeclared-error violation.
//!
//! Rollback always completes before an error leaves [`Engine::run_process`].
//!
//! # Nesting
//!
//! A process cannot invoke another process. Its body only receives a
//! [`Guard`] or an [`Unguarded`] handle, neither of which reaches the engine,
//! and `run_process` holds `&mut Engine` for the whole call, so a re-entrant
//! invocation does not compile. Each invocation and each [`Engine::edit`]
//! handle opens exactly one unlock scope, and the lock returns to its prior
//! depth when that scope ends.
//!
//! # Direct access
//!
//! [`Engine::edit`] yields an [`Unguarded`] handle inside an unlock scope.
//! It is the privileged bootstrap path: its writes are not logged and not
//! audited. [`Engine::unguarded`] yields the same handle without unlocking,
//! so its writes are subject to strict mode.

use crate::audit::{AuditLog, AuditRecord};
use crate::config::{EngineConfig, CONFIG_FILE_NAME};
use crate::coordinator::{InvocationCoordinator, InvocationMetrics};
use crate::guard::Guard;
use crate::process::{Args, InvocationRecord, InvocationState, Process};
use crate::workflow::WorkflowStep;
use chrono::Utc;
use pop_core::{
    DomainContext, Error, FieldPath, GlobalContext, Layer, LockManager, ProcessContract, Result,
    SystemContext, UnlockScope, Value, Violation,
};
use pop_transaction::Transaction;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

// ============================================================================
// Engine
// ============================================================================

/// Orchestrates process invocations over one system context
pub struct Engine {
    ctx: SystemContext,
    registry: BTreeMap<String, Process>,
    lock: LockManager,
    coordinator: InvocationCoordinator,
    audit: AuditLog,
    last_invocation: Option<InvocationRecord>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with the default configuration
    pub fn new(ctx: SystemContext) -> Self {
        Self::with_config(ctx, EngineConfig::default())
    }

    /// Create an engine with an explicit configuration
    pub fn with_config(ctx: SystemContext, config: EngineConfig) -> Self {
        let lock = config.lock_manager();
        info!(
            target: "pop::engine",
            strict_mode = lock.strict_mode(),
            record_audit = config.record_audit,
            "Engine created"
        );
        Self {
            ctx,
            registry: BTreeMap::new(),
            lock,
            coordinator: InvocationCoordinator::new(),
            audit: AuditLog::new(config.audit_capacity),
            last_invocation: None,
            config,
        }
    }

    /// Start a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    // === Registry ===

    /// Register a process under a unique name
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateProcess`] if the name is taken, and
    /// [`Error::InvalidContract`] if the contract does not resolve.
    pub fn register_process(&mut self, name: impl Into<String>, process: Process) -> Result<()> {
        let name = name.into();
        if self.registry.contains_key(&name) {
            return Err(Error::DuplicateProcess(name));
        }
        match &process {
            Process::Contracted { contract, .. } => {
                contract.validate(&name)?;
                debug!(
                    target: "pop::engine",
                    process = %name,
                    inputs = contract.inputs.len(),
                    outputs = contract.outputs.len(),
                    "Process registered"
                );
            }
            Process::Unchecked { .. } => {
                warn!(
                    target: "pop::engine",
                    process = %name,
                    "Process registered without a contract; it runs with unguarded context access"
                );
            }
        }
        self.registry.insert(name, process);
        Ok(())
    }

    /// Registered process names, sorted
    pub fn process_names(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    /// Contract of a registered process
    pub fn contract(&self, name: &str) -> Option<&ProcessContract> {
        self.registry.get(name).and_then(Process::contract)
    }

    // === Invocation ===

    /// Invoke a process
    ///
    /// Returns the body's result on commit. On failure the domain layer is
    /// exactly as it was before the call.
    pub fn run_process(&mut self, name: &str, args: &Args) -> Result<Value> {
        let process = self
            .registry
            .get(name)
            .ok_or_else(|| Error::ProcessNotFound(name.to_string()))?;
        let _scope = self.lock.scoped_unlock();

        let (record, outcome) = match process {
            Process::Contracted { contract, body } => {
                let txn_id = self.coordinator.start_transaction(name);
                let mut state = InvocationState::Pending;
                let (global, domain) = self.ctx.split_mut();
                let mut tx = Transaction::begin(txn_id, domain);

                let result = Guard::new(name, contract, global, &mut tx).and_then(|mut guard| {
                    state = InvocationState::Running;
                    body(&mut guard, args)
                });
                debug!(target: "pop::engine", txn_id, process = name, ?state, "Process body returned");

                match result {
                    Ok(value) => {
                        let entries = tx.commit()?;
                        drop(tx);
                        self.coordinator.record_commit(txn_id, name);
                        if self.config.record_audit {
                            self.audit.push(AuditRecord {
                                txn_id,
                                process: name.to_string(),
                                committed_at: Utc::now(),
                                entries,
                            });
                        }
                        let record = InvocationRecord {
                            txn_id: Some(txn_id),
                            process: name.to_string(),
                            state: InvocationState::Committed,
                            error_kind: None,
                        };
                        (record, Ok(value))
                    }
                    Err(err) => {
                        tx.rollback()?;
                        drop(tx);
                        self.coordinator.record_rollback(txn_id, name, err.kind());
                        let err = classify(name, contract, err);
                        let record = InvocationRecord {
                            txn_id: Some(txn_id),
                            process: name.to_string(),
                            state: InvocationState::RolledBack,
                            error_kind: Some(err.kind().to_string()),
                        };
                        (record, Err(err))
                    }
                }
            }
            Process::Unchecked { body } => {
                self.coordinator.record_unchecked(name);
                let mut raw = Unguarded::new(&mut self.ctx, &self.lock, None);
                let result = body(&mut raw, args);
                let record = InvocationRecord {
                    txn_id: None,
                    process: name.to_string(),
                    state: if result.is_ok() {
                        InvocationState::Committed
                    } else {
                        InvocationState::RolledBack
                    },
                    error_kind: result.as_ref().err().map(|e| e.kind().to_string()),
                };
                (record, result)
            }
        };

        self.last_invocation = Some(record);
        outcome
    }

    /// Run the processes of a workflow in order
    ///
    /// Steps without a process name are skipped. Execution stops at the first
    /// failing step; earlier steps stay committed.
    pub fn execute_workflow(&mut self, steps: &[WorkflowStep], args: &Args) -> Result<&SystemContext> {
        info!(target: "pop::engine", steps = steps.len(), "Workflow started");
        for (index, step) in steps.iter().enumerate() {
            match step.process_name() {
                Some(name) => {
                    if let Err(e) = self.run_process(name, args) {
                        warn!(target: "pop::engine", step = index, process = name, error = %e, "Workflow stopped");
                        return Err(e);
                    }
                }
                None => debug!(target: "pop::engine", step = index, "Workflow step without a process skipped"),
            }
        }
        Ok(&self.ctx)
    }

    // === Direct access ===

    /// Direct, unlogged access inside an unlock scope
    ///
    /// The context relocks when the returned handle is dropped.
    pub fn edit(&mut self) -> Unguarded<'_> {
        let scope = self.lock.scoped_unlock();
        debug!(target: "pop::engine", depth = scope.depth(), "Edit scope opened");
        Unguarded::new(&mut self.ctx, &self.lock, Some(scope))
    }

    /// Direct access under the current lock state
    pub fn unguarded(&mut self) -> Unguarded<'_> {
        Unguarded::new(&mut self.ctx, &self.lock, None)
    }

    // === Accessors ===

    /// The system context
    pub fn context(&self) -> &SystemContext {
        &self.ctx
    }

    /// The lock manager
    pub fn lock(&self) -> &LockManager {
        &self.lock
    }

    /// Whether locked direct mutations are rejected
    pub fn strict_mode(&self) -> bool {
        self.lock.strict_mode()
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Committed invocations, oldest first
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Outcome of the most recent invocation
    pub fn last_invocation(&self) -> Option<&InvocationRecord> {
        self.last_invocation.as_ref()
    }

    /// Invocation metrics
    pub fn metrics(&self) -> InvocationMetrics {
        self.coordinator.metrics()
    }

    /// Consume the engine, returning the context
    pub fn into_context(self) -> SystemContext {
        self.ctx
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("processes", &self.registry.len())
            .field("strict_mode", &self.lock.strict_mode())
            .field("audit_records", &self.audit.len())
            .finish()
    }
}

/// Decide what a failed contracted invocation reports
fn classify(process: &str, contract: &ProcessContract, err: Error) -> Error {
    if err.is_contract_violation() || contract.declares_error(err.kind()) {
        return err;
    }
    warn!(
        target: "pop::engine",
        process,
        kind = err.kind(),
        "Process raised an undeclared error"
    );
    Error::ContractViolation {
        process: process.to_string(),
        violation: Violation::UndeclaredError {
            kind: err.kind().to_string(),
            message: err.message(),
        },
    }
}

// ============================================================================
// Unguarded
// ============================================================================

/// Raw context access for unchecked processes and bootstrap code
///
/// Writes go straight to the domain layer through the lock manager: they are
/// allowed inside an unlock scope, and otherwise rejected in strict mode or
/// warned about in permissive mode. Nothing is logged in a transaction.
pub struct Unguarded<'e> {
    ctx: &'e mut SystemContext,
    lock: &'e LockManager,
    _scope: Option<UnlockScope<'e>>,
}

impl<'e> Unguarded<'e> {
    fn new(ctx: &'e mut SystemContext, lock: &'e LockManager, scope: Option<UnlockScope<'e>>) -> Self {
        Self {
            ctx,
            lock,
            _scope: scope,
        }
    }

    /// The whole system context
    pub fn context(&self) -> &SystemContext {
        self.ctx
    }

    /// The global layer
    pub fn global(&self) -> &GlobalContext {
        self.ctx.global()
    }

    /// The domain layer
    pub fn domain(&self) -> &DomainContext {
        self.ctx.domain()
    }

    /// True while the context is unlocked
    pub fn is_unlocked(&self) -> bool {
        !self.lock.is_locked()
    }

    /// Number of open unlock scopes
    pub fn lock_depth(&self) -> usize {
        self.lock.depth()
    }

    /// Read a layer-rooted (`global.x`) or domain-relative (`items[0]`) path
    pub fn get(&self, path: &str) -> Result<Value> {
        let parsed = FieldPath::from_str(path)?;
        match parsed.first_key().and_then(Layer::from_name) {
            Some(_) if parsed.len() >= 2 => self.ctx.get_path(path),
            _ => self.ctx.domain().get_path(&parsed),
        }
    }

    /// Directly set a domain value, returning the previous one
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let rel = domain_relative(path)?;
        self.ctx.domain_mut().set(self.lock, &rel, value)
    }

    /// Directly remove a domain value
    pub fn remove(&mut self, path: &str) -> Result<Value> {
        let rel = domain_relative(path)?;
        self.ctx.domain_mut().remove(self.lock, &rel)
    }

    /// Directly append to a domain list
    pub fn push(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let rel = domain_relative(path)?;
        self.ctx.domain_mut().push(self.lock, &rel, value)
    }
}

impl std::fmt::Debug for Unguarded<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unguarded")
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

/// Strip a `domain.` prefix; reject global paths
fn domain_relative(path: &str) -> Result<String> {
    let parsed = FieldPath::from_str(path)?;
    match parsed.first_key().and_then(Layer::from_name) {
        Some(Layer::Global) if parsed.len() >= 2 => Err(Error::InvalidState(format!(
            "'{}' is on the read-only global layer",
            path
        ))),
        Some(Layer::Domain) if parsed.len() >= 2 => Ok(parsed.tail().to_string()),
        _ => Ok(path.to_string()),
    }
}

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for [`Engine`]
///
/// Both context layers are required; building without either fails with
/// [`Error::MissingLayer`].
///
/// ```
/// use pop_core::{DomainContext, GlobalContext};
/// use pop_engine::Engine;
///
/// let engine = Engine::builder()
///     .global(GlobalContext::empty())
///     .domain(DomainContext::new())
///     .strict_mode(true)
///     .build()
///     .unwrap();
/// assert!(engine.strict_mode());
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    global: Option<GlobalContext>,
    domain: Option<DomainContext>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global layer
    pub fn global(mut self, global: GlobalContext) -> Self {
        self.global = Some(global);
        self
    }

    /// Set the domain layer
    pub fn domain(mut self, domain: DomainContext) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Set both layers from an existing context
    pub fn context(self, ctx: SystemContext) -> Self {
        let (global, domain) = ctx.into_parts();
        self.global(global).domain(domain)
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the file cannot be read or parsed.
    pub fn config_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let config = EngineConfig::from_file(path)?;
        Ok(self.config(config))
    }

    /// Load `pop.toml` from a directory, keeping defaults if it has none
    pub fn config_dir(self, dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!(target: "pop::engine", path = %path.display(), "No config file, using defaults");
            return Ok(self);
        }
        self.config_file(path)
    }

    /// Force strict mode on or off
    pub fn strict_mode(mut self, strict: bool) -> Self {
        self.config.strict_mode = Some(strict);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<Engine> {
        let mut ctx = SystemContext::builder();
        if let Some(global) = self.global {
            ctx = ctx.global(global);
        }
        if let Some(domain) = self.domain {
            ctx = ctx.domain(domain);
        }
        Ok(Engine::with_config(ctx.build()?, self.config))
    }
}

//! Operation controller: runs intents as two-phase transactions against the
//! configuration model and the service runtime.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ProvisioningConfig;
use crate::error::{ProvisionError, Result};
use crate::log_component;
use crate::model::{ConfigModel, ConfigurationDelta, StagedModel};
use crate::service::engine::ignore_not_found;
use crate::service::{LifecycleEngine, ServiceName, VerificationGate};

use super::handler::HandlerRegistry;
use super::intent::{Intent, OperationKind};
use super::report::TransactionReport;
use super::TransactionState;

/// Entry point for configuration changes.
///
/// Cloning is cheap; clones share the model, engine and handlers.
#[derive(Clone)]
pub struct OperationController {
    model: Arc<ConfigModel>,
    engine: LifecycleEngine,
    handlers: Arc<HandlerRegistry>,
    config: ProvisioningConfig,
}

impl OperationController {
    pub fn new(
        model: Arc<ConfigModel>,
        engine: LifecycleEngine,
        handlers: HandlerRegistry,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            model,
            engine,
            handlers: Arc::new(handlers),
            config,
        }
    }

    pub fn model(&self) -> &Arc<ConfigModel> {
        &self.model
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Create a transaction for `intent` without running it.
    pub fn prepare(&self, intent: Intent) -> Transaction {
        let (abort_tx, abort_rx) = watch::channel(false);
        Transaction {
            id: Uuid::new_v4(),
            intent,
            controller: self.clone(),
            abort_tx: Arc::new(abort_tx),
            abort_rx,
            history: vec![TransactionState::Received],
        }
    }

    /// Prepare and run `intent`.
    pub async fn execute(&self, intent: Intent) -> TransactionReport {
        self.prepare(intent).run().await
    }
}

impl std::fmt::Debug for OperationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationController")
            .field("resources", &self.model.len())
            .field("engine", &self.engine)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Cancels a transaction that has not committed yet.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Request an abort. Has no effect once the transaction committed.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One intent on its way through the state machine.
pub struct Transaction {
    id: Uuid,
    intent: Intent,
    controller: OperationController,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
    history: Vec<TransactionState>,
}

impl Transaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Drive the transaction to `COMMITTED` or `ROLLED_BACK`.
    pub async fn run(mut self) -> TransactionReport {
        let started_at = Utc::now();
        log_component!(
            info,
            "transaction",
            "Transaction received",
            id = %self.id,
            intent = %self.intent
        );

        let outcome = match self.intent.op {
            OperationKind::Add => self.run_add().await,
            OperationKind::Remove => self.run_remove().await,
        };

        let (services, outcome) = match outcome {
            Ok(services) => {
                self.advance(TransactionState::Committed);
                (services, Ok(()))
            }
            Err(e) => {
                self.advance(TransactionState::RolledBack);
                warn!(id = %self.id, error = %e, "Transaction rolled back");
                (Vec::new(), Err(e))
            }
        };

        TransactionReport {
            id: self.id,
            op: self.intent.op,
            address: self.intent.address,
            history: self.history,
            services,
            started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }

    fn advance(&mut self, state: TransactionState) {
        log_component!(debug, "transaction", "Transaction state changed", id = %self.id, state = %state);
        self.history.push(state);
    }

    fn check_aborted(&self) -> Result<()> {
        if *self.abort_rx.borrow() {
            return Err(ProvisionError::Aborted);
        }
        Ok(())
    }

    async fn run_add(&mut self) -> Result<Vec<ServiceName>> {
        let handler = self.controller.handlers.for_address(&self.intent.address)?;
        let resource = handler.validate(&self.intent).await?;
        self.check_aborted()?;
        self.advance(TransactionState::Validated);

        let address = self.intent.address.clone();
        let descriptors = handler.descriptors(&address, &resource)?;
        let owner = descriptors.first().map(|d| d.name().clone());
        let mut staged = StagedModel::new(self.controller.model.clone());
        staged
            .stage(ConfigurationDelta::Add {
                address: address.clone(),
                resource: resource.clone(),
            })
            .map_err(|e| duplicate_as_service(e, owner.as_ref()))?;
        self.check_aborted()?;
        self.advance(TransactionState::Staged);

        // Register everything before starting anything, so a name clash
        // fails here without a single factory having run.
        let engine = &self.controller.engine;
        let mut registered: Vec<ServiceName> = Vec::new();
        let mut services: Vec<ServiceName> = Vec::new();
        for descriptor in descriptors {
            let names: Vec<ServiceName> = descriptor.all_names().cloned().collect();
            let primary = descriptor.name().clone();
            if let Err(e) = engine.register(descriptor) {
                self.rollback(&registered).await;
                return Err(e);
            }
            registered.push(primary);
            services.extend(names);
        }
        self.advance(TransactionState::Installing);

        let result = self.install_and_verify(&registered).await;
        let result = result.and_then(|()| {
            self.check_aborted()?;
            staged
                .commit()
                .map_err(|e| duplicate_as_service(e, owner.as_ref()))
        });
        if let Err(e) = result {
            self.rollback(&registered).await;
            return Err(e);
        }

        log_component!(info, "transaction", "Committed", id = %self.id, address = %address);
        Ok(services)
    }

    async fn install_and_verify(&mut self, registered: &[ServiceName]) -> Result<()> {
        let engine = self.controller.engine.clone();
        let mut gate = VerificationGate::new(engine.registry().clone());
        for name in registered {
            engine.start(name)?;
            gate.observe(name.clone());
        }

        let timeout = self.controller.config.verification_timeout();
        let abort_rx = &mut self.abort_rx;
        tokio::select! {
            verified = gate.wait(timeout) => verified.map_err(ProvisionError::from_failures),
            _ = aborted(abort_rx) => Err(ProvisionError::Aborted),
        }
    }

    /// Undo runtime registrations, dependents first. Teardown failures are
    /// logged and never replace the error being reported.
    async fn rollback(&self, registered: &[ServiceName]) {
        for name in registered.iter().rev() {
            if let Err(e) = ignore_not_found(self.controller.engine.remove(name).await) {
                error!(id = %self.id, service = %name, error = %e, "Rollback teardown failed");
            }
        }
        info!(id = %self.id, services = registered.len(), "Rolled back runtime changes");
    }

    async fn run_remove(&mut self) -> Result<Vec<ServiceName>> {
        let handler = self.controller.handlers.for_address(&self.intent.address)?;
        let address = self.intent.address.clone();
        let resource = self
            .controller
            .model
            .get(&address)
            .ok_or_else(|| ProvisionError::NotFound(format!("resource '{}'", address)))?;
        self.check_aborted()?;
        self.advance(TransactionState::Validated);

        let mut staged = StagedModel::new(self.controller.model.clone());
        staged.stage(ConfigurationDelta::Remove {
            address: address.clone(),
        })?;
        self.check_aborted()?;
        self.advance(TransactionState::Staged);

        let services = handler.service_names(&address, &resource);
        self.check_aborted()?;
        self.advance(TransactionState::Installing);

        // Removing a primary drops its aliases too, so later names may
        // already be gone. Removal past this point is not undone.
        for name in &services {
            ignore_not_found(self.controller.engine.remove(name).await)?;
        }
        staged.commit()?;

        log_component!(info, "transaction", "Removed", id = %self.id, address = %address);
        Ok(services)
    }
}

/// An add that finds its resource already present clashes with the service
/// that resource owns.
fn duplicate_as_service(err: ProvisionError, owner: Option<&ServiceName>) -> ProvisionError {
    match (err, owner) {
        (ProvisionError::DuplicateResource(_), Some(name)) => {
            ProvisionError::DuplicateService(name.clone())
        }
        (err, _) => err,
    }
}

/// Resolves once an abort is requested. Never resolves if every handle is
/// dropped without aborting.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("intent", &self.intent)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

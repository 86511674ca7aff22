// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::InstanceSyncConfig;
use crate::delegate_task::{DelegateResponse, DelegateTask, DelegateTaskQueue};
use crate::error::InstanceSyncError;
use crate::provider::InstanceSyncKind;
use crate::target::TargetReference;
use crate::wire::WireTaskParams;
use infra_resolver::ConfigResolver;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Id of the validation task the delegate answered.
    pub task_id: String,
    /// Payload to persist for the periodic sync task.
    pub params: WireTaskParams,
}

/// Validates a target through a delegate, then hands back its periodic payload.
#[derive(Clone)]
pub struct InstanceSyncRegistrar {
    resolver: ConfigResolver,
    queue: Arc<dyn DelegateTaskQueue>,
    config: InstanceSyncConfig,
}

impl fmt::Debug for InstanceSyncRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSyncRegistrar")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InstanceSyncRegistrar {
    pub fn new(
        resolver: ConfigResolver,
        queue: Arc<dyn DelegateTaskQueue>,
        config: InstanceSyncConfig,
    ) -> Result<Self, InstanceSyncError> {
        config.validate()?;
        Ok(Self {
            resolver,
            queue,
            config,
        })
    }

    pub fn config(&self) -> &InstanceSyncConfig {
        &self.config
    }

    /// Builds the periodic payload for `target` without contacting any delegate.
    pub fn periodic_params(
        &self,
        kind: InstanceSyncKind,
        target: &TargetReference,
    ) -> Result<WireTaskParams, InstanceSyncError> {
        let resolved = kind.resolve(&self.resolver, target)?;
        Ok(resolved.build_periodic_params(self.config.params_version))
    }

    /// Builds the one-shot validation task for `target` without queueing it.
    pub fn validation_task(
        &self,
        kind: InstanceSyncKind,
        target: &TargetReference,
        account_id: &str,
    ) -> Result<DelegateTask, InstanceSyncError> {
        let resolved = kind.resolve(&self.resolver, target)?;
        Ok(resolved.build_validation_task(account_id, &self.config))
    }

    /// Resolves `target`, runs the validation task synchronously and, when the
    /// delegate reports success, returns the periodic payload.
    ///
    /// Nothing is queued when resolution fails.
    pub fn register(
        &self,
        kind: InstanceSyncKind,
        target: &TargetReference,
        account_id: &str,
    ) -> Result<Registration, InstanceSyncError> {
        let resolved = kind.resolve(&self.resolver, target)?;
        let task = resolved.build_validation_task(account_id, &self.config);
        let task_id = task.uuid.clone();
        debug!(
            %kind,
            task_id = %task_id,
            task_type = %task.data.task_type,
            routing_tags = ?task.routing_tags,
            "Queueing instance sync validation task"
        );

        let response = self.queue.execute_sync(task).map_err(|err| {
            error!(%kind, task_id = %task_id, "Validation task was not answered: {err}");
            InstanceSyncError::ValidationTaskFailure {
                task_id: task_id.clone(),
                reason: err.to_string(),
            }
        })?;

        match response {
            DelegateResponse::Success { .. } => {
                info!(%kind, task_id = %task_id, "Instance sync validation succeeded");
                Ok(Registration {
                    params: resolved.build_periodic_params(self.config.params_version),
                    task_id,
                })
            }
            DelegateResponse::Failure { message } => {
                error!(%kind, task_id = %task_id, "Instance sync validation failed: {message}");
                Err(InstanceSyncError::ValidationTaskFailure {
                    task_id,
                    reason: message,
                })
            }
        }
    }
}

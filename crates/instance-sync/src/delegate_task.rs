// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dispatch envelope consumed by the delegate task queue.

use crate::config::InstanceSyncConfig;
use infra_resolver::{DecryptedSetting, Orchestrator};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Task type understood by delegates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TaskType {
    #[display("AWS_LAMBDA_TASK")]
    AwsLambda,
    #[display("AWS_EC2_TASK")]
    AwsEc2,
    #[display("AZURE_VMSS_COMMAND_TASK")]
    AzureVmss,
    #[display("AZURE_APP_SERVICE_TASK")]
    AzureAppService,
    #[display("CONTAINER_VALIDATION")]
    ContainerValidation,
    #[display("SPOTINST_COMMAND_TASK")]
    Spotinst,
    #[display("HOST_VALIDATION")]
    HostValidation,
    #[display("PCF_COMMAND_TASK")]
    Pcf,
}

/// Typed request a delegate runs for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskParameters {
    ListFunctionVersions {
        region: String,
        function_name: String,
        qualifier: Option<String>,
        credentials: DecryptedSetting,
    },
    ListEc2Instances {
        region: String,
        vpc_ids: Vec<String>,
        tags: BTreeMap<String, String>,
        asg_name: Option<String>,
        credentials: DecryptedSetting,
    },
    ListScaleSetInstances {
        subscription_id: String,
        resource_group: String,
        vmss_id: String,
        credentials: DecryptedSetting,
    },
    ListWebAppInstances {
        subscription_id: String,
        resource_group: String,
        app_name: String,
        slot_name: String,
        credentials: DecryptedSetting,
    },
    ListContainers {
        orchestrator: Orchestrator,
        cluster_name: String,
        namespace: String,
        release_name: Option<String>,
        container_service_name: Option<String>,
        credentials: DecryptedSetting,
    },
    ListElastigroupInstances {
        region: String,
        elastigroup_id: String,
        spotinst_credentials: DecryptedSetting,
        aws_credentials: DecryptedSetting,
    },
    CheckHostReachability {
        host_names: Vec<String>,
        connection_credentials: DecryptedSetting,
    },
    ListApplicationInstances {
        organization: String,
        space: String,
        application_name: String,
        credentials: DecryptedSetting,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskData {
    pub is_async: bool,
    pub task_type: TaskType,
    pub parameters: Vec<TaskParameters>,
    pub timeout_millis: u64,
}

/// Unit of work handed to the delegate dispatch queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateTask {
    pub uuid: String,
    pub account_id: String,
    /// Delegate selectors; empty means any delegate of the account may pick it up
    pub routing_tags: Vec<String>,
    pub data: TaskData,
    pub created_at: i64,
    pub expiry: i64,
}

impl DelegateTask {
    /// Builds a synchronous one-shot task expiring `delegate_queue_timeout` after `now_millis`.
    pub fn validation(
        account_id: &str,
        task_type: TaskType,
        parameters: TaskParameters,
        routing_tag: Option<&str>,
        config: &InstanceSyncConfig,
        now_millis: i64,
    ) -> Self {
        let queue_timeout = i64::try_from(config.delegate_queue_timeout.as_millis())
            .unwrap_or(i64::MAX)
            .max(1);
        let timeout_millis = u64::try_from(config.validation_timeout.as_millis()).unwrap_or(u64::MAX);
        Self {
            uuid: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            routing_tags: routing_tag.map(|tag| vec![tag.to_string()]).unwrap_or_default(),
            data: TaskData {
                is_async: false,
                task_type,
                parameters: vec![parameters],
                timeout_millis,
            },
            created_at: now_millis,
            expiry: now_millis.saturating_add(queue_timeout),
        }
    }
}

/// Outcome reported by the delegate for a synchronous task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateResponse {
    Success { message: Option<String> },
    Failure { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("no delegate answered within {timeout_millis}ms")]
    Timeout { timeout_millis: u64 },

    #[error("delegate queue unavailable: {0}")]
    Unavailable(String),
}

/// External delegate dispatch queue.
pub trait DelegateTaskQueue: Send + Sync {
    /// Submits `task` and blocks until a delegate answers or the queue gives up.
    fn execute_sync(&self, task: DelegateTask) -> Result<DelegateResponse, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use infra_resolver::EncryptedFieldDetail;
    use std::time::Duration;

    fn parameters() -> TaskParameters {
        TaskParameters::CheckHostReachability {
            host_names: vec!["host-a".to_string()],
            connection_credentials: DecryptedSetting {
                setting_id: "ssh-1".to_string(),
                fields: vec![EncryptedFieldDetail::new("key", "-----BEGIN KEY-----")],
            },
        }
    }

    #[test]
    fn test_validation_task_shape() {
        let config = InstanceSyncConfig {
            validation_timeout: Duration::from_secs(120),
            delegate_queue_timeout: Duration::from_secs(6),
            params_version: 1,
        };
        let task = DelegateTask::validation(
            "acct",
            TaskType::HostValidation,
            parameters(),
            Some("dc-east"),
            &config,
            1_000,
        );

        assert!(!task.data.is_async);
        assert_eq!(task.data.timeout_millis, 120_000);
        assert_eq!(task.created_at, 1_000);
        assert_eq!(task.expiry, 7_000);
        assert_eq!(task.routing_tags, vec!["dc-east"]);
        assert_eq!(task.data.task_type.to_string(), "HOST_VALIDATION");
        assert!(Uuid::parse_str(&task.uuid).is_ok());
    }

    #[test]
    fn test_validation_task_never_prints_credentials() {
        let task = DelegateTask::validation(
            "acct",
            TaskType::HostValidation,
            parameters(),
            None,
            &InstanceSyncConfig::default(),
            0,
        );
        assert!(task.routing_tags.is_empty());
        assert!(!format!("{task:?}").contains("BEGIN KEY"));
    }

    #[test]
    fn test_each_task_gets_a_fresh_id() {
        let config = InstanceSyncConfig::default();
        let first =
            DelegateTask::validation("acct", TaskType::Pcf, parameters(), None, &config, 0);
        let second =
            DelegateTask::validation("acct", TaskType::Pcf, parameters(), None, &config, 0);
        assert_ne!(first.uuid, second.uuid);
    }
}

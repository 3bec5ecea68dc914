use crate::app::{BackendEvent, BackendTask};
use crate::domain::Resource;
use crate::error::ApiError;
use crate::infra::ConsoleApi;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Runs tasks concurrently until the task channel closes, then aborts
/// whatever is still in flight.
pub(crate) async fn worker_loop(
    client: Arc<dyn ConsoleApi>,
    mut task_rx: UnboundedReceiver<BackendTask>,
    event_tx: UnboundedSender<BackendEvent>,
) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            task = task_rx.recv() => {
                let Some(task) = task else {
                    break;
                };
                let client = client.clone();
                let event_tx = event_tx.clone();
                running.spawn(async move {
                    let event = execute(client.as_ref(), task).await;
                    if event_tx.send(event).is_err() {
                        debug!("console stopped listening; dropping result");
                    }
                });
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(err) = joined
                    && err.is_panic()
                {
                    warn!(error = %err, "backend task panicked");
                }
            }
        }
    }

    if !running.is_empty() {
        debug!(in_flight = running.len(), "aborting in-flight requests");
    }
    running.abort_all();
}

async fn execute(client: &dyn ConsoleApi, task: BackendTask) -> BackendEvent {
    match task {
        BackendTask::Load {
            resource,
            generation,
        } => match client.list(resource).await {
            Ok(records) => BackendEvent::Loaded {
                resource,
                generation,
                records,
            },
            Err(err) => failed(
                format!("load {}", resource.label()),
                Some((resource, generation)),
                err,
            ),
        },
        BackendTask::Create { resource, payload } => match client.create(resource, &payload).await
        {
            Ok(saved) => BackendEvent::Created {
                resource,
                payload,
                saved,
            },
            Err(err) => failed(format!("create {}", resource.singular()), None, err),
        },
        BackendTask::Update {
            resource,
            id,
            payload,
        } => match client.update(resource, &id, &payload).await {
            Ok(saved) => BackendEvent::Updated {
                resource,
                id,
                payload,
                saved,
            },
            Err(err) => failed(format!("update {} {id}", resource.singular()), None, err),
        },
        BackendTask::Delete { resource, id } => match client.delete(resource, &id).await {
            Ok(()) => BackendEvent::Deleted { resource, id },
            Err(err) => failed(format!("delete {} {id}", resource.singular()), None, err),
        },
        BackendTask::LoadDeviceUsers { terminal_id } => {
            match client.device_users(&terminal_id).await {
                Ok(users) => BackendEvent::DeviceUsersLoaded { terminal_id, users },
                Err(err) => failed(format!("device users of {terminal_id}"), None, err),
            }
        }
        BackendTask::RunCommand { request } => match client.run_command(&request).await {
            Ok(result) => BackendEvent::CommandFinished { request, result },
            Err(err) => failed(request.describe(), None, err),
        },
    }
}

fn failed(context: String, load: Option<(Resource, u64)>, err: ApiError) -> BackendEvent {
    warn!(%context, error = %err, "backend task failed");
    BackendEvent::Failed {
        context,
        load,
        notice: err.notice(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandRequest, CommandResult, DeviceCommand, DeviceUser, Record};
    use crate::error::{Notice, Route};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(record) => record,
            other => panic!("not an object: {other}"),
        }
    }

    struct FakeApi {
        delay: Duration,
    }

    #[async_trait]
    impl ConsoleApi for FakeApi {
        async fn list(&self, resource: Resource) -> Result<Vec<Record>, ApiError> {
            tokio::time::sleep(self.delay).await;
            match resource {
                Resource::Groups => Ok(vec![record(json!({ "groupID": "G1" }))]),
                _ => Err(ApiError::Status {
                    status: 401,
                    body: String::new(),
                }),
            }
        }

        async fn create(
            &self,
            _resource: Resource,
            entity: &Record,
        ) -> Result<Option<Record>, ApiError> {
            let mut saved = entity.clone();
            saved.insert("groupID".to_string(), json!("G9"));
            Ok(Some(saved))
        }

        async fn update(
            &self,
            _resource: Resource,
            _id: &str,
            _entity: &Record,
        ) -> Result<Option<Record>, ApiError> {
            Ok(None)
        }

        async fn delete(&self, _resource: Resource, id: &str) -> Result<(), ApiError> {
            if id == "missing" {
                return Err(ApiError::Status {
                    status: 404,
                    body: String::new(),
                });
            }
            Ok(())
        }

        async fn device_users(&self, _terminal_id: &str) -> Result<Vec<DeviceUser>, ApiError> {
            Ok(Vec::new())
        }

        async fn run_command(&self, _request: &CommandRequest) -> Result<CommandResult, ApiError> {
            Ok(CommandResult {
                message: Some("ok".to_string()),
                duration_ms: 3,
            })
        }
    }

    fn spawn_worker(
        delay: Duration,
    ) -> (
        mpsc::UnboundedSender<BackendTask>,
        mpsc::UnboundedReceiver<BackendEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(worker_loop(Arc::new(FakeApi { delay }), task_rx, event_tx));
        (task_tx, event_rx, handle)
    }

    #[tokio::test]
    async fn load_success_carries_generation() {
        let (task_tx, mut event_rx, _handle) = spawn_worker(Duration::ZERO);
        task_tx
            .send(BackendTask::Load {
                resource: Resource::Groups,
                generation: 7,
            })
            .expect("send task");

        match event_rx.recv().await.expect("event") {
            BackendEvent::Loaded {
                resource,
                generation,
                records,
            } => {
                assert_eq!(resource, Resource::Groups);
                assert_eq!(generation, 7);
                assert_eq!(records.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn load_failure_maps_status_to_notice() {
        let (task_tx, mut event_rx, _handle) = spawn_worker(Duration::ZERO);
        task_tx
            .send(BackendTask::Load {
                resource: Resource::Zones,
                generation: 2,
            })
            .expect("send task");

        match event_rx.recv().await.expect("event") {
            BackendEvent::Failed { load, notice, .. } => {
                assert_eq!(load, Some((Resource::Zones, 2)));
                assert_eq!(notice.route(), Some(Route::Unauthorized));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mutations_report_their_outcome() {
        let (task_tx, mut event_rx, _handle) = spawn_worker(Duration::ZERO);
        task_tx
            .send(BackendTask::Create {
                resource: Resource::Groups,
                payload: record(json!({ "name": "Night" })),
            })
            .expect("send task");
        match event_rx.recv().await.expect("event") {
            BackendEvent::Created { saved, .. } => {
                let saved = saved.expect("saved record");
                assert_eq!(Resource::Groups.record_id(&saved).as_deref(), Some("G9"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        task_tx
            .send(BackendTask::Delete {
                resource: Resource::Groups,
                id: "missing".to_string(),
            })
            .expect("send task");
        match event_rx.recv().await.expect("event") {
            BackendEvent::Failed {
                context, notice, ..
            } => {
                assert_eq!(context, "delete group missing");
                assert!(matches!(
                    notice,
                    Notice::Redirect {
                        route: Route::NotFound,
                        ..
                    }
                ));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_result_is_forwarded() {
        let (task_tx, mut event_rx, _handle) = spawn_worker(Duration::ZERO);
        let request = CommandRequest {
            command: DeviceCommand::SyncTime,
            terminal_id: "T1".to_string(),
            terminal_name: "Entrance".to_string(),
            employee_id: None,
        };
        task_tx
            .send(BackendTask::RunCommand {
                request: request.clone(),
            })
            .expect("send task");
        match event_rx.recv().await.expect("event") {
            BackendEvent::CommandFinished {
                request: finished,
                result,
            } => {
                assert_eq!(finished, request);
                assert_eq!(result.message.as_deref(), Some("ok"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_the_channel_aborts_in_flight_requests() {
        let (task_tx, mut event_rx, handle) = spawn_worker(Duration::from_secs(60));
        task_tx
            .send(BackendTask::Load {
                resource: Resource::Groups,
                generation: 1,
            })
            .expect("send task");
        drop(task_tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops promptly")
            .expect("worker did not panic");
        assert!(event_rx.recv().await.is_none());
    }
}

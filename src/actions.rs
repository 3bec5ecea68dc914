use crate::app::{App, BackendTask, ModalState, PendingConfirm};
use crate::domain::{CommandRequest, DeviceCommand, ListView, Resource};
use crate::forms::{FormMode, FormState};
use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;

pub(crate) fn send_task(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    task: BackendTask,
) -> Result<()> {
    app.task_started();
    task_tx
        .send(task)
        .map_err(|err| anyhow::anyhow!("failed to dispatch task: {err}"))
}

/// Starts a fresh load; any response to an earlier load becomes stale.
pub(crate) fn refresh_resource(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    resource: Resource,
) -> Result<()> {
    let generation = app.loads.begin(resource);
    send_task(
        app,
        task_tx,
        BackendTask::Load {
            resource,
            generation,
        },
    )
}

pub(crate) fn refresh_all(app: &mut App, task_tx: &UnboundedSender<BackendTask>) -> Result<()> {
    for resource in Resource::ALL {
        refresh_resource(app, task_tx, resource)?;
    }
    Ok(())
}

/// Reloads what the current view shows.
pub(crate) fn refresh_view(app: &mut App, task_tx: &UnboundedSender<BackendTask>) -> Result<()> {
    match app.view {
        ListView::Dashboard => {
            for resource in [
                Resource::Employees,
                Resource::Departments,
                Resource::Groups,
                Resource::Terminals,
            ] {
                refresh_resource(app, task_tx, resource)?;
            }
        }
        ListView::Transactions => {
            app.log(format!(
                "transactions arrive over the live feed ({})",
                app.feed_status.label()
            ));
        }
        ListView::Employees | ListView::Visitors | ListView::ExternalEmployees => {
            for resource in [Resource::Employees, Resource::Departments, Resource::Groups] {
                refresh_resource(app, task_tx, resource)?;
            }
        }
        view => {
            if let Some(resource) = view.resource() {
                refresh_resource(app, task_tx, resource)?;
            }
            if view == ListView::Terminals
                && let Some(terminal_id) = app.selected_terminal.clone()
            {
                send_task(app, task_tx, BackendTask::LoadDeviceUsers { terminal_id })?;
            }
        }
    }
    Ok(())
}

/// Builds one request per target. Fails with a user-facing message when the
/// preconditions are not met.
pub(crate) fn build_command_requests(
    app: &App,
    command: DeviceCommand,
) -> Result<Vec<CommandRequest>, String> {
    let Some(terminal_id) = app.selected_terminal.clone() else {
        return Err("select a terminal first".to_string());
    };
    let terminal_name = app
        .selected_terminal_name()
        .unwrap_or_else(|| terminal_id.clone());

    if !command.needs_employee() {
        return Ok(vec![CommandRequest {
            command,
            terminal_id,
            terminal_name,
            employee_id: None,
        }]);
    }

    let employees = app.tree.selected_employee_ids();
    if employees.is_empty() {
        return Err("select at least one employee in the tree first".to_string());
    }
    Ok(employees
        .into_iter()
        .map(|employee_id| CommandRequest {
            command,
            terminal_id: terminal_id.clone(),
            terminal_name: terminal_name.clone(),
            employee_id: Some(employee_id),
        })
        .collect())
}

pub(crate) fn dispatch_command(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    command: DeviceCommand,
) -> Result<()> {
    let requests = match build_command_requests(app, command) {
        Ok(requests) => requests,
        Err(message) => {
            app.log(message);
            return Ok(());
        }
    };

    if command.is_dangerous() {
        app.open_confirm(PendingConfirm::Commands(requests));
        return Ok(());
    }

    for request in requests {
        execute_command(app, task_tx, request)?;
    }
    Ok(())
}

pub(crate) fn execute_command(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    request: CommandRequest,
) -> Result<()> {
    app.log(format!("running {}", request.describe()));
    send_task(app, task_tx, BackendTask::RunCommand { request })
}

pub(crate) fn execute_confirmed(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    pending: PendingConfirm,
) -> Result<()> {
    match pending {
        PendingConfirm::Delete { resource, id, name } => {
            app.log(format!("deleting {} {name}", resource.singular()));
            send_task(app, task_tx, BackendTask::Delete { resource, id })
        }
        PendingConfirm::Commands(requests) => {
            for request in requests {
                execute_command(app, task_tx, request)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn load_device_users(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    terminal_id: String,
) -> Result<()> {
    send_task(app, task_tx, BackendTask::LoadDeviceUsers { terminal_id })
}

pub(crate) fn open_create_form(app: &mut App) {
    let Some(resource) = app.view.resource() else {
        app.log(format!("{} is read-only", app.view.title()));
        return;
    };
    let mut form = FormState::create(resource);
    if let Some(employee_type) = app.view.employee_type() {
        form.set_value("type", employee_type);
    }
    app.open_form(form);
}

pub(crate) fn open_edit_form(app: &mut App, mode: FormMode) {
    let Some(resource) = app.view.resource() else {
        app.log(format!("{} is read-only", app.view.title()));
        return;
    };
    let Some(record) = app.selected_record() else {
        app.log("select a row first".to_string());
        return;
    };
    match mode {
        FormMode::Duplicate => app.open_form(FormState::duplicate(resource, &record)),
        FormMode::Edit | FormMode::Create => match FormState::edit(resource, &record) {
            Some(form) => app.open_form(form),
            None => app.log(format!(
                "selected {} has no {}",
                resource.singular(),
                resource.id_field()
            )),
        },
    }
}

pub(crate) fn request_delete(app: &mut App) {
    let Some(resource) = app.view.resource() else {
        app.log(format!("{} is read-only", app.view.title()));
        return;
    };
    let Some(record) = app.selected_record() else {
        app.log("select a row first".to_string());
        return;
    };
    let Some(id) = resource.record_id(&record) else {
        app.log(format!(
            "selected {} has no {}",
            resource.singular(),
            resource.id_field()
        ));
        return;
    };
    let name = resource.record_name(&record);
    app.open_confirm(PendingConfirm::Delete { resource, id, name });
}

/// Validates the open form and sends it. An invalid form stays open with
/// the error shown.
pub(crate) fn submit_form(app: &mut App, task_tx: &UnboundedSender<BackendTask>) -> Result<()> {
    let ModalState::Form(form) = &mut app.modal else {
        return Ok(());
    };
    let payload = match form.build_payload() {
        Ok(payload) => payload,
        Err(err) => {
            form.error = Some(err.to_string());
            return Ok(());
        }
    };

    let resource = form.resource;
    let task = match (form.mode, form.target_id.clone()) {
        (FormMode::Edit, Some(id)) => BackendTask::Update {
            resource,
            id,
            payload,
        },
        _ => BackendTask::Create { resource, payload },
    };
    let title = form.title();
    app.close_modal();
    app.log(format!("{title}: saving"));
    send_task(app, task_tx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ConfirmStep;
    use crate::config::AppConfig;
    use crate::domain::Record;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    fn records(value: Value) -> Vec<Record> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            other => panic!("not an array: {other}"),
        }
    }

    fn load(app: &mut App, resource: Resource, value: Value) {
        let generation = app.loads.begin(resource);
        assert!(app.apply_loaded(resource, generation, records(value)));
    }

    fn terminal_app() -> App {
        let mut app = App::new(AppConfig::default());
        load(
            &mut app,
            Resource::Employees,
            json!([
                { "employeeID": "E1", "name": "Alice" },
                { "employeeID": "E2", "name": "Bob" }
            ]),
        );
        app.switch_view(ListView::Terminals);
        load(
            &mut app,
            Resource::Terminals,
            json!([{ "zktecoDeviceID": "T1", "deviceName": "Entrance" }]),
        );
        app
    }

    #[test]
    fn refresh_all_issues_one_load_per_resource() {
        let mut app = App::new(AppConfig::default());
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        refresh_all(&mut app, &task_tx).expect("refresh");

        let mut loaded = Vec::new();
        while let Ok(BackendTask::Load {
            resource,
            generation,
        }) = task_rx.try_recv()
        {
            assert!(app.loads.is_current(resource, generation));
            loaded.push(resource);
        }
        assert_eq!(loaded, Resource::ALL.to_vec());
        assert!(app.is_busy());
    }

    #[test]
    fn commands_require_a_terminal() {
        let mut app = terminal_app();
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        dispatch_command(&mut app, &task_tx, DeviceCommand::SyncTime).expect("dispatch");
        assert!(task_rx.try_recv().is_err());
        assert_eq!(app.logs.last().map(String::as_str), Some("select a terminal first"));
    }

    #[test]
    fn safe_command_is_sent_immediately() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        dispatch_command(&mut app, &task_tx, DeviceCommand::OpenDoor).expect("dispatch");

        match task_rx.try_recv() {
            Ok(BackendTask::RunCommand { request }) => {
                assert_eq!(request.command, DeviceCommand::OpenDoor);
                assert_eq!(request.terminal_id, "T1");
                assert_eq!(request.terminal_name, "Entrance");
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[test]
    fn dangerous_command_waits_for_confirmation() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        dispatch_command(&mut app, &task_tx, DeviceCommand::Restart).expect("dispatch");

        assert!(task_rx.try_recv().is_err());
        match &app.modal {
            ModalState::Confirm { pending, step, .. } => {
                assert_eq!(*step, ConfirmStep::Primary);
                assert_eq!(
                    pending.danger_phrase(false).as_deref(),
                    Some("RESTART Entrance")
                );
            }
            other => panic!("unexpected modal: {other:?}"),
        }
    }

    #[test]
    fn send_selected_needs_tree_selection() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        assert_eq!(
            build_command_requests(&app, DeviceCommand::SendSelectedUsers),
            Err("select at least one employee in the tree first".to_string())
        );
    }

    #[test]
    fn send_selected_builds_one_request_per_employee() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        // Root row selects every employee leaf.
        assert!(app.tree.toggle_at_cursor());

        let requests =
            build_command_requests(&app, DeviceCommand::SendSelectedUsers).expect("requests");
        let employees: Vec<Option<String>> =
            requests.into_iter().map(|r| r.employee_id).collect();
        assert_eq!(
            employees,
            vec![Some("E1".to_string()), Some("E2".to_string())]
        );
    }

    #[test]
    fn fetch_selected_targets_each_employee_without_confirmation() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        assert!(app.tree.toggle_at_cursor());
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        dispatch_command(&mut app, &task_tx, DeviceCommand::FetchSelectedUsers)
            .expect("dispatch");

        assert_eq!(app.modal, ModalState::None);
        let mut sent = Vec::new();
        while let Ok(BackendTask::RunCommand { request }) = task_rx.try_recv() {
            assert_eq!(
                request.command.path(&request.terminal_id),
                "Zkteco/SaveAllEmployeesOnDeviceToDB/T1"
            );
            sent.push(request.employee_id);
        }
        assert_eq!(sent, vec![Some("E1".to_string()), Some("E2".to_string())]);
    }

    #[test]
    fn delete_selected_confirms_once_then_sends_every_employee() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        assert!(app.tree.toggle_at_cursor());
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        dispatch_command(&mut app, &task_tx, DeviceCommand::DeleteSelectedUsers)
            .expect("dispatch");
        assert!(task_rx.try_recv().is_err());

        let pending = match &app.modal {
            ModalState::Confirm { pending, .. } => pending.clone(),
            other => panic!("unexpected modal: {other:?}"),
        };
        assert_eq!(
            pending.danger_phrase(false).as_deref(),
            Some("REMOVE USERS Entrance")
        );
        assert_eq!(pending.summary(), "delete-selected-users on Entrance (2 employees)");

        app.close_modal();
        execute_confirmed(&mut app, &task_tx, pending).expect("execute");
        let mut sent = Vec::new();
        while let Ok(BackendTask::RunCommand { request }) = task_rx.try_recv() {
            assert_eq!(request.command, DeviceCommand::DeleteSelectedUsers);
            sent.push(request.employee_id);
        }
        assert_eq!(sent, vec![Some("E1".to_string()), Some("E2".to_string())]);
    }

    #[test]
    fn delete_selected_needs_tree_selection() {
        let mut app = terminal_app();
        app.toggle_terminal_at_cursor();
        assert_eq!(
            build_command_requests(&app, DeviceCommand::DeleteSelectedUsers),
            Err("select at least one employee in the tree first".to_string())
        );
    }

    #[test]
    fn visitor_form_is_created_as_visitor() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::Visitors);
        open_create_form(&mut app);
        let ModalState::Form(form) = &app.modal else {
            panic!("unexpected modal: {:?}", app.modal);
        };
        assert_eq!(form.resource, Resource::Employees);
        let err = form.build_payload().expect_err("required fields are blank");
        assert!(err.to_string().contains("required"));

        let type_index = form
            .fields()
            .iter()
            .position(|field| field.key == "type")
            .expect("type field");
        assert_eq!(form.values[type_index], "Visitante");
    }

    #[test]
    fn refresh_of_a_typed_view_reloads_the_tree_inputs() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::ExternalEmployees);
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        refresh_view(&mut app, &task_tx).expect("refresh");

        let mut loaded = Vec::new();
        while let Ok(BackendTask::Load { resource, .. }) = task_rx.try_recv() {
            loaded.push(resource);
        }
        assert_eq!(
            loaded,
            vec![Resource::Employees, Resource::Departments, Resource::Groups]
        );
    }

    #[test]
    fn invalid_form_stays_open_with_error() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::Terminals);
        open_create_form(&mut app);
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        submit_form(&mut app, &task_tx).expect("submit");

        assert!(task_rx.try_recv().is_err());
        match &app.modal {
            ModalState::Form(form) => assert!(form.error.is_some()),
            other => panic!("unexpected modal: {other:?}"),
        }
    }

    #[test]
    fn edit_form_submits_update_by_id() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::Groups);
        load(
            &mut app,
            Resource::Groups,
            json!([{ "groupID": 4, "name": "Day", "extra": true }]),
        );
        open_edit_form(&mut app, FormMode::Edit);
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        submit_form(&mut app, &task_tx).expect("submit");

        assert_eq!(app.modal, ModalState::None);
        match task_rx.try_recv() {
            Ok(BackendTask::Update {
                resource,
                id,
                payload,
            }) => {
                assert_eq!(resource, Resource::Groups);
                assert_eq!(id, "4");
                assert_eq!(payload.get("extra"), Some(&json!(true)));
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[test]
    fn duplicate_submits_create_without_id() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::Groups);
        load(&mut app, Resource::Groups, json!([{ "groupID": 4, "name": "Day" }]));
        open_edit_form(&mut app, FormMode::Duplicate);
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackendTask>();
        submit_form(&mut app, &task_tx).expect("submit");

        match task_rx.try_recv() {
            Ok(BackendTask::Create { payload, .. }) => {
                assert!(payload.get("groupID").is_none());
                assert_eq!(payload.get("name"), Some(&json!("Day")));
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[test]
    fn delete_request_opens_confirmation() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::Zones);
        load(&mut app, Resource::Zones, json!([{ "zoneID": "Z1", "name": "Lobby" }]));
        request_delete(&mut app);
        match &app.modal {
            ModalState::Confirm { pending, .. } => assert_eq!(
                *pending,
                PendingConfirm::Delete {
                    resource: Resource::Zones,
                    id: "Z1".to_string(),
                    name: "Lobby".to_string(),
                }
            ),
            other => panic!("unexpected modal: {other:?}"),
        }
    }

    #[test]
    fn read_only_views_reject_forms() {
        let mut app = App::new(AppConfig::default());
        app.switch_view(ListView::Transactions);
        open_create_form(&mut app);
        assert_eq!(app.modal, ModalState::None);
        assert_eq!(app.logs.len(), 1);
    }
}

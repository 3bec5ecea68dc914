use crate::actions::{
    dispatch_command, execute_confirmed, load_device_users, open_create_form, open_edit_form,
    refresh_all, refresh_resource, refresh_view, request_delete, submit_form,
};
use crate::app::{App, BackendEvent, BackendTask, ConfirmStep, ModalState, PaneFocus, PendingConfirm};
use crate::domain::{DeviceCommand, ListView, Resource};
use crate::forms::FormMode;
use crate::table;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

const LOG_PAGE: usize = 10;

pub(crate) fn handle_backend_event(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    event: BackendEvent,
) -> Result<()> {
    match event {
        BackendEvent::Loaded {
            resource,
            generation,
            records,
        } => {
            app.task_finished();
            let count = records.len();
            if app.apply_loaded(resource, generation, records) {
                app.log(format!("loaded {count} {}", resource.label()));
            } else {
                debug!(%resource, generation, "discarded stale load");
            }
        }
        BackendEvent::Created {
            resource,
            payload,
            saved,
        } => {
            app.task_finished();
            app.apply_created(resource, payload, saved);
            app.log(format!("created {}", resource.singular()));
            refresh_resource(app, task_tx, resource)?;
        }
        BackendEvent::Updated {
            resource,
            id,
            payload,
            saved,
        } => {
            app.task_finished();
            app.apply_updated(resource, &id, payload, saved);
            app.log(format!("updated {} {id}", resource.singular()));
            refresh_resource(app, task_tx, resource)?;
        }
        BackendEvent::Deleted { resource, id } => {
            app.task_finished();
            app.apply_deleted(resource, &id);
            app.log(format!("deleted {} {id}", resource.singular()));
            refresh_resource(app, task_tx, resource)?;
        }
        BackendEvent::DeviceUsersLoaded { terminal_id, users } => {
            app.task_finished();
            if app.selected_terminal.as_deref() == Some(terminal_id.as_str()) {
                app.log(format!("{} users enrolled on {terminal_id}", users.len()));
                app.device_users = users;
            } else {
                debug!(terminal = %terminal_id, "device users for a deselected terminal");
            }
        }
        BackendEvent::CommandFinished { request, result } => {
            app.task_finished();
            let mut line = format!("{} done in {}ms", request.describe(), result.duration_ms);
            if let Some(message) = &result.message {
                line.push_str(&format!(": {message}"));
            }
            app.log(line);
            match request.command {
                DeviceCommand::FetchUsers | DeviceCommand::FetchSelectedUsers => {
                    refresh_resource(app, task_tx, Resource::Employees)?;
                    reload_device_users(app, task_tx, &request.terminal_id)?;
                }
                DeviceCommand::SendAllUsers
                | DeviceCommand::SendSelectedUsers
                | DeviceCommand::DeleteAllUsers
                | DeviceCommand::DeleteSelectedUsers => {
                    reload_device_users(app, task_tx, &request.terminal_id)?;
                }
                _ => {}
            }
        }
        BackendEvent::Failed {
            context,
            load,
            notice,
            detail,
        } => {
            app.task_finished();
            if let Some((resource, generation)) = load
                && !app.loads.finish_err(resource, generation, detail.clone())
            {
                debug!(%resource, generation, "discarded stale load failure");
                return Ok(());
            }
            app.log(format!("error[{context}]: {detail}"));
            app.apply_notice(&notice);
        }
        BackendEvent::Feed(event) => app.apply_feed(event),
    }

    Ok(())
}

fn reload_device_users(
    app: &mut App,
    task_tx: &UnboundedSender<BackendTask>,
    terminal_id: &str,
) -> Result<()> {
    if app.selected_terminal.as_deref() == Some(terminal_id) {
        load_device_users(app, task_tx, terminal_id.to_string())?;
    }
    Ok(())
}

fn is_plain_char(key: &KeyEvent) -> bool {
    !key.modifiers.contains(KeyModifiers::CONTROL)
        && !key.modifiers.contains(KeyModifiers::ALT)
        && !key.modifiers.contains(KeyModifiers::SUPER)
}

pub(crate) fn handle_key_event(
    app: &mut App,
    key: KeyEvent,
    task_tx: &UnboundedSender<BackendTask>,
) -> Result<()> {
    if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return Ok(());
    }

    match app.modal.clone() {
        ModalState::None => handle_key_without_modal(app, key, task_tx),
        ModalState::Help => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?') | KeyCode::Char('q')
            ) {
                app.close_modal();
            }
            Ok(())
        }
        ModalState::TreeSearch { .. } => {
            handle_tree_search_key(app, key);
            Ok(())
        }
        ModalState::TableFilter { .. } => {
            handle_table_filter_key(app, key);
            Ok(())
        }
        ModalState::CommandMenu { .. } => handle_command_menu_key(app, key, task_tx),
        ModalState::ColumnPicker { .. } => {
            handle_column_picker_key(app, key);
            Ok(())
        }
        ModalState::Confirm { .. } => handle_confirm_key(app, key, task_tx),
        ModalState::Form(_) => handle_form_key(app, key, task_tx),
    }
}

fn handle_key_without_modal(
    app: &mut App,
    key: KeyEvent,
    task_tx: &UnboundedSender<BackendTask>,
) -> Result<()> {
    if app.route.is_some() {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => app.route = None,
            KeyCode::Char('q') => app.should_quit = true,
            _ => {}
        }
        return Ok(());
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('?') => app.open_help(),
        KeyCode::Tab => app.cycle_focus(),
        KeyCode::Char('r') => refresh_view(app, task_tx)?,
        KeyCode::Char('R') => refresh_all(app, task_tx)?,
        KeyCode::Char(c) if c.is_ascii_digit() && is_plain_char(&key) => {
            if let Some(view) = ListView::from_shortcut(c) {
                app.switch_view(view);
            }
        }
        _ => match app.focus {
            PaneFocus::Tree => handle_tree_key(app, key),
            PaneFocus::Table => handle_table_key(app, key, task_tx)?,
            PaneFocus::Log => handle_log_key(app, key),
        },
    }

    Ok(())
}

fn handle_tree_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.tree.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.tree.select_prev(),
        KeyCode::Char('l') | KeyCode::Right => {
            app.tree.expand_at_cursor();
        }
        KeyCode::Char('h') | KeyCode::Left => {
            app.tree.collapse_at_cursor();
        }
        KeyCode::Char(' ') => {
            if app.tree.toggle_at_cursor() {
                app.sync_selection_bounds();
            }
        }
        KeyCode::Char('/') => app.open_tree_search(),
        KeyCode::Char('c') => {
            if app.tree.clear_selection() {
                app.sync_selection_bounds();
                app.log("cleared tree selection".to_string());
            }
        }
        KeyCode::Esc if !app.tree.search().is_empty() => app.set_tree_search(""),
        _ => {}
    }
}

fn handle_table_key(
    app: &mut App,
    key: KeyEvent,
    task_tx: &UnboundedSender<BackendTask>,
) -> Result<()> {
    let terminals = app.view == ListView::Terminals;
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
        KeyCode::Char('/') => app.open_table_filter(),
        KeyCode::Esc if !app.table_filter.is_empty() => app.set_table_filter(""),
        KeyCode::Char('n') => open_create_form(app),
        KeyCode::Char('e') | KeyCode::Enter => open_edit_form(app, FormMode::Edit),
        KeyCode::Char('y') => open_edit_form(app, FormMode::Duplicate),
        KeyCode::Char('x') | KeyCode::Delete => request_delete(app),
        KeyCode::Char('o') if !table::catalogue(app.view).is_empty() => app.open_column_picker(),
        KeyCode::Char(' ') if terminals => {
            if let Some(terminal_id) = app.toggle_terminal_at_cursor() {
                app.log(format!("selected terminal {terminal_id}"));
                load_device_users(app, task_tx, terminal_id)?;
            }
        }
        KeyCode::Char('a') if terminals => app.open_command_menu(),
        KeyCode::Char('u') if terminals => {
            app.device_user_filter = app.device_user_filter.next();
        }
        _ => {}
    }
    Ok(())
}

fn handle_log_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            app.scroll_log_down(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.scroll_log_up(1);
        }
        KeyCode::PageDown => {
            app.scroll_log_down(LOG_PAGE);
        }
        KeyCode::PageUp => {
            app.scroll_log_up(LOG_PAGE);
        }
        _ => {}
    }
}

fn handle_tree_search_key(app: &mut App, key: KeyEvent) {
    let mut apply: Option<String> = None;

    {
        let ModalState::TreeSearch { value, original } = &mut app.modal else {
            return;
        };

        match key.code {
            KeyCode::Esc => {
                let original = original.clone();
                app.close_modal();
                app.set_tree_search(&original);
                return;
            }
            KeyCode::Enter => {
                app.close_modal();
                return;
            }
            KeyCode::Backspace => {
                value.pop();
                apply = Some(value.clone());
            }
            KeyCode::Char(c) if is_plain_char(&key) => {
                value.push(c);
                apply = Some(value.clone());
            }
            _ => {}
        }
    }

    if let Some(term) = apply {
        app.set_tree_search(&term);
    }
}

fn handle_table_filter_key(app: &mut App, key: KeyEvent) {
    let mut apply: Option<String> = None;

    {
        let ModalState::TableFilter { value, original } = &mut app.modal else {
            return;
        };

        match key.code {
            KeyCode::Esc => {
                let original = original.clone();
                app.close_modal();
                app.set_table_filter(&original);
                return;
            }
            KeyCode::Enter => {
                app.close_modal();
                return;
            }
            KeyCode::Backspace => {
                value.pop();
                apply = Some(value.clone());
            }
            KeyCode::Char(c) if is_plain_char(&key) => {
                value.push(c);
                apply = Some(value.clone());
            }
            _ => {}
        }
    }

    if let Some(text) = apply {
        app.set_table_filter(&text);
    }
}

fn handle_command_menu_key(
    app: &mut App,
    key: KeyEvent,
    task_tx: &UnboundedSender<BackendTask>,
) -> Result<()> {
    let mut chosen: Option<DeviceCommand> = None;
    let mut no_match = false;

    {
        let ModalState::CommandMenu { selected, filter } = &mut app.modal else {
            return Ok(());
        };

        match key.code {
            KeyCode::Esc => {
                app.close_modal();
                return Ok(());
            }
            KeyCode::Down => {
                let items = App::command_menu_items(filter);
                if !items.is_empty() {
                    *selected = (*selected + 1) % items.len();
                }
            }
            KeyCode::Up => {
                let items = App::command_menu_items(filter);
                if !items.is_empty() {
                    *selected = if *selected == 0 {
                        items.len() - 1
                    } else {
                        *selected - 1
                    };
                }
            }
            KeyCode::Backspace => {
                filter.pop();
                *selected = 0;
            }
            KeyCode::Char(c) if is_plain_char(&key) => {
                filter.push(c);
                *selected = 0;
            }
            KeyCode::Enter => match App::command_menu_items(filter).get(*selected) {
                Some(command) => chosen = Some(*command),
                None => no_match = true,
            },
            _ => {}
        }
    }

    if no_match {
        app.log("no command matches the filter".to_string());
    }
    if let Some(command) = chosen {
        app.close_modal();
        dispatch_command(app, task_tx, command)?;
    }

    Ok(())
}

fn handle_column_picker_key(app: &mut App, key: KeyEvent) {
    let view = app.view;
    let columns = table::catalogue(view);
    let ModalState::ColumnPicker { selected } = &mut app.modal else {
        return;
    };

    match key.code {
        KeyCode::Esc | KeyCode::Enter => app.close_modal(),
        KeyCode::Char('j') | KeyCode::Down => {
            if !columns.is_empty() {
                *selected = (*selected + 1) % columns.len();
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if !columns.is_empty() {
                *selected = if *selected == 0 {
                    columns.len() - 1
                } else {
                    *selected - 1
                };
            }
        }
        KeyCode::Char(' ') => {
            if let Some(column) = columns.get(*selected)
                && !table::toggle_column(view, &mut app.config.columns, &column.key)
            {
                app.log("at least one column must stay visible".to_string());
            }
        }
        KeyCode::Char('a') => table::select_all_columns(view, &mut app.config.columns),
        KeyCode::Char('r') => table::reset_columns(view, &mut app.config.columns),
        _ => {}
    }
}

fn handle_confirm_key(
    app: &mut App,
    key: KeyEvent,
    task_tx: &UnboundedSender<BackendTask>,
) -> Result<()> {
    let mut confirmed: Option<PendingConfirm> = None;
    let mut pending_log: Option<String> = None;
    let two_step = app.config.require_two_step_confirmation;

    {
        let ModalState::Confirm {
            pending,
            step,
            typed,
        } = &mut app.modal
        else {
            return Ok(());
        };

        match key.code {
            KeyCode::Esc => {
                let summary = pending.summary();
                app.close_modal();
                app.log(format!("cancelled: {summary}"));
                return Ok(());
            }
            KeyCode::Enter => match step {
                ConfirmStep::Primary => {
                    if pending.danger_phrase(two_step).is_some() {
                        *step = ConfirmStep::DangerPhrase;
                    } else {
                        confirmed = Some(pending.clone());
                    }
                }
                ConfirmStep::DangerPhrase => {
                    if let Some(phrase) = pending.danger_phrase(two_step) {
                        if typed.as_str() == phrase {
                            confirmed = Some(pending.clone());
                        } else {
                            pending_log = Some(format!(
                                "Confirmation phrase mismatch. required={phrase} input={typed}"
                            ));
                        }
                    }
                }
            },
            KeyCode::Backspace => {
                if matches!(step, ConfirmStep::DangerPhrase) {
                    typed.pop();
                }
            }
            KeyCode::Char(c) if is_plain_char(&key) => {
                if matches!(step, ConfirmStep::DangerPhrase) {
                    typed.push(c);
                }
            }
            _ => {}
        }
    }

    if let Some(line) = pending_log {
        app.log(line);
    }

    if let Some(pending) = confirmed {
        app.close_modal();
        execute_confirmed(app, task_tx, pending)?;
    }

    Ok(())
}

fn handle_form_key(
    app: &mut App,
    key: KeyEvent,
    task_tx: &UnboundedSender<BackendTask>,
) -> Result<()> {
    let ModalState::Form(form) = &mut app.modal else {
        return Ok(());
    };

    match key.code {
        KeyCode::Esc => app.close_modal(),
        KeyCode::Tab | KeyCode::Down => form.next_field(),
        KeyCode::BackTab | KeyCode::Up => form.prev_field(),
        KeyCode::Backspace => form.pop_char(),
        KeyCode::Enter => submit_form(app, task_tx)?,
        KeyCode::Char(c) if is_plain_char(&key) => form.push_char(c),
        _ => {}
    }

    Ok(())
}

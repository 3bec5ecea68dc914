use crate::config::AppConfig;
use crate::dashboard::DashboardSummary;
use crate::directory::Directory;
use crate::domain::{
    CommandRequest, CommandResult, DeviceCommand, DeviceUser, DeviceUserFilter, ListView, Record,
    Resource,
};
use crate::error::{Notice, Route};
use crate::feed::{FeedEvent, FeedStatus, Transaction, TransactionLog};
use crate::forms::FormState;
use crate::loading::LoadTracker;
use crate::table;
use crate::tree::TreeState;
use chrono::NaiveDate;

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneFocus {
    Tree,
    Table,
    Log,
}

impl PaneFocus {
    pub fn next(self) -> Self {
        match self {
            Self::Tree => Self::Table,
            Self::Table => Self::Log,
            Self::Log => Self::Tree,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStep {
    Primary,
    DangerPhrase,
}

/// An operation waiting for the user to confirm it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirm {
    Delete {
        resource: Resource,
        id: String,
        name: String,
    },
    /// One request per target employee, confirmed together.
    Commands(Vec<CommandRequest>),
}

impl PendingConfirm {
    pub fn summary(&self) -> String {
        match self {
            Self::Delete { resource, id, name } => {
                format!("delete {} {name} ({id})", resource.singular())
            }
            Self::Commands(requests) => match requests.as_slice() {
                [request] => request.describe(),
                [first, ..] => format!(
                    "{} on {} ({} employees)",
                    first.command.label(),
                    first.terminal_name,
                    requests.len()
                ),
                [] => "no command".to_string(),
            },
        }
    }

    /// Phrase to type on the second step. Record deletion only asks for one
    /// when two-step confirmation is enabled.
    pub fn danger_phrase(&self, two_step: bool) -> Option<String> {
        match self {
            Self::Delete { name, .. } => two_step.then(|| format!("DELETE {name}")),
            Self::Commands(requests) => requests
                .first()
                .and_then(CommandRequest::confirmation_phrase),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalState {
    None,
    Help,
    TreeSearch {
        value: String,
        original: String,
    },
    TableFilter {
        value: String,
        original: String,
    },
    CommandMenu {
        selected: usize,
        filter: String,
    },
    ColumnPicker {
        selected: usize,
    },
    Confirm {
        pending: PendingConfirm,
        step: ConfirmStep,
        typed: String,
    },
    Form(FormState),
}

#[derive(Debug, Clone)]
pub enum BackendTask {
    Load {
        resource: Resource,
        generation: u64,
    },
    Create {
        resource: Resource,
        payload: Record,
    },
    Update {
        resource: Resource,
        id: String,
        payload: Record,
    },
    Delete {
        resource: Resource,
        id: String,
    },
    LoadDeviceUsers {
        terminal_id: String,
    },
    RunCommand {
        request: CommandRequest,
    },
}

#[derive(Debug, Clone)]
pub enum BackendEvent {
    Loaded {
        resource: Resource,
        generation: u64,
        records: Vec<Record>,
    },
    Created {
        resource: Resource,
        payload: Record,
        saved: Option<Record>,
    },
    Updated {
        resource: Resource,
        id: String,
        payload: Record,
        saved: Option<Record>,
    },
    Deleted {
        resource: Resource,
        id: String,
    },
    DeviceUsersLoaded {
        terminal_id: String,
        users: Vec<DeviceUser>,
    },
    CommandFinished {
        request: CommandRequest,
        result: CommandResult,
    },
    Failed {
        context: String,
        /// Set when the failed task was a list load.
        load: Option<(Resource, u64)>,
        notice: Notice,
        detail: String,
    },
    Feed(FeedEvent),
}

pub struct App {
    pub config: AppConfig,
    pub focus: PaneFocus,
    pub view: ListView,
    pub directory: Directory,
    pub loads: LoadTracker,
    pub tree: TreeState,
    pub table_filter: String,
    pub selected_index: usize,
    list_scroll: usize,
    pub selected_terminal: Option<String>,
    pub device_users: Vec<DeviceUser>,
    pub device_user_filter: DeviceUserFilter,
    pub transactions: TransactionLog,
    pub feed_status: FeedStatus,
    pub dashboard: DashboardSummary,
    pub logs: Vec<String>,
    pub log_tail_offset: usize,
    pub modal: ModalState,
    pub in_flight: usize,
    pub route: Option<Route>,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let view = ListView::from_key(&config.start_view).unwrap_or(ListView::Employees);
        let transactions = TransactionLog::with_capacity(config.transaction_log_capacity);
        Self {
            config,
            focus: if view.shows_tree() {
                PaneFocus::Tree
            } else {
                PaneFocus::Table
            },
            view,
            directory: Directory::default(),
            loads: LoadTracker::new(),
            tree: TreeState::new(),
            table_filter: String::new(),
            selected_index: 0,
            list_scroll: 0,
            selected_terminal: None,
            device_users: Vec::new(),
            device_user_filter: DeviceUserFilter::default(),
            transactions,
            feed_status: FeedStatus::Connecting,
            dashboard: DashboardSummary::default(),
            logs: Vec::new(),
            log_tail_offset: 0,
            modal: ModalState::None,
            in_flight: 0,
            route: None,
            should_quit: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0 || self.loads.any_loading()
    }

    pub fn task_started(&mut self) {
        self.in_flight += 1;
    }

    pub fn task_finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn switch_view(&mut self, view: ListView) {
        if self.view == view {
            return;
        }
        self.view = view;
        // Each employee view has a tree of its own employee type.
        if view.shows_tree() {
            self.rebuild_tree();
        }
        self.table_filter.clear();
        self.selected_index = 0;
        self.list_scroll = 0;
        if self.focus == PaneFocus::Tree && !view.shows_tree() {
            self.focus = PaneFocus::Table;
        }
    }

    pub fn cycle_focus(&mut self) {
        let mut next = self.focus.next();
        if next == PaneFocus::Tree && !self.view.shows_tree() {
            next = next.next();
        }
        self.focus = next;
    }

    /// Rows of the current view after the tree selection and text filter.
    pub fn current_rows(&self) -> Vec<&Record> {
        match self.view {
            ListView::Dashboard => Vec::new(),
            ListView::Transactions => table::filter_records(
                self.transactions.iter_latest().map(Transaction::record),
                &self.table_filter,
            ),
            view if view.shows_tree() => table::filter_employees(
                self.employee_records(),
                &self.tree.selected_employee_ids(),
                &self.table_filter,
            ),
            view => view
                .resource()
                .map(|resource| {
                    table::filter_records(self.directory.records(resource), &self.table_filter)
                })
                .unwrap_or_default(),
        }
    }

    /// Employee records of the `type` the current view is narrowed to.
    pub fn employee_records(&self) -> Vec<&Record> {
        let employee_type = self.view.employee_type();
        self.directory
            .records(Resource::Employees)
            .iter()
            .filter(|record| table::employee_type_matches(record, employee_type))
            .collect()
    }

    pub fn current_len(&self) -> usize {
        self.current_rows().len()
    }

    pub fn selected_record(&self) -> Option<Record> {
        self.current_rows()
            .get(self.selected_index)
            .map(|record| (*record).clone())
    }

    pub fn select_next(&mut self) {
        let len = self.current_len();
        if len == 0 {
            self.selected_index = 0;
            return;
        }
        self.selected_index = (self.selected_index + 1) % len;
    }

    pub fn select_prev(&mut self) {
        let len = self.current_len();
        if len == 0 {
            self.selected_index = 0;
            return;
        }
        if self.selected_index == 0 {
            self.selected_index = len - 1;
        } else {
            self.selected_index -= 1;
        }
    }

    pub fn list_scroll(&self) -> usize {
        self.list_scroll
    }

    pub fn sync_list_scroll(&mut self, viewport_rows: usize) {
        let len = self.current_len();
        if len == 0 {
            self.list_scroll = 0;
            return;
        }

        let rows = viewport_rows.max(1);
        if self.selected_index < self.list_scroll {
            self.list_scroll = self.selected_index;
        } else if self.selected_index >= self.list_scroll + rows {
            self.list_scroll = self.selected_index + 1 - rows;
        }

        let max_offset = len.saturating_sub(rows);
        if self.list_scroll > max_offset {
            self.list_scroll = max_offset;
        }
    }

    pub fn sync_selection_bounds(&mut self) {
        let len = self.current_len();
        if len == 0 {
            self.selected_index = 0;
            self.list_scroll = 0;
        } else if self.selected_index >= len {
            self.selected_index = len - 1;
        }
    }

    pub fn set_table_filter(&mut self, value: &str) {
        self.table_filter = value.to_string();
        self.sync_selection_bounds();
    }

    pub fn set_tree_search(&mut self, value: &str) {
        self.tree.set_search(value);
    }

    pub fn rebuild_tree(&mut self) {
        let departments = self.directory.departments();
        let groups = self.directory.groups();
        let employees = self.directory.employees_of_type(self.view.employee_type());
        self.tree.rebuild(&departments, &groups, &employees);
        self.sync_selection_bounds();
    }

    pub fn refresh_dashboard(&mut self) {
        self.refresh_dashboard_at(chrono::Local::now().date_naive());
    }

    pub fn refresh_dashboard_at(&mut self, today: NaiveDate) {
        self.dashboard = DashboardSummary::compute(&self.directory, today);
    }

    fn directory_changed(&mut self, resource: Resource) {
        if resource.feeds_tree() {
            self.rebuild_tree();
        }
        if resource == Resource::Terminals
            && let Some(id) = self.selected_terminal.clone()
            && self.directory.find(Resource::Terminals, &id).is_none()
        {
            self.selected_terminal = None;
            self.device_users.clear();
        }
        self.refresh_dashboard();
        self.sync_selection_bounds();
    }

    /// Stores a list response. Returns false when a newer load superseded it.
    pub fn apply_loaded(&mut self, resource: Resource, generation: u64, records: Vec<Record>) -> bool {
        if !self.loads.finish_ok(resource, generation, records.len()) {
            return false;
        }
        self.directory.replace(resource, records);
        self.directory_changed(resource);
        true
    }

    pub fn apply_created(&mut self, resource: Resource, payload: Record, saved: Option<Record>) {
        self.directory.upsert(resource, saved.unwrap_or(payload));
        self.directory_changed(resource);
    }

    pub fn apply_updated(
        &mut self,
        resource: Resource,
        id: &str,
        payload: Record,
        saved: Option<Record>,
    ) {
        let mut record = saved.unwrap_or(payload);
        if resource.record_id(&record).is_none() {
            record.insert(
                resource.id_field().to_string(),
                serde_json::Value::String(id.to_string()),
            );
        }
        self.directory.upsert(resource, record);
        self.directory_changed(resource);
    }

    pub fn apply_deleted(&mut self, resource: Resource, id: &str) -> bool {
        let removed = self.directory.remove(resource, id);
        self.directory_changed(resource);
        removed
    }

    pub fn apply_notice(&mut self, notice: &Notice) {
        self.log(notice.message().to_string());
        if let Some(route) = notice.route() {
            self.route = Some(route);
        }
    }

    pub fn apply_feed(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Status(status) => {
                match &status {
                    FeedStatus::Failed(reason) => {
                        self.log(format!("transaction feed failed: {reason}"))
                    }
                    other => self.log(format!("transaction feed {}", other.label())),
                }
                self.feed_status = status;
            }
            FeedEvent::Transaction(transaction) => {
                self.transactions.push(transaction);
                if self.view == ListView::Transactions {
                    self.sync_selection_bounds();
                }
            }
            FeedEvent::Rejected(reason) => {
                self.log(format!("dropped transaction message: {reason}"));
            }
        }
    }

    /// Marks the terminal under the cursor as the command target, or clears
    /// the mark when it is already selected. Returns the newly selected id.
    pub fn toggle_terminal_at_cursor(&mut self) -> Option<String> {
        if self.view != ListView::Terminals {
            return None;
        }
        let id = self
            .selected_record()
            .and_then(|record| Resource::Terminals.record_id(&record))?;
        self.device_users.clear();
        if self.selected_terminal.as_deref() == Some(id.as_str()) {
            self.selected_terminal = None;
            return None;
        }
        self.selected_terminal = Some(id.clone());
        Some(id)
    }

    pub fn selected_terminal_name(&self) -> Option<String> {
        let id = self.selected_terminal.as_deref()?;
        Some(
            self.directory
                .name_of(Resource::Terminals, id)
                .unwrap_or_else(|| id.to_string()),
        )
    }

    pub fn visible_device_users(&self) -> Vec<&DeviceUser> {
        self.device_users
            .iter()
            .filter(|user| self.device_user_filter.matches(user))
            .collect()
    }

    pub fn command_menu_items(filter: &str) -> Vec<DeviceCommand> {
        let query = filter.trim().to_lowercase();
        DeviceCommand::ALL
            .iter()
            .copied()
            .filter(|command| query.is_empty() || command.label().to_lowercase().contains(&query))
            .collect()
    }

    pub fn open_help(&mut self) {
        self.modal = ModalState::Help;
    }

    pub fn open_command_menu(&mut self) {
        self.modal = ModalState::CommandMenu {
            selected: 0,
            filter: String::new(),
        };
    }

    pub fn open_column_picker(&mut self) {
        self.modal = ModalState::ColumnPicker { selected: 0 };
    }

    pub fn open_tree_search(&mut self) {
        let current = self.tree.search().to_string();
        self.modal = ModalState::TreeSearch {
            value: current.clone(),
            original: current,
        };
    }

    pub fn open_table_filter(&mut self) {
        self.modal = ModalState::TableFilter {
            value: self.table_filter.clone(),
            original: self.table_filter.clone(),
        };
    }

    pub fn open_confirm(&mut self, pending: PendingConfirm) {
        self.modal = ModalState::Confirm {
            pending,
            step: ConfirmStep::Primary,
            typed: String::new(),
        };
    }

    pub fn open_form(&mut self, form: FormState) {
        self.modal = ModalState::Form(form);
    }

    pub fn close_modal(&mut self) {
        self.modal = ModalState::None;
    }

    pub fn log(&mut self, line: String) {
        self.logs.push(line);
        if self.log_tail_offset > 0 {
            self.log_tail_offset = self.log_tail_offset.saturating_add(1);
        }
        if self.logs.len() > MAX_LOG_LINES {
            let to_trim = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(0..to_trim);
        }
        self.log_tail_offset = self
            .log_tail_offset
            .min(self.logs.len().saturating_sub(1));
    }

    pub fn scroll_log_up(&mut self, lines: usize) -> bool {
        let before = self.log_tail_offset;
        let max = self.logs.len().saturating_sub(1);
        self.log_tail_offset = self.log_tail_offset.saturating_add(lines).min(max);
        self.log_tail_offset != before
    }

    pub fn scroll_log_down(&mut self, lines: usize) -> bool {
        let before = self.log_tail_offset;
        self.log_tail_offset = self.log_tail_offset.saturating_sub(lines);
        self.log_tail_offset != before
    }
}

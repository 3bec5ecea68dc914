use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;

/// A backend entity as received over the wire. Unknown fields are kept so an
/// update can send the full object back.
pub type Record = Map<String, Value>;

/// Normalises an identifier-like JSON value. Backends send ids and codes as
/// either strings or numbers; blank strings count as absent.
pub fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Reads `key` from a record as an identifier.
pub fn record_key(record: &Record, key: &str) -> Option<String> {
    record.get(key).and_then(value_to_key)
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_key))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_opt_string(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("identifier is null or blank"))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(raw)) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "sim"
        ),
        _ => false,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Department {
    #[serde(rename = "departmentID", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Parent reference, resolved against the parent's `code`.
    #[serde(rename = "paiId", default, deserialize_with = "lenient_opt_string")]
    pub parent_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    #[serde(rename = "groupID", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Employee {
    #[serde(rename = "employeeID", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "departmentId", default, deserialize_with = "lenient_opt_string")]
    pub department_id: Option<String>,
    #[serde(rename = "groupId", default, deserialize_with = "lenient_opt_string")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
}

/// A user enrolled on a biometric terminal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceUser {
    #[serde(rename = "employeeID", default, deserialize_with = "lenient_opt_string")]
    pub employee_id: Option<String>,
    #[serde(rename = "enrollNumber", default, deserialize_with = "lenient_opt_string")]
    pub enroll_number: Option<String>,
    #[serde(rename = "employeeName", default)]
    pub employee_name: Option<String>,
    #[serde(rename = "cardNumber", default, deserialize_with = "lenient_opt_string")]
    pub card_number: Option<String>,
    #[serde(rename = "statusFprint", default, deserialize_with = "lenient_bool")]
    pub fingerprint: bool,
    #[serde(rename = "statusFace", default, deserialize_with = "lenient_bool")]
    pub face: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceUserFilter {
    #[default]
    All,
    Fingerprint,
    Face,
}

impl DeviceUserFilter {
    pub fn next(self) -> Self {
        match self {
            Self::All => Self::Fingerprint,
            Self::Fingerprint => Self::Face,
            Self::Face => Self::All,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::All => "all users",
            Self::Fingerprint => "fingerprint enrolled",
            Self::Face => "face enrolled",
        }
    }

    pub fn matches(self, user: &DeviceUser) -> bool {
        match self {
            Self::All => true,
            Self::Fingerprint => user.fingerprint,
            Self::Face => user.face,
        }
    }
}

/// Backend collections the console manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Employees,
    Departments,
    Groups,
    Zones,
    ExternalEntities,
    Terminals,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Employees,
        Resource::Departments,
        Resource::Groups,
        Resource::Zones,
        Resource::ExternalEntities,
        Resource::Terminals,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Resource::Employees => "employees",
            Resource::Departments => "departments",
            Resource::Groups => "groups",
            Resource::Zones => "zones",
            Resource::ExternalEntities => "external entities",
            Resource::Terminals => "terminals",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Resource::Employees => "employee",
            Resource::Departments => "department",
            Resource::Groups => "group",
            Resource::Zones => "zone",
            Resource::ExternalEntities => "external entity",
            Resource::Terminals => "terminal",
        }
    }

    /// Field that identifies a record of this resource.
    pub fn id_field(self) -> &'static str {
        match self {
            Resource::Employees => "employeeID",
            Resource::Departments => "departmentID",
            Resource::Groups => "groupID",
            Resource::Zones => "zoneID",
            Resource::ExternalEntities => "externalEntityID",
            Resource::Terminals => "zktecoDeviceID",
        }
    }

    pub fn name_field(self) -> &'static str {
        match self {
            Resource::Terminals => "deviceName",
            _ => "name",
        }
    }

    fn base_path(self) -> &'static str {
        match self {
            Resource::Employees => "Employees",
            // Backend route spelling.
            Resource::Departments => "Departaments",
            Resource::Groups => "Groups",
            Resource::Zones => "Zones",
            Resource::ExternalEntities => "ExternalEntities",
            Resource::Terminals => "Zkteco",
        }
    }

    pub fn list_path(self) -> String {
        match self {
            Resource::Employees => "Employees/GetAllEmployees".to_string(),
            Resource::Terminals => "Zkteco/GetAllDevices".to_string(),
            other => other.base_path().to_string(),
        }
    }

    pub fn create_path(self) -> String {
        match self {
            Resource::Employees => "Employees/CreateEmployee".to_string(),
            Resource::Terminals => "Zkteco/CreateDevice".to_string(),
            other => other.base_path().to_string(),
        }
    }

    pub fn update_path(self, id: &str) -> String {
        match self {
            Resource::Employees => format!("Employees/UpdateEmployee/{id}"),
            Resource::Terminals => format!("Zkteco/UpdateDevice/{id}"),
            other => format!("{}/{id}", other.base_path()),
        }
    }

    pub fn delete_path(self, id: &str) -> String {
        match self {
            Resource::Employees => format!("Employees/DeleteEmployee/{id}"),
            Resource::Terminals => format!("Zkteco/DeleteDevice/{id}"),
            other => format!("{}/{id}", other.base_path()),
        }
    }

    pub fn record_id(self, record: &Record) -> Option<String> {
        record_key(record, self.id_field())
    }

    pub fn record_name(self, record: &Record) -> String {
        record
            .get(self.name_field())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| self.record_id(record))
            .unwrap_or_else(|| "(unnamed)".to_string())
    }

    /// Whether a change to this resource invalidates the hierarchy tree.
    pub fn feeds_tree(self) -> bool {
        matches!(
            self,
            Resource::Employees | Resource::Departments | Resource::Groups
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListView {
    Dashboard,
    Employees,
    Departments,
    Groups,
    Zones,
    ExternalEntities,
    Terminals,
    Transactions,
    Visitors,
    ExternalEmployees,
}

/// Values of the employee `type` field that have a view of their own.
pub const VISITOR_TYPE: &str = "Visitante";
pub const EXTERNAL_EMPLOYEE_TYPE: &str = "Funcionário Externo";

impl ListView {
    pub const ALL: [ListView; 10] = [
        ListView::Dashboard,
        ListView::Employees,
        ListView::Departments,
        ListView::Groups,
        ListView::Zones,
        ListView::ExternalEntities,
        ListView::Terminals,
        ListView::Transactions,
        ListView::Visitors,
        ListView::ExternalEmployees,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ListView::Dashboard => "Dashboard",
            ListView::Employees => "Employees",
            ListView::Departments => "Departments",
            ListView::Groups => "Groups",
            ListView::Zones => "Zones",
            ListView::ExternalEntities => "External entities",
            ListView::Terminals => "Terminals",
            ListView::Transactions => "Transactions",
            ListView::Visitors => "Visitors",
            ListView::ExternalEmployees => "External employees",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ListView::Dashboard => "dashboard",
            ListView::Employees => "employees",
            ListView::Departments => "departments",
            ListView::Groups => "groups",
            ListView::Zones => "zones",
            ListView::ExternalEntities => "external-entities",
            ListView::Terminals => "terminals",
            ListView::Transactions => "transactions",
            ListView::Visitors => "visitors",
            ListView::ExternalEmployees => "external-employees",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|view| view.key() == key.trim().to_ascii_lowercase())
    }

    /// Digit key that switches to this view; the tenth view is on `0`.
    pub fn shortcut(self) -> char {
        let index = Self::ALL
            .iter()
            .position(|view| *view == self)
            .unwrap_or_default();
        char::from_digit((index as u32 + 1) % 10, 10).unwrap_or('?')
    }

    pub fn from_shortcut(c: char) -> Option<Self> {
        let index = match c.to_digit(10)? {
            0 => 9,
            digit => digit as usize - 1,
        };
        Self::ALL.get(index).copied()
    }

    pub fn resource(self) -> Option<Resource> {
        match self {
            ListView::Employees | ListView::Visitors | ListView::ExternalEmployees => {
                Some(Resource::Employees)
            }
            ListView::Departments => Some(Resource::Departments),
            ListView::Groups => Some(Resource::Groups),
            ListView::Zones => Some(Resource::Zones),
            ListView::ExternalEntities => Some(Resource::ExternalEntities),
            ListView::Terminals => Some(Resource::Terminals),
            ListView::Dashboard | ListView::Transactions => None,
        }
    }

    pub fn shows_tree(self) -> bool {
        self.resource() == Some(Resource::Employees)
    }

    /// Employee `type` this view is narrowed to; `None` shows every employee.
    pub fn employee_type(self) -> Option<&'static str> {
        match self {
            ListView::Visitors => Some(VISITOR_TYPE),
            ListView::ExternalEmployees => Some(EXTERNAL_EMPLOYEE_TYPE),
            _ => None,
        }
    }
}

/// Device-management operations the backend performs on a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    FetchUsers,
    FetchSelectedUsers,
    SendAllUsers,
    SendSelectedUsers,
    CollectAttendance,
    SyncTime,
    OpenDoor,
    Restart,
    DeleteAllUsers,
    DeleteSelectedUsers,
}

impl DeviceCommand {
    pub const ALL: [DeviceCommand; 10] = [
        DeviceCommand::FetchUsers,
        DeviceCommand::FetchSelectedUsers,
        DeviceCommand::SendAllUsers,
        DeviceCommand::SendSelectedUsers,
        DeviceCommand::CollectAttendance,
        DeviceCommand::SyncTime,
        DeviceCommand::OpenDoor,
        DeviceCommand::Restart,
        DeviceCommand::DeleteAllUsers,
        DeviceCommand::DeleteSelectedUsers,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DeviceCommand::FetchUsers => "fetch-users",
            DeviceCommand::FetchSelectedUsers => "fetch-selected-users",
            DeviceCommand::SendAllUsers => "send-all-users",
            DeviceCommand::SendSelectedUsers => "send-selected-users",
            DeviceCommand::CollectAttendance => "collect-attendance",
            DeviceCommand::SyncTime => "sync-time",
            DeviceCommand::OpenDoor => "open-door",
            DeviceCommand::Restart => "restart",
            DeviceCommand::DeleteAllUsers => "delete-all-users",
            DeviceCommand::DeleteSelectedUsers => "delete-selected-users",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeviceCommand::FetchUsers => "pull users enrolled on the terminal into the database",
            DeviceCommand::FetchSelectedUsers => "pull employees selected in the tree from the terminal",
            DeviceCommand::SendAllUsers => "push every employee to the terminal",
            DeviceCommand::SendSelectedUsers => "push employees selected in the tree",
            DeviceCommand::CollectAttendance => "pull attendance records from the terminal",
            DeviceCommand::SyncTime => "set the terminal clock to server time",
            DeviceCommand::OpenDoor => "trigger the door relay",
            DeviceCommand::Restart => "reboot the terminal",
            DeviceCommand::DeleteAllUsers => "erase every user enrolled on the terminal",
            DeviceCommand::DeleteSelectedUsers => "erase employees selected in the tree from the terminal",
        }
    }

    pub fn is_dangerous(self) -> bool {
        matches!(
            self,
            DeviceCommand::Restart
                | DeviceCommand::DeleteAllUsers
                | DeviceCommand::DeleteSelectedUsers
        )
    }

    pub fn confirm_phrase(self) -> Option<&'static str> {
        match self {
            DeviceCommand::Restart => Some("RESTART"),
            DeviceCommand::DeleteAllUsers => Some("DELETE USERS"),
            DeviceCommand::DeleteSelectedUsers => Some("REMOVE USERS"),
            _ => None,
        }
    }

    pub fn needs_employee(self) -> bool {
        matches!(
            self,
            DeviceCommand::SendSelectedUsers
                | DeviceCommand::FetchSelectedUsers
                | DeviceCommand::DeleteSelectedUsers
        )
    }

    pub fn path(self, terminal_id: &str) -> String {
        let endpoint = match self {
            DeviceCommand::FetchUsers | DeviceCommand::FetchSelectedUsers => {
                "SaveAllEmployeesOnDeviceToDB"
            }
            DeviceCommand::SendAllUsers | DeviceCommand::SendSelectedUsers => {
                "SendEmployeesToDevice"
            }
            DeviceCommand::CollectAttendance => "SaveAllAttendancesEmployeesOnDevice",
            DeviceCommand::SyncTime => "SyncTimeManuallyToDevice",
            DeviceCommand::OpenDoor => "OpenDeviceDoor",
            DeviceCommand::Restart => "RestartDevice",
            DeviceCommand::DeleteAllUsers | DeviceCommand::DeleteSelectedUsers => {
                "DeleteAllUsersOnDevice"
            }
        };
        format!("Zkteco/{endpoint}/{terminal_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: DeviceCommand,
    pub terminal_id: String,
    pub terminal_name: String,
    pub employee_id: Option<String>,
}

impl CommandRequest {
    pub fn confirmation_phrase(&self) -> Option<String> {
        let base = self.command.confirm_phrase()?;
        Some(format!("{base} {}", self.terminal_name))
    }

    pub fn describe(&self) -> String {
        match &self.employee_id {
            Some(employee) => format!(
                "{} on {} (employee {employee})",
                self.command.label(),
                self.terminal_name
            ),
            None => format!("{} on {}", self.command.label(), self.terminal_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub message: Option<String>,
    pub duration_ms: u64,
}

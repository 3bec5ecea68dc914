use crate::domain::{Record, Resource};
use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn text(key: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind: FieldKind::Text,
        required: false,
    }
}

const fn number(key: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind: FieldKind::Number,
        required: false,
    }
}

const fn required(spec: FieldSpec) -> FieldSpec {
    FieldSpec {
        required: true,
        ..spec
    }
}

const EMPLOYEE_FIELDS: &[FieldSpec] = &[
    required(number("enrollNumber", "Número de Matrícula")),
    required(text("name", "Nome")),
    required(text("shortName", "Nome Abreviado")),
    required(text("nameAcronym", "Acrônimo do Nome")),
    text("type", "Tipo"),
    text("comments", "Comentários"),
    text("photo", "Foto"),
    text("address", "Morada"),
    text("zipcode", "Código Postal"),
    text("locality", "Localidade"),
    text("village", "Freguesia"),
    text("district", "Distrito"),
    number("phone", "Telefone"),
    number("mobile", "Telemóvel"),
    text("email", "E-Mail"),
    text("birthday", "Data de Nascimento"),
    text("nacionality", "Nacionalidade"),
    text("gender", "Gênero"),
    text("biNumber", "Número de BI"),
    text("biIssuance", "Emissão de BI"),
    text("biValidity", "Validade de BI"),
    number("nif", "NIF"),
    text("admissionDate", "Data de Admissão"),
    text("exitDate", "Data de Saída"),
    text("rgpdAut", "Autorização RGPD"),
    text("departmentId", "ID do Departmento"),
    text("departmentName", "Nome do Departmento"),
    text("professionId", "ID da Profissão"),
    text("professionName", "Nome da Profissão"),
    text("categoryId", "ID da Categoria"),
    text("categoryName", "Nome da Categoria"),
    text("groupId", "ID do Grupo"),
    text("groupName", "Nome do Grupo"),
    text("zoneId", "ID da Zona"),
    text("zoneName", "Nome da Zona"),
    text("externalEntityId", "ID da Entidade Externa"),
    text("externalEntityName", "Nome da Entidade Externa"),
];

const DEPARTMENT_FIELDS: &[FieldSpec] = &[
    required(number("code", "Código")),
    required(text("name", "Nome")),
    text("description", "Descrição"),
    number("paiId", "ID de Parente"),
];

const GROUP_FIELDS: &[FieldSpec] = &[
    required(text("name", "Nome")),
    text("description", "Descrição"),
    number("paiId", "ID de Parente"),
];

const ZONE_FIELDS: &[FieldSpec] = &[
    text("type", "Tipo"),
    required(text("name", "Nome")),
    text("description", "Descrição"),
    required(text("acronym", "Acrônimo")),
    text("address", "Morada"),
    text("ZIPCode", "Código Postal"),
    text("locality", "Localidade"),
    text("village", "Freguesia"),
    text("District", "Distrito"),
    number("Phone", "Telefone"),
    number("Mobile", "Telemóvel"),
    text("Email", "E-Mail"),
];

const EXTERNAL_ENTITY_FIELDS: &[FieldSpec] = &[
    required(text("name", "Nome")),
    text("comments", "Comentários"),
    text("commercialName", "Nome Comercial"),
    text("responsibleName", "Nome Responsável"),
    text("photo", "Foto"),
    text("address", "Morada"),
    text("ZIPCode", "Código Postal"),
    text("locality", "Localidade"),
    text("village", "Freguesia"),
    text("district", "Distrito"),
    number("phone", "Telefone"),
    number("mobile", "Telemóvel"),
    text("email", "E-Mail"),
    text("www", "WWW"),
    number("fax", "Fax"),
    required(number("nif", "NIF")),
    text("dateInserted", "Data Inserida"),
    text("dateUpdated", "Data Atualizada"),
];

const TERMINAL_FIELDS: &[FieldSpec] = &[
    required(number("deviceNumber", "Número")),
    required(text("deviceName", "Nome")),
    text("model", "Modelo"),
    required(text("ipAddress", "Endereço IP")),
    number("port", "Porta"),
    text("serialNumber", "Número de Série"),
];

pub fn fields_for(resource: Resource) -> &'static [FieldSpec] {
    match resource {
        Resource::Employees => EMPLOYEE_FIELDS,
        Resource::Departments => DEPARTMENT_FIELDS,
        Resource::Groups => GROUP_FIELDS,
        Resource::Zones => ZONE_FIELDS,
        Resource::ExternalEntities => EXTERNAL_ENTITY_FIELDS,
        Resource::Terminals => TERMINAL_FIELDS,
    }
}

/// Plain-text rendering of a field value for tables and form prefill.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(true)) => "yes".to_string(),
        Some(Value::Bool(false)) => "no".to_string(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{label} is required")]
    Required { label: &'static str },
    #[error("{label} must be a number")]
    NotANumber { label: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub resource: Resource,
    pub mode: FormMode,
    /// Id of the record being edited.
    pub target_id: Option<String>,
    base: Record,
    pub values: Vec<String>,
    pub selected: usize,
    pub error: Option<String>,
}

impl FormState {
    pub fn create(resource: Resource) -> Self {
        Self {
            resource,
            mode: FormMode::Create,
            target_id: None,
            base: Record::new(),
            values: vec![String::new(); fields_for(resource).len()],
            selected: 0,
            error: None,
        }
    }

    /// Returns `None` when the record carries no id to update by.
    pub fn edit(resource: Resource, record: &Record) -> Option<Self> {
        let id = resource.record_id(record)?;
        Some(Self {
            mode: FormMode::Edit,
            target_id: Some(id),
            ..Self::prefilled(resource, record.clone())
        })
    }

    pub fn duplicate(resource: Resource, record: &Record) -> Self {
        let mut base = record.clone();
        base.remove(resource.id_field());
        Self {
            mode: FormMode::Duplicate,
            ..Self::prefilled(resource, base)
        }
    }

    fn prefilled(resource: Resource, base: Record) -> Self {
        let values = fields_for(resource)
            .iter()
            .map(|field| value_text(base.get(field.key)))
            .collect();
        Self {
            resource,
            mode: FormMode::Create,
            target_id: None,
            base,
            values,
            selected: 0,
            error: None,
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        fields_for(self.resource)
    }

    pub fn title(&self) -> String {
        match self.mode {
            FormMode::Create => format!("New {}", self.resource.singular()),
            FormMode::Duplicate => format!("Duplicate {}", self.resource.singular()),
            FormMode::Edit => format!(
                "Edit {} {}",
                self.resource.singular(),
                self.target_id.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Prefills the field with `key`; unknown keys are ignored.
    pub fn set_value(&mut self, key: &str, value: &str) {
        let idx = self.fields().iter().position(|field| field.key == key);
        if let Some(slot) = idx.and_then(|idx| self.values.get_mut(idx)) {
            *slot = value.to_string();
        }
    }

    pub fn next_field(&mut self) {
        let len = self.values.len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    pub fn prev_field(&mut self) {
        let len = self.values.len();
        if len > 0 {
            self.selected = (self.selected + len - 1) % len;
        }
    }

    pub fn push_char(&mut self, c: char) {
        if let Some(value) = self.values.get_mut(self.selected) {
            value.push(c);
            self.error = None;
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(value) = self.values.get_mut(self.selected) {
            value.pop();
            self.error = None;
        }
    }

    /// Builds the entity to send. Fields outside the catalogue are carried
    /// over from the base record; blank optional fields become `null`.
    pub fn build_payload(&self) -> Result<Record, FormError> {
        let mut payload = self.base.clone();
        for (field, raw) in self.fields().iter().zip(&self.values) {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                if field.required {
                    return Err(FormError::Required { label: field.label });
                }
                payload.insert(field.key.to_string(), Value::Null);
                continue;
            }
            let value = match field.kind {
                FieldKind::Text => Value::String(trimmed.to_string()),
                FieldKind::Number => parse_number(trimmed)
                    .map(Value::Number)
                    .ok_or(FormError::NotANumber { label: field.label })?,
            };
            payload.insert(field.key.to_string(), value);
        }
        Ok(payload)
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(record) => record,
            other => panic!("not an object: {other}"),
        }
    }

    fn fill(form: &mut FormState, key: &str, value: &str) {
        let idx = form
            .fields()
            .iter()
            .position(|f| f.key == key)
            .expect("field");
        form.values[idx] = value.to_string();
    }

    #[test]
    fn create_requires_mandatory_fields() {
        let mut form = FormState::create(Resource::Departments);
        fill(&mut form, "code", "10");
        assert_eq!(
            form.build_payload(),
            Err(FormError::Required { label: "Nome" })
        );

        fill(&mut form, "name", "  Sales ");
        let payload = form.build_payload().expect("payload");
        assert_eq!(
            Value::Object(payload),
            json!({ "code": 10, "name": "Sales", "description": null, "paiId": null })
        );
    }

    #[test]
    fn number_fields_must_parse() {
        let mut form = FormState::create(Resource::Departments);
        fill(&mut form, "code", "ten");
        fill(&mut form, "name", "Sales");
        assert_eq!(
            form.build_payload(),
            Err(FormError::NotANumber { label: "Código" })
        );
        fill(&mut form, "code", "10.5");
        assert!(form.build_payload().is_ok());
    }

    #[test]
    fn edit_keeps_id_and_unknown_fields() {
        let original = record(json!({
            "groupID": "G1",
            "name": "Night",
            "description": "late",
            "paiId": null,
            "createdBy": "admin"
        }));
        let mut form = FormState::edit(Resource::Groups, &original).expect("editable");
        assert_eq!(form.target_id.as_deref(), Some("G1"));
        assert_eq!(form.values, vec!["Night", "late", ""]);

        fill(&mut form, "name", "Night shift");
        let payload = form.build_payload().expect("payload");
        assert_eq!(payload.get("groupID"), Some(&json!("G1")));
        assert_eq!(payload.get("createdBy"), Some(&json!("admin")));
        assert_eq!(payload.get("name"), Some(&json!("Night shift")));
    }

    #[test]
    fn edit_without_id_is_refused() {
        assert!(FormState::edit(Resource::Zones, &record(json!({ "name": "Lobby" }))).is_none());
    }

    #[test]
    fn duplicate_drops_the_id() {
        let original = record(json!({ "zktecoDeviceID": "T1", "deviceNumber": 1, "deviceName": "Gate", "ipAddress": "10.0.0.2" }));
        let form = FormState::duplicate(Resource::Terminals, &original);
        assert_eq!(form.mode, FormMode::Duplicate);
        assert!(form.target_id.is_none());
        let payload = form.build_payload().expect("payload");
        assert!(!payload.contains_key("zktecoDeviceID"));
        assert_eq!(payload.get("deviceNumber"), Some(&json!(1)));
    }

    #[test]
    fn field_cursor_wraps() {
        let mut form = FormState::create(Resource::Groups);
        form.prev_field();
        assert_eq!(form.selected, 2);
        form.next_field();
        assert_eq!(form.selected, 0);
        form.push_char('x');
        form.pop_char();
        form.pop_char();
        assert_eq!(form.values[0], "");
    }
}

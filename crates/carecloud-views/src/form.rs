//! Modal content for create, update and delete actions.
//!
//! Every `(EntityKind, FormAction)` pair maps to content, so there is no
//! "form not found" case for a shell to handle.

use serde::Serialize;

use crate::entity::EntityKind;

/// What the user asked to do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FormAction {
    Create,
    Update,
    Delete,
}

impl FormAction {
    pub const ALL: [FormAction; 3] = [FormAction::Create, FormAction::Update, FormAction::Delete];
}

/// Input widget for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "camelCase")]
pub enum InputKind {
    Text,
    Email,
    Date,
    Select(Vec<&'static str>),
    File,
    Checkbox,
    TextArea,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub label: &'static str,
    /// Payload key the field writes
    pub name: &'static str,
    pub input: InputKind,
    pub required: bool,
}

impl FieldSpec {
    fn required(label: &'static str, name: &'static str, input: InputKind) -> Self {
        Self {
            label,
            name,
            input,
            required: true,
        }
    }

    fn optional(label: &'static str, name: &'static str, input: InputKind) -> Self {
        Self {
            label,
            name,
            input,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSpec {
    pub title: String,
    pub submit_label: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl FormSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Body of the modal opened for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ModalContent {
    Form(FormSpec),
    ConfirmDelete { message: String },
}

/// Modal content for `action` on a record of `kind`.
pub fn modal(kind: EntityKind, action: FormAction) -> ModalContent {
    match action {
        FormAction::Delete => ModalContent::ConfirmDelete {
            message: format!(
                "Are you sure you want to delete this {}? This action cannot be undone.",
                kind.noun()
            ),
        },
        FormAction::Create | FormAction::Update => ModalContent::Form(FormSpec {
            title: match action {
                FormAction::Create => format!("Create a new {}", kind.noun()),
                _ => format!("Update {}", kind.noun()),
            },
            submit_label: match action {
                FormAction::Create => "Create",
                _ => "Update",
            },
            fields: fields(kind),
        }),
    }
}

fn fields(kind: EntityKind) -> Vec<FieldSpec> {
    use InputKind::*;

    match kind {
        EntityKind::Resident => vec![
            FieldSpec::required("Full Name", "fullName", Text),
            FieldSpec::optional("Email", "email", Email),
            FieldSpec::required("Phone", "phone", Text),
            FieldSpec::required("Address", "address", Text),
            FieldSpec::required("Primary Care Physician", "pcp", Text),
            FieldSpec::required("Date of Birth", "dateOfBirth", Date),
            FieldSpec::optional("Emergency Contact Name", "emergencyContactName", Text),
            FieldSpec::optional("Emergency Contact Number", "emergencyContactNumber", Text),
            FieldSpec::optional(
                "Emergency Contact Relationship",
                "emergencyContactRelationship",
                Text,
            ),
            FieldSpec::optional("Health Conditions", "healthConditions", TextArea),
            FieldSpec::optional("Do Not Resuscitate Consent", "dncConsent", Checkbox),
        ],
        EntityKind::Staff => vec![
            FieldSpec::required("Full Name", "fullName", Text),
            FieldSpec::required("Email", "email", Email),
            FieldSpec::required("Phone", "phone", Text),
            FieldSpec::required("Role", "role", Select(vec!["nurse", "caregiver", "physician", "admin"])),
            FieldSpec::optional("Address", "address", Text),
            FieldSpec::optional("Photo", "photo", File),
        ],
        EntityKind::Family => vec![
            FieldSpec::required("Full Name", "fullName", Text),
            FieldSpec::optional("Email", "email", Email),
            FieldSpec::required("Phone", "phone", Text),
            FieldSpec::required("Resident", "residentId", Text),
            FieldSpec::optional("Relationship", "relationship", Text),
        ],
        EntityKind::CareRecord => vec![
            FieldSpec::required("Resident", "residentId", Text),
            FieldSpec::required("Record Type", "recordType", Select(vec!["activity", "incident"])),
            FieldSpec::required("Activity/Incident", "type", Text),
            FieldSpec::optional("Severity", "severity", Select(vec!["low", "medium", "high"])),
            FieldSpec::optional("Description", "description", TextArea),
        ],
    }
}

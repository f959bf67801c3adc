//! Entity kinds and their list tables.

use serde::{Deserialize, Serialize};

/// Kinds of record the dashboard lists and edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Resident,
    Staff,
    Family,
    /// Activity and incident log entries
    CareRecord,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Resident,
        EntityKind::Staff,
        EntityKind::Family,
        EntityKind::CareRecord,
    ];

    /// Lowercase noun used in prompts ("delete this resident").
    pub fn noun(self) -> &'static str {
        match self {
            EntityKind::Resident => "resident",
            EntityKind::Staff => "staff member",
            EntityKind::Family => "family member",
            EntityKind::CareRecord => "care record",
        }
    }
}

/// Smallest screen width at which a column is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Always,
    Medium,
    Large,
}

/// One table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub header: &'static str,
    /// Row field the cell reads
    pub accessor: &'static str,
    pub visibility: Visibility,
}

impl Column {
    const fn new(header: &'static str, accessor: &'static str, visibility: Visibility) -> Self {
        Self {
            header,
            accessor,
            visibility,
        }
    }
}

/// A list table: title plus ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSpec {
    pub title: &'static str,
    pub columns: Vec<Column>,
}

impl TableSpec {
    /// Columns shown at the given screen width.
    pub fn visible_at(&self, width: Visibility) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(move |c| c.visibility <= width)
    }
}

/// Table layout for an entity kind.
pub fn table(kind: EntityKind) -> TableSpec {
    use Visibility::*;

    let (title, columns) = match kind {
        EntityKind::Resident => (
            "All Residents",
            vec![
                Column::new("Info", "info", Always),
                Column::new("Resident Number", "residentNumber", Medium),
                Column::new("Care Level", "careLevel", Medium),
                Column::new("Room Number", "roomNumber", Medium),
                Column::new("Contact", "contactNumber", Large),
                Column::new("Actions", "action", Always),
            ],
        ),
        EntityKind::Staff => (
            "All Staff",
            vec![
                Column::new("Info", "info", Always),
                Column::new("Staff ID", "staffId", Medium),
                Column::new("Role", "role", Medium),
                Column::new("Phone", "phone", Large),
                Column::new("Address", "address", Large),
                Column::new("Actions", "action", Always),
            ],
        ),
        EntityKind::Family => (
            "All Family Members",
            vec![
                Column::new("Info", "info", Always),
                Column::new("Resident", "resident", Medium),
                Column::new("Relationship", "relationship", Medium),
                Column::new("Phone", "phone", Large),
                Column::new("Actions", "action", Always),
            ],
        ),
        EntityKind::CareRecord => (
            "All Care Records",
            vec![
                Column::new("Activity/Incident", "activity", Always),
                Column::new("Resident", "resident", Always),
                Column::new("Staff", "staff", Medium),
                Column::new("Date", "date", Medium),
                Column::new("Actions", "action", Always),
            ],
        ),
    };

    TableSpec { title, columns }
}

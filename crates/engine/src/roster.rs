//! Employee roster records and the label format used by the dropdown.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

/// One employee as listed in a roster file or the HR directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub employee_id: String,
    pub employee_name: String,
}

impl EmployeeRecord {
    pub fn new(employee_id: impl Into<String>, employee_name: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            employee_name: employee_name.into(),
        }
    }

    /// Dropdown label: `"{employee_name} ({employee_id})"`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.employee_name, self.employee_id)
    }
}

/// Labels for every record, in source order.
///
/// Records that produce an identical label collapse to the first occurrence,
/// the same way a list rule treats repeated entries.
pub fn dropdown_labels(records: &[EmployeeRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labels = Vec::with_capacity(records.len());
    for record in records {
        let label = record.label();
        if seen.insert(label.clone()) {
            labels.push(label);
        } else {
            log::warn!("duplicate roster entry collapsed: {}", label);
        }
    }
    labels
}

/// Parse a JSON array of `{employee_id, employee_name}` objects.
pub fn parse_roster_json(input: &str) -> Result<Vec<EmployeeRecord>, serde_json::Error> {
    serde_json::from_str(input)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
    })
}

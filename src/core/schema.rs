use std::fmt;

/// Canonical column types of the analytical table, as exposed to the
/// query synthesizer and validator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnKind {
    String,
    Integer,
    Date,
    Timestamp,
    StringArray,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::String => "String",
            ColumnKind::Integer => "Int32",
            ColumnKind::Date => "Date",
            ColumnKind::Timestamp => "DateTime",
            ColumnKind::StringArray => "Array(String)",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub description: &'static str,
}

/// Static description of the one table in scope. Loaded once at startup and
/// shared read-only; `name` must match the validator's table allow-list.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// The clinical encounters table backing every endpoint.
    pub fn encounters() -> Self {
        Self {
            name: "encounters",
            columns: vec![
                ColumnSpec {
                    name: "patient_id",
                    kind: ColumnKind::String,
                    description: "stable patient identifier",
                },
                ColumnSpec {
                    name: "age",
                    kind: ColumnKind::Integer,
                    description: "patient age at encounter",
                },
                ColumnSpec {
                    name: "conditions",
                    kind: ColumnKind::StringArray,
                    description: "active condition list",
                },
                ColumnSpec {
                    name: "last_a1c_date",
                    kind: ColumnKind::Date,
                    description: "most recent A1c test date",
                },
                ColumnSpec {
                    name: "encounter_date",
                    kind: ColumnKind::Timestamp,
                    description: "encounter timestamp",
                },
                ColumnSpec {
                    name: "chief_complaint",
                    kind: ColumnKind::String,
                    description: "presenting complaint",
                },
                ColumnSpec {
                    name: "encounter_type",
                    kind: ColumnKind::String,
                    description: "ED, Inpatient, Outpatient, Telehealth",
                },
            ],
        }
    }

    /// One `- name (Type): description` line per column, for embedding in
    /// generation prompts.
    pub fn prompt_lines(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("- {} ({}): {}", c.name, c.kind, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

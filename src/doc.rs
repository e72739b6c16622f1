//! Document snapshot model: per-family payloads, typed view configuration,
//! and create payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{AggregateKey, DocFamily, DocId, Version};

/// Per-view field metadata: view id, then arbitrary string keys.
///
/// Mutations patch individual leaves; entries for unrelated views are never
/// rewritten.
pub type ColumnMeta = BTreeMap<DocId, BTreeMap<String, Value>>;

/// Free-form per-view display options.
pub type ViewOptions = BTreeMap<String, Value>;

/// Schema container document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDoc {
    /// Document id (`tbl…`).
    pub id: DocId,
    /// Table display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Discriminated column type, re-derived from the stored generic row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Short text cell.
    SingleLineText,
    /// Multi-line text cell.
    LongText,
    /// Boolean cell.
    Checkbox,
    /// Numeric cell with display precision.
    Number {
        /// Decimal places shown.
        precision: u8,
    },
    /// One choice from a fixed list.
    SingleSelect {
        /// Allowed choices.
        choices: Vec<String>,
    },
    /// Date cell.
    Date {
        /// Whether a time component is shown.
        include_time: bool,
    },
}

impl FieldKind {
    /// Stored discriminator string for the generic field row.
    pub fn stored_kind(&self) -> &'static str {
        match self {
            Self::SingleLineText => "singleLineText",
            Self::LongText => "longText",
            Self::Checkbox => "checkbox",
            Self::Number { .. } => "number",
            Self::SingleSelect { .. } => "singleSelect",
            Self::Date { .. } => "date",
        }
    }

    /// Kind-specific options for the stored row, if the kind carries any.
    pub fn options_value(&self) -> Option<Value> {
        match self {
            Self::SingleLineText | Self::LongText | Self::Checkbox => None,
            Self::Number { precision } => Some(json!({ "precision": precision })),
            Self::SingleSelect { choices } => Some(json!({ "choices": choices })),
            Self::Date { include_time } => Some(json!({ "includeTime": include_time })),
        }
    }

    /// Re-derives the typed kind from stored discriminator and options.
    ///
    /// Returns `None` for an unknown discriminator or malformed options.
    pub fn from_stored(kind: &str, options: Option<&Value>) -> Option<Self> {
        match kind {
            "singleLineText" => Some(Self::SingleLineText),
            "longText" => Some(Self::LongText),
            "checkbox" => Some(Self::Checkbox),
            "number" => {
                let precision = options
                    .and_then(|v| v.get("precision"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Some(Self::Number {
                    precision: u8::try_from(precision).ok()?,
                })
            }
            "singleSelect" => {
                let choices = options
                    .and_then(|v| v.get("choices"))
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|c| c.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Self::SingleSelect { choices })
            }
            "date" => {
                let include_time = options
                    .and_then(|v| v.get("includeTime"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Some(Self::Date { include_time })
            }
            _ => None,
        }
    }
}

/// Column definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDoc {
    /// Document id (`fld…`).
    pub id: DocId,
    /// Field display name.
    pub name: String,
    /// Typed column kind.
    pub kind: FieldKind,
    /// Parsed per-view metadata.
    pub column_meta: ColumnMeta,
}

/// Filter conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    /// All conditions must hold.
    And,
    /// Any condition may hold.
    Or,
}

/// One filter condition against a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Field the condition reads.
    pub field_id: DocId,
    /// Comparison operator name.
    pub operator: String,
    /// Comparison operand.
    pub value: Value,
}

/// Parsed view filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// How conditions combine.
    pub conjunction: Conjunction,
    /// Conditions in display order.
    pub conditions: Vec<FilterCondition>,
}

/// One sort rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortRule {
    /// Field sorted by.
    pub field_id: DocId,
    /// Descending when true.
    pub descending: bool,
}

/// Parsed view sort configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Rules applied in order.
    pub rules: Vec<SortRule>,
}

/// One grouping rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRule {
    /// Field grouped by.
    pub field_id: DocId,
    /// Descending group order when true.
    pub descending: bool,
}

/// View configuration document.
///
/// Filter, sort, group, and options are stored independently; an absent or
/// empty stored value decodes to `None`, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDoc {
    /// Document id (`viw…`).
    pub id: DocId,
    /// View display name.
    pub name: String,
    /// Parsed filter configuration.
    pub filter: Option<FilterSpec>,
    /// Parsed sort configuration.
    pub sort: Option<SortSpec>,
    /// Parsed grouping configuration.
    pub group: Option<Vec<GroupRule>>,
    /// Parsed display options.
    pub options: Option<ViewOptions>,
}

/// Row document: cell values plus per-view position keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDoc {
    /// Document id (`rec…`).
    pub id: DocId,
    /// Cell values keyed by field id.
    pub cells: BTreeMap<DocId, Value>,
    /// Position keys keyed by view id.
    pub orders: BTreeMap<DocId, f64>,
}

/// Computed scalar document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDoc {
    /// Aggregate computation.
    pub key: AggregateKey,
    /// View the aggregate is keyed under.
    pub view_id: DocId,
    /// Computed value.
    pub value: i64,
}

/// Family-tagged snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocData {
    /// Table payload.
    Table(TableDoc),
    /// Field payload.
    Field(FieldDoc),
    /// View payload.
    View(ViewDoc),
    /// Record payload.
    Record(RecordDoc),
    /// Aggregate payload.
    Aggregate(AggregateDoc),
}

impl DocData {
    /// Family tag of this payload.
    pub fn family(&self) -> DocFamily {
        match self {
            Self::Table(_) => DocFamily::Table,
            Self::Field(_) => DocFamily::Field,
            Self::View(_) => DocFamily::View,
            Self::Record(_) => DocFamily::Record,
            Self::Aggregate(_) => DocFamily::Aggregate,
        }
    }
}

/// Externally visible read-model of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Document id as requested.
    pub id: DocId,
    /// Current version; 0 means never created.
    pub version: Version,
    /// Payload; absent for never-created and deleted documents.
    pub data: Option<DocData>,
}

impl Snapshot {
    /// Placeholder snapshot for a never-created document.
    pub fn absent(id: impl Into<DocId>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            data: None,
        }
    }

    /// True when the document was never created.
    pub fn is_absent(&self) -> bool {
        self.version == 0 && self.data.is_none()
    }
}

/// Initial payload for a table create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInit {
    /// Table display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Initial payload for a field create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    /// Field display name.
    pub name: String,
    /// Typed column kind.
    pub kind: FieldKind,
    /// Initial per-view metadata, usually empty.
    pub column_meta: ColumnMeta,
}

/// Initial payload for a view create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewInit {
    /// View display name.
    pub name: String,
    /// Initial filter configuration.
    pub filter: Option<FilterSpec>,
    /// Initial sort configuration.
    pub sort: Option<SortSpec>,
    /// Initial grouping configuration.
    pub group: Option<Vec<GroupRule>>,
    /// Initial display options.
    pub options: Option<ViewOptions>,
}

/// Initial payload for a record create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecordInit {
    /// Initial cell values keyed by field id.
    pub cells: BTreeMap<DocId, Value>,
    /// Initial position keys keyed by view id.
    pub orders: BTreeMap<DocId, f64>,
}

/// Family-specific create payload carried by a create operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocInit {
    /// Create a table document.
    Table(TableInit),
    /// Create a field document.
    Field(FieldInit),
    /// Create a view document.
    View(ViewInit),
    /// Create a record document.
    Record(RecordInit),
}

impl DocInit {
    /// Family this payload creates.
    pub fn family(&self) -> DocFamily {
        match self {
            Self::Table(_) => DocFamily::Table,
            Self::Field(_) => DocFamily::Field,
            Self::View(_) => DocFamily::View,
            Self::Record(_) => DocFamily::Record,
        }
    }

    /// Materializes the payload as the snapshot it creates.
    pub fn to_data(&self, doc_id: &str) -> DocData {
        match self {
            Self::Table(init) => DocData::Table(TableDoc {
                id: doc_id.to_string(),
                name: init.name.clone(),
                description: init.description.clone(),
            }),
            Self::Field(init) => DocData::Field(FieldDoc {
                id: doc_id.to_string(),
                name: init.name.clone(),
                kind: init.kind.clone(),
                column_meta: init.column_meta.clone(),
            }),
            Self::View(init) => DocData::View(ViewDoc {
                id: doc_id.to_string(),
                name: init.name.clone(),
                filter: init.filter.clone(),
                sort: init.sort.clone(),
                group: init.group.clone(),
                options: init.options.clone(),
            }),
            Self::Record(init) => DocData::Record(RecordDoc {
                id: doc_id.to_string(),
                cells: init.cells.clone(),
                orders: init.orders.clone(),
            }),
        }
    }
}

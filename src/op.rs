//! Operation model: effects, mutation descriptors, and persistence wrappers.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::doc::DocInit;
use crate::types::{DocFamily, DocId, OpSeq, SourceId, Version};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// One semantic effect extracted from an edit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationDescriptor {
    /// Rewrite the record's position key within one view.
    SetRecordOrder {
        /// View whose ordering changes.
        view_id: DocId,
        /// New sortable position key, already chosen between its neighbors.
        order: f64,
    },
    /// Overwrite one cell value.
    SetRecordCell {
        /// Field whose cell changes.
        field_id: DocId,
        /// New cell value.
        value: Value,
    },
    /// Set a single leaf of the field's per-view metadata.
    SetColumnMeta {
        /// View whose metadata changes.
        view_id: DocId,
        /// Metadata key under that view.
        key: String,
        /// New leaf value.
        value: Value,
    },
    /// Merge a batch of keys into the field's per-view metadata.
    AddColumnMeta {
        /// View whose metadata changes.
        view_id: DocId,
        /// Key/value pairs merged into the view's entry.
        entries: BTreeMap<String, Value>,
    },
    /// Rename a field.
    SetFieldName {
        /// New field name.
        name: String,
    },
}

/// Descriptor kind used for grouped, batched application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// [`MutationDescriptor::SetFieldName`].
    FieldName,
    /// [`MutationDescriptor::SetColumnMeta`].
    ColumnMeta,
    /// [`MutationDescriptor::AddColumnMeta`].
    ColumnMetaMerge,
    /// [`MutationDescriptor::SetRecordOrder`].
    RecordOrder,
    /// [`MutationDescriptor::SetRecordCell`].
    RecordCell,
}

/// Fixed inter-kind application order for one commit.
///
/// Descriptors of one kind always keep their original relative order; this
/// constant pins the order *between* kinds: naming first, then metadata,
/// then record ordering, then cell content.
pub const KIND_APPLY_ORDER: [DescriptorKind; 5] = [
    DescriptorKind::FieldName,
    DescriptorKind::ColumnMeta,
    DescriptorKind::ColumnMetaMerge,
    DescriptorKind::RecordOrder,
    DescriptorKind::RecordCell,
];

impl DescriptorKind {
    /// Document family this kind of mutation applies to.
    pub fn family(&self) -> DocFamily {
        match self {
            Self::FieldName | Self::ColumnMeta | Self::ColumnMetaMerge => DocFamily::Field,
            Self::RecordOrder | Self::RecordCell => DocFamily::Record,
        }
    }
}

impl MutationDescriptor {
    /// Kind bucket this descriptor applies under.
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::SetRecordOrder { .. } => DescriptorKind::RecordOrder,
            Self::SetRecordCell { .. } => DescriptorKind::RecordCell,
            Self::SetColumnMeta { .. } => DescriptorKind::ColumnMeta,
            Self::AddColumnMeta { .. } => DescriptorKind::ColumnMetaMerge,
            Self::SetFieldName { .. } => DescriptorKind::FieldName,
        }
    }
}

/// Groups descriptors by kind, preserving relative order within each kind.
pub fn group_by_kind(
    descriptors: &[MutationDescriptor],
) -> HashMap<DescriptorKind, Vec<&MutationDescriptor>> {
    let mut grouped: HashMap<DescriptorKind, Vec<&MutationDescriptor>> = HashMap::new();
    for descriptor in descriptors {
        grouped.entry(descriptor.kind()).or_default().push(descriptor);
    }
    grouped
}

/// What an operation does to its target document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Bring the document into existence with an initial payload.
    Create {
        /// Family-specific initial snapshot payload.
        init: DocInit,
    },
    /// Apply an ordered list of mutation descriptors.
    Edit {
        /// Descriptors in the order the client produced them.
        descriptors: Vec<MutationDescriptor>,
    },
    /// Tombstone the document; state is retained for audit.
    Delete,
}

/// Immutable, versioned proposal appended to the op log on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Client session that authored the operation.
    pub source: SourceId,
    /// Sequence number within the authoring source.
    pub seq: OpSeq,
    /// Version this operation commits at; must equal the document's
    /// current max logged version plus one.
    pub version: Version,
    /// Effect payload.
    pub effect: Effect,
}

impl Operation {
    /// Builds a create operation committing at version 1.
    pub fn create(source: impl Into<SourceId>, seq: OpSeq, init: DocInit) -> Self {
        Self {
            source: source.into(),
            seq,
            version: 1,
            effect: Effect::Create { init },
        }
    }

    /// Builds an edit operation committing at `version`.
    pub fn edit(
        source: impl Into<SourceId>,
        seq: OpSeq,
        version: Version,
        descriptors: Vec<MutationDescriptor>,
    ) -> Self {
        Self {
            source: source.into(),
            seq,
            version,
            effect: Effect::Edit { descriptors },
        }
    }

    /// Builds a delete operation committing at `version`.
    pub fn delete(source: impl Into<SourceId>, seq: OpSeq, version: Version) -> Self {
        Self {
            source: source.into(),
            seq,
            version,
            effect: Effect::Delete,
        }
    }
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub op: Operation,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(op: Operation) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            op,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

// LogicalBlobId — The identity of a blob within a job
//
// A logical blob is named by the op that produces it and the output slot it
// comes out of; the rendered form "op_name/blob_name" is the logical blob
// name (lbn) every metadata query keys on. Identity comparison and hashing
// live HERE, not on blob handles: two handles to the same lbi are the same
// logical blob no matter how their metadata was resolved.

/// Identity of a logical blob: producing op name + output slot name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalBlobId {
    pub op_name: String,
    pub blob_name: String,
}

impl LogicalBlobId {
    pub fn new(op_name: impl Into<String>, blob_name: impl Into<String>) -> Self {
        LogicalBlobId {
            op_name: op_name.into(),
            blob_name: blob_name.into(),
        }
    }

    /// The logical blob name, `"op_name/blob_name"`.
    pub fn lbn(&self) -> String {
        format!("{}/{}", self.op_name, self.blob_name)
    }
}

impl fmt::Display for LogicalBlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.op_name, self.blob_name)
    }
}

/// Placement annotation a blob handle can carry into downstream op
/// construction: let the planner decide, replicate to every device, or
/// split along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribute {
    Auto,
    Broadcast,
    Split(usize),
}

impl Default for Distribute {
    fn default() -> Self {
        Distribute::Auto
    }
}

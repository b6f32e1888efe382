//! Core types for collective parameter resolution
//!
//! These are the request/response shapes workers exchange to agree on who
//! participates in a collective operation and under what parameters.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Identifies one execution of a graph. Not globally unique across graphs,
/// only within a graph's concurrent step window.
pub type StepId = i64;

/// Opaque identifier for a logical graph, scoping step-id sequencing.
pub type GraphKey = i64;

/// Sentinel meaning "invalid / no collective in use". Never issued by the
/// sequencer and never a valid registry key.
pub const INVALID_STEP_ID: StepId = -1;

/// Attributes of one abstract device participating in collectives
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAttributes {
    /// Fully qualified device name, e.g. "/job:worker/task:1/device:cpu:0"
    pub name: String,
    /// Device type, e.g. "cpu" or "gpu"
    pub device_type: String,
    /// Task hosting the device
    pub task: String,
    /// Incarnation number distinguishing restarts of the same device
    pub incarnation: u64,
}

impl DeviceAttributes {
    /// Create attributes with minimal fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type: "cpu".to_string(),
            task: String::new(),
            incarnation: 0,
        }
    }

    /// Set the device type
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Set the hosting task
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    /// Set the incarnation number
    pub fn with_incarnation(mut self, incarnation: u64) -> Self {
        self.incarnation = incarnation;
        self
    }

    /// Canonical ordering used for group membership: device name first,
    /// then task, then incarnation. Every participant sorts by this, so all
    /// workers derive the same ring topology regardless of join order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.task.cmp(&other.task))
            .then_with(|| self.incarnation.cmp(&other.incarnation))
    }
}

/// Kind of collective operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectiveKind {
    /// All-reduce style reduction across the group
    Reduction,
    /// Broadcast from one source to the group
    Broadcast,
    /// Gather from all members
    Gather,
}

/// Element type of the tensors moved by a collective
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F16,
    F32,
    F64,
    I32,
    I64,
}

/// Declares the target group for group formation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub group_key: i64,
    /// Expected member count; every caller must claim the same value
    pub group_size: usize,
}

/// One worker's check-in for group formation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteGroupRequest {
    pub device: DeviceAttributes,
    pub spec: GroupSpec,
}

/// Agreed group membership, identical (including order) on every participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_key: i64,
    pub group_size: usize,
    /// Members in canonical order (see [`DeviceAttributes::canonical_cmp`])
    pub members: Vec<DeviceAttributes>,
}

impl GroupMembership {
    /// Rank of a device within the canonical ordering
    pub fn rank_of(&self, device_name: &str) -> Option<usize> {
        self.members.iter().position(|d| d.name == device_name)
    }

    /// Member names in canonical (ring) order
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|d| d.name.as_str()).collect()
    }
}

/// Per-instance operation parameters every participant must agree on
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub instance_key: i64,
    pub kind: CollectiveKind,
    pub dtype: DataType,
    pub shape: Vec<i64>,
}

/// One worker's check-in for instance formation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteInstanceRequest {
    pub group_key: i64,
    /// Name of the calling device; must be a member of the completed group
    pub device_name: String,
    pub instance: InstanceSpec,
}

/// Fully resolved plan for one collective operation. Immutable once
/// resolution completes, for the lifetime of the operation.
#[derive(Clone, Debug)]
pub struct ResolvedParams {
    pub group: Arc<GroupMembership>,
    pub instance_key: i64,
    pub kind: CollectiveKind,
    pub dtype: DataType,
    pub shape: Vec<i64>,
    /// The calling device's position in the group's canonical ordering
    pub default_rank: usize,
}

/// Request for the current step-id window of one or more graphs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepSequenceRequest {
    pub graph_keys: Vec<GraphKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSequenceEntry {
    pub graph_key: GraphKey,
    pub next_step_id: StepId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSequenceResponse {
    pub entries: Vec<StepSequenceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_ignores_join_order() {
        let mut devices = vec![
            DeviceAttributes::new("/task:2/device:cpu:0").with_task("/task:2"),
            DeviceAttributes::new("/task:0/device:cpu:0").with_task("/task:0"),
            DeviceAttributes::new("/task:1/device:cpu:0").with_task("/task:1"),
        ];
        devices.sort_by(|a, b| a.canonical_cmp(b));
        let names: Vec<_> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "/task:0/device:cpu:0",
                "/task:1/device:cpu:0",
                "/task:2/device:cpu:0"
            ]
        );
    }

    #[test]
    fn test_rank_of() {
        let membership = GroupMembership {
            group_key: 1,
            group_size: 2,
            members: vec![DeviceAttributes::new("a"), DeviceAttributes::new("b")],
        };
        assert_eq!(membership.rank_of("a"), Some(0));
        assert_eq!(membership.rank_of("b"), Some(1));
        assert_eq!(membership.rank_of("c"), None);
    }
}

//! Parameter resolution - the agreement protocol run before any collective
//!
//! Independent workers discover each other and agree on a consistent plan
//! in two phases: group formation (who participates) and instance formation
//! (operation kind, dtype, shape, device ordering). Both phases complete
//! through futures; a worker awaiting `complete_group` is "waiting for the
//! callback" in the classic formulation.

mod local;
mod stub;

pub use local::LocalParamResolver;
pub use stub::StubParamResolver;

use crate::core::errors::{ColexError, Result};
use crate::types::{
    CompleteGroupRequest, CompleteInstanceRequest, DeviceAttributes, GroupMembership, GroupSpec,
    InstanceSpec, ResolvedParams,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Multi-phase agreement protocol for collective parameters.
///
/// Backends: [`LocalParamResolver`] for the real in-process rendezvous,
/// [`StubParamResolver`] for minimal backends that never run collectives.
/// The manager selects one at construction time.
#[async_trait]
pub trait ParamResolver: Send + Sync {
    /// Register the calling device as a member of the target group and wait
    /// until the expected member count is reached. Every participant
    /// resolves with an identical, canonically ordered membership list.
    async fn complete_group(
        &self,
        request: CompleteGroupRequest,
        token: CancellationToken,
    ) -> Result<Arc<GroupMembership>>;

    /// Agree on per-instance parameters across all members of an already
    /// completed group.
    async fn complete_instance(
        &self,
        request: CompleteInstanceRequest,
        token: CancellationToken,
    ) -> Result<ResolvedParams>;

    /// Run both phases for one device: group formation, then instance
    /// formation against the completed group.
    async fn complete_params(
        &self,
        device: DeviceAttributes,
        spec: GroupSpec,
        instance: InstanceSpec,
        token: CancellationToken,
    ) -> Result<ResolvedParams> {
        let group_key = spec.group_key;
        let device_name = device.name.clone();
        self.complete_group(CompleteGroupRequest { device, spec }, token.clone())
            .await?;
        self.complete_instance(
            CompleteInstanceRequest {
                group_key,
                device_name,
                instance,
            },
            token,
        )
        .await
    }

    /// Fail every in-flight and future resolution call with `status`.
    /// Idempotent; the first status wins.
    fn start_abort(&self, status: ColexError);
}

//! Collective executor manager - the single injection point
//!
//! The rest of the runtime depends on [`CollectiveExecutorMgr`] only; a
//! concrete backend is selected at construction time, not through an
//! inheritance chain. [`LocalCollectiveExecutorMgr`] composes the registry,
//! one param resolver, one device resolver and the step sequencer, all
//! shared for the manager's lifetime rather than per step.

use crate::core::config::CoordConfig;
use crate::core::errors::{ColexError, Result};
use crate::device::DeviceResolver;
use crate::registry::{CollectiveExecutor, ExecutorResources, StepExecutorRegistry};
use crate::resolver::{LocalParamResolver, ParamResolver};
use crate::sequencer::StepSequencer;
use crate::types::{GraphKey, StepId, StepSequenceRequest, StepSequenceResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// External collaborator seam for NCCL-style communicators. Backends built
/// without one report `Unimplemented` (or abort, when configured fatal).
pub trait NcclCommunicator: Send + Sync {
    /// Key identifying the communicator clique this process belongs to
    fn communicator_key(&self) -> String;
}

/// Top-level facade over registry, resolvers and sequencer
#[async_trait]
pub trait CollectiveExecutorMgr: Send + Sync {
    /// Executor for `step_id`, created on first use
    fn find_or_create(&self, step_id: StepId) -> Arc<CollectiveExecutor>;

    /// Release the registry's reference for `step_id`
    fn cleanup(&self, step_id: StepId);

    /// The manager's single param resolver
    fn param_resolver(&self) -> Arc<dyn ParamResolver>;

    /// The manager's single device resolver
    fn device_resolver(&self) -> Arc<dyn DeviceResolver>;

    /// NCCL communicator hook; external collaborator seam only
    fn nccl_communicator(&self) -> Result<Arc<dyn NcclCommunicator>>;

    fn next_step_id(&self, graph_key: GraphKey) -> StepId;

    fn retire_step_id(&self, graph_key: GraphKey, step_id: StepId);

    /// Cross-worker view of the current step-id windows
    async fn get_step_sequence(
        &self,
        request: StepSequenceRequest,
    ) -> Result<StepSequenceResponse>;

    /// Re-seed the step-id sequence for a graph
    async fn refresh_step_id_sequence(&self, graph_key: GraphKey) -> Result<StepId>;
}

/// In-process backend composing the real resolver protocol
pub struct LocalCollectiveExecutorMgr {
    config: CoordConfig,
    registry: StepExecutorRegistry,
    param_resolver: Arc<dyn ParamResolver>,
    device_resolver: Arc<dyn DeviceResolver>,
    sequencer: StepSequencer,
    nccl: Option<Arc<dyn NcclCommunicator>>,
}

impl LocalCollectiveExecutorMgr {
    /// Build a manager around the real in-process param resolver.
    pub fn new(config: CoordConfig, device_resolver: Arc<dyn DeviceResolver>) -> Result<Self> {
        let param_resolver: Arc<dyn ParamResolver> =
            Arc::new(LocalParamResolver::new(config.clone()));
        Self::with_param_resolver(config, param_resolver, device_resolver)
    }

    /// Build a manager around an explicit resolver backend (e.g. the stub
    /// resolver for runtimes that never execute collectives).
    pub fn with_param_resolver(
        config: CoordConfig,
        param_resolver: Arc<dyn ParamResolver>,
        device_resolver: Arc<dyn DeviceResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = StepExecutorRegistry::new(ExecutorResources {
            param_resolver: param_resolver.clone(),
            device_resolver: device_resolver.clone(),
        });
        let sequencer = StepSequencer::new(config.clone());
        Ok(Self {
            config,
            registry,
            param_resolver,
            device_resolver,
            sequencer,
            nccl: None,
        })
    }

    /// Attach an NCCL communicator provided by the surrounding runtime
    pub fn with_nccl_communicator(mut self, nccl: Arc<dyn NcclCommunicator>) -> Self {
        self.nccl = Some(nccl);
        self
    }

    /// Number of resident per-step executors
    pub fn live_executors(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for LocalCollectiveExecutorMgr {
    fn drop(&mut self) {
        let resident = self.registry.len();
        if resident > 0 {
            info!(resident, "manager dropped with resident step executors");
        }
    }
}

#[async_trait]
impl CollectiveExecutorMgr for LocalCollectiveExecutorMgr {
    fn find_or_create(&self, step_id: StepId) -> Arc<CollectiveExecutor> {
        self.registry.find_or_create(step_id)
    }

    fn cleanup(&self, step_id: StepId) {
        self.registry.cleanup(step_id)
    }

    fn param_resolver(&self) -> Arc<dyn ParamResolver> {
        self.param_resolver.clone()
    }

    fn device_resolver(&self) -> Arc<dyn DeviceResolver> {
        self.device_resolver.clone()
    }

    fn nccl_communicator(&self) -> Result<Arc<dyn NcclCommunicator>> {
        match &self.nccl {
            Some(nccl) => Ok(nccl.clone()),
            None => {
                if self.config.unimplemented_is_fatal {
                    error!("NCCL communicator requested on a backend built without one");
                    std::process::abort();
                }
                Err(ColexError::unimplemented("nccl_communicator"))
            }
        }
    }

    fn next_step_id(&self, graph_key: GraphKey) -> StepId {
        self.sequencer.next_step_id(graph_key)
    }

    fn retire_step_id(&self, graph_key: GraphKey, step_id: StepId) {
        self.sequencer.retire_step_id(graph_key, step_id)
    }

    async fn get_step_sequence(
        &self,
        request: StepSequenceRequest,
    ) -> Result<StepSequenceResponse> {
        self.sequencer.get_step_sequence(request).await
    }

    async fn refresh_step_id_sequence(&self, graph_key: GraphKey) -> Result<StepId> {
        self.sequencer.refresh_step_id_sequence(graph_key).await
    }
}

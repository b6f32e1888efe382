//! Step-keyed executor registry with reference-counted lifecycle
//!
//! One `CollectiveExecutor` exists per in-flight step id. The registry holds
//! one strong reference while the entry is resident; every caller of
//! `find_or_create` holds another. The executor drops only when the last
//! reference goes away, so `cleanup` never destroys an executor out from
//! under a caller still running a collective against it.

use crate::core::errors::Result;
use crate::device::DeviceResolver;
use crate::resolver::ParamResolver;
use crate::types::{
    DeviceAttributes, GroupSpec, InstanceSpec, ResolvedParams, StepId, INVALID_STEP_ID,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared resolver handles an executor needs to prepare a collective.
/// Cloned from the owning manager at creation time; the manager keeps the
/// single resolver instances alive for its whole lifetime.
#[derive(Clone)]
pub struct ExecutorResources {
    pub param_resolver: Arc<dyn ParamResolver>,
    pub device_resolver: Arc<dyn DeviceResolver>,
}

/// Per-step handle that collective operations run against. Thin dispatch
/// only: parameter agreement happens here, moving bytes does not.
pub struct CollectiveExecutor {
    step_id: StepId,
    resources: ExecutorResources,
}

impl CollectiveExecutor {
    fn new(step_id: StepId, resources: ExecutorResources) -> Self {
        Self { step_id, resources }
    }

    pub fn step_id(&self) -> StepId {
        self.step_id
    }

    pub fn param_resolver(&self) -> &Arc<dyn ParamResolver> {
        &self.resources.param_resolver
    }

    pub fn device_resolver(&self) -> &Arc<dyn DeviceResolver> {
        &self.resources.device_resolver
    }

    /// Resolve group and instance parameters for one device before the
    /// collective op is issued.
    pub async fn complete_params(
        &self,
        device: DeviceAttributes,
        spec: GroupSpec,
        instance: InstanceSpec,
        token: CancellationToken,
    ) -> Result<ResolvedParams> {
        self.resources
            .param_resolver
            .complete_params(device, spec, instance, token)
            .await
    }
}

impl Drop for CollectiveExecutor {
    fn drop(&mut self) {
        debug!(step_id = self.step_id, "collective executor released");
    }
}

/// Mapping from step id to its shared executor
pub struct StepExecutorRegistry {
    table: Mutex<HashMap<StepId, Arc<CollectiveExecutor>>>,
    resources: ExecutorResources,
}

impl StepExecutorRegistry {
    pub fn new(resources: ExecutorResources) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            resources,
        }
    }

    /// Return the executor for `step_id`, creating it on first use. Exactly
    /// one executor per step id is ever visible, even when two callers race
    /// on a fresh id.
    pub fn find_or_create(&self, step_id: StepId) -> Arc<CollectiveExecutor> {
        if step_id == INVALID_STEP_ID {
            warn!(step_id, "find_or_create called with the invalid step id");
        }
        let mut table = self.table.lock();
        if let Some(executor) = table.get(&step_id) {
            return executor.clone();
        }
        let executor = Arc::new(CollectiveExecutor::new(step_id, self.resources.clone()));
        table.insert(step_id, executor.clone());
        debug!(step_id, "created collective executor");
        executor
    }

    /// Drop the registry's reference for `step_id` and erase the entry.
    /// No-op when absent. Callers still holding the executor keep it alive;
    /// destruction happens when the last reference drops.
    pub fn cleanup(&self, step_id: StepId) {
        if self.table.lock().remove(&step_id).is_some() {
            debug!(step_id, "cleaned up registry entry");
        }
    }

    /// Number of resident executors
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
}

// Coordination layer components
pub mod device;
pub mod mgr;
pub mod registry;
pub mod resolver;
pub mod sequencer;
pub mod types;

// Re-exports for convenience
pub use core::config::CoordConfig;
pub use core::errors::{ColexError, Result};
pub use device::{DeviceResolver, StaticDeviceResolver};
pub use mgr::{CollectiveExecutorMgr, LocalCollectiveExecutorMgr, NcclCommunicator};
pub use registry::{CollectiveExecutor, ExecutorResources, StepExecutorRegistry};
pub use resolver::{LocalParamResolver, ParamResolver, StubParamResolver};
pub use sequencer::StepSequencer;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn two_worker_mgr() -> Arc<LocalCollectiveExecutorMgr> {
        let devices = Arc::new(StaticDeviceResolver::new(vec![
            DeviceAttributes::new("/task:0/device:cpu:0").with_task("/task:0"),
            DeviceAttributes::new("/task:1/device:cpu:0").with_task("/task:1"),
        ]));
        Arc::new(LocalCollectiveExecutorMgr::new(CoordConfig::for_testing(), devices).unwrap())
    }

    #[tokio::test]
    async fn test_two_workers_resolve_matching_params() -> Result<()> {
        let mgr = two_worker_mgr();

        let graph_key = 1;
        let step_id = mgr.next_step_id(graph_key);
        assert_ne!(step_id, INVALID_STEP_ID);

        let spec = GroupSpec {
            group_key: 100,
            group_size: 2,
        };
        let instance = InstanceSpec {
            instance_key: 7,
            kind: CollectiveKind::Reduction,
            dtype: DataType::F32,
            shape: vec![8, 8],
        };

        // Each worker thread grabs the step executor and resolves params
        // before issuing its collective op.
        let mut handles = Vec::new();
        for task in 0..2 {
            let mgr = mgr.clone();
            let spec = spec.clone();
            let instance = instance.clone();
            handles.push(tokio::spawn(async move {
                let executor = mgr.find_or_create(step_id);
                let device = mgr
                    .device_resolver()
                    .device_attributes(&format!("/task:{}/device:cpu:0", task))?;
                executor
                    .complete_params(device, spec, instance, CancellationToken::new())
                    .await
            }));
        }

        let mut resolved = Vec::new();
        for handle in handles {
            resolved.push(handle.await??);
        }

        // Both workers derived the same canonical ordering.
        assert_eq!(resolved[0].group.members, resolved[1].group.members);
        assert_eq!(
            resolved[0].group.member_names(),
            vec!["/task:0/device:cpu:0", "/task:1/device:cpu:0"]
        );
        let mut ranks: Vec<usize> = resolved.iter().map(|p| p.default_rank).collect();
        ranks.sort();
        assert_eq!(ranks, vec![0, 1]);

        mgr.cleanup(step_id);
        mgr.retire_step_id(graph_key, step_id);
        assert_eq!(mgr.live_executors(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_step_sequence_via_mgr() {
        let mgr = two_worker_mgr();
        let response = mgr
            .get_step_sequence(StepSequenceRequest {
                graph_keys: vec![1, 2],
            })
            .await
            .unwrap();
        assert_eq!(response.entries.len(), 2);

        let refreshed = mgr.refresh_step_id_sequence(1).await.unwrap();
        assert_eq!(mgr.next_step_id(1), refreshed);
    }
}

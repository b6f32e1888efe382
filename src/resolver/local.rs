//! In-process rendezvous for group and instance formation
//!
//! All bookkeeping lives behind one mutex. Waiters are parked on oneshot
//! channels and woken only after the guard is dropped, so completion never
//! runs user continuations while an internal lock is held.

use crate::core::config::CoordConfig;
use crate::core::errors::{ColexError, Result};
use crate::resolver::ParamResolver;
use crate::types::{
    CompleteGroupRequest, CompleteInstanceRequest, DeviceAttributes, GroupMembership, InstanceSpec,
    ResolvedParams,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type GroupWaiter = oneshot::Sender<Result<Arc<GroupMembership>>>;
type InstanceWaiter = oneshot::Sender<Result<()>>;

/// Group formation state: Collecting while `done` is None, Complete after.
struct GroupState {
    group_size: usize,
    pending: Vec<DeviceAttributes>,
    waiters: Vec<GroupWaiter>,
    done: Option<Arc<GroupMembership>>,
}

impl GroupState {
    fn new(group_size: usize) -> Self {
        Self {
            group_size,
            pending: Vec::new(),
            waiters: Vec::new(),
            done: None,
        }
    }
}

/// Instance formation state within a completed group
struct InstanceState {
    spec: InstanceSpec,
    checked_in: HashSet<String>,
    waiters: Vec<InstanceWaiter>,
    done: bool,
}

impl InstanceState {
    fn new(spec: InstanceSpec) -> Self {
        Self {
            spec,
            checked_in: HashSet::new(),
            waiters: Vec::new(),
            done: false,
        }
    }
}

struct ResolverState {
    groups: HashMap<i64, GroupState>,
    instances: HashMap<(i64, i64), InstanceState>,
    abort: Option<ColexError>,
}

/// The real parameter resolver: N independent workers check in and every
/// waiter observes exactly one completion decision per group/instance key.
pub struct LocalParamResolver {
    config: CoordConfig,
    state: Mutex<ResolverState>,
}

impl LocalParamResolver {
    pub fn new(config: CoordConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ResolverState {
                groups: HashMap::new(),
                instances: HashMap::new(),
                abort: None,
            }),
        }
    }

    fn make_params(
        group: Arc<GroupMembership>,
        instance: &InstanceSpec,
        rank: usize,
    ) -> ResolvedParams {
        ResolvedParams {
            group,
            instance_key: instance.instance_key,
            kind: instance.kind,
            dtype: instance.dtype,
            shape: instance.shape.clone(),
            default_rank: rank,
        }
    }
}

enum GroupOutcome {
    Ready(Result<Arc<GroupMembership>>),
    Notify(Arc<GroupMembership>, Vec<GroupWaiter>),
    Wait(oneshot::Receiver<Result<Arc<GroupMembership>>>),
}

enum InstanceOutcome {
    Ready(Result<ResolvedParams>),
    Notify(ResolvedParams, Vec<InstanceWaiter>),
    Wait(oneshot::Receiver<Result<()>>, Arc<GroupMembership>, usize),
}

#[async_trait]
impl ParamResolver for LocalParamResolver {
    async fn complete_group(
        &self,
        request: CompleteGroupRequest,
        token: CancellationToken,
    ) -> Result<Arc<GroupMembership>> {
        let CompleteGroupRequest { device, spec } = request;
        if spec.group_size == 0 {
            return Err(ColexError::configuration_field(
                "group_size must be greater than 0",
                "group_size",
            ));
        }
        if spec.group_size > self.config.max_group_size {
            return Err(ColexError::configuration_field(
                format!(
                    "group_size {} exceeds max_group_size {}",
                    spec.group_size, self.config.max_group_size
                ),
                "group_size",
            ));
        }

        let outcome = {
            let mut state = self.state.lock();
            if let Some(status) = &state.abort {
                GroupOutcome::Ready(Err(status.clone()))
            } else {
                let entry = state
                    .groups
                    .entry(spec.group_key)
                    .or_insert_with(|| GroupState::new(spec.group_size));
                if entry.group_size != spec.group_size {
                    GroupOutcome::Ready(Err(ColexError::internal_group(
                        spec.group_key,
                        format!(
                            "inconsistent group_size: group declared {}, caller {} claimed {}",
                            entry.group_size, device.name, spec.group_size
                        ),
                    )))
                } else if let Some(done) = &entry.done {
                    // Re-resolution by an existing member is idempotent;
                    // an extra device after completion is a protocol error.
                    if done.rank_of(&device.name).is_some() {
                        GroupOutcome::Ready(Ok(done.clone()))
                    } else {
                        GroupOutcome::Ready(Err(ColexError::internal_group(
                            spec.group_key,
                            format!(
                                "group already complete; device {} is not a member",
                                device.name
                            ),
                        )))
                    }
                } else if entry.pending.iter().any(|d| d.name == device.name) {
                    GroupOutcome::Ready(Err(ColexError::internal_group(
                        spec.group_key,
                        format!("device {} already registered for group", device.name),
                    )))
                } else {
                    debug!(
                        group_key = spec.group_key,
                        device = %device.name,
                        pending = entry.pending.len() + 1,
                        expected = entry.group_size,
                        "group check-in"
                    );
                    entry.pending.push(device);
                    if entry.pending.len() == entry.group_size {
                        let mut members = std::mem::take(&mut entry.pending);
                        members.sort_by(|a, b| a.canonical_cmp(b));
                        let membership = Arc::new(GroupMembership {
                            group_key: spec.group_key,
                            group_size: spec.group_size,
                            members,
                        });
                        entry.done = Some(membership.clone());
                        let waiters = std::mem::take(&mut entry.waiters);
                        GroupOutcome::Notify(membership, waiters)
                    } else {
                        let (tx, rx) = oneshot::channel();
                        entry.waiters.push(tx);
                        GroupOutcome::Wait(rx)
                    }
                }
            }
        };

        match outcome {
            GroupOutcome::Ready(result) => result,
            GroupOutcome::Notify(membership, waiters) => {
                info!(
                    group_key = membership.group_key,
                    group_size = membership.group_size,
                    "collective group complete"
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(membership.clone()));
                }
                Ok(membership)
            }
            GroupOutcome::Wait(rx) => tokio::select! {
                result = rx => {
                    result.unwrap_or_else(|_| Err(ColexError::internal("param resolver dropped")))
                }
                _ = token.cancelled() => Err(ColexError::cancelled("complete_group")),
            },
        }
    }

    async fn complete_instance(
        &self,
        request: CompleteInstanceRequest,
        token: CancellationToken,
    ) -> Result<ResolvedParams> {
        let CompleteInstanceRequest {
            group_key,
            device_name,
            instance,
        } = request;

        let outcome = {
            let mut state = self.state.lock();
            if let Some(status) = &state.abort {
                InstanceOutcome::Ready(Err(status.clone()))
            } else {
                let group = match state.groups.get(&group_key).and_then(|g| g.done.clone()) {
                    Some(group) => group,
                    None => {
                        return Err(ColexError::internal_group(
                            group_key,
                            "instance resolution requires a completed group",
                        ))
                    }
                };
                let rank = match group.rank_of(&device_name) {
                    Some(rank) => rank,
                    None => {
                        return Err(ColexError::internal_group(
                            group_key,
                            format!("device {} is not a member of the group", device_name),
                        ))
                    }
                };
                let instance_key = instance.instance_key;
                let entry = state
                    .instances
                    .entry((group_key, instance_key))
                    .or_insert_with(|| InstanceState::new(instance.clone()));
                if entry.spec != instance {
                    InstanceOutcome::Ready(Err(ColexError::internal_instance(
                        group_key,
                        instance_key,
                        format!(
                            "instance parameter mismatch from device {}: expected {:?}, got {:?}",
                            device_name, entry.spec, instance
                        ),
                    )))
                } else if entry.done {
                    InstanceOutcome::Ready(Ok(Self::make_params(group, &instance, rank)))
                } else if !entry.checked_in.insert(device_name.clone()) {
                    InstanceOutcome::Ready(Err(ColexError::internal_instance(
                        group_key,
                        instance_key,
                        format!("device {} already checked in for instance", device_name),
                    )))
                } else if entry.checked_in.len() == group.group_size {
                    entry.done = true;
                    let waiters = std::mem::take(&mut entry.waiters);
                    InstanceOutcome::Notify(Self::make_params(group, &instance, rank), waiters)
                } else {
                    debug!(
                        group_key,
                        instance_key,
                        device = %device_name,
                        checked_in = entry.checked_in.len(),
                        expected = group.group_size,
                        "instance check-in"
                    );
                    let (tx, rx) = oneshot::channel();
                    entry.waiters.push(tx);
                    InstanceOutcome::Wait(rx, group, rank)
                }
            }
        };

        match outcome {
            InstanceOutcome::Ready(result) => result,
            InstanceOutcome::Notify(params, waiters) => {
                info!(
                    group_key,
                    instance_key = params.instance_key,
                    "collective instance complete"
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                Ok(params)
            }
            InstanceOutcome::Wait(rx, group, rank) => tokio::select! {
                result = rx => {
                    result
                        .unwrap_or_else(|_| Err(ColexError::internal("param resolver dropped")))
                        .map(|_| Self::make_params(group, &instance, rank))
                }
                _ = token.cancelled() => Err(ColexError::cancelled("complete_instance")),
            },
        }
    }

    fn start_abort(&self, status: ColexError) {
        let (group_waiters, instance_waiters) = {
            let mut state = self.state.lock();
            if state.abort.is_some() {
                debug!("param resolver already aborted; keeping first status");
                return;
            }
            warn!(status = %status, "aborting collective param resolution");
            state.abort = Some(status.clone());
            let mut group_waiters = Vec::new();
            for group in state.groups.values_mut() {
                group_waiters.append(&mut group.waiters);
            }
            let mut instance_waiters = Vec::new();
            for instance in state.instances.values_mut() {
                instance_waiters.append(&mut instance.waiters);
            }
            (group_waiters, instance_waiters)
        };
        for waiter in group_waiters {
            let _ = waiter.send(Err(status.clone()));
        }
        for waiter in instance_waiters {
            let _ = waiter.send(Err(status.clone()));
        }
    }
}

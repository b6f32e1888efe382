//! Minimal resolver backend for runtimes that never execute collectives
//!
//! Reaching any resolution call on this backend means a graph containing a
//! collective op was scheduled against a build that cannot run one. That is
//! a deployment mismatch, so the default behavior is to terminate the
//! process; tests flip `unimplemented_is_fatal` off to get an error back.

use crate::core::config::CoordConfig;
use crate::core::errors::{ColexError, Result};
use crate::resolver::ParamResolver;
use crate::types::{CompleteGroupRequest, CompleteInstanceRequest, GroupMembership, ResolvedParams};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub struct StubParamResolver {
    fatal: bool,
}

impl StubParamResolver {
    pub fn new(config: &CoordConfig) -> Self {
        Self {
            fatal: config.unimplemented_is_fatal,
        }
    }

    fn unsupported(&self, capability: &str) -> ColexError {
        if self.fatal {
            error!(capability, "collective capability missing from this build");
            std::process::abort();
        }
        ColexError::unimplemented(capability)
    }
}

#[async_trait]
impl ParamResolver for StubParamResolver {
    async fn complete_group(
        &self,
        _request: CompleteGroupRequest,
        _token: CancellationToken,
    ) -> Result<Arc<GroupMembership>> {
        Err(self.unsupported("complete_group"))
    }

    async fn complete_instance(
        &self,
        _request: CompleteInstanceRequest,
        _token: CancellationToken,
    ) -> Result<ResolvedParams> {
        Err(self.unsupported("complete_instance"))
    }

    fn start_abort(&self, _status: ColexError) {}
}

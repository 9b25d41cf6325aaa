pub mod account;
pub mod group;
pub mod monitor;
pub mod token;

use tokio_util::sync::CancellationToken;

use super::args::SubscriptionArgs;
use crate::api::ArmClient;
use crate::auth::{CredentialChain, CredentialSourceConfig, build_chain};
use crate::context::{EnvDefaults, SubscriptionContext, resolve_subscription};
use crate::error::ContextResult;

pub use account::{AccountCommands, handle_account_command};
pub use group::{GroupCommands, handle_group_command};
pub use monitor::{MonitorCommands, handle_monitor_command};
pub use token::{TokenCommand, handle_token_command};

/// Resolved global options shared by every command of one invocation
#[derive(Debug)]
pub struct CommandContext {
    pub env: EnvDefaults,
    pub credentials: CredentialSourceConfig,
    pub interactive: bool,
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn credential_chain(&self) -> ContextResult<CredentialChain> {
        build_chain(&self.credentials)
    }

    pub fn arm_client(&self) -> ContextResult<ArmClient> {
        ArmClient::new(self.credential_chain()?)
    }

    pub async fn subscription(
        &self,
        client: &ArmClient,
        args: &SubscriptionArgs,
    ) -> ContextResult<SubscriptionContext> {
        let mut reference = args.reference(&self.env);
        resolve_subscription(&mut reference, client, true, &self.cancel).await
    }
}

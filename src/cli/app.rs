use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use super::args::CredentialArgs;
use super::commands::{
    AccountCommands, CommandContext, GroupCommands, MonitorCommands, TokenCommand, handle_account_command,
    handle_group_command, handle_monitor_command, handle_token_command,
};
use crate::context::EnvDefaults;
use crate::error::ContextResult;

#[derive(Parser, Debug)]
#[command(name = "maz", version)]
#[command(about = "A small command line for Azure Resource Manager")]
pub struct Cli {
    /// Allow interactive prompts
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    pub interactive: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Get an access token for Azure resources
    GetToken(TokenCommand),
    /// Manage Azure subscription information
    Account(AccountCommands),
    /// Manage resource groups
    #[command(visible_alias = "grp")]
    Group(GroupCommands),
    /// Azure Monitor
    Monitor(MonitorCommands),
}

impl Cli {
    /// Resolve global options once, then run the selected command
    pub async fn run(self, env: EnvDefaults, cancel: CancellationToken) -> ContextResult<()> {
        let credentials = self.credentials.to_config(&env)?;
        let ctx = CommandContext {
            env,
            credentials,
            interactive: self.interactive,
            cancel,
        };

        match self.command {
            Commands::GetToken(args) => handle_token_command(args, &ctx).await,
            Commands::Account(args) => handle_account_command(args, &ctx).await,
            Commands::Group(args) => handle_group_command(args, &ctx).await,
            Commands::Monitor(args) => handle_monitor_command(args, &ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "maz",
            "grp",
            "list",
            "--interactive",
            "false",
            "--allowed-credential-types",
            "env",
        ]);
        assert!(!cli.interactive);
        assert_eq!(cli.credentials.allowed_credential_types, ["env"]);
        assert!(matches!(cli.command, Commands::Group(_)));
    }
}

use std::io::{self, Write};

use clap::{Args, Subcommand};
use futures::StreamExt;

use super::CommandContext;
use crate::api::{LocationRecord, SubscriptionRecord};
use crate::cli::args::SubscriptionArgs;
use crate::error::{ContextError, ContextResult};

#[derive(Args, Debug)]
pub struct AccountCommands {
    #[command(subcommand)]
    pub command: AccountSubcommands,
}

#[derive(Subcommand, Debug)]
pub enum AccountSubcommands {
    /// List all available Azure subscriptions
    #[command(visible_alias = "ls")]
    List {
        /// Include subscriptions that are not enabled
        #[arg(long)]
        all: bool,
    },
    /// Show available locations for a subscription
    #[command(visible_alias = "locations")]
    ListLocations {
        #[command(flatten)]
        subscription: SubscriptionArgs,
    },
}

pub async fn handle_account_command(args: AccountCommands, ctx: &CommandContext) -> ContextResult<()> {
    match args.command {
        AccountSubcommands::List { all } => list_command(all, ctx).await,
        AccountSubcommands::ListLocations { subscription } => locations_command(&subscription, ctx).await,
    }
}

async fn list_command(all: bool, ctx: &CommandContext) -> ContextResult<()> {
    let client = ctx.arm_client()?;
    let mut subscriptions = client.list_subscriptions(&ctx.cancel);

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ContextError::Cancelled),
            next = subscriptions.next() => next,
        };
        let Some(subscription) = next.transpose()? else {
            break;
        };
        if !all && !subscription.is_enabled() {
            continue;
        }
        println!("{}", subscription_line(&subscription));
    }

    io::stdout().flush()?;
    Ok(())
}

async fn locations_command(args: &SubscriptionArgs, ctx: &CommandContext) -> ContextResult<()> {
    let client = ctx.arm_client()?;
    let subscription = ctx.subscription(&client, args).await?;
    for location in client.list_locations(&subscription, &ctx.cancel).await? {
        println!("{}", location_line(&location));
    }
    Ok(())
}

fn subscription_line(subscription: &SubscriptionRecord) -> String {
    format!(
        "{}: {:>30} ({:>15}) {}",
        subscription.subscription_id,
        subscription.display_name,
        subscription.state.as_deref().unwrap_or_default(),
        subscription.tenant_id.as_deref().unwrap_or_default()
    )
}

fn location_line(location: &LocationRecord) -> String {
    format!(
        "{:>20}: {:>30} ({})",
        location.name,
        location.display_name,
        location.location_type.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_line_alignment() {
        let record: SubscriptionRecord = serde_json::from_value(json!({
            "id": "/subscriptions/00000000-0000-0000-0000-000000000001",
            "subscriptionId": "00000000-0000-0000-0000-000000000001",
            "displayName": "Production",
            "tenantId": "tenant-1",
            "state": "Enabled"
        }))
        .unwrap();
        assert_eq!(
            subscription_line(&record),
            format!(
                "00000000-0000-0000-0000-000000000001: {}Production ({}Enabled) tenant-1",
                " ".repeat(20),
                " ".repeat(8)
            )
        );
    }

    #[test]
    fn test_location_line_alignment() {
        let location = LocationRecord {
            name: "eastus".to_string(),
            display_name: "East US".to_string(),
            regional_display_name: None,
            location_type: Some("Region".to_string()),
        };
        assert_eq!(
            location_line(&location),
            format!("{}eastus: {}East US (Region)", " ".repeat(14), " ".repeat(23))
        );
    }
}

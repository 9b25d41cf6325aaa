use clap::{Args, Subcommand};
use futures::StreamExt;
use log::info;
use tokio::io::{self, AsyncWriteExt};

use super::CommandContext;
use crate::api::{ResourceGroupData, ResourceGroupResource, WaitUntil};
use crate::cli::args::{RenderArgs, ResourceGroupArgs, SubscriptionArgs};
use crate::context::{Location, Tag, append_tags_to, require_location};
use crate::error::{ContextError, ContextResult};
use crate::render::{Renderable, Renderer, renderer_for};
use crate::ui::require_confirmation;

#[derive(Args, Debug)]
pub struct GroupCommands {
    #[command(subcommand)]
    pub command: GroupSubcommands,
}

#[derive(Subcommand, Debug)]
pub enum GroupSubcommands {
    /// Create a new resource group
    Create {
        #[command(flatten)]
        subscription: SubscriptionArgs,
        #[command(flatten)]
        resource_group: ResourceGroupArgs,
        /// Location of the resource group (e.g. "East US" or eastus)
        #[arg(short, long)]
        location: Option<Location>,
        /// Tags as key=value pairs
        #[arg(long, num_args = 1..)]
        tags: Vec<Tag>,
        /// The id of the resource which manages this resource group
        #[arg(long)]
        managed_by: Option<String>,
        /// Wait for the operation to complete or only until it has started
        #[arg(long, visible_alias = "wait", value_enum, default_value = "completed")]
        wait_until: WaitUntil,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// List resource groups
    #[command(visible_alias = "ls")]
    List {
        #[command(flatten)]
        subscription: SubscriptionArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Show details of a resource group
    Show {
        #[command(flatten)]
        subscription: SubscriptionArgs,
        #[command(flatten)]
        resource_group: ResourceGroupArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Delete a resource group
    Delete {
        #[command(flatten)]
        subscription: SubscriptionArgs,
        #[command(flatten)]
        resource_group: ResourceGroupArgs,
        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes", visible_alias = "confirm")]
        confirm: bool,
        /// Resource types to force delete (Microsoft.Compute/virtualMachines, Microsoft.Compute/virtualMachineScaleSets)
        #[arg(long, num_args = 1..)]
        force_deletion_types: Vec<String>,
        /// Wait for the operation to complete or only until it has started
        #[arg(long, visible_alias = "wait", value_enum, default_value = "completed")]
        wait_until: WaitUntil,
    },
}

pub async fn handle_group_command(args: GroupCommands, ctx: &CommandContext) -> ContextResult<()> {
    match args.command {
        GroupSubcommands::Create {
            subscription,
            resource_group,
            location,
            tags,
            managed_by,
            wait_until: _,
            render,
        } => {
            let client = ctx.arm_client()?;
            let subscription = ctx.subscription(&client, &subscription).await?;
            let renderer = renderer_for::<ResourceGroupResource>(render.format, render.options())?;

            let mut data = ResourceGroupData::new(require_location(location.as_ref())?);
            data.managed_by = managed_by;
            append_tags_to(&tags, &mut data.tags);

            // Resource group writes complete synchronously, so both wait modes return the group
            let name = resource_group.require(&ctx.env)?;
            let created = client
                .create_or_update_resource_group(&subscription, &name, &data, &ctx.cancel)
                .await?;
            render_one(renderer.as_ref(), &created, ctx).await
        }
        GroupSubcommands::List { subscription, render } => {
            let client = ctx.arm_client()?;
            let subscription = ctx.subscription(&client, &subscription).await?;
            let renderer = renderer_for::<ResourceGroupResource>(render.format, render.options())?;

            let mut groups = client.list_resource_groups(&subscription, &ctx.cancel);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(ContextError::Cancelled),
                    next = groups.next() => next,
                };
                let Some(group) = next.transpose()? else {
                    break;
                };
                render_one(renderer.as_ref(), &group, ctx).await?;
            }
            Ok(())
        }
        GroupSubcommands::Show {
            subscription,
            resource_group,
            render,
        } => {
            let client = ctx.arm_client()?;
            let subscription = ctx.subscription(&client, &subscription).await?;
            let renderer = renderer_for::<ResourceGroupResource>(render.format, render.options())?;
            let name = resource_group.require(&ctx.env)?;
            let group = client.get_resource_group(&subscription, &name, &ctx.cancel).await?;
            render_one(renderer.as_ref(), &group, ctx).await
        }
        GroupSubcommands::Delete {
            subscription,
            resource_group,
            confirm,
            force_deletion_types,
            wait_until,
        } => {
            let client = ctx.arm_client()?;
            let subscription = ctx.subscription(&client, &subscription).await?;
            let name = resource_group.require(&ctx.env)?;
            let group = client.get_resource_group(&subscription, &name, &ctx.cancel).await?;

            let force_deletion_types = join_force_deletion_types(&force_deletion_types);
            require_confirmation(confirm, ctx.interactive, &ctx.cancel).await?;

            info!("Deleting resource group {}", group.id);
            client
                .delete_resource_group(&group, force_deletion_types.as_deref(), wait_until, &ctx.cancel)
                .await
        }
    }
}

async fn render_one(
    renderer: &dyn Renderer,
    value: &dyn Renderable,
    ctx: &CommandContext,
) -> ContextResult<()> {
    let mut stdout = io::stdout();
    renderer.render(&mut stdout, value, &ctx.cancel).await?;
    stdout.flush().await?;
    Ok(())
}

fn join_force_deletion_types(types: &[String]) -> Option<String> {
    (!types.is_empty()).then(|| types.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: GroupSubcommands,
    }

    #[test]
    fn test_force_deletion_types_are_comma_joined() {
        assert_eq!(join_force_deletion_types(&[]), None);
        assert_eq!(
            join_force_deletion_types(&[
                "Microsoft.Compute/virtualMachines".to_string(),
                "Microsoft.Compute/virtualMachineScaleSets".to_string()
            ])
            .as_deref(),
            Some("Microsoft.Compute/virtualMachines,Microsoft.Compute/virtualMachineScaleSets")
        );
    }

    #[test]
    fn test_create_arguments() {
        let parsed = Harness::parse_from([
            "group", "create", "-g", "rg1", "--location", "West Europe", "--tags", "env=prod", "team=core",
            "--wait", "started",
        ]);
        match parsed.command {
            GroupSubcommands::Create {
                resource_group,
                location,
                tags,
                wait_until,
                ..
            } => {
                assert_eq!(resource_group.resource_group.as_deref(), Some("rg1"));
                assert_eq!(location.unwrap().name(), "westeurope");
                assert_eq!(tags.len(), 2);
                assert_eq!(wait_until, WaitUntil::Started);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_delete_defaults() {
        let parsed = Harness::parse_from(["group", "delete", "--resource-group-name", "rg1"]);
        match parsed.command {
            GroupSubcommands::Delete {
                confirm,
                wait_until,
                force_deletion_types,
                ..
            } => {
                assert!(!confirm);
                assert_eq!(wait_until, WaitUntil::Completed);
                assert!(force_deletion_types.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

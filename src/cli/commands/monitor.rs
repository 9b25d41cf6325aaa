use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde_json::Value;
use tokio::io::{self, AsyncWriteExt};
use uuid::Uuid;

use super::CommandContext;
use crate::api::{LogsQueryClient, LogsQueryOptions, LogsQueryResult, LogsQueryTarget, ResourceIdentifier};
use crate::error::{ContextError, ContextResult};

#[derive(Args, Debug)]
pub struct MonitorCommands {
    #[command(subcommand)]
    pub command: MonitorSubcommands,
}

#[derive(Subcommand, Debug)]
pub enum MonitorSubcommands {
    /// Query Log Analytics workspaces
    LogAnalytics {
        #[command(subcommand)]
        command: LogAnalyticsSubcommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogAnalyticsSubcommands {
    /// Query Azure Monitor Log Analytics workspaces or Azure resource logs
    Query(QueryArgs),
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// The Log Analytics query to execute
    #[arg(short, long)]
    pub query: String,

    /// The workspace id to query against
    #[arg(short, long, visible_alias = "workspace")]
    pub workspace_id: Option<Uuid>,

    /// The resource id to query against
    #[arg(short, long, visible_alias = "resource")]
    pub resource_id: Option<String>,

    /// Save the visualization output to a file
    #[arg(long, visible_alias = "vis-output")]
    pub visualization_output: Option<PathBuf>,

    /// Include query statistics in the output
    #[arg(long, visible_alias = "stats")]
    pub include_statistics: bool,

    /// Additional workspaces to include in the query
    #[arg(long, num_args = 1..)]
    pub additional_workspaces: Vec<String>,
}

impl QueryArgs {
    fn target(&self) -> ContextResult<LogsQueryTarget> {
        if let Some(workspace) = self.workspace_id {
            return Ok(LogsQueryTarget::Workspace(workspace.to_string()));
        }
        if let Some(resource) = &self.resource_id {
            let id = ResourceIdentifier::parse(resource).map_err(ContextError::InvalidIdentifierFormat)?;
            return Ok(LogsQueryTarget::Resource(id));
        }
        Err(ContextError::Configuration(
            "Either --workspace-id or --resource-id must be specified for the query.".to_string(),
        ))
    }

    fn options(&self) -> LogsQueryOptions {
        LogsQueryOptions {
            include_statistics: self.include_statistics,
            include_visualization: self.visualization_output.is_some(),
            additional_workspaces: self.additional_workspaces.clone(),
        }
    }
}

pub async fn handle_monitor_command(args: MonitorCommands, ctx: &CommandContext) -> ContextResult<()> {
    match args.command {
        MonitorSubcommands::LogAnalytics {
            command: LogAnalyticsSubcommands::Query(query),
        } => query_command(query, ctx).await,
    }
}

async fn query_command(args: QueryArgs, ctx: &CommandContext) -> ContextResult<()> {
    let target = args.target()?;
    let client = LogsQueryClient::new(ctx.credential_chain()?)?;
    let result = client
        .query(&target, &args.query, &args.options(), &ctx.cancel)
        .await?;

    if let Some(path) = &args.visualization_output {
        save_visualization(&result, path).await?;
    }

    let mut stdout = io::stdout();
    for row in &result.table()?.rows {
        let line = format!("{}\n", format_row(row));
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ContextError::Cancelled),
            written = stdout.write_all(line.as_bytes()) => written?,
        }
    }
    stdout.flush().await?;

    if args.include_statistics {
        match &result.statistics {
            Some(stats) => {
                eprintln!("Query Statistics:");
                eprintln!("{stats}");
            }
            None => eprintln!("No statistics data available."),
        }
    }
    Ok(())
}

async fn save_visualization(result: &LogsQueryResult, path: &Path) -> ContextResult<()> {
    match &result.render {
        Some(visualization) => {
            let bytes = serde_json::to_vec(visualization).map_err(|e| ContextError::Remote(e.into()))?;
            tokio::fs::write(path, bytes).await?;
            eprintln!("Visualization saved to {}", path.display());
        }
        None => eprintln!("No visualization data available."),
    }
    Ok(())
}

fn format_row(row: &[Value]) -> String {
    row.iter().map(format_cell).collect::<Vec<_>>().join("\t")
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        query: QueryArgs,
    }

    #[test]
    fn test_rows_are_tab_separated() {
        let row = [json!("2024-01-01T00:00:00Z"), json!(12), Value::Null, json!(true)];
        assert_eq!(format_row(&row), "2024-01-01T00:00:00Z\t12\tnull\ttrue");
    }

    #[test]
    fn test_target_is_required() {
        let args = Harness::parse_from(["maz", "--query", "Heartbeat | take 1"]).query;
        let err = args.target().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Either --workspace-id or --resource-id must be specified for the query."
        );
    }

    #[test]
    fn test_workspace_alias_and_options() {
        let args = Harness::parse_from([
            "maz",
            "--query",
            "Heartbeat",
            "--workspace",
            "00000000-0000-0000-0000-000000000001",
            "--stats",
            "--vis-output",
            "chart.json",
        ])
        .query;
        assert_eq!(
            args.target().unwrap(),
            LogsQueryTarget::Workspace("00000000-0000-0000-0000-000000000001".to_string())
        );
        let options = args.options();
        assert!(options.include_statistics);
        assert!(options.include_visualization);
    }
}

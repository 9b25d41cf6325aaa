use std::io::{self, Write};

use clap::{ArgAction, Args};
use log::info;
use reqwest::Url;

use super::CommandContext;
use crate::auth::{MANAGEMENT_SCOPE, TokenRequestContext};
use crate::error::ContextResult;

#[derive(Args, Debug)]
pub struct TokenCommand {
    /// The scopes required for the token
    #[arg(long, num_args = 1.., visible_aliases = ["resource", "resources"], default_values = [MANAGEMENT_SCOPE])]
    pub scopes: Vec<String>,

    /// The parent request id for the token request
    #[arg(long)]
    pub parent_request_id: Option<String>,

    /// Additional claims to be included in the token
    #[arg(long)]
    pub claims: Option<String>,

    /// The tenant id to be included in the token request
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Enable Continuous Access Evaluation for the requested token
    #[arg(long)]
    pub is_cae_enabled: bool,

    /// Enable Proof of Possession for the requested token
    #[arg(long)]
    pub is_proof_of_possession_enabled: bool,

    /// The nonce value required for PoP token requests
    #[arg(long)]
    pub proof_of_possession_nonce: Option<String>,

    /// The resource request URI to be authorized with a PoP token
    #[arg(long)]
    pub proof_of_possession_request_uri: Option<Url>,

    /// The HTTP method of the resource request (GET, POST, ...)
    #[arg(long)]
    pub proof_of_possession_request_method: Option<String>,

    /// Print only the raw token
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub print_raw_token: bool,
}

impl TokenCommand {
    fn request_context(&self) -> TokenRequestContext {
        TokenRequestContext {
            scopes: self.scopes.clone(),
            parent_request_id: self.parent_request_id.clone(),
            claims: self.claims.clone(),
            tenant_id: self.tenant_id.clone(),
            cae_enabled: self.is_cae_enabled,
            pop_enabled: self.is_proof_of_possession_enabled,
            pop_nonce: self.proof_of_possession_nonce.clone(),
            pop_request_uri: self.proof_of_possession_request_uri.clone(),
            pop_request_method: self.proof_of_possession_request_method.clone(),
        }
    }
}

pub async fn handle_token_command(args: TokenCommand, ctx: &CommandContext) -> ContextResult<()> {
    let chain = ctx.credential_chain()?;
    info!("Requesting a token for {}", args.scopes.join(" "));
    let token = chain.get_token(&args.request_context(), &ctx.cancel).await?;

    let mut stdout = io::stdout().lock();
    if args.print_raw_token {
        write!(stdout, "{}", token.token)?;
    } else {
        writeln!(stdout, "Access Token: {}", token.token)?;
        writeln!(stdout, "Expires On: {}", token.expires_on)?;
        writeln!(
            stdout,
            "Refresh On: {}",
            token.refresh_on.map(|r| r.to_string()).unwrap_or_default()
        )?;
        writeln!(stdout, "Token Type: {}", token.token_type)?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        token: TokenCommand,
    }

    #[test]
    fn test_defaults() {
        let args = Harness::parse_from(["maz"]).token;
        assert_eq!(args.scopes, [MANAGEMENT_SCOPE]);
        assert!(args.print_raw_token);
        assert!(!args.request_context().pop_enabled);
    }

    #[test]
    fn test_resource_alias_and_raw_flag() {
        let args = Harness::parse_from([
            "maz",
            "--resource",
            "https://vault.azure.net/.default",
            "--print-raw-token",
            "false",
            "--tenant-id",
            "contoso",
        ])
        .token;
        let request = args.request_context();
        assert_eq!(request.scopes, ["https://vault.azure.net/.default"]);
        assert_eq!(request.tenant_id.as_deref(), Some("contoso"));
        assert!(!args.print_raw_token);
    }
}

//! Command-line arguments

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vault_auth::TwoFactorProviderType;

#[derive(Debug, Parser)]
#[command(name = "vault-cli")]
#[command(about = "Authenticated vault API client")]
pub struct Cli {
    /// Config file (default: vault-cli.toml)
    #[arg(long, env = "CONFIG_PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    pub metrics: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Print the account profile
    Profile,
    /// Print the vault revision date (unix ms)
    RevisionDate,
    /// Print the full sync payload
    Sync,
    /// Exchange the refresh token for a new pair
    Refresh,
    /// Log in with e-mail and master password hash
    Login(LoginArgs),
}

#[derive(Debug, PartialEq, Args)]
pub struct LoginArgs {
    pub email: String,
    pub password_hash: String,
    /// Second-factor code
    #[arg(long, requires = "provider")]
    pub code: Option<String>,
    /// Second-factor provider, by id or name
    #[arg(long, value_parser = parse_provider, requires = "code")]
    pub provider: Option<TwoFactorProviderType>,
    /// Ask the server for a remember token
    #[arg(long)]
    pub remember: bool,
}

impl LoginArgs {
    pub fn second_factor(&self) -> Option<(TwoFactorProviderType, String)> {
        self.provider.zip(self.code.clone())
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Profile => "profile",
            Command::RevisionDate => "revision-date",
            Command::Sync => "sync",
            Command::Refresh => "refresh",
            Command::Login(_) => "login",
        }
    }
}

fn parse_provider(value: &str) -> Result<TwoFactorProviderType, String> {
    if let Ok(id) = value.parse::<u8>() {
        return TwoFactorProviderType::from_id(id)
            .ok_or_else(|| format!("unknown two-factor provider id {id}"));
    }
    (0..=6)
        .filter_map(TwoFactorProviderType::from_id)
        .find(|p| p.label().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown two-factor provider {value}"))
}

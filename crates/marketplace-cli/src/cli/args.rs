use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "marketplace",
    version,
    about = "Integration marketplace registry: trusted CI publishing and catalog queries"
)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "MARKETPLACE_DATABASE_PATH")]
    pub database: Option<PathBuf>,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database schema (idempotent)
    InitDb,
    /// Publish an integration on behalf of a CI identity token
    Publish(PublishArgs),
    /// List integrations
    List(ListArgs),
    /// Show one integration (latest version unless --version is given)
    Get(GetArgs),
    /// List all versions of an integration, newest first
    Versions(IdArgs),
    /// Record a download of the latest version
    RecordDownload(IdArgs),
    /// Mark the latest version as featured (or clear it with --off)
    Feature(FeatureArgs),
}

#[derive(clap::Args, Debug)]
pub struct PublishArgs {
    /// Publish request JSON file ("-" reads stdin)
    #[arg(long)]
    pub request: PathBuf,

    /// CI identity token (raw JWT)
    #[arg(long, env = "MARKETPLACE_PUBLISH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Include versions that are no longer latest
    #[arg(long)]
    pub all: bool,

    /// Only featured integrations
    #[arg(long)]
    pub featured: bool,

    /// Sort key: downloads, trending, version or name
    #[arg(long, default_value = "name")]
    pub sort: String,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    pub id: String,

    #[arg(long)]
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct IdArgs {
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct FeatureArgs {
    pub id: String,

    /// Clear the featured flag instead of setting it
    #[arg(long)]
    pub off: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_args_parse() {
        let cli = Cli::try_parse_from([
            "marketplace",
            "--database",
            "/tmp/m.db",
            "publish",
            "--request",
            "req.json",
            "--token",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/m.db")));
        match cli.cmd {
            Command::Publish(args) => {
                assert_eq!(args.request, PathBuf::from("req.json"));
                assert_eq!(args.token.as_deref(), Some("abc"));
            }
            _ => panic!("expected publish"),
        }
    }

    #[test]
    fn test_list_defaults() {
        let cli = Cli::try_parse_from(["marketplace", "list"]).unwrap();
        match cli.cmd {
            Command::List(args) => {
                assert!(!args.all);
                assert!(!args.featured);
                assert_eq!(args.sort, "name");
            }
            _ => panic!("expected list"),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }
}

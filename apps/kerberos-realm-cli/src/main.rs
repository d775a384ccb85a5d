//! `kerberos-realm` operator binary.

mod commands;
mod logging;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "kerberos-realm", version, about = "Kerberos realm operator tool")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, default_value = "config/kerberos-realm.yml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one negotiation round for an `Authorization` header value
    Negotiate {
        /// Full header value, e.g. "Negotiate YIIF..."
        header: Option<String>,
    },
    /// Build the role mapping and print it as JSON
    Mapping,
    /// Check whether a principal belongs to a group through nested groups
    IsMember {
        #[arg(long)]
        principal: String,
        #[arg(long)]
        group: String,
    },
    /// Keep the role mapping fresh until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.json_logs);
    let cfg = settings::load(&cli.config)?;

    match cli.command {
        Command::Negotiate { header } => commands::negotiate(cfg, header.as_deref()).await?,
        Command::Mapping => commands::mapping(&cfg).await?,
        Command::IsMember { principal, group } => {
            if !commands::is_member(cfg, &principal, &group).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Run => commands::run(cfg).await?,
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parses_is_member() {
        let cli = Cli::try_parse_from([
            "kerberos-realm",
            "--config",
            "realm.yml",
            "is-member",
            "--principal",
            "alice@CORP.EXAMPLE.COM",
            "--group",
            "CN=Admins,DC=corp",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("realm.yml"));
        assert!(matches!(
            cli.command,
            Command::IsMember { ref principal, .. } if principal == "alice@CORP.EXAMPLE.COM"
        ));
    }

    #[test]
    fn negotiate_header_is_optional() {
        let cli = Cli::try_parse_from(["kerberos-realm", "negotiate"]).unwrap();
        assert!(matches!(cli.command, Command::Negotiate { header: None }));
        assert_eq!(cli.config, PathBuf::from("config/kerberos-realm.yml"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory as _;
        Cli::command().debug_assert();
    }
}

// CLI interface
pub mod commands;

use crate::error::Result;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "aws-cli-oidc")]
#[command(
    about = "Get AWS credentials through an OpenID Connect login",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never launch a browser, only print the login URL
    #[arg(long, global = true, env = "AWS_CLI_OIDC_HEADLESS")]
    pub headless: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Get AWS credentials for a role and print them
    ///
    /// Without --print the output is the JSON expected by `credential_process`:
    ///
    ///   [profile deploy]
    ///   credential_process = aws-cli-oidc get-cred corp arn:aws:iam::123456789012:role/Deploy
    GetCred {
        /// Provider name from the config file
        provider: String,

        /// ARN of the role to assume
        role: String,

        /// Print shell export lines instead of JSON
        #[arg(short, long)]
        print: bool,

        /// Requested session duration in seconds (0 = provider maximum)
        #[arg(short, long, default_value_t = 0)]
        duration: i64,
    },

    /// Configure an OIDC provider interactively
    Setup {
        /// Provider name to create or update
        provider: String,
    },

    /// Inspect or clear cached tokens and credentials
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Open the AWS Console in a browser for a role
    Console {
        /// Provider name from the config file
        provider: String,

        /// ARN of the role to assume
        role: String,

        /// AWS region to open the console in
        #[arg(long)]
        region: Option<String>,
    },

    /// Generate shell completion scripts
    ///
    /// INSTALLATION:
    ///
    /// Bash:
    ///   eval "$(aws-cli-oidc completions bash)"    # Add to ~/.bashrc
    ///
    /// Zsh:
    ///   eval "$(aws-cli-oidc completions zsh)"     # Add to ~/.zshrc
    ///
    /// Fish:
    ///   aws-cli-oidc completions fish > ~/.config/fish/completions/aws-cli-oidc.fish
    Completions {
        /// Shell type to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached entries and their remaining validity
    Show,

    /// Remove every cached token and credential
    Clear,
}

#[derive(Debug, Clone, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

pub async fn execute(args: Cli) -> Result<()> {
    let headless = crate::env::is_headless_environment(args.headless);

    match args.command {
        Commands::GetCred {
            provider,
            role,
            print,
            duration,
        } => commands::get_cred::execute(&provider, &role, print, duration, headless).await,
        Commands::Setup { provider } => commands::setup::execute(&provider).await,
        Commands::Cache { action } => commands::cache::execute(action),
        Commands::Console {
            provider,
            role,
            region,
        } => commands::console::execute(&provider, &role, region.as_deref(), headless).await,
        Commands::Completions { shell } => {
            commands::completions::execute(shell);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_cred() {
        let cli = Cli::try_parse_from([
            "aws-cli-oidc",
            "get-cred",
            "corp",
            "arn:aws:iam::123456789012:role/Deploy",
            "--print",
            "--duration",
            "7200",
        ])
        .unwrap();

        match cli.command {
            Commands::GetCred {
                provider,
                role,
                print,
                duration,
            } => {
                assert_eq!(provider, "corp");
                assert_eq!(role, "arn:aws:iam::123456789012:role/Deploy");
                assert!(print);
                assert_eq!(duration, 7200);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli = Cli::try_parse_from(["aws-cli-oidc", "cache", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clear
            }
        ));
    }
}

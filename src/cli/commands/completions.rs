use crate::cli::{Cli, Shell};
use clap::CommandFactory;
use clap_complete::{generate, Shell as ClapShell};
use std::io;

const BIN_NAME: &str = "aws-cli-oidc";

pub fn execute(shell: Shell) {
    let mut cmd = Cli::command();

    eprintln!("Generating completion file for {:?}...", shell);
    generate(to_clap_shell(&shell), &mut cmd, BIN_NAME, &mut io::stdout());
    eprintln!("\n# Installation instructions:");

    match shell {
        Shell::Bash => {
            eprintln!("# Add to ~/.bashrc:");
            eprintln!("#   eval \"$({} completions bash)\"", BIN_NAME);
        }
        Shell::Zsh => {
            eprintln!("# Save to completion directory:");
            eprintln!("#   {} completions zsh > ~/.zfunc/_{}", BIN_NAME, BIN_NAME);
            eprintln!("#   Then add to ~/.zshrc: fpath=(~/.zfunc $fpath)");
        }
        Shell::Fish => {
            eprintln!("# Save to fish completion directory:");
            eprintln!(
                "#   {} completions fish > ~/.config/fish/completions/{}.fish",
                BIN_NAME, BIN_NAME
            );
        }
        Shell::PowerShell => {
            eprintln!("# Add to PowerShell profile:");
            eprintln!("#   {} completions powershell | Out-String | Invoke-Expression", BIN_NAME);
        }
        Shell::Elvish => {
            eprintln!("# Add to Elvish config:");
            eprintln!("#   eval ({} completions elvish | slurp)", BIN_NAME);
        }
    }
}

fn to_clap_shell(shell: &Shell) -> ClapShell {
    match shell {
        Shell::Bash => ClapShell::Bash,
        Shell::Zsh => ClapShell::Zsh,
        Shell::Fish => ClapShell::Fish,
        Shell::PowerShell => ClapShell::PowerShell,
        Shell::Elvish => ClapShell::Elvish,
    }
}

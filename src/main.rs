use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use plak::cli::{self, Context};
use plak::config::Paths;
use plak::{PlakError, Result};

#[derive(Parser)]
#[command(name = "plak")]
#[command(version)]
#[command(about = "Manage SSH connections, hosts-file domains and SSH keys", long_about = None)]
struct Cli {
    /// SSH client config file [default: ~/.ssh/config]
    #[arg(long, global = true, env = "PLAK_SSH_CONFIG", value_name = "PATH")]
    ssh_config: Option<PathBuf>,

    /// Hosts file [default: /etc/hosts]
    #[arg(long, global = true, env = "PLAK_HOSTS_FILE", value_name = "PATH")]
    hosts_file: Option<PathBuf>,

    /// Directory holding SSH keys [default: ~/.ssh]
    #[arg(long, global = true, env = "PLAK_KEY_DIR", value_name = "DIR")]
    key_dir: Option<PathBuf>,

    /// Do not ask for confirmation before deleting
    #[arg(short, long, global = true)]
    yes: bool,

    /// Never retry hosts-file writes through sudo
    #[arg(long, global = true)]
    no_sudo: bool,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage SSH connections in the SSH config
    Server {
        #[command(subcommand)]
        action: ServerCommands,
    },

    /// Manage domains in the hosts file
    Domain {
        #[command(subcommand)]
        action: DomainCommands,
    },

    /// Manage SSH keys
    Sshkey {
        #[command(subcommand)]
        action: SshkeyCommands,
    },
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Add a new connection
    Create,
    /// Show configured connections
    View {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a connection
    Delete {
        /// Connection name (asked interactively if omitted)
        name: Option<String>,
    },
    /// Connect to a server
    Connect {
        /// Connection name (asked interactively if omitted)
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum DomainCommands {
    /// Map a domain to an IP address
    Create {
        /// Domain name (asked interactively if omitted)
        domain: Option<String>,
        /// IP address [default: 127.0.0.1]
        #[arg(long)]
        ip: Option<String>,
    },
    /// Show domains in the hosts file
    View {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a domain
    Delete {
        /// Domain name (asked interactively if omitted)
        domain: Option<String>,
        /// Only delete the mapping to this IP
        #[arg(long)]
        ip: Option<String>,
    },
}

#[derive(Subcommand)]
enum SshkeyCommands {
    /// Generate a key pair with ssh-keygen
    Create,
    /// Show keys, or the details of one key
    View {
        /// Key name
        name: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a key pair
    Delete {
        /// Key name (asked interactively if omitted)
        name: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(PlakError::Cancelled) => {
            println!("{}", "Operation cancelled.".yellow());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Cli) -> Result<()> {
    let paths = Paths::resolve(args.ssh_config, args.hosts_file, args.key_dir)?;
    let mut ctx = Context::new(paths);
    ctx.assume_yes = args.yes;
    ctx.elevate = !args.no_sudo && needs_elevation();

    match args.command {
        Commands::Server { action } => match action {
            ServerCommands::Create => cli::server::create(&ctx),
            ServerCommands::View { json } => cli::server::view(&ctx, json),
            ServerCommands::Delete { name } => cli::server::delete(&ctx, name),
            ServerCommands::Connect { name } => cli::server::connect(&ctx, name),
        },
        Commands::Domain { action } => match action {
            DomainCommands::Create { domain, ip } => cli::domain::create(&ctx, domain, ip),
            DomainCommands::View { json } => cli::domain::view(&ctx, json),
            DomainCommands::Delete { domain, ip } => cli::domain::delete(&ctx, domain, ip),
        },
        Commands::Sshkey { action } => match action {
            SshkeyCommands::Create => cli::sshkey::create(&ctx),
            SshkeyCommands::View { name, json } => cli::sshkey::view(&ctx, name, json),
            SshkeyCommands::Delete { name } => cli::sshkey::delete(&ctx, name),
        },
    }
}

/// sudo is only worth trying for a non-root user on Unix
#[cfg(unix)]
fn needs_elevation() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() != 0 }
}

#[cfg(not(unix))]
fn needs_elevation() -> bool {
    false
}

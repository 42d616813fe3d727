use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use recharge_core::CoreError;
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "recharge-cli", version, about = "Recharge timer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report a user's current amount and start recharging
    Report {
        /// User ID
        user: String,
        /// Current amount
        amount: u32,
        /// Time left on the unit in progress, as m:ss or seconds
        #[arg(long)]
        carry: Option<String>,
    },
    /// Show a user's recharge status
    Status {
        /// User ID
        user: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a user's maximum capacity
    Capacity {
        /// User ID
        user: String,
        /// New maximum capacity
        max: u32,
    },
    /// Set the time zone used to show a user's finish time
    Timezone {
        /// User ID
        user: String,
        /// IANA zone name (e.g. "Europe/Lisbon")
        tz: String,
    },
    /// Remember the message ID of a user's status panel
    Panel {
        /// User ID
        user: String,
        /// Message ID; omit to clear
        message_id: Option<String>,
    },
    /// List every stored user
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a single sweep and print the report as JSON
    Sweep,
    /// Run the sweeper until Ctrl-C or SIGTERM
    Daemon,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Report {
            user,
            amount,
            carry,
        } => commands::recharge::report(&user, amount, carry.as_deref()),
        Commands::Status { user, json } => commands::recharge::status(&user, json),
        Commands::Capacity { user, max } => commands::recharge::capacity(&user, max),
        Commands::Timezone { user, tz } => commands::recharge::timezone(&user, &tz),
        Commands::Panel { user, message_id } => commands::recharge::panel(&user, message_id),
        Commands::List { json } => commands::recharge::list(json),
        Commands::Sweep => commands::sweeper::sweep_once(),
        Commands::Daemon => commands::sweeper::daemon(),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "recharge-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        if e.downcast_ref::<CoreError>().is_some_and(CoreError::is_transient) {
            eprintln!("this is likely temporary, try again shortly");
        }
        std::process::exit(1);
    }
}

mod cmd;

use clap::Parser;
use cmd::report::RunOptions;

#[derive(Parser)]
#[command(
    name = "md2slack",
    about = "Turn a day of git history into a Slack daily status report",
    version
)]
struct Cli {
    /// Don't send to Slack; print the git facts, report and Slack blocks
    #[arg(long)]
    debug: bool,

    /// Link ~/.md2slack to the current directory
    #[arg(long)]
    install: bool,

    /// Serve the Workspace web UI
    #[arg(long)]
    web: bool,

    /// Workspace address as host:port (default: [server] in config.ini, then 127.0.0.1:8080)
    #[arg(long, env = "MD2SLACK_WEB_ADDR")]
    web_addr: Option<String>,

    /// Open the Workspace in a browser once it is listening
    #[arg(long, requires = "web")]
    open: bool,

    /// Report date as MM-DD-YYYY; several may be given comma separated
    #[arg(required_unless_present_any = ["web", "install"])]
    dates: Option<String>,

    /// Extra context handed to the model, e.g. work that left no commits
    #[arg(trailing_var_arg = true)]
    extra: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = if cli.install {
        cmd::install::run()
    } else {
        cmd::report::run(RunOptions {
            debug: cli.debug,
            web: cli.web,
            web_addr: cli.web_addr,
            open: cli.open,
            dates: cmd::report::split_dates(cli.dates.as_deref().unwrap_or_default()),
            extra: cmd::report::clean_extra(&cli.extra),
        })
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use webdiff::config;
use webdiff::error::{EXIT_CONFIG, EXIT_DIFFERS, EXIT_OK};
use webdiff::logging::init_logging;
use webdiff::pipeline::FailurePolicy;
use webdiff::run::{RunOptions, run};

/// webdiff - compare two deployments of a site screenshot by screenshot
#[derive(Parser, Debug)]
#[command(
    name = "webdiff",
    version,
    about = "Capture the same pages on two environments and report pixel differences",
    after_help = "INPUT:\n\
        One relative path per line, or 'EXEC <script>' to run a script in both browsers.\n\
        Blank lines and lines starting with '#' are ignored.\n\n\
        ENVIRONMENT VARIABLES:\n\
        WEBDIFF_OUTPUT           Reports output directory\n\
        WEBDIFF_PROFILE          Profile TOML file\n\
        WEBDIFF_TEMPLATE         HTML report template\n\
        WEBDIFF_WEBDRIVER_URL    WebDriver endpoint when the profile sets none\n\
        WEBDIFF_LOG              Log filter when RUST_LOG is unset"
)]
struct Args {
    /// Base URL of the reference environment
    left: String,

    /// Base URL of the environment under test
    right: String,

    /// Target list file (default: stdin)
    input: Option<PathBuf>,

    /// Directory receiving one timestamped folder per run
    #[arg(short, long, env = config::ENV_OUTPUT_DIR, default_value = config::DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Profile TOML file; the .toml extension may be omitted
    #[arg(short, long, env = config::ENV_PROFILE, default_value = config::DEFAULT_PROFILE)]
    profile: PathBuf,

    /// HTML report template; the .html extension may be omitted
    #[arg(short, long, env = config::ENV_TEMPLATE, default_value = config::DEFAULT_TEMPLATE)]
    template: PathBuf,

    /// Record failed pages in the report instead of stopping the run
    #[arg(long)]
    keep_going: bool,

    /// Exit with code 3 when any page differs
    #[arg(long)]
    fail_on_diff: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if let Err(io) = e.print() {
                eprintln!("webdiff: failed to print usage: {}", io);
            }
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(EXIT_OK),
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };

    init_logging(args.verbose, args.quiet);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, closing browsers");
            on_interrupt.cancel();
        }
    });

    let options = RunOptions {
        left: args.left,
        right: args.right,
        input: args.input,
        output: args.output,
        profile: args.profile,
        template: args.template,
        failure_policy: if args.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        },
    };

    match run(&options, cancel).await {
        Ok(report) => {
            println!("{}", report.run_dir.display());
            if args.fail_on_diff && report.mismatches() > 0 {
                ExitCode::from(EXIT_DIFFERS)
            } else {
                ExitCode::from(EXIT_OK)
            }
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

use clap::Parser;
use ftps_uploader::{logging, Overrides, UploadError, UploadTask, UploaderConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Upload a local directory to an FTPS server.
#[derive(Parser, Debug)]
#[command(name = "ftps-uploader", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "FTPS_UPLOADER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(short, long)]
    user: Option<String>,

    /// Prefer FTPS_UPLOADER_PASSWORD over passing this on the command line.
    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    local_dir: Option<PathBuf>,

    #[arg(long)]
    remote_dir: Option<String>,

    /// Implicit FTPS (TLS from the first byte, port 990 unless set).
    #[arg(long)]
    implicit: bool,

    /// Accept self-signed or otherwise untrusted server certificates.
    #[arg(long)]
    insecure: bool,

    /// Check the server and report what would happen, changing nothing.
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON on stdout and log as JSON.
    #[arg(long)]
    json: bool,

    /// More log output (-v debug, -vv wire trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            password: self.password.clone(),
            local_dir: self.local_dir.clone(),
            remote_dir: self.remote_dir.clone(),
            implicit: self.implicit,
            insecure: self.insecure,
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let mut config = match cli.config.as_deref() {
        Some(path) => match UploaderConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => UploaderConfig::default(),
    };
    config.apply(cli.overrides());
    config.apply_env();

    let task = match UploadTask::new(config) {
        Ok(t) => t,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match task.spawn().await {
        Ok(Ok(report)) => report,
        Ok(Err(_)) => return ExitCode::FAILURE,
        Err(join) => {
            error!("{}", UploadError::from(join));
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Cannot serialise report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

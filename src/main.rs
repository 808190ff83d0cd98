use anyhow::Result;
use clap::Parser;
use drive_provisioner::auth::{ClientCredentials, ConsolePrompt, OAuthSession};
use drive_provisioner::cleaner::RetentionCleaner;
use drive_provisioner::cli::{self, Cli, Commands, ProgressReporter};
use drive_provisioner::client::{DriveApi, DriveClient};
use drive_provisioner::config::Config;
use drive_provisioner::credential_store::CredentialStore;
use drive_provisioner::error::{DriveError, ErrorKind};
use drive_provisioner::folder_hint::{hint_store_from_config, FolderHintStore};
use drive_provisioner::http::HttpTransport;
use drive_provisioner::models::{CleanupReport, EventFolderInfo, PublishedFile, UploadTarget};
use drive_provisioner::provisioner::ResourceProvisioner;
use drive_provisioner::throttle::CallThrottle;
use indicatif::MultiProgress;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use tracing::Instrument;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: drive-provisioner --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("drive_provisioner=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("drive_provisioner=info,warn"))
    };

    // Logs print above progress bars through the shared MultiProgress
    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter {
        multi: Arc::clone(&multi_progress),
    };

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", id = %run_id);

    async {
        match &cli.command {
            Commands::Auth { force } => run_auth(&cli, *force, &reporter).await,
            Commands::Publish {
                event,
                model,
                rollback_on_failure,
                files,
            } => run_publish(&cli, event, model, *rollback_on_failure, files, &reporter).await,
            Commands::Cleanup {
                retention_days,
                dry_run,
                force,
            } => run_cleanup(&cli, *retention_days, *dry_run, *force, &reporter).await,
            Commands::Status => run_status(&cli).await,
            Commands::InitConfig { output, force } => run_init_config(&cli, output.as_deref(), *force).await,
        }
    }
    .instrument(span)
    .await
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load(&cli.config_path()).await?;
    config.validate()?;
    Ok(config)
}

fn build_session(cli: &Cli, config: &Config, transport: HttpTransport) -> OAuthSession {
    let callback_addr = SocketAddr::from(([127, 0, 0, 1], config.oauth.callback_port));
    OAuthSession::new(
        transport,
        CredentialStore::new(cli.token_path()),
        callback_addr,
        Box::new(ConsolePrompt::new(config.oauth.open_browser)),
    )
}

/// Obtain an access token, running the interactive flow when refresh is impossible
async fn authorize(
    session: &mut OAuthSession,
    credentials: &ClientCredentials,
) -> std::result::Result<String, DriveError> {
    match session.get_access_token(credentials).await {
        Err(DriveError::ReauthRequired(reason)) => {
            tracing::warn!("Stored credentials cannot be refreshed ({}), authorizing again", reason);
            session.reauthenticate(credentials).await
        }
        other => other,
    }
}

/// Authorize and build a Drive client
async fn connect(
    cli: &Cli,
    config: &Config,
    reporter: &ProgressReporter,
) -> Result<(HttpTransport, String)> {
    config.require_client_credentials()?;
    let transport = HttpTransport::new()?;
    let credentials = ClientCredentials::from_config(&config.oauth);
    let mut session = build_session(cli, config, transport.clone());

    reporter.println("Authenticating with Google Drive...");
    let token = authorize(&mut session, &credentials).await?;
    reporter.println("  ✓ Authenticated with Google Drive");
    Ok((transport, token))
}

async fn run_auth(cli: &Cli, force: bool, reporter: &ProgressReporter) -> Result<()> {
    let config = load_config(cli).await?;
    config.require_client_credentials()?;

    let transport = HttpTransport::new()?;
    let credentials = ClientCredentials::from_config(&config.oauth);
    let mut session = build_session(cli, &config, transport);

    if force {
        session.sign_out().await?;
        tracing::info!("Removed stored token");
    }

    authorize(&mut session, &credentials).await?;
    reporter.println(format!(
        "Authenticated with Google Drive. Token stored at {:?}",
        session.store().path()
    ));
    Ok(())
}

fn drive_client(transport: HttpTransport, token: String) -> Box<dyn DriveApi> {
    Box::new(DriveClient::new(transport, token))
}

async fn run_publish(
    cli: &Cli,
    event: &str,
    model: &str,
    rollback_on_failure: bool,
    files: &[PathBuf],
    reporter: &ProgressReporter,
) -> Result<()> {
    let config = load_config(cli).await?;

    for file in files {
        if !tokio::fs::metadata(file).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(DriveError::ConfigError(format!("Not a readable file: {:?}", file)).into());
        }
    }

    let (transport, token) = connect(cli, &config, reporter).await?;
    let hints = hint_store_from_config(&config.drive, cli.hint_path());
    let mut provisioner = ResourceProvisioner::new(
        drive_client(transport, token),
        hints,
        config.drive.root_folder_name.clone(),
    );
    let mut throttle = CallThrottle::from_config(&config.throttle);

    match publish_into(&mut provisioner, event, model, files, &mut throttle, reporter).await {
        Ok((folder_url, published)) => {
            reporter.println(cli::render_publish_summary(&folder_url, &published));
            Ok(())
        }
        Err(e) => {
            if rollback_on_failure && !provisioner.created_resources().is_empty() {
                tracing::warn!("Publish failed, rolling back created resources");
                let outcome = provisioner.rollback_created(&mut throttle).await;
                reporter.println(cli::render_rollback(&outcome));
            }
            Err(e.into())
        }
    }
}

async fn publish_into(
    provisioner: &mut ResourceProvisioner,
    event: &str,
    model: &str,
    files: &[PathBuf],
    throttle: &mut CallThrottle,
    reporter: &ProgressReporter,
) -> std::result::Result<(String, Vec<PublishedFile>), DriveError> {
    let spinner = reporter.add_spinner("Preparing folders...");
    let root = provisioner.resolve_root_folder().await?;
    let event_folder = provisioner.ensure_child_folder(&root.id, event).await?;
    let model_folder = provisioner.ensure_folder_path(&event_folder.id, &[model]).await?;
    reporter.finish_spinner(
        &spinner,
        &format!("{}/{}/{}", root.name, event_folder.name, model_folder.name),
    );

    let pb = reporter.add_progress_bar(files.len() as u64, "Uploading...");
    let mut published = Vec::with_capacity(files.len());
    for file in files {
        throttle.pause().await;
        let target = UploadTarget::new(file, model_folder.id.clone());
        pb.set_message(target.desired_name.clone());
        match provisioner.upload_and_publish(&target).await {
            Ok(file) => published.push(file),
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("Uploaded {} file(s)", published.len()));

    let folder_url = provisioner.publish_folder(&event_folder.id).await?;
    Ok((folder_url, published))
}

async fn run_cleanup(
    cli: &Cli,
    retention_override: Option<i64>,
    dry_run_flag: bool,
    force: bool,
    reporter: &ProgressReporter,
) -> Result<()> {
    let config = load_config(cli).await?;
    let retention_days = retention_override.unwrap_or(config.cleanup.retention_days);
    if retention_days < 0 {
        return Err(DriveError::ConfigError("--retention-days must not be negative".to_string()).into());
    }
    let dry_run = dry_run_flag || config.cleanup.dry_run;
    if dry_run {
        reporter.println("Running in DRY RUN mode - no changes will be made");
    }

    let (transport, token) = connect(cli, &config, reporter).await?;
    let provisioner = ResourceProvisioner::new(
        drive_client(transport, token),
        hint_store_from_config(&config.drive, cli.hint_path()),
        config.drive.root_folder_name.clone(),
    );

    let root = match provisioner.find_root_folder().await? {
        Some(root) => root,
        None => {
            reporter.println(format!(
                "Root folder '{}' not found. Nothing to clean up.",
                config.drive.root_folder_name
            ));
            return Ok(());
        }
    };

    let mut cleaner = RetentionCleaner::new(
        provisioner.into_client(),
        CallThrottle::from_config(&config.throttle),
    );

    let preview = cleaner.run(&root.id, retention_days, true).await?;
    let stale_count = match &preview {
        CleanupReport::DryRun(stale) => stale.len(),
        CleanupReport::Executed(_) => 0,
    };

    if dry_run || stale_count == 0 {
        reporter.println(cli::render_cleanup_report(&preview, retention_days));
        return Ok(());
    }

    if !force {
        reporter.println(cli::render_cleanup_report(&preview, retention_days));
        reporter.println("\n⚠️  This action will permanently delete the folders listed above!");
        reporter.multi_progress().suspend(|| {
            print!("Are you sure you want to proceed? [y/N]: ");
            let _ = std::io::stdout().flush();
        });

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "y" {
            reporter.println("Aborted.");
            return Ok(());
        }
    }

    let pb = reporter.add_progress_bar(stale_count as u64, "Deleting folders...");
    let progress = pb.clone();
    let mut cleaner = cleaner.with_progress(Arc::new(move |folder: &EventFolderInfo| {
        progress.set_message(folder.name.clone());
        progress.inc(1);
    }));
    let report = cleaner.run(&root.id, retention_days, false).await?;
    pb.finish_and_clear();

    reporter.println(cli::render_cleanup_report(&report, retention_days));
    if let CleanupReport::Executed(outcome) = &report {
        if outcome.is_partial() {
            anyhow::bail!(
                "{} of {} deletions failed",
                outcome.failures.len(),
                outcome.failures.len() + outcome.deleted_count
            );
        }
    }
    Ok(())
}

async fn run_status(cli: &Cli) -> Result<()> {
    let config_path = cli.config_path();
    let config = Config::load(&config_path).await?;

    println!("\n========================================");
    println!("Drive Provisioner Status");
    println!("========================================");
    println!("Config file: {:?}", config_path);
    println!("Root folder name: {}", config.drive.root_folder_name);
    println!("Retention: {} days", config.cleanup.retention_days);
    println!(
        "Client credentials: {}",
        if config.require_client_credentials().is_ok() {
            "configured"
        } else {
            "missing"
        }
    );

    let store = CredentialStore::new(cli.token_path());
    match store.load().await {
        Some(record) => {
            println!("Token file: {:?}", store.path());
            match record.expiry_epoch_millis {
                Some(expiry) => {
                    let when = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(expiry)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| expiry.to_string());
                    let state = if record.is_expired() { "expired" } else { "valid" };
                    println!("Access token: {} (expires {})", state, when);
                }
                None => println!("Access token: present (no expiry recorded)"),
            }
            println!(
                "Refresh token: {}",
                if record.refresh_token.is_some() { "present" } else { "missing" }
            );
        }
        None => println!("Not authenticated. Run: drive-provisioner auth"),
    }

    let hints = hint_store_from_config(&config.drive, cli.hint_path());
    match hints.load().await {
        Some(id) => println!("Remembered root folder: {}", id),
        None => println!("Remembered root folder: none"),
    }
    println!("========================================");
    Ok(())
}

async fn run_init_config(cli: &Cli, output: Option<&Path>, force: bool) -> Result<()> {
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| cli.config_path());

    if output.exists() && !force {
        return Err(DriveError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        ))
        .into());
    }

    Config::create_example(&output).await?;

    println!("Created example configuration file at: {:?}", output);
    println!("\nKey settings to review:");
    println!("  - oauth.client_id / oauth.client_secret (or DRIVE_CLIENT_ID / DRIVE_CLIENT_SECRET)");
    println!("  - oauth.callback_port: must match the redirect URI registered for the client");
    println!("  - drive.root_folder_name: top-level folder holding event folders");
    println!("  - cleanup.retention_days: age after which event folders are deleted");
    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    if let Some(drive_err) = error.downcast_ref::<DriveError>() {
        match drive_err.kind() {
            ErrorKind::ReauthRequired | ErrorKind::AuthorizationFailed => {
                eprintln!("\nHint: Authorization with Google failed or was revoked.");
                eprintln!("      Try running: drive-provisioner auth --force");
            }
            ErrorKind::AuthTransport | ErrorKind::Transport => {
                eprintln!("\nHint: Could not reach Google. Check your network connection.");
            }
            ErrorKind::RemoteApi if drive_err.is_transient() => {
                eprintln!("\nHint: This may be a temporary API error or rate limit.");
                eprintln!("      Wait a moment and run the command again.");
            }
            ErrorKind::Config => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: drive-provisioner init-config --force");
            }
            _ => {}
        }
    }
}

//! CLI entry point for the authdl tool.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use authdl_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use authdl_core::download::{ProgressFactory, SilentProgress, TerminalProgress};
use authdl_core::session::origin_of;
use authdl_core::{
    BearerTokenAuthenticator, Credential, DialoguerPrompter, Downloader, HttpBasicAuthenticator,
    HttpFetcher, NoAuthentication, NonInteractive, PatternFailureDetector, Prompter, SessionStore,
    Token, UrlInfo, UserPassword,
};
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod config;

use cli::{Args, AuthArgs, Command};
use config::{AuthSetting, FileConfig};

/// Environment variable holding the basic-auth password.
const PASSWORD_ENV: &str = "AUTHDL_PASSWORD";

/// Environment variable holding the bearer token.
const TOKEN_ENV: &str = "AUTHDL_TOKEN";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = config::load_config(args.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", config::VerbositySetting::default_filter),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, ?file_config, "CLI arguments parsed");

    let downloader = build_downloader(&args, &file_config)?;

    match &args.command {
        Command::Download {
            url,
            output,
            overwrite,
            ..
        } => {
            let overwrite = *overwrite || file_config.overwrite.unwrap_or(false);
            let path = downloader
                .download(url, output.as_deref(), overwrite)
                .await?;
            info!(path = %path.display(), "Download complete");
            println!("{}", path.display());
        }
        Command::Fetch { url, .. } => {
            let content = downloader.fetch_bytes(url).await?;
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&content)
                .and_then(|()| stdout.flush())
                .context("Failed to write content to stdout")?;
        }
        Command::Check { url, json, .. } => {
            let url_info = downloader.check(url).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&url_info)?);
            } else {
                print_url_info(&url_info);
            }
        }
    }

    Ok(())
}

fn build_downloader(args: &Args, file_config: &FileConfig) -> Result<Downloader> {
    let auth_args = args.command.auth();
    let url = command_url(&args.command);

    let interactive =
        !auth_args.no_input && file_config.interactive.unwrap_or(true) && io::stdin().is_terminal();
    let prompter: Arc<dyn Prompter> = if interactive {
        Arc::new(DialoguerPrompter)
    } else {
        Arc::new(NonInteractive)
    };
    let progress: Arc<dyn ProgressFactory> = if args.quiet || !io::stderr().is_terminal() {
        Arc::new(SilentProgress)
    } else {
        Arc::new(TerminalProgress)
    };

    let sessions = SessionStore::with_timeouts(
        file_config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    );
    let mut downloader = Downloader::new(Arc::new(HttpFetcher::new()), Arc::new(sessions))
        .with_prompter(Arc::clone(&prompter))
        .with_progress(progress);
    if let Some(output_dir) = &file_config.output_dir {
        downloader = downloader.with_base_dir(output_dir.clone());
    }

    let scheme = auth_args
        .auth
        .or(file_config.auth)
        .unwrap_or(AuthSetting::Unknown);
    debug!(auth = scheme.as_str(), interactive, "configuring authentication");

    let patterns = failure_patterns(auth_args, file_config);
    let detector = PatternFailureDetector::new(&patterns)
        .with_context(|| format!("Invalid failure pattern in {patterns:?}"))?;
    let credential_name = origin_of(url)?;

    let downloader = match scheme {
        AuthSetting::Unknown => downloader,
        AuthSetting::None => downloader.with_authenticator(Arc::new(NoAuthentication), None)?,
        AuthSetting::Basic => {
            let username = auth_args
                .username
                .clone()
                .or_else(|| file_config.username.clone());
            let credential = match (username, std::env::var(PASSWORD_ENV).ok()) {
                (Some(username), Some(password)) => {
                    UserPassword::new(&credential_name, username, password)
                }
                (Some(username), None) => UserPassword::with_username(&credential_name, username),
                (None, _) => UserPassword::empty(&credential_name),
            };
            let credential = ensure_values(Arc::new(credential), prompter.as_ref())?;
            downloader.with_authenticator(
                Arc::new(HttpBasicAuthenticator::new().with_failure_detector(detector)),
                Some(credential),
            )?
        }
        AuthSetting::Bearer => {
            let credential = match std::env::var(TOKEN_ENV).ok() {
                Some(token) => Token::new(&credential_name, token),
                None => Token::empty(&credential_name),
            };
            let credential = ensure_values(Arc::new(credential), prompter.as_ref())?;
            downloader.with_authenticator(
                Arc::new(BearerTokenAuthenticator::new().with_failure_detector(detector)),
                Some(credential),
            )?
        }
    };

    Ok(downloader)
}

fn command_url(command: &Command) -> &str {
    match command {
        Command::Download { url, .. } | Command::Fetch { url, .. } | Command::Check { url, .. } => {
            url
        }
    }
}

fn failure_patterns(auth_args: &AuthArgs, file_config: &FileConfig) -> Vec<String> {
    if auth_args.failure_patterns.is_empty() {
        file_config.failure_patterns.clone()
    } else {
        auth_args.failure_patterns.clone()
    }
}

/// Asks for missing credential values up front.
fn ensure_values(
    credential: Arc<dyn Credential>,
    prompter: &dyn Prompter,
) -> Result<Arc<dyn Credential>> {
    if !credential.has_valid_values() {
        credential.enter_new(prompter).with_context(|| {
            format!(
                "Credential '{}' is incomplete; set {PASSWORD_ENV}/{TOKEN_ENV} or run interactively",
                credential.name()
            )
        })?;
    }
    if !credential.has_valid_values() {
        bail!("Credential '{}' is still incomplete", credential.name());
    }
    Ok(credential)
}

fn print_url_info(url_info: &UrlInfo) {
    println!("url:           {}", url_info.url);
    if url_info.final_url != url_info.url {
        println!("final url:     {}", url_info.final_url);
    }
    println!("status:        {}", url_info.status);
    println!("filename:      {}", url_info.filename);
    if let Some(size) = url_info.size {
        println!("size:          {size}");
    }
    if let Some(content_type) = &url_info.content_type {
        println!("content type:  {content_type}");
    }
    if let Some(last_modified) = &url_info.last_modified {
        println!("last modified: {last_modified}");
    }
}

use anyhow::{Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use iocraft::prelude::*;
use std::{
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};
use tokio::sync::{oneshot, watch};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use crate::{
    client::HttpStore,
    config::Config,
    error::UploadError,
    session::{UploadProgress, upload_object},
    source::LocalFile,
    store::ObjectKey,
    ui::{ConfigHeader, ErrorMessage, InputPrompt, ProgressBar, SuccessMessage, WarningMessage},
};

mod client;
mod config;
mod error;
mod planner;
mod rest_types;
mod serde_utils;
mod session;
mod source;
mod store;
mod ui;

const DEFAULT_STORE_URL: &str = "http://localhost:9000/";
const ORPHANED_EXIT_CODE: u8 = 3;

#[derive(Parser)]
#[command(name = "mpup")]
#[command(version)]
#[command(about = "Upload large files to a blob store in parts")]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    upload: UploadArgs,
}

#[derive(Args)]
struct UploadArgs {
    /// File to upload
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    file: Option<PathBuf>,
    /// Destination object key, defaults to the file name
    #[arg(short, long)]
    key: Option<String>,
    /// Part size in MiB
    #[arg(short, long, value_name = "MIB")]
    part_size: Option<u64>,
    /// Do not display a progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure mpup interactively
    Config,
    /// Store your API key in the OS keyring
    SetApiKey { api_key: String },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "mpup=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    let result = rt.block_on(async {
        match cli.command {
            Some(Commands::Config) => interactive_config(),
            Some(Commands::SetApiKey { api_key }) => config::set_api_key_keyring(api_key),
            None => upload_file(cli.upload).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

fn failure_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<UploadError>() {
        Some(upload_error) if upload_error.is_orphaned() => ORPHANED_EXIT_CODE,
        _ => 1,
    }
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    element!(ErrorMessage(message: format!("{:#}", err))).eprint();

    match err.downcast_ref::<UploadError>() {
        Some(UploadError::Orphaned { .. }) => {
            element!(WarningMessage(
                message: "The remote upload session could not be aborted. Its uploaded parts remain in the store and must be removed manually.".to_string()
            ))
            .eprint();
        }
        Some(aborted @ UploadError::Aborted { .. }) => {
            let message = if matches!(aborted.cause(), UploadError::Cancelled) {
                "Upload interrupted, the remote upload session was aborted."
            } else {
                "The remote upload session was aborted, no parts were left behind."
            };
            element!(WarningMessage(message: message.to_string())).eprint();
        }
        _ => {}
    }

    ExitCode::from(failure_exit_code(err))
}

fn object_key_for(file: &Path, key: Option<String>) -> Result<ObjectKey> {
    let key = match key {
        Some(key) => key,
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(anyhow!(
                "Cannot derive an object key from {}, pass --key",
                file.display()
            ))?,
    };
    Ok(ObjectKey::new(key)?)
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn upload_file(args: UploadArgs) -> Result<()> {
    let file = args.file.ok_or(anyhow!("A file to upload is required"))?;
    if !file.is_file() {
        bail!("Source file not found: {}", file.display());
    }
    let key = object_key_for(&file, args.key)?;

    let config: Config = config::read_config()?;
    let part_size = config.part_size(args.part_size)?;
    let store = HttpStore::new(
        config.store_url.clone(),
        config.api_key.clone(),
        config.request_timeout,
    )?;
    let source = LocalFile::new(&file);

    info!(
        file = %file.display(),
        key = %key,
        part_size,
        store = %config.store_url,
        "starting upload"
    );

    let location = if args.quiet || !io::stdout().is_terminal() {
        upload_object(&store, &source, key, part_size, None, interrupted()).await?
    } else {
        let (progress_tx, progress_rx) = watch::channel(UploadProgress::default());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        // The progress display may consume Ctrl-C itself; leaving its loop cancels the upload.
        let cancel = async move {
            tokio::select! {
                _ = interrupted() => {}
                _ = stop_rx => {}
            }
        };
        let upload = upload_object(&store, &source, key, part_size, Some(progress_tx), cancel);

        let mut progress_bar =
            element!(ProgressBar(title: "Uploading".to_string(), progress: Some(progress_rx)));
        let render = async {
            let _ = progress_bar.render_loop().await;
            let _ = stop_tx.send(());
            std::future::pending::<()>().await
        };

        tokio::select! {
            result = upload => result?,
            _ = render => unreachable!("render loop should not terminate"),
        }
    };

    element!(SuccessMessage(
        message: format!("Uploaded {} to {}", file.display(), location)
    ))
    .print();

    Ok(())
}

fn read_input(prompt: &str, default: Option<&str>, description: Option<&str>) -> Result<String> {
    element! {
        InputPrompt(
            prompt: prompt.to_string(),
            default: default.map(|s| s.to_string()),
            description: description.map(|s| s.to_string())
        )
    }
    .print();

    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        if let Some(def) = default {
            Ok(def.to_string())
        } else {
            Ok(input)
        }
    } else {
        Ok(input)
    }
}

fn interactive_config() -> Result<()> {
    element!(ConfigHeader()).print();

    let store_url = loop {
        let store_url_str = read_input(
            "Store URL",
            Some(DEFAULT_STORE_URL),
            Some("The base URL of the multipart upload API"),
        )?;

        match Url::parse(&store_url_str) {
            Ok(url) => break url,
            Err(e) => {
                element!(ErrorMessage(message: format!("Invalid URL: {}", e))).print();
                println!();
            }
        }
    };

    let api_key = loop {
        let api_key = read_input(
            "API Key",
            None,
            Some("Your store API key (stored securely in OS keyring)"),
        )?;

        if api_key.is_empty() {
            element!(ErrorMessage(message: "API key cannot be empty".to_string())).print();
            println!();
        } else {
            break api_key;
        }
    };

    let default_part_size = config::DEFAULT_PART_SIZE_MIB.to_string();
    let part_size_mib = loop {
        let part_size_str = read_input(
            "Part Size (MiB)",
            Some(&default_part_size),
            Some("Size of each uploaded part, between 5 MiB and 5 GiB"),
        )?;

        match part_size_str
            .parse::<u64>()
            .map_err(anyhow::Error::from)
            .and_then(|mib| config::part_size_bytes(mib).map(|_| mib))
        {
            Ok(mib) => break mib,
            Err(e) => {
                element!(ErrorMessage(message: format!("Invalid part size: {}", e))).print();
                println!();
            }
        }
    };

    config::set_api_key_keyring(api_key)?;

    let config_file = config::ConfigFile {
        store_url: Some(store_url),
        part_size_mib: Some(part_size_mib),
        request_timeout: None,
    };

    config::write_config(config_file)?;

    element!(SuccessMessage(message: "Configuration complete!".to_string())).print();

    Ok(())
}

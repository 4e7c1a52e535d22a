use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, info, trace, warn};

use s3browse_rs::config::Config;
use s3browse_rs::config::args::Command;
use s3browse_rs::{
    CLIArgs, Depth, ObjectDeleter, ObjectLister, UploadCoordinator, UploadSource,
    create_storage, create_upload_cancellation_token, exit_code_from_error, object_url,
};

mod ctrl_c_handler;
pub mod indicator;
mod listing_view;
mod tracing_init;
pub mod ui_config;

const EXIT_CODE_PARTIAL_FAILURE: i32 = 3;

/// s3browse - folder-style browser and file manager for an Amazon S3 bucket.
///
/// This binary is a thin wrapper over the s3browse-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3browse",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let Some(command) = config.command.clone() else {
        return Ok(());
    };

    match run(config, command).await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(exit_code_from_error(&e));
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Run one subcommand and return the process exit code.
async fn run(config: Config, command: Command) -> Result<i32> {
    let start_time = tokio::time::Instant::now();
    let storage = create_storage(config.clone()).await?;

    let exit_code = match command {
        Command::Ls { prefix } => {
            let listing = ObjectLister::new(storage, &config)
                .resolve(&prefix, Depth::OneLevel)
                .await?;
            print!("{}", listing_view::render_one_level(&listing));
            0
        }
        Command::Tree { prefix } => {
            let listing = ObjectLister::new(storage, &config)
                .resolve(&prefix, Depth::Full)
                .await?;
            print!(
                "{}",
                listing_view::render_tree(&prefix, &listing, &config.delimiter)
            );
            0
        }
        Command::Upload { folder, files } => upload(storage, &config, &folder, &files).await?,
        Command::Rm { reference } => {
            match ObjectDeleter::new(storage, &config)
                .delete_object(&reference)
                .await?
            {
                Some(key) => println!("deleted {key}"),
                None => debug!("empty reference, nothing deleted."),
            }
            0
        }
        Command::Rmdir { prefix } => {
            let report = ObjectDeleter::new(storage, &config)
                .delete_folder(&prefix)
                .await?;
            println!("deleted {} object(s)", report.deleted.len());
            0
        }
        Command::Url { key } => {
            println!(
                "{}",
                object_url(storage.bucket(), storage.region(), &key)
            );
            0
        }
    };

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    debug!(duration_sec = duration_sec, "s3browse has been completed.");

    Ok(exit_code)
}

async fn upload(
    storage: s3browse_rs::storage::Storage,
    config: &Config,
    folder: &str,
    files: &[std::path::PathBuf],
) -> Result<i32> {
    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        sources.push(UploadSource::from_path(path).await?);
    }

    let cancellation_token = create_upload_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let (stats_sender, stats_receiver) = async_channel::unbounded();
    let indicator_join_handle = indicator::show_indicator(
        stats_receiver,
        ui_config::is_progress_indicator_needed(config),
        ui_config::is_show_result_needed(config),
    );

    let report = {
        let coordinator = UploadCoordinator::new(storage, config, cancellation_token.clone())
            .with_stats_sender(stats_sender);
        coordinator.upload_many(sources, folder, None).await
    };
    indicator_join_handle.await?;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(url) => println!("{url}"),
            Err(e) if e.is_cancelled() => {
                warn!(file_name = outcome.file_name.as_str(), "upload cancelled.")
            }
            Err(e) => error!(
                file_name = outcome.file_name.as_str(),
                error = e.to_string(),
                "upload failed."
            ),
        }
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed().len(),
        "uploads finished."
    );

    if report.has_failure() {
        return Ok(EXIT_CODE_PARTIAL_FAILURE);
    }
    Ok(0)
}

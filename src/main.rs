use clap::Parser;
use color_eyre::Result;
use serial_hub::{cli, config::Config, device::Device, logging, mock::MockBuilder, server};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, error, info, Level};

#[cfg(unix)]
async fn hangup() -> Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    hangup.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> Result<()> {
    std::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command);

        return Ok(());
    }

    logging::init(
        cli.log_level,
        cli.log_dir.clone().map(|dir| (Level::DEBUG, dir)),
    )
    .await;

    let mut config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };
    cli.apply(&mut config);
    config.validate()?;

    let device = if cli.mock {
        info!("Using a loopback mock instead of a serial port");
        MockBuilder::new("loopback")
            .set_write_capacity(config.device_write_capacity)
            .build_loopback()
    } else {
        Device::open(&config)?
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        hung = hangup() => {
            hung?;
            info!("Told to hang up, quitting")
        }
        result = server::run_with_device(config, device) => {
            error!("Server returned");
            result?;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    Ok(())
}

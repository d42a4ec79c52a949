mod config;
mod injector;
mod relay;

use anyhow::{Context, Error};
use clap::Parser;
use config::Config;
use control::ControlServer;
use injector::ClickInjector;
use input::{EventChannel, SourceDevice, VirtualDevice};
use log::LevelFilter;
use relay::{RelayError, Shutdown};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinError;

const DEVICE_HINT: &str = "/dev/input/by-id/usb-Logitech_USB_Receiver-if02-event-mouse";

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Input event node to capture, preferably a stable /dev/input/by-id/ link
    #[clap(short, long, value_parser)]
    device: Option<PathBuf>,

    #[clap(short, long, value_parser, default_value = "/etc/clickmate/config.toml")]
    config_path: PathBuf,

    /// Control socket, overrides the config file
    #[clap(short, long, value_parser)]
    socket_path: Option<PathBuf>,
}

enum Stopped {
    Relay(Result<(Result<u64, RelayError>, SourceDevice), JoinError>),
    Failed(Error),
    Signal,
}

async fn run(device: &Path, config: &Config) -> Result<(), Error> {
    let mut source = SourceDevice::open(device).with_context(|| {
        format!(
            "Failed to open {}. Check the path, and that you may read it (usually by being in the `input` group)",
            device.display()
        )
    })?;
    match source.identity() {
        Ok(identity) => log::info!(
            "Capturing \"{}\" ({:04x}:{:04x}) from {}",
            identity.name,
            identity.vendor,
            identity.product,
            device.display()
        ),
        Err(err) => log::warn!("Failed to identify {}: {}", device.display(), err),
    }

    let capabilities = input::mirror(&source)
        .with_context(|| format!("Failed to read the capabilities of {}", device.display()))?;
    log::debug!("Mirroring {:?}", capabilities);

    let identity = config.virtual_device.clone();
    let settle = config.settle_delay();
    let virtual_device = tokio::task::spawn_blocking(move || {
        VirtualDevice::create(&identity, &capabilities, settle)
    })
    .await?
    .context("Failed to create the virtual device. Is the uinput module loaded and /dev/uinput writable?")?;
    log::info!("Created virtual device \"{}\"", config.virtual_device.name);

    source
        .grab()
        .context("Failed to grab the device. Is another program holding it?")?;
    source.set_poll_timeout(Some(config.poll_interval()));

    let channel = Arc::new(EventChannel::new(virtual_device));
    let injector = Arc::new(ClickInjector::new(channel.clone(), config.click_settings()));
    let server = ControlServer::bind(&config.socket_path)
        .with_context(|| format!("Failed to bind control socket {}", config.socket_path.display()))?;

    let mut terminate = signal(SignalKind::terminate()).context("Error setting up signal handler")?;

    let shutdown = Shutdown::default();
    let mut relay_task = tokio::task::spawn_blocking({
        let channel = channel.clone();
        let shutdown = shutdown.clone();
        move || {
            let result = relay::run(&mut source, &channel, &shutdown);
            (result, source)
        }
    });

    log::info!("Relaying events");
    let stopped = tokio::select! {
        result = &mut relay_task => Stopped::Relay(result),
        result = server.serve(injector.clone()) => match result {
            Ok(never) => match never {},
            Err(err) => Stopped::Failed(Error::new(err).context("Control socket failed")),
        },
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => Stopped::Signal,
            Err(err) => Stopped::Failed(Error::new(err).context("Error waiting for signal")),
        },
        _ = terminate.recv() => Stopped::Signal,
    };

    // The serve future is gone by now, and with it the socket file. Connection tasks still in
    // flight may hold the injector, closing it keeps them from turning clicking back on.
    shutdown.trigger();

    let closing = injector.clone();
    tokio::task::spawn_blocking(move || closing.close()).await?;
    drop(injector);

    let (relayed, failure) = match stopped {
        Stopped::Relay(result) => (result?, None),
        Stopped::Failed(err) => (relay_task.await?, Some(err)),
        Stopped::Signal => {
            log::info!("Exiting on signal");
            (relay_task.await?, None)
        }
    };

    let (relayed, source) = relayed;
    drop(source);

    match Arc::try_unwrap(channel) {
        Ok(channel) => channel
            .into_inner()
            .destroy()
            .context("Failed to destroy the virtual device")?,
        Err(_) => log::debug!("Virtual device still referenced, destroying it on drop"),
    }

    if let Some(err) = failure {
        return Err(err);
    }

    let relayed = relayed.context("Relay stopped")?;
    log::info!("Relayed {} events", relayed);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .format_timestamp(None)
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let mut config = match Config::new(&args.config_path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("Error reading config: {}", err);
            process::exit(1);
        }
    };
    if let Some(device) = args.device {
        config.device = Some(device);
    }
    if let Some(socket_path) = args.socket_path {
        config.socket_path = socket_path;
    }

    let device = match config.device.clone() {
        Some(device) => device,
        None => {
            log::error!("No input device specified.");
            log::error!("Pass one with --device, for example --device {}", DEVICE_HINT);
            process::exit(1);
        }
    };

    if let Err(err) = run(&device, &config).await {
        log::error!("Error: {:#}", err);
        process::exit(1);
    }
}

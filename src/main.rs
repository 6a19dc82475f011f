//! MQTT bridge for a Neato robot vacuum.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rumqttc::{AsyncClient, Event as MqttEvent, LastWill, MqttOptions, Packet, QoS};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use neato_serial::config::{MqttSettings, SerialSettings};
use neato_serial::{
    Config, Event, Neato, PowerSwitch, SerialTransport, Subscription, UsbSwitchMode, list_ports,
};

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "neato2mqtt")]
#[command(about = "Bridge between a Neato robot vacuum and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy)]
enum Mode {
    /// Publish telemetry and accept commands over MQTT (default)
    Bridge,
    /// Send commands typed on stdin and print the output
    Console,
    /// List serial ports on this host
    Ports,
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

async fn build_session(settings: &SerialSettings) -> Result<Neato<SerialTransport>> {
    let serial = settings
        .serial_config()
        .context("Invalid serial settings")?;

    let power: Box<dyn PowerSwitch> = match settings.usb_switch_mode {
        UsbSwitchMode::Direct => {
            let hub = settings.hub_switch();
            // Restores power if a previous run stopped with the port off
            if let Err(e) = hub.init().await {
                warn!("Could not enable USB hub port: {e}");
            }
            Box::new(hub)
        }
        UsbSwitchMode::Relay => {
            let relay = settings.relay_switch();
            relay
                .init()
                .await
                .context("Failed to initialize relay GPIO")?;
            Box::new(relay)
        }
    };

    Ok(Neato::serial(serial, power, settings.session_config()))
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

async fn run_console(neato: Neato<SerialTransport>) -> Result<()> {
    if !neato.connect().await {
        warn!("Neato not reachable; commands will retry the connection");
    }

    println!("Enter commands. Enter 'exit' to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("? ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match neato.send(line).await {
            Some(output) => println!(">> {output}"),
            None => println!("No result returned."),
        }
    }

    neato.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

fn mqtt_options(settings: &MqttSettings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_seconds));
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(username, password);
    }
    options.set_last_will(LastWill::new(
        &settings.availability_topic,
        OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    options
}

async fn publish_availability(client: &AsyncClient, topic: &str, online: bool) {
    let payload = if online { ONLINE } else { OFFLINE };
    if let Err(e) = client
        .publish(topic, QoS::AtLeastOnce, true, payload)
        .await
    {
        error!("Failed to publish availability: {e}");
    }
}

async fn forward_availability(mut events: Subscription, client: AsyncClient, topic: String) {
    while let Some(event) = events.recv().await {
        match event {
            Event::Connected { device } => {
                info!("Neato connected at {device}");
                publish_availability(&client, &topic, true).await;
            }
            Event::Disconnected | Event::ConnectFailed => {
                publish_availability(&client, &topic, false).await;
            }
            Event::PowerCycled { succeeded } => {
                debug!("USB power cycled (succeeded: {succeeded})");
            }
        }
    }
}

async fn run_commands(
    neato: Arc<Neato<SerialTransport>>,
    mut commands: mpsc::Receiver<String>,
    client: AsyncClient,
    topic: String,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        // Shutdown is only checked between commands so a power cycle always
        // completes.
        let command = tokio::select! {
            _ = shutdown.changed() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        info!("Command received: {command}");
        let output = neato.send(&command).await.unwrap_or_default();
        debug!("Output from Neato: {output:?}");
        if let Err(e) = client
            .publish(&topic, QoS::AtLeastOnce, false, output)
            .await
        {
            error!("Failed to publish command output: {e}");
        }
    }
}

async fn publish_status(
    neato: Arc<Neato<SerialTransport>>,
    client: AsyncClient,
    topic: String,
    wait: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let status = neato.poll_status().await;
        if let Some(message) = &status.error {
            info!("Error from Neato: {message}");
        }
        match serde_json::to_string(&status) {
            Ok(json) => {
                if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, false, json).await {
                    error!("Failed to publish status: {e}");
                }
            }
            Err(e) => error!("Failed to encode status: {e}"),
        }
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_bridge(neato: Neato<SerialTransport>, settings: &MqttSettings) -> Result<()> {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(settings), 64);
    let neato = Arc::new(neato);

    // Subscribe before connecting so the first Connected event is seen
    let availability_handle = tokio::spawn(forward_availability(
        neato.subscribe(),
        client.clone(),
        settings.availability_topic.clone(),
    ));
    if !neato.connect().await {
        warn!("Neato not reachable; polling will retry the connection");
    }

    // Commands take seconds; the MQTT event loop hands them to a worker so
    // it keeps polling meanwhile.
    let (command_tx, command_rx) = mpsc::channel::<String>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let command_handle = tokio::spawn(run_commands(
        Arc::clone(&neato),
        command_rx,
        client.clone(),
        settings.response_topic.clone(),
        shutdown_rx.clone(),
    ));

    let status_handle = tokio::spawn(publish_status(
        Arc::clone(&neato),
        client.clone(),
        settings.state_topic.clone(),
        Duration::from_secs(settings.publish_wait_seconds),
        shutdown_rx,
    ));

    let command_topic = settings.command_topic.clone();
    let client_mqtt = client.clone();
    let mqtt_handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                    // rumqttc does not resubscribe after a broker reconnect
                    info!("MQTT: connected, subscribing to {command_topic}");
                    if let Err(e) = client_mqtt
                        .subscribe(&command_topic, QoS::AtLeastOnce)
                        .await
                    {
                        error!("Failed to subscribe to {command_topic}: {e}");
                    }
                }
                Ok(MqttEvent::Incoming(Packet::Publish(msg))) => {
                    if msg.topic == command_topic {
                        let payload = String::from_utf8_lossy(&msg.payload).into_owned();
                        if command_tx.try_send(payload).is_err() {
                            warn!("Command queue full, dropping command");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    info!("MQTT bridge running. Send SIGINT/SIGTERM to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }

    // Stop intake, then let the workers finish their current exchange. A
    // task aborted inside a power cycle would leave USB power cut.
    mqtt_handle.abort();
    let _ = shutdown_tx.send(true);
    info!("Waiting for the running Neato exchange to finish");
    for handle in [command_handle, status_handle] {
        if let Err(e) = handle.await {
            warn!("Worker task failed: {e}");
        }
    }
    availability_handle.abort();

    publish_availability(&client, &settings.availability_topic, false).await;
    if let Err(e) = client.disconnect().await {
        warn!("Error disconnecting from MQTT: {e}");
    }

    match Arc::try_unwrap(neato) {
        Ok(neato) => neato.shutdown().await,
        Err(neato) => {
            warn!("Session still shared after shutdown, closing port only");
            neato.close().await;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=neato_serial=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt()
            .without_time()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mode = cli.mode.unwrap_or(Mode::Bridge);

    if let Mode::Ports = mode {
        for port in list_ports().context("Failed to list serial ports")? {
            println!("{port}");
        }
        return Ok(());
    }

    let config = Config::load(&cli.config).context("Failed to load config file")?;
    info!("Setting up serial");
    let neato = build_session(&config.serial).await?;

    match mode {
        Mode::Console => run_console(neato).await?,
        Mode::Bridge | Mode::Ports => run_bridge(neato, &config.mqtt).await?,
    }

    info!("Shutdown complete");
    Ok(())
}

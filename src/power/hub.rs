//! Power-cycling through a USB hub's per-port power switching.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};
use crate::power::PowerSwitch;

/// Default hub control invocation.
pub const DEFAULT_HUB_CTRL: [&str; 2] = ["sudo", "./hub-ctrl"];

/// Default reboot invocation.
pub const DEFAULT_REBOOT: [&str; 2] = ["sudo", "reboot"];

/// Default time the port stays unpowered.
pub const DEFAULT_OFF_TIME: Duration = Duration::from_secs(1);

/// Switches a hub port off and on with `hub-ctrl`.
///
/// Runs `<tool> -h <hub> -P <port> -p 0`, waits, then `... -p 1`. If a
/// reboot command is configured it runs afterwards; some hosts only
/// re-enumerate the device after a reboot.
#[derive(Debug, Clone)]
pub struct HubPort {
    tool: Vec<String>,
    hub: u32,
    port: u32,
    off_time: Duration,
    reboot: Option<Vec<String>>,
}

impl HubPort {
    /// Creates a switch for the given hub and port with default settings.
    #[must_use]
    pub fn new(hub: u32, port: u32) -> Self {
        Self {
            tool: DEFAULT_HUB_CTRL.iter().map(ToString::to_string).collect(),
            hub,
            port,
            off_time: DEFAULT_OFF_TIME,
            reboot: None,
        }
    }

    /// Sets the hub control program and its leading arguments.
    #[must_use]
    pub fn tool(mut self, tool: Vec<String>) -> Self {
        self.tool = tool;
        self
    }

    /// Sets how long the port stays unpowered.
    #[must_use]
    pub const fn off_time(mut self, off_time: Duration) -> Self {
        self.off_time = off_time;
        self
    }

    /// Runs `command` after the port is powered again.
    #[must_use]
    pub fn reboot_with(mut self, command: Vec<String>) -> Self {
        self.reboot = Some(command);
        self
    }

    /// Runs the default reboot command after the port is powered again.
    #[must_use]
    pub fn reboot_after_switch(self) -> Self {
        self.reboot_with(DEFAULT_REBOOT.iter().map(ToString::to_string).collect())
    }

    /// Powers the port on.
    ///
    /// Run once at startup so the device is powered even if a previous
    /// toggle never switched the port back on. Never reboots.
    pub async fn init(&self) -> Result<()> {
        self.set_power(true).await?;
        tracing::info!("USB hub {} port {} powered on", self.hub, self.port);
        Ok(())
    }

    async fn set_power(&self, on: bool) -> Result<()> {
        let state = if on { "1" } else { "0" };
        let mut args = vec![
            "-h".to_owned(),
            self.hub.to_string(),
            "-P".to_owned(),
            self.port.to_string(),
            "-p".to_owned(),
            state.to_owned(),
        ];
        let mut command = self.tool.clone();
        command.append(&mut args);
        run(&command).await
    }
}

impl PowerSwitch for HubPort {
    fn toggle(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!("power-cycling USB hub {} port {}", self.hub, self.port);
            self.set_power(false).await?;
            tokio::time::sleep(self.off_time).await;
            self.set_power(true).await?;

            if let Some(reboot) = &self.reboot {
                tracing::warn!("rebooting host after USB switch");
                run(reboot).await?;
            }
            Ok(())
        })
    }
}

/// Runs a command line and fails unless it exits successfully.
async fn run(command: &[String]) -> Result<()> {
    let (program, args) = command.split_first().ok_or_else(|| Error::PowerSwitch {
        message: "empty command".into(),
    })?;

    tracing::debug!("running {}", command.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| Error::PowerSwitch {
            message: format!("failed to run {program}: {e}"),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::PowerSwitch {
            message: format!("{} exited with {status}", command.join(" ")),
        })
    }
}

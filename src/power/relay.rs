//! Power-cycling through a relay driven by a GPIO pin.
//!
//! The pin is controlled through the Linux sysfs GPIO interface. The relay
//! passes USB power while the pin is high.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::power::PowerSwitch;

/// Default sysfs GPIO directory.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Default time the relay stays open.
pub const DEFAULT_OFF_TIME: Duration = Duration::from_secs(1);

/// Relay on a GPIO output pin.
#[derive(Debug, Clone)]
pub struct Relay {
    pin: u32,
    root: PathBuf,
    off_time: Duration,
}

impl Relay {
    /// Creates a relay on the given BCM pin number.
    #[must_use]
    pub fn new(pin: u32) -> Self {
        Self {
            pin,
            root: PathBuf::from(DEFAULT_GPIO_ROOT),
            off_time: DEFAULT_OFF_TIME,
        }
    }

    /// Sets the sysfs GPIO directory.
    #[must_use]
    pub fn gpio_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets how long the relay stays open.
    #[must_use]
    pub const fn off_time(mut self, off_time: Duration) -> Self {
        self.off_time = off_time;
        self
    }

    /// Returns the pin number.
    #[must_use]
    pub const fn pin(&self) -> u32 {
        self.pin
    }

    /// Exports the pin and drives it high.
    ///
    /// Must run once at startup so the device is powered before the first
    /// connection attempt.
    pub async fn init(&self) -> Result<()> {
        let pin_dir = self.pin_dir();
        if !tokio::fs::try_exists(&pin_dir).await.unwrap_or(false) {
            self.write(&self.root.join("export"), &self.pin.to_string())
                .await?;
        }
        // "high" configures the pin as an output already driven high
        self.write(&pin_dir.join("direction"), "high").await?;
        tracing::info!("relay on GPIO {} initialized high", self.pin);
        Ok(())
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    async fn set_level(&self, high: bool) -> Result<()> {
        let value = if high { "1" } else { "0" };
        self.write(&self.pin_dir().join("value"), value).await
    }

    async fn write(&self, path: &Path, value: &str) -> Result<()> {
        tokio::fs::write(path, value)
            .await
            .map_err(|e| Error::PowerSwitch {
                message: format!("GPIO {}: writing {}: {e}", self.pin, path.display()),
            })
    }
}

impl PowerSwitch for Relay {
    fn toggle(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!("power-cycling USB through relay on GPIO {}", self.pin);
            self.set_level(false).await?;
            tokio::time::sleep(self.off_time).await;
            self.set_level(true).await
        })
    }
}

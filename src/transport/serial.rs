//! Serial/USB transport implementation.
//!
//! The Neato exposes its console as a USB CDC device. Depending on USB
//! enumeration order it shows up under different paths, so the transport
//! takes an ordered list of candidates and opens the first that works.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default baud rate for the Neato console.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default size of a single read.
///
/// A read shorter than this marks the end of a response.
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    devices: Vec<String>,
    baud_rate: u32,
    read_timeout: Duration,
    chunk_size: usize,
}

impl SerialConfig {
    /// Creates a serial configuration for the given device candidates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeoutNotConfigured`] if `read_timeout` is zero.
    pub fn new<I, S>(devices: I, read_timeout: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if read_timeout.is_zero() {
            return Err(Error::TimeoutNotConfigured);
        }
        Ok(Self {
            devices: devices.into_iter().map(Into::into).collect(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Creates a configuration from a comma separated device list such as
    /// `"/dev/ttyACM0,/dev/ttyACM1"`.
    pub fn from_device_list(list: &str, read_timeout: Duration) -> Result<Self> {
        let devices = list
            .split(',')
            .map(str::trim)
            .filter(|device| !device.is_empty());
        Self::new(devices, read_timeout)
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the read chunk size. Values below 1 are raised to 1.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Returns the device candidates in the order they are tried.
    #[must_use]
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Returns the read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

/// Serial transport for Neato communication.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<SerialStream>,
    device: Option<String>,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: None,
            device: None,
        }
    }

    /// Returns the path of the open device.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            if let (Some(_), Some(device)) = (&self.port, &self.device) {
                return Ok(device.clone());
            }

            let config = &self.config;
            let (device, port) = open_first(config.devices(), |device| open_port(device, config))?;

            tracing::info!("connected to Neato at {device}");
            self.port = Some(port);
            self.device = Some(device.clone());
            Ok(device)
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.port.take().is_some() {
                tracing::info!(
                    "closed serial port {}",
                    self.device.as_deref().unwrap_or("?")
                );
            }
            self.device = None;
            Ok(())
        })
    }

    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let port = self.port.as_mut().ok_or(Error::NotConnected)?;

            tracing::trace!("sending {} bytes", data.len());
            port.write_all(&data).await.map_err(Error::Io)?;
            port.flush().await.map_err(Error::Io)?;

            Ok(())
        })
    }

    fn drain(&mut self) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
        Box::pin(async move {
            let timeout = self.config.read_timeout;
            let chunk_size = self.config.chunk_size;
            let port = self.port.as_mut().ok_or(Error::NotConnected)?;

            let mut out = BytesMut::new();
            while port.bytes_to_read()? > 0 {
                let data = read_all(&mut *port, timeout, chunk_size).await?;
                out.extend_from_slice(&data);
            }

            tracing::trace!("drained {} bytes", out.len());
            Ok(out.freeze())
        })
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

/// Opens a single candidate as 8N1 and discards stale input.
fn open_port(device: &str, config: &SerialConfig) -> Result<SerialStream> {
    let port = tokio_serial::new(device, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(config.read_timeout)
        .open_native_async()?;
    port.clear(ClearBuffer::Input)?;
    Ok(port)
}

/// Tries each candidate in order and returns the first that opens.
///
/// Candidates after the first success are not tried.
///
/// # Errors
///
/// Returns [`Error::NoDeviceAvailable`] if every candidate fails.
pub fn open_first<S, F>(candidates: &[String], mut open: F) -> Result<(String, S)>
where
    F: FnMut(&str) -> Result<S>,
{
    for device in candidates {
        match open(device) {
            Ok(port) => return Ok((device.clone(), port)),
            Err(e) => tracing::warn!("could not connect to {device}: {e}, trying next device"),
        }
    }
    Err(Error::NoDeviceAvailable {
        tried: candidates.to_vec(),
    })
}

/// Reads until a chunk comes back shorter than `chunk_size`.
///
/// Each chunk waits at most `timeout` to fill up, so a short chunk means the
/// device went quiet.
///
/// # Errors
///
/// Returns [`Error::TimeoutNotConfigured`] without reading if `timeout` is
/// zero, or [`Error::Io`] if a read fails.
pub async fn read_all<R>(reader: &mut R, timeout: Duration, chunk_size: usize) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    if timeout.is_zero() {
        return Err(Error::TimeoutNotConfigured);
    }
    let chunk_size = chunk_size.max(1);

    let mut buffer = BytesMut::new();
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let n = read_chunk(reader, &mut chunk, timeout).await?;
        buffer.extend_from_slice(&chunk[..n]);
        if n < chunk_size {
            break;
        }
    }
    Ok(buffer)
}

/// Fills `chunk` until it is full, the reader hits EOF, or `timeout` elapses.
async fn read_chunk<R>(reader: &mut R, chunk: &mut [u8], timeout: Duration) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut filled = 0;
    while filled < chunk.len() {
        match tokio::time::timeout_at(deadline, reader.read(&mut chunk[filled..])).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

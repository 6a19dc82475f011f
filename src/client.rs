//! Main [`Neato`] session implementation.
//!
//! The session owns the transport and serializes every exchange with the
//! device. The console has no framing or acknowledgments: a command is
//! written, the session sleeps for a fixed settle time and then takes
//! whatever the device printed as the answer. Two commands in flight would
//! make the answers indistinguishable, so all state lives behind one lock
//! that is held for a whole exchange.

use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::event::{Event, EventDispatcher, Subscription};
use crate::power::PowerSwitch;
use crate::protocol::{
    CLEAN, Command, Query, WAKE_PROBE, encode_line, error_line, parse_error_line, parse_record,
};
use crate::transport::{SerialConfig, SerialTransport, Transport};
use crate::types::{ChargerStatus, DeviceError, MotorStatus, Record, Status};

/// Settle delays between protocol steps.
///
/// The device gives no signal when it is ready, so fixed sleeps are the only
/// synchronization available. The defaults are tuned for the Neato's UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait after the wake probe before draining.
    pub wake_settle: Duration,
    /// Wait after a command before reading its response.
    pub command_settle: Duration,
    /// Wait before closing and reopening the port.
    pub reconnect_settle: Duration,
    /// Wait after a power cycle before reconnecting.
    pub toggle_settle: Duration,
    /// Wait after reconnecting for the device to boot and start cleaning.
    pub clean_boot: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            wake_settle: Duration::from_secs(1),
            command_settle: Duration::from_secs(1),
            reconnect_settle: Duration::from_secs(5),
            toggle_settle: Duration::from_secs(2),
            clean_boot: Duration::from_secs(8),
        }
    }
}

/// Behavior of the session around the clean-start workaround.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Settle delays.
    pub timings: Timings,
    /// After a clean command, check the vacuum and repeat the command and
    /// power cycle once if it is not spinning.
    pub resend_if_not_cleaning: bool,
    /// When `GetErr` reports error 220, power-cycle and resend `Clean`.
    pub recover_on_unplug_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            resend_if_not_cleaning: false,
            recover_on_unplug_error: true,
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration.
    ///
    /// Unplug-error recovery is on, resending is off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settle delays.
    #[must_use]
    pub const fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Enables or disables resending a clean command that did not start.
    #[must_use]
    pub const fn resend_if_not_cleaning(mut self, enabled: bool) -> Self {
        self.resend_if_not_cleaning = enabled;
        self
    }

    /// Enables or disables recovery from error 220.
    #[must_use]
    pub const fn recover_on_unplug_error(mut self, enabled: bool) -> Self {
        self.recover_on_unplug_error = enabled;
        self
    }
}

/// Session with a Neato robot vacuum.
///
/// Every public method takes the session lock for its full duration, so
/// the session can be shared between tasks. Calls block for their settle
/// delays: about two seconds for a plain command and much longer for a
/// clean command.
pub struct Neato<T> {
    session: Mutex<Session<T>>,
    dispatcher: EventDispatcher,
}

impl Neato<SerialTransport> {
    /// Creates a session on a serial port (not yet connected).
    #[must_use]
    pub fn serial(config: SerialConfig, power: Box<dyn PowerSwitch>, session: SessionConfig) -> Self {
        Self::new(SerialTransport::new(config), power, session)
    }
}

impl<T: Transport> Neato<T> {
    /// Creates a session with the given transport (not yet connected).
    #[must_use]
    pub fn new(transport: T, power: Box<dyn PowerSwitch>, config: SessionConfig) -> Self {
        let dispatcher = EventDispatcher::new(64);
        let session = Session {
            transport,
            power,
            config,
            dispatcher: dispatcher.clone(),
        };
        Self {
            session: Mutex::new(session),
            dispatcher,
        }
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Opens the first available device.
    ///
    /// Returns false if no candidate could be opened; the session stays
    /// disconnected and may be connected later.
    pub async fn connect(&self) -> bool {
        self.session.lock().await.connect().await
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.transport.is_connected()
    }

    /// Waits for the device to settle, closes the port and connects again.
    ///
    /// Returns whether the session is connected afterwards.
    pub async fn reconnect(&self) -> bool {
        self.session.lock().await.reconnect().await
    }

    /// Closes the port. Closing a closed session is a no-op.
    pub async fn close(&self) {
        self.session.lock().await.close().await;
    }

    /// Closes the port and consumes the session.
    pub async fn shutdown(self) {
        self.session.into_inner().close().await;
    }

    /// Sends a command and returns the device output.
    ///
    /// Returns `None` when the device printed nothing, when the session was
    /// disconnected (a connection attempt is made instead), when the command
    /// started cleaning, or when the exchange failed (the session reconnects
    /// once; the command is not retried).
    pub async fn send(&self, command: &str) -> Option<String> {
        self.session.lock().await.send(command).await
    }

    /// Runs a status query and parses its output.
    ///
    /// Returns an empty record when the device does not answer.
    pub async fn query(&self, query: Query) -> Record {
        self.send(query.as_str())
            .await
            .map(|output| parse_record(&output))
            .unwrap_or_default()
    }

    /// Gets battery and charger state.
    pub async fn get_charger(&self) -> ChargerStatus {
        ChargerStatus::from_record(self.query(Query::GetCharger).await)
    }

    /// Gets motor state.
    pub async fn get_motors(&self) -> MotorStatus {
        MotorStatus::from_record(self.query(Query::GetMotors).await)
    }

    /// Returns the battery level in percent, 0 if unknown.
    pub async fn get_battery_level(&self) -> u8 {
        self.get_charger().await.battery_level()
    }

    /// Returns true if the battery is charging.
    pub async fn get_charging_active(&self) -> bool {
        self.get_charger().await.is_charging()
    }

    /// Returns true if external power is present, i.e. the robot is docked.
    pub async fn get_ext_pwr_present(&self) -> bool {
        self.get_charger().await.is_docked()
    }

    /// Returns the vacuum fan speed, 0 if unknown.
    pub async fn get_vacuum_rpm(&self) -> u32 {
        self.get_motors().await.vacuum_rpm()
    }

    /// Returns true if the vacuum fan is spinning.
    pub async fn get_cleaning(&self) -> bool {
        self.get_vacuum_rpm().await > 0
    }

    /// Returns the current device error.
    ///
    /// Error 220 means the device wants USB unplugged before it starts
    /// cleaning; unless disabled, the session power-cycles USB and resends
    /// `Clean` before returning it.
    pub async fn get_error(&self) -> Option<DeviceError> {
        let line = self.session.lock().await.error_line().await?;
        parse_error_line(&line)
    }

    /// Returns the current error as text for display.
    ///
    /// This is the message of a `<code> - <message>` line, or the whole line
    /// when the device printed something else. Runs the same error 220
    /// handling as [`Self::get_error`].
    pub async fn get_error_text(&self) -> Option<String> {
        let line = self.session.lock().await.error_line().await?;
        match parse_error_line(&line) {
            Some(error) => Some(error.message),
            None => Some(line),
        }
    }

    /// Gets accelerometer readings.
    pub async fn get_accel(&self) -> Record {
        self.query(Query::GetAccel).await
    }

    /// Gets analog sensor readings.
    pub async fn get_analog_sensors(&self) -> Record {
        self.query(Query::GetAnalogSensors).await
    }

    /// Gets button states.
    pub async fn get_buttons(&self) -> Record {
        self.query(Query::GetButtons).await
    }

    /// Gets calibration info.
    pub async fn get_cal_info(&self) -> Record {
        self.query(Query::GetCalInfo).await
    }

    /// Gets digital sensor readings.
    pub async fn get_digital_sensors(&self) -> Record {
        self.query(Query::GetDigitalSensors).await
    }

    /// Gets a lidar scan.
    pub async fn get_lds_scan(&self) -> Record {
        self.query(Query::GetLDSScan).await
    }

    /// Gets firmware and hardware versions.
    pub async fn get_version(&self) -> Record {
        self.query(Query::GetVersion).await
    }

    /// Collects the status snapshot published by the bridge.
    ///
    /// Each field is a separate round trip.
    pub async fn poll_status(&self) -> Status {
        let battery_level = self.get_battery_level().await;
        let docked = self.get_ext_pwr_present().await;
        let cleaning = self.get_cleaning().await;
        let charging = self.get_charging_active().await;
        let fan_speed = self.get_vacuum_rpm().await;
        let error = self.get_error_text().await;

        Status {
            battery_level,
            docked,
            cleaning,
            charging,
            fan_speed,
            error,
        }
    }
}

/// State guarded by the session lock.
struct Session<T> {
    transport: T,
    power: Box<dyn PowerSwitch>,
    config: SessionConfig,
    dispatcher: EventDispatcher,
}

impl<T: Transport> Session<T> {
    async fn connect(&mut self) -> bool {
        match self.transport.connect().await {
            Ok(device) => {
                self.dispatcher.dispatch(Event::Connected { device });
                true
            }
            Err(e) => {
                tracing::error!("could not connect to Neato: {e}");
                self.dispatcher.dispatch(Event::ConnectFailed);
                false
            }
        }
    }

    async fn close(&mut self) {
        let was_connected = self.transport.is_connected();
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!("error closing serial port: {e}");
        }
        if was_connected {
            self.dispatcher.dispatch(Event::Disconnected);
        }
    }

    async fn reconnect(&mut self) -> bool {
        tracing::info!("reconnecting to Neato");
        tokio::time::sleep(self.config.timings.reconnect_settle).await;
        self.close().await;
        let connected = self.connect().await;
        tracing::info!("reconnect finished, connected: {connected}");
        connected
    }

    async fn send(&mut self, text: &str) -> Option<String> {
        let command = match Command::new(text) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("not sending {text:?}: {e}");
                return None;
            }
        };

        if !self.transport.is_connected() {
            tracing::warn!("not connected, connecting instead of sending {command}");
            self.connect().await;
            return None;
        }

        tracing::debug!("sending {command}");
        match self.exchange(&command).await {
            Ok(output) if output.is_empty() => None,
            Ok(output) => Some(output),
            Err(e) => {
                tracing::error!("sending {command} failed: {e}");
                self.reconnect().await;
                None
            }
        }
    }

    /// Wakes the device, then either sends the command or runs the clean
    /// start sequence.
    async fn exchange(&mut self, command: &Command) -> Result<String> {
        self.wake().await?;
        if command.starts_cleaning() {
            self.start_cleaning(command).await?;
            return Ok(String::new());
        }
        self.request(command).await
    }

    /// Sends the wake probe and discards whatever comes back.
    async fn wake(&mut self) -> Result<()> {
        self.transport.send(encode_line(WAKE_PROBE)).await?;
        tokio::time::sleep(self.config.timings.wake_settle).await;
        let discarded = self.transport.drain().await?;
        tracing::trace!("discarded {} bytes after wake probe", discarded.len());
        Ok(())
    }

    async fn request(&mut self, command: &Command) -> Result<String> {
        self.transport.send(command.to_line()).await?;
        tokio::time::sleep(self.config.timings.command_settle).await;
        let output = self.transport.drain().await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn start_cleaning(&mut self, command: &Command) -> Result<()> {
        tracing::info!("{command} requested, power-cycling USB to start cleaning");
        self.transport.send(command.to_line()).await?;
        self.power_cycle().await;

        if !self.config.resend_if_not_cleaning || !self.transport.is_connected() {
            return Ok(());
        }

        self.wake().await?;
        let output = self.request(&Query::GetMotors.into()).await?;
        if MotorStatus::from_record(parse_record(&output)).is_cleaning() {
            return Ok(());
        }

        tracing::warn!("cleaning did not start, resending {command}");
        self.wake().await?;
        self.transport.send(command.to_line()).await?;
        self.power_cycle().await;
        Ok(())
    }

    /// Cuts USB power, reconnects and waits for the device to boot.
    ///
    /// A failed toggle is logged; the device may still come back.
    async fn power_cycle(&mut self) {
        let succeeded = match self.power.toggle().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("USB power cycle failed: {e}");
                false
            }
        };
        self.dispatcher.dispatch(Event::PowerCycled { succeeded });

        tokio::time::sleep(self.config.timings.toggle_settle).await;
        self.reconnect().await;
        tokio::time::sleep(self.config.timings.clean_boot).await;
    }

    /// Queries `GetErr` and returns its error line.
    async fn error_line(&mut self) -> Option<String> {
        let output = self.send(Query::GetErr.as_str()).await?;
        let line = error_line(&output)?.to_owned();
        tracing::info!("error from Neato: {line}");

        let unplug = parse_error_line(&line).is_some_and(|error| error.requires_usb_unplug());
        if unplug && self.config.recover_on_unplug_error {
            tracing::warn!("Neato needs USB unplugged to clean, power-cycling and resending {CLEAN}");
            if let Err(e) = self.resend_clean().await {
                tracing::error!("resending {CLEAN} failed: {e}");
                self.reconnect().await;
            }
        }
        Some(line)
    }

    async fn resend_clean(&mut self) -> Result<()> {
        self.power_cycle().await;
        if !self.transport.is_connected() {
            tracing::warn!("not connected after power cycle, {CLEAN} not resent");
            return Ok(());
        }
        self.wake().await?;
        self.transport.send(encode_line(CLEAN)).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use bytes::Bytes;

    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct MockState {
        available: bool,
        open: bool,
        connects: usize,
        disconnects: usize,
        sent: Vec<String>,
        responses: HashMap<String, String>,
        pending: Option<String>,
        fail_next_send: bool,
        fail_next_drain: bool,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        state: Arc<StdMutex<MockState>>,
    }

    impl MockTransport {
        fn available() -> Self {
            let mock = Self::default();
            mock.state().available = true;
            mock
        }

        fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.state.lock().unwrap()
        }

        fn respond(&self, command: &str, output: &str) {
            self.state()
                .responses
                .insert(command.to_owned(), output.to_owned());
        }

        fn sent(&self) -> Vec<String> {
            self.state().sent.clone()
        }

        fn commands(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|line| line != WAKE_PROBE)
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state();
                if !state.available {
                    return Err(Error::NoDeviceAvailable {
                        tried: vec!["/dev/ttyACM0".into()],
                    });
                }
                state.open = true;
                state.connects += 1;
                Ok("/dev/ttyACM0".to_owned())
            })
        }

        fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state();
                if state.open {
                    state.disconnects += 1;
                }
                state.open = false;
                Ok(())
            })
        }

        fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state();
                if !state.open {
                    return Err(Error::NotConnected);
                }
                if state.fail_next_send {
                    state.fail_next_send = false;
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "device unplugged",
                    )));
                }
                let line = String::from_utf8_lossy(&data).trim_end().to_owned();
                state.pending = state.responses.get(&line).cloned();
                state.sent.push(line);
                Ok(())
            })
        }

        fn drain(&mut self) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state();
                if !state.open {
                    return Err(Error::NotConnected);
                }
                if state.fail_next_drain {
                    state.fail_next_drain = false;
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "read failed",
                    )));
                }
                Ok(state.pending.take().map(Bytes::from).unwrap_or_default())
            })
        }

        fn is_connected(&self) -> bool {
            self.state().open
        }
    }

    #[derive(Clone, Default)]
    struct MockSwitch {
        toggles: Arc<AtomicUsize>,
        fail: bool,
        // Device that disappears while power is cut
        unplugs: Option<MockTransport>,
    }

    impl MockSwitch {
        fn toggles(&self) -> usize {
            self.toggles.load(Ordering::SeqCst)
        }
    }

    impl PowerSwitch for MockSwitch {
        fn toggle(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.toggles.fetch_add(1, Ordering::SeqCst);
                if let Some(transport) = &self.unplugs {
                    transport.state().available = false;
                }
                if self.fail {
                    Err(Error::PowerSwitch {
                        message: "relay stuck".into(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    const CHARGER: &str = "GetCharger\r\nLabel,Value\r\nFuelPercent,76\r\nChargingActive,1\r\n\
                           ExtPwrPresent,1\r\n";
    const MOTORS_IDLE: &str = "GetMotors\r\nParameter,Value\r\nVacuum_RPM,0\r\n";
    const MOTORS_RUNNING: &str = "GetMotors\r\nParameter,Value\r\nVacuum_RPM,1800\r\n";
    const UNPLUG_ERROR: &str = "GetErr\r\n220 - Unplug USB before cleaning\r\n";

    async fn connected(
        config: SessionConfig,
    ) -> (Neato<MockTransport>, MockTransport, MockSwitch) {
        let transport = MockTransport::available();
        let switch = MockSwitch::default();
        let neato = Neato::new(transport.clone(), Box::new(switch.clone()), config);
        assert!(neato.connect().await);
        (neato, transport, switch)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_wakes_then_reads_response() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        transport.respond("GetCharger", CHARGER);

        let start = tokio::time::Instant::now();
        let output = neato.send("GetCharger").await;

        assert_eq!(output.as_deref(), Some(CHARGER));
        assert_eq!(transport.sent(), [WAKE_PROBE, "GetCharger"]);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_output() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        assert_eq!(neato.send("PlaySound 1").await, None);
        assert_eq!(transport.commands(), ["PlaySound 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_when_disconnected_connects_instead() {
        let transport = MockTransport::available();
        let neato = Neato::new(
            transport.clone(),
            Box::new(MockSwitch::default()),
            SessionConfig::new(),
        );

        assert_eq!(neato.send("GetCharger").await, None);
        assert!(transport.sent().is_empty());
        assert!(neato.is_connected().await);
        assert_eq!(transport.state().connects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_device() {
        let transport = MockTransport::default();
        let neato = Neato::new(
            transport.clone(),
            Box::new(MockSwitch::default()),
            SessionConfig::new(),
        );
        let mut events = neato.subscribe();

        assert!(!neato.connect().await);
        assert!(!neato.is_connected().await);
        assert_eq!(events.try_recv(), Some(Event::ConnectFailed));

        assert!(!neato.reconnect().await);
        assert!(!neato.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_command_is_not_sent() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        assert_eq!(neato.send("GetCharger\nClean").await, None);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_power_cycles_once() {
        let (neato, transport, switch) = connected(SessionConfig::new()).await;
        let mut events = neato.subscribe();

        assert_eq!(neato.send("Clean").await, None);

        assert_eq!(switch.toggles(), 1);
        assert_eq!(transport.commands(), ["Clean"]);
        assert_eq!(transport.state().connects, 2);
        assert_eq!(transport.state().disconnects, 1);
        assert!(neato.is_connected().await);

        assert_eq!(events.try_recv(), Some(Event::PowerCycled { succeeded: true }));
        assert_eq!(events.try_recv(), Some(Event::Disconnected));
        assert!(matches!(events.try_recv(), Some(Event::Connected { .. })));
        assert_eq!(events.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_duration() {
        let (neato, _, _) = connected(SessionConfig::new()).await;
        let timings = Timings::default();

        let start = tokio::time::Instant::now();
        neato.send("Clean").await;

        let expected = timings.wake_settle
            + timings.toggle_settle
            + timings.reconnect_settle
            + timings.clean_boot;
        assert_eq!(start.elapsed(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_stop_is_a_plain_command() {
        let (neato, transport, switch) = connected(SessionConfig::new()).await;
        neato.send("Clean Stop").await;
        assert_eq!(switch.toggles(), 0);
        assert_eq!(transport.commands(), ["Clean Stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_resend_when_vacuum_idle() {
        let config = SessionConfig::new().resend_if_not_cleaning(true);
        let (neato, transport, switch) = connected(config).await;
        transport.respond("GetMotors", MOTORS_IDLE);

        neato.send("Clean Spot").await;

        assert_eq!(switch.toggles(), 2);
        assert_eq!(transport.commands(), ["Clean Spot", "GetMotors", "Clean Spot"]);
        assert_eq!(transport.state().connects, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_no_resend_when_vacuum_running() {
        let config = SessionConfig::new().resend_if_not_cleaning(true);
        let (neato, transport, switch) = connected(config).await;
        transport.respond("GetMotors", MOTORS_RUNNING);

        neato.send("Clean").await;

        assert_eq!(switch.toggles(), 1);
        assert_eq!(transport.commands(), ["Clean", "GetMotors"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_continues_after_failed_toggle() {
        let transport = MockTransport::available();
        let switch = MockSwitch {
            fail: true,
            ..MockSwitch::default()
        };
        let neato = Neato::new(transport.clone(), Box::new(switch.clone()), SessionConfig::new());
        neato.connect().await;
        let mut events = neato.subscribe();

        neato.send("Clean").await;

        assert_eq!(switch.toggles(), 1);
        assert_eq!(transport.state().connects, 2);
        assert_eq!(events.try_recv(), Some(Event::PowerCycled { succeeded: false }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_failure_reconnects_once() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        transport.respond("GetCharger", CHARGER);
        transport.state().fail_next_send = true;

        assert_eq!(neato.send("GetCharger").await, None);
        assert!(transport.sent().is_empty());
        assert_eq!(transport.state().connects, 2);
        assert_eq!(transport.state().disconnects, 1);

        assert_eq!(neato.send("GetCharger").await.as_deref(), Some(CHARGER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_reconnects_once() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        transport.respond("GetCharger", CHARGER);
        transport.state().fail_next_drain = true;

        assert_eq!(neato.send("GetCharger").await, None);
        assert_eq!(transport.sent(), [WAKE_PROBE]);
        assert_eq!(transport.state().connects, 2);
        assert_eq!(transport.state().disconnects, 1);
        assert!(neato.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_resend_skipped_when_device_gone() {
        let transport = MockTransport::available();
        let switch = MockSwitch {
            unplugs: Some(transport.clone()),
            ..MockSwitch::default()
        };
        let config = SessionConfig::new().resend_if_not_cleaning(true);
        let neato = Neato::new(transport.clone(), Box::new(switch.clone()), config);
        assert!(neato.connect().await);

        assert_eq!(neato.send("Clean").await, None);

        assert_eq!(switch.toggles(), 1);
        assert_eq!(transport.commands(), ["Clean"]);
        assert!(!neato.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_running_power_cycle() {
        let (neato, transport, switch) = connected(SessionConfig::new()).await;
        let neato = Arc::new(neato);
        let timings = Timings::default();

        let start = tokio::time::Instant::now();
        let clean = tokio::spawn({
            let neato = Arc::clone(&neato);
            async move { neato.send("Clean").await }
        });
        // Lands between the toggle and the reconnect
        tokio::time::sleep(timings.wake_settle + Duration::from_millis(500)).await;
        neato.close().await;

        assert_eq!(clean.await.unwrap(), None);
        assert_eq!(
            start.elapsed(),
            timings.wake_settle + timings.toggle_settle + timings.reconnect_settle + timings.clean_boot
        );
        assert_eq!(switch.toggles(), 1);
        assert_eq!(transport.state().connects, 2);
        assert!(!neato.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_failure_with_device_gone() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        {
            let mut state = transport.state();
            state.fail_next_send = true;
            state.available = false;
        }

        assert_eq!(neato.send("GetCharger").await, None);
        assert!(!neato.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        let mut events = neato.subscribe();

        neato.close().await;
        neato.close().await;

        assert!(!neato.is_connected().await);
        assert_eq!(transport.state().disconnects, 1);
        assert_eq!(events.try_recv(), Some(Event::Disconnected));
        assert_eq!(events.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_port() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        neato.shutdown().await;
        assert!(!transport.state().open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_accessors() {
        let (neato, transport, _) = connected(SessionConfig::new()).await;
        transport.respond("GetCharger", CHARGER);
        transport.respond("GetMotors", MOTORS_RUNNING);

        assert_eq!(neato.get_battery_level().await, 76);
        assert!(neato.get_charging_active().await);
        assert!(neato.get_ext_pwr_present().await);
        assert_eq!(neato.get_vacuum_rpm().await, 1800);
        assert!(neato.get_cleaning().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_defaults_without_output() {
        let (neato, _, _) = connected(SessionConfig::new()).await;

        assert_eq!(neato.get_vacuum_rpm().await, 0);
        assert!(!neato.get_cleaning().await);
        assert_eq!(neato.get_battery_level().await, 0);
        assert!(!neato.get_charging_active().await);
        assert!(neato.get_version().await.is_empty());
        assert_eq!(neato.get_error().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unplug_error_power_cycles_and_resends_clean() {
        let (neato, transport, switch) = connected(SessionConfig::new()).await;
        transport.respond("GetErr", UNPLUG_ERROR);

        let error = neato.get_error().await.unwrap();

        assert_eq!(error, DeviceError::new("220", "Unplug USB before cleaning"));
        assert_eq!(switch.toggles(), 1);
        assert_eq!(transport.commands(), ["GetErr", CLEAN]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unplug_error_recovery_disabled() {
        let config = SessionConfig::new().recover_on_unplug_error(false);
        let (neato, transport, switch) = connected(config).await;
        transport.respond("GetErr", UNPLUG_ERROR);

        assert!(neato.get_error().await.is_some());
        assert_eq!(switch.toggles(), 0);
        assert_eq!(transport.commands(), ["GetErr"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_reported_only() {
        let (neato, transport, switch) = connected(SessionConfig::new()).await;
        transport.respond("GetErr", "GetErr\r\n243 - Dust bin full\r\n");

        let error = neato.get_error().await.unwrap();
        assert_eq!(error.code, "243");
        assert_eq!(switch.toggles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsed_error_text_is_kept() {
        let (neato, transport, switch) = connected(SessionConfig::new()).await;
        transport.respond("GetErr", "GetErr\r\nBrush stuck\r\n");

        assert_eq!(neato.get_error().await, None);
        assert_eq!(neato.get_error_text().await.as_deref(), Some("Brush stuck"));
        assert_eq!(neato.poll_status().await.error.as_deref(), Some("Brush stuck"));
        assert_eq!(switch.toggles(), 0);
    }

    #[test]
    fn test_session_config_default_recovers_unplug_error() {
        assert_eq!(SessionConfig::default(), SessionConfig::new());
        assert!(SessionConfig::default().recover_on_unplug_error);
        assert!(!SessionConfig::default().resend_if_not_cleaning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_status() {
        let (neato, transport, _) = connected(SessionConfig::new().recover_on_unplug_error(false)).await;
        transport.respond("GetCharger", CHARGER);
        transport.respond("GetMotors", MOTORS_IDLE);
        transport.respond("GetErr", UNPLUG_ERROR);

        let status = neato.poll_status().await;

        assert_eq!(
            status,
            Status {
                battery_level: 76,
                docked: true,
                cleaning: false,
                charging: true,
                fan_speed: 0,
                error: Some("Unplug USB before cleaning".into()),
            }
        );
        assert_eq!(
            transport.commands(),
            ["GetCharger", "GetCharger", "GetMotors", "GetCharger", "GetMotors", "GetErr"]
        );
    }
}

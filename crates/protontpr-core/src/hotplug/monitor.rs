// ProtonTPR Hotplug Monitor
// Session lifecycle: attach, forward, reconnect, tear down

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{HotplugAction, HotplugEvent};
use crate::backend::{DeviceBackend, EventSink, EventSource};
use crate::error::{MirrorError, MirrorResult};
use crate::event::{Forwarder, PumpOutcome};
use crate::input::{CapabilitySet, UsbFilter};
use crate::output::{mirror_capabilities, VirtualDeviceSpec, DEFAULT_VIRTUAL_NAME};

/// Default delay between reopen attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Lifecycle state of the mirrored device pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No session
    Idle,
    /// Opening the real device and building the virtual one
    Attaching,
    /// Both devices live, events flowing
    Attached,
    /// Real device lost, virtual device kept, reopen pending
    Reconnecting,
    /// Releasing both devices
    Detaching,
}

/// What to do when the real device disappears without a remove notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Tear the session down
    Drop,
    /// Keep the virtual device and retry opening the same node forever
    Retry { interval: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Retry {
            interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Name of the virtual device
    pub virtual_name: String,
    /// USB ids add notifications must match; without one, notifications are ignored
    pub filter: Option<UsbFilter>,
    pub reconnect: ReconnectPolicy,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            virtual_name: DEFAULT_VIRTUAL_NAME.to_string(),
            filter: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl MonitorOptions {
    /// Options for notification-driven attach
    pub fn hotplug(filter: UsbFilter) -> Self {
        Self {
            filter: Some(filter),
            reconnect: ReconnectPolicy::Drop,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.virtual_name = name.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// One real device bound to its virtual twin
struct Session<B: DeviceBackend> {
    path: PathBuf,
    syspath: Option<PathBuf>,
    /// None while reconnecting
    real: Option<B::Source>,
    sink: B::Sink,
    /// Next reopen attempt, while reconnecting
    next_attempt: Option<Instant>,
    /// Next liveness check, while attached with reconnect enabled
    next_check: Option<Instant>,
}

/// Check if a notification concerns the session's device.
///
/// Removal leaves no sysfs attributes to match on, so the node path and the
/// sysfs hierarchy are compared instead.
fn is_related(path: &Path, syspath: Option<&Path>, event: &HotplugEvent) -> bool {
    if event.devnode.as_deref() == Some(path) || event.event_nodes.iter().any(|node| node == path) {
        return true;
    }
    match syspath {
        Some(syspath) => syspath.starts_with(&event.syspath) || event.syspath.starts_with(syspath),
        None => false,
    }
}

/// Hotplug state machine owning at most one mirroring session.
///
/// Dropping the monitor tears down whatever session is active.
pub struct HotplugMonitor<B: DeviceBackend> {
    backend: B,
    options: MonitorOptions,
    state: MonitorState,
    session: Option<Session<B>>,
    forwarder: Forwarder,
}

impl<B: DeviceBackend> HotplugMonitor<B> {
    pub fn new(backend: B, options: MonitorOptions) -> Self {
        Self {
            backend,
            options,
            state: MonitorState::Idle,
            session: None,
            forwarder: Forwarder::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Whether a session exists (attached or reconnecting)
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Node of the real device of the current session
    pub fn device_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn virtual_devnode(&self) -> Option<&Path> {
        self.session.as_ref().and_then(|s| s.sink.devnode())
    }

    /// Capabilities the virtual device was registered with
    pub fn virtual_capabilities(&self) -> Option<&CapabilitySet> {
        self.session.as_ref().map(|s| s.sink.capabilities())
    }

    /// Descriptor of the real device, while attached
    pub fn device_fd(&self) -> Option<RawFd> {
        self.session
            .as_ref()
            .and_then(|s| s.real.as_ref())
            .and_then(|real| real.raw_fd())
    }

    /// Events forwarded over the monitor's lifetime
    pub fn forwarded(&self) -> u64 {
        self.forwarder.total()
    }

    /// Liveness of the real device handle; false when there is none
    pub fn health_check(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.real.as_ref())
            .map_or(false, |real| real.health_check())
    }

    fn transition(&mut self, to: MonitorState) {
        if self.state != to {
            log::debug!("Monitor state {:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }

    fn retry_interval(&self) -> Duration {
        self.check_interval().unwrap_or(DEFAULT_RECONNECT_INTERVAL)
    }

    /// Liveness checks run at the reconnect interval, only when a lost
    /// device would be reopened
    fn check_interval(&self) -> Option<Duration> {
        match self.options.reconnect {
            ReconnectPolicy::Retry { interval } => Some(interval),
            ReconnectPolicy::Drop => None,
        }
    }

    /// Open a real device and create its virtual twin.
    ///
    /// Nothing is kept on failure. With a session already active this is a
    /// no-op.
    pub fn attach(&mut self, path: &Path, syspath: Option<PathBuf>) -> MirrorResult<()> {
        if let Some(session) = &self.session {
            log::warn!(
                "Already mirroring {}, ignoring {}",
                session.path.display(),
                path.display()
            );
            return Ok(());
        }

        self.transition(MonitorState::Attaching);
        match self.open_session(path, syspath) {
            Ok(session) => {
                self.session = Some(session);
                self.forwarder.reset();
                self.transition(MonitorState::Attached);
                Ok(())
            }
            Err(e) => {
                self.transition(MonitorState::Idle);
                Err(e)
            }
        }
    }

    fn open_session(&mut self, path: &Path, syspath: Option<PathBuf>) -> MirrorResult<Session<B>> {
        let real = self.backend.open(path)?;
        log::info!("Device connected: {} at {}", real.identity(), path.display());

        let spec = VirtualDeviceSpec::mirror(
            real.identity(),
            real.capabilities(),
            &self.options.virtual_name,
        );
        // On failure `real` is dropped here, closing the device
        let sink = self.backend.create_virtual(&spec)?;

        match sink.devnode() {
            Some(node) => log::info!(
                "Running virtual device '{}' at {}",
                spec.identity.name,
                node.display()
            ),
            None => log::info!("Running virtual device '{}'", spec.identity.name),
        }

        Ok(Session {
            path: path.to_path_buf(),
            syspath,
            real: Some(real),
            sink,
            next_attempt: None,
            next_check: self.check_interval().map(|interval| Instant::now() + interval),
        })
    }

    /// Whether an add notification names the watched USB device
    pub fn matches(&self, event: &HotplugEvent) -> bool {
        match (&self.options.filter, &event.usb_ids) {
            (Some(filter), Some(ids)) => filter.matches(ids),
            _ => false,
        }
    }

    /// Drive the state machine with one notification
    pub fn handle_notification(&mut self, event: &HotplugEvent) {
        match event.action {
            HotplugAction::Add => self.handle_add(event),
            HotplugAction::Remove => self.handle_remove(event),
        }
    }

    fn handle_add(&mut self, event: &HotplugEvent) {
        if !self.matches(event) {
            log::trace!("Ignoring add of {}", event.syspath.display());
            return;
        }
        let node = match event.event_node() {
            Some(node) => node.to_path_buf(),
            None => {
                log::debug!("No event node under {} yet", event.syspath.display());
                return;
            }
        };

        match self.state {
            MonitorState::Attached => {
                if self.device_path() == Some(node.as_path()) {
                    log::debug!("{} is already attached", node.display());
                } else {
                    log::warn!(
                        "Ignoring second matching device {}, already mirroring {}",
                        node.display(),
                        self.device_path().map(|p| p.display().to_string()).unwrap_or_default()
                    );
                }
            }
            MonitorState::Reconnecting => self.reopen(&node, Some(event.syspath.clone())),
            _ => {
                if let Err(e) = self.attach(&node, Some(event.syspath.clone())) {
                    log::error!("Failed to attach {}: {}", node.display(), e);
                }
            }
        }
    }

    fn handle_remove(&mut self, event: &HotplugEvent) {
        let related = self
            .session
            .as_ref()
            .map_or(false, |s| is_related(&s.path, s.syspath.as_deref(), event));
        if related {
            log::info!("Device removed: {}", event.syspath.display());
            self.detach();
        }
    }

    /// Forward whatever the real device has ready. Returns events forwarded.
    pub fn pump(&mut self) -> usize {
        let outcome = match self.session.as_mut() {
            Some(Session {
                real: Some(real),
                sink,
                ..
            }) => self.forwarder.pump(real, sink),
            _ => return 0,
        };

        let forwarded = outcome.forwarded();
        let path = self.device_path().map(Path::to_path_buf).unwrap_or_default();
        match outcome {
            PumpOutcome::Drained { .. } => {}
            PumpOutcome::Disconnected { .. } => {
                log::info!("{}", MirrorError::Disconnected { path });
                self.lose_device();
            }
            PumpOutcome::Failed { error, .. } => {
                log::warn!("{}", MirrorError::TransientRead { path, source: error });
                self.lose_device();
            }
        }
        forwarded
    }

    /// Run the liveness check; a dead handle counts as a disconnect
    pub fn check_liveness(&mut self) {
        if self.state != MonitorState::Attached || self.health_check() {
            return;
        }
        log::info!(
            "Health check failed for {}",
            self.device_path().map(|p| p.display().to_string()).unwrap_or_default()
        );
        if let Some(session) = self.session.as_mut() {
            self.forwarder.abandon(&mut session.sink);
        }
        self.lose_device();
    }

    /// Release the real device after it failed, keeping or destroying the
    /// virtual device according to the reconnect policy
    fn lose_device(&mut self) {
        self.forwarder.reset();
        match self.options.reconnect {
            ReconnectPolicy::Retry { interval } => {
                if let Some(session) = self.session.as_mut() {
                    session.real = None;
                    session.next_check = None;
                    session.next_attempt = Some(Instant::now() + interval);
                    log::info!(
                        "Waiting for {} to come back, retrying every {} ms",
                        session.path.display(),
                        interval.as_millis()
                    );
                }
                self.transition(MonitorState::Reconnecting);
            }
            ReconnectPolicy::Drop => self.detach(),
        }
    }

    /// Retry the reopen or run the liveness check, whichever is due
    pub fn tick(&mut self, now: Instant) {
        let (reopen_due, check_due) = match &self.session {
            Some(session) if session.real.is_none() => {
                (session.next_attempt.map_or(true, |at| now >= at), false)
            }
            Some(session) => (false, session.next_check.map_or(false, |at| now >= at)),
            None => (false, false),
        };

        if reopen_due {
            if let Some(path) = self.device_path().map(Path::to_path_buf) {
                self.reopen(&path, None);
            }
        }
        if check_due {
            let next = self.check_interval().map(|interval| now + interval);
            if let Some(session) = self.session.as_mut() {
                session.next_check = next;
            }
            self.check_liveness();
        }
    }

    /// When the next reopen attempt or liveness check is due
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.session {
            Some(session) if session.real.is_none() => session.next_attempt,
            Some(session) => session.next_check,
            None => None,
        }
    }

    fn reopen(&mut self, path: &Path, syspath: Option<PathBuf>) {
        let interval = self.retry_interval();
        let check_interval = self.check_interval();
        let session = match self.session.as_mut() {
            Some(session) if session.real.is_none() => session,
            _ => return,
        };

        match self.backend.open(path) {
            Ok(real) => {
                if mirror_capabilities(real.capabilities()) != *session.sink.capabilities() {
                    log::warn!(
                        "{} came back with different capabilities, keeping the existing virtual device",
                        path.display()
                    );
                }
                session.path = path.to_path_buf();
                if syspath.is_some() {
                    session.syspath = syspath;
                }
                session.real = Some(real);
                session.next_attempt = None;
                session.next_check = check_interval.map(|interval| Instant::now() + interval);
                log::info!("Reconnected to {}", path.display());
                self.forwarder.reset();
                self.transition(MonitorState::Attached);
            }
            Err(e) => {
                log::debug!("Reopen of {} failed: {}", path.display(), e);
                session.next_attempt = Some(Instant::now() + interval);
            }
        }
    }

    /// Release both devices and return to idle
    pub fn detach(&mut self) {
        let session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        self.transition(MonitorState::Detaching);
        self.forwarder.reset();

        let Session {
            path, real, sink, ..
        } = session;
        // Real device first so nothing is read into a dead virtual device
        drop(real);
        drop(sink);
        log::info!("Virtual device destroyed, released {}", path.display());

        self.transition(MonitorState::Idle);
    }

    /// Final teardown on exit
    pub fn shutdown(&mut self) {
        if self.is_active() {
            log::debug!("Shutting down active session");
        }
        self.detach();
    }
}

impl<B: DeviceBackend> Drop for HotplugMonitor<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ProtonTPR Run Loop
// Single-threaded scheduler for hotplug notifications and device events

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use super::shutdown::Shutdown;
use crate::backend::DeviceBackend;
use crate::error::{MirrorError, MirrorResult};
use crate::hotplug::{HotplugChannel, HotplugMonitor};

/// Default sleep of the polling strategy when nothing was ready
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How the loop waits for work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Block in poll(2) until a descriptor is ready or a reopen or liveness check is due
    Multiplex,
    /// Check everything, sleep for the interval when idle
    Poll { interval: Duration },
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Multiplex
    }
}

/// Owner of the monitor and its notification source.
///
/// Without a channel (static device path) the loop ends once the monitor
/// goes idle, since nothing could ever attach a device again.
pub struct RunLoop<B: DeviceBackend, H: HotplugChannel> {
    monitor: HotplugMonitor<B>,
    channel: Option<H>,
    shutdown: Shutdown,
    wait: WaitStrategy,
}

/// Readiness reported by one multiplexed wait
#[derive(Debug, Default, Clone, Copy)]
struct Ready {
    shutdown: bool,
    channel: bool,
    device: bool,
    device_hangup: bool,
}

impl<B: DeviceBackend, H: HotplugChannel> RunLoop<B, H> {
    pub fn new(
        monitor: HotplugMonitor<B>,
        channel: Option<H>,
        shutdown: Shutdown,
        wait: WaitStrategy,
    ) -> Self {
        Self {
            monitor,
            channel,
            shutdown,
            wait,
        }
    }

    pub fn monitor(&self) -> &HotplugMonitor<B> {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut HotplugMonitor<B> {
        &mut self.monitor
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Run until a termination request, or until a static session ends.
    ///
    /// The monitor is shut down before returning, on success and on error.
    pub fn run(&mut self) -> MirrorResult<()> {
        let result = self.run_inner();
        self.monitor.shutdown();
        log::info!("Exiting.");
        result
    }

    fn run_inner(&mut self) -> MirrorResult<()> {
        if let Some(channel) = self.channel.as_mut() {
            let existing = channel.existing()?;
            for event in &existing {
                if self.monitor.matches(event) {
                    log::info!("Matching device present at startup: {}", event.syspath.display());
                }
                self.monitor.handle_notification(event);
            }
        }

        while !self.shutdown.requested() {
            if self.channel.is_none() && !self.monitor.is_active() {
                log::info!("Device session ended");
                break;
            }

            match self.wait {
                WaitStrategy::Multiplex => self.step_multiplexed()?,
                WaitStrategy::Poll { interval } => self.step_polled(interval),
            }
        }

        Ok(())
    }

    fn drain_channel(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            for event in channel.receive() {
                log::debug!("Hotplug {:?} {}", event.action, event.syspath.display());
                self.monitor.handle_notification(&event);
            }
        }
    }

    fn step_polled(&mut self, interval: Duration) {
        self.drain_channel();
        let forwarded = self.monitor.pump();
        self.monitor.tick(Instant::now());
        if forwarded == 0 && !self.shutdown.requested() {
            std::thread::sleep(interval);
        }
    }

    fn step_multiplexed(&mut self) -> MirrorResult<()> {
        let timeout_ms = match self.monitor.next_deadline() {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                // Round up so the wait does not return just before the deadline
                let ms = remaining.as_millis() + u128::from(remaining.subsec_nanos() % 1_000_000 != 0);
                i32::try_from(ms).unwrap_or(i32::MAX)
            }
            None => -1,
        };

        let channel_fd = self.channel.as_ref().and_then(|c| c.raw_fd());
        let device_fd = self.monitor.device_fd();
        let ready = wait_readable(self.shutdown.raw_fd(), channel_fd, device_fd, timeout_ms)?;

        if ready.shutdown {
            self.shutdown.drain();
        }
        if ready.channel {
            self.drain_channel();
        }
        // The device may have been detached by a notification
        if ready.device && self.monitor.device_fd() == device_fd {
            self.monitor.pump();
            if ready.device_hangup {
                self.monitor.check_liveness();
            }
        }
        self.monitor.tick(Instant::now());
        Ok(())
    }
}

/// poll(2) on up to three descriptors, retrying on EINTR.
///
/// Returns with nothing ready when the timeout expires.
fn wait_readable(
    shutdown_fd: RawFd,
    channel_fd: Option<RawFd>,
    device_fd: Option<RawFd>,
    timeout_ms: i32,
) -> MirrorResult<Ready> {
    let pollfd = |fd: RawFd| libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // Negative descriptors are ignored by poll
    let mut fds = [
        pollfd(shutdown_fd),
        pollfd(channel_fd.unwrap_or(-1)),
        pollfd(device_fd.unwrap_or(-1)),
    ];

    loop {
        // SAFETY: fds is a valid array of pollfd for the duration of the call
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc >= 0 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            // A signal handler may have requested shutdown; the pipe will
            // be readable on the next wait
            continue;
        }
        return Err(MirrorError::SystemCall(err));
    }

    let readable = |pfd: &libc::pollfd| pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
    Ok(Ready {
        shutdown: readable(&fds[0]),
        channel: readable(&fds[1]),
        device: readable(&fds[2]),
        device_hangup: fds[2].revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0,
    })
}

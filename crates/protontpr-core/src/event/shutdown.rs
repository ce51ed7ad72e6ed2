// ProtonTPR Shutdown Signalling
// Termination signals set a flag and wake the run loop through a self-pipe

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};

/// Signals that end the run loop
pub const TERM_SIGNALS: [i32; 3] = [SIGINT, SIGQUIT, SIGTERM];

/// Shutdown request state owned by the run loop.
///
/// The read end of the pipe is what the loop waits on; anything written to
/// it (by a signal handler or a [`ShutdownHandle`]) makes the wait return.
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    reader: UnixStream,
    writer: Arc<UnixStream>,
}

impl Shutdown {
    /// Create the flag and wake-up pipe without touching signal dispositions
    pub fn new() -> std::io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            reader,
            writer: Arc::new(writer),
        })
    }

    /// Create and hook SIGINT, SIGQUIT and SIGTERM.
    ///
    /// A second signal while shutdown is already pending terminates the
    /// process immediately with status 1.
    pub fn install() -> std::io::Result<Self> {
        let shutdown = Self::new()?;
        for signal in TERM_SIGNALS {
            // Registered first so it sees the flag before this signal sets it
            signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&shutdown.flag))?;
            signal_hook::flag::register(signal, Arc::clone(&shutdown.flag))?;
            signal_hook::low_level::pipe::register(signal, shutdown.writer.try_clone()?)?;
        }
        log::debug!("Termination signal handlers installed");
        Ok(shutdown)
    }

    /// Whether shutdown has been requested
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown from the loop's own thread
    pub fn request(&self) {
        self.handle().request();
    }

    /// Cloneable requester, for code that does not own the loop
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.flag),
            writer: Arc::clone(&self.writer),
        }
    }

    /// Descriptor that becomes readable once shutdown is requested
    pub fn raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Consume pending wake-up bytes
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

/// Requests shutdown of a [`Shutdown`] it was taken from
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    writer: Arc<UnixStream>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // A full pipe already guarantees a wake-up
        let _ = (&*self.writer).write(&[1]);
    }
}

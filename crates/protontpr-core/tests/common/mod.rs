// Shared fakes for the integration tests
//
// A FakeWorld stands in for the kernel: device nodes that can be plugged and
// unplugged, queued input events, and a record of every virtual device.
// Handles and the hotplug channel carry socket descriptors that become
// readable whenever something is queued for them.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use evdev::{EventType, InputEvent};
use protontpr_core::event::ShutdownHandle;
use protontpr_core::hotplug::{HotplugChannel, HotplugEvent};
use protontpr_core::input::{event_triple, AxisInfo, EV_ABS, EV_KEY, EV_LED, EV_MSC, EV_SYN};
use protontpr_core::{
    check_registrable, CapabilitySet, DeviceBackend, DeviceIdentity, EventSink, EventSource,
    MirrorError, MirrorResult, ReadOutcome, UsbIds, VirtualDeviceSpec,
};

pub const RUDDER_NODE: &str = "/dev/input/event5";
pub const RUDDER_SYSPATH: &str =
    "/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/0003:044F:B68F.0001/input/input21";

// =========================================================================
// Fake kernel
// =========================================================================

enum Queued {
    Event(InputEvent),
    /// Device disappears when this is read
    Unplug,
    /// Open handles die when this is read, the node stays (USB reset)
    Reset,
    /// Read fails with EIO
    Fail,
    /// Runs when read, then reading continues
    Call(Box<dyn FnOnce()>),
}

struct FakeNode {
    identity: DeviceIdentity,
    capabilities: CapabilitySet,
    queue: VecDeque<Queued>,
    present: bool,
    generation: u32,
    /// Generation whose handles read nothing and fail the health check
    frozen: Option<u32>,
    /// Write ends of the readiness sockets of current handles
    bells: Vec<UnixStream>,
    /// Kept open so frozen handles never see a hangup
    frozen_bells: Vec<UnixStream>,
}

impl FakeNode {
    /// Make every current handle readable
    fn ring(&mut self) {
        self.bells.retain(|bell| (&*bell).write_all(&[1]).is_ok());
    }
}

/// Record of one virtual device created through the fake backend
#[derive(Debug, Clone)]
pub struct VirtualRecord {
    pub spec: VirtualDeviceSpec,
    pub devnode: PathBuf,
    /// Every event written, SYN_REPORT included
    pub emitted: Vec<(u16, u16, i32)>,
    pub alive: bool,
}

#[derive(Default)]
pub struct FakeWorld {
    nodes: HashMap<PathBuf, FakeNode>,
    pub open_handles: usize,
    pub open_attempts: usize,
    pub virtuals: Vec<VirtualRecord>,
    pub fail_virtual: bool,
}

pub type World = Rc<RefCell<FakeWorld>>;

pub fn world() -> World {
    Rc::new(RefCell::new(FakeWorld::default()))
}

impl FakeWorld {
    /// Make a device node appear (again)
    pub fn plug(&mut self, path: &str, identity: DeviceIdentity, capabilities: CapabilitySet) {
        let generation = self
            .nodes
            .get(Path::new(path))
            .map_or(0, |node| node.generation + 1);
        self.nodes.insert(
            PathBuf::from(path),
            FakeNode {
                identity,
                capabilities,
                queue: VecDeque::new(),
                present: true,
                generation,
                frozen: None,
                bells: Vec::new(),
                frozen_bells: Vec::new(),
            },
        );
    }

    /// Make a device node disappear; open handles see ENODEV and a hangup
    pub fn unplug(&mut self, path: &str) {
        if let Some(node) = self.nodes.get_mut(Path::new(path)) {
            node.present = false;
            node.queue.clear();
            node.bells.clear();
        }
    }

    /// Open handles go quiet without an error and fail their health check.
    /// Reopening the node yields a working handle.
    pub fn freeze(&mut self, path: &str) {
        if let Some(node) = self.nodes.get_mut(Path::new(path)) {
            node.frozen = Some(node.generation);
            node.generation += 1;
            let bells = std::mem::take(&mut node.bells);
            node.frozen_bells.extend(bells);
        }
    }

    /// Queue (type, code, value) triples on a device
    pub fn push_events(&mut self, path: &str, events: &[(u16, u16, i32)]) {
        if let Some(node) = self.nodes.get_mut(Path::new(path)) {
            node.queue.extend(
                events
                    .iter()
                    .map(|&(t, c, v)| Queued::Event(InputEvent::new(EventType(t), c, v))),
            );
            node.ring();
        }
    }

    /// The device vanishes once the queued events have been read
    pub fn unplug_after_queue(&mut self, path: &str) {
        self.push(path, Queued::Unplug);
    }

    /// Open handles die once the queued events have been read
    pub fn reset_after_queue(&mut self, path: &str) {
        self.push(path, Queued::Reset);
    }

    /// The next read after the queued events fails with EIO
    pub fn fail_after_queue(&mut self, path: &str) {
        self.push(path, Queued::Fail);
    }

    /// Run `f` once the queued events have been read
    pub fn call_after_queue(&mut self, path: &str, f: impl FnOnce() + 'static) {
        self.push(path, Queued::Call(Box::new(f)));
    }

    fn push(&mut self, path: &str, item: Queued) {
        if let Some(node) = self.nodes.get_mut(Path::new(path)) {
            node.queue.push_back(item);
            node.ring();
        }
    }

    pub fn live_virtuals(&self) -> usize {
        self.virtuals.iter().filter(|v| v.alive).count()
    }
}

// =========================================================================
// Fake backend
// =========================================================================

pub struct FakeSource {
    world: World,
    path: PathBuf,
    generation: u32,
    identity: DeviceIdentity,
    capabilities: CapabilitySet,
    /// Readable while the node has something for this handle
    bell: UnixStream,
}

impl FakeSource {
    fn node_alive(&self) -> bool {
        self.world
            .borrow()
            .nodes
            .get(&self.path)
            .map_or(false, |node| node.present && node.generation == self.generation)
    }

    fn quiet(&self) -> ReadOutcome {
        let mut buf = [0u8; 64];
        while let Ok(n) = (&self.bell).read(&mut buf) {
            if n == 0 {
                break;
            }
        }
        ReadOutcome::WouldBlock
    }
}

impl EventSource for FakeSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn next_event(&mut self) -> ReadOutcome {
        let item = {
            let mut world = self.world.borrow_mut();
            let node = match world.nodes.get_mut(&self.path) {
                Some(node) => node,
                None => return ReadOutcome::Disconnected,
            };
            if node.frozen == Some(self.generation) {
                None
            } else if !node.present || node.generation != self.generation {
                return ReadOutcome::Disconnected;
            } else {
                match node.queue.pop_front() {
                    Some(Queued::Unplug) => {
                        node.present = false;
                        node.bells.clear();
                        return ReadOutcome::Disconnected;
                    }
                    Some(Queued::Reset) => {
                        node.generation += 1;
                        node.bells.clear();
                        return ReadOutcome::Disconnected;
                    }
                    other => other,
                }
            }
        };

        match item {
            Some(Queued::Event(event)) => ReadOutcome::Event(event),
            Some(Queued::Fail) => ReadOutcome::Failed(std::io::Error::from_raw_os_error(libc::EIO)),
            Some(Queued::Call(f)) => {
                f();
                self.next_event()
            }
            Some(Queued::Unplug) | Some(Queued::Reset) | None => self.quiet(),
        }
    }

    fn health_check(&self) -> bool {
        self.node_alive()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.bell.as_raw_fd())
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.world.borrow_mut().open_handles -= 1;
    }
}

pub struct FakeSink {
    world: World,
    index: usize,
    devnode: PathBuf,
    capabilities: CapabilitySet,
}

impl EventSink for FakeSink {
    fn devnode(&self) -> Option<&Path> {
        Some(&self.devnode)
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn emit_frame(&mut self, events: &[InputEvent]) -> std::io::Result<()> {
        self.emit_unterminated(events)?;
        self.world.borrow_mut().virtuals[self.index]
            .emitted
            .push((EV_SYN, 0, 0));
        Ok(())
    }

    fn emit_unterminated(&mut self, events: &[InputEvent]) -> std::io::Result<()> {
        let mut world = self.world.borrow_mut();
        let record = &mut world.virtuals[self.index];
        record.emitted.extend(events.iter().map(event_triple));
        Ok(())
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.world.borrow_mut().virtuals[self.index].alive = false;
    }
}

pub struct FakeBackend {
    world: World,
}

impl FakeBackend {
    pub fn new(world: &World) -> Self {
        Self {
            world: Rc::clone(world),
        }
    }
}

impl DeviceBackend for FakeBackend {
    type Source = FakeSource;
    type Sink = FakeSink;

    fn open(&mut self, path: &Path) -> MirrorResult<FakeSource> {
        let mut world = self.world.borrow_mut();
        world.open_attempts += 1;
        let node = match world.nodes.get_mut(path) {
            Some(node) if node.present => node,
            _ => {
                return Err(MirrorError::Open {
                    path: path.to_path_buf(),
                    source: std::io::Error::from_raw_os_error(libc::ENOENT),
                })
            }
        };

        let (bell, ringer) = UnixStream::pair().expect("socketpair");
        bell.set_nonblocking(true).expect("non-blocking bell");
        node.bells.push(ringer);
        if !node.queue.is_empty() {
            node.ring();
        }

        let source = FakeSource {
            world: Rc::clone(&self.world),
            path: path.to_path_buf(),
            generation: node.generation,
            identity: node.identity.clone(),
            capabilities: node.capabilities.clone(),
            bell,
        };
        world.open_handles += 1;
        Ok(source)
    }

    fn create_virtual(&mut self, spec: &VirtualDeviceSpec) -> MirrorResult<FakeSink> {
        let mut world = self.world.borrow_mut();
        if world.fail_virtual {
            return Err(MirrorError::VirtualCreation("uinput unavailable".to_string()));
        }
        check_registrable(&spec.capabilities)?;

        let index = world.virtuals.len();
        let devnode = PathBuf::from(format!("/dev/input/event{}", 100 + index));
        world.virtuals.push(VirtualRecord {
            spec: spec.clone(),
            devnode: devnode.clone(),
            emitted: Vec::new(),
            alive: true,
        });
        Ok(FakeSink {
            world: Rc::clone(&self.world),
            index,
            devnode,
            capabilities: spec.capabilities.clone(),
        })
    }
}

// =========================================================================
// Fake hotplug channel
// =========================================================================

enum Script {
    Batch(Vec<HotplugEvent>),
    Call(Box<dyn FnOnce()>),
}

/// Replays notification batches, one step per receive.
///
/// Each pending step makes the channel descriptor readable once, so the
/// multiplexed loop sees exactly as many wakeups as there are steps.
pub struct FakeChannel {
    pub existing: Vec<HotplugEvent>,
    script: VecDeque<Script>,
    reader: UnixStream,
    writer: UnixStream,
}

impl FakeChannel {
    pub fn new(existing: Vec<HotplugEvent>) -> Self {
        let (reader, writer) = UnixStream::pair().expect("socketpair");
        reader.set_nonblocking(true).expect("non-blocking channel");
        Self {
            existing,
            script: VecDeque::new(),
            reader,
            writer,
        }
    }

    fn step(mut self, step: Script) -> Self {
        self.script.push_back(step);
        (&self.writer).write_all(&[1]).expect("ring channel");
        self
    }

    pub fn then(self, batch: Vec<HotplugEvent>) -> Self {
        self.step(Script::Batch(batch))
    }

    /// Run `f` once every batch queued so far was delivered
    pub fn when_drained(self, f: impl FnOnce() + 'static) -> Self {
        self.step(Script::Call(Box::new(f)))
    }

    /// Request shutdown once every batch was delivered
    pub fn then_shutdown(self, handle: ShutdownHandle) -> Self {
        self.when_drained(move || handle.request())
    }
}

impl HotplugChannel for FakeChannel {
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.reader.as_raw_fd())
    }

    fn existing(&mut self) -> MirrorResult<Vec<HotplugEvent>> {
        Ok(std::mem::take(&mut self.existing))
    }

    fn receive(&mut self) -> Vec<HotplugEvent> {
        let mut byte = [0u8; 1];
        let _ = (&self.reader).read(&mut byte);
        match self.script.pop_front() {
            Some(Script::Batch(batch)) => batch,
            Some(Script::Call(f)) => {
                f();
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

// =========================================================================
// Fixtures
// =========================================================================

pub fn rudder_identity() -> DeviceIdentity {
    DeviceIdentity::new("Thrustmaster T-Pendular-Rudder", 0x03, 0x044f, 0xb68f, 0x0111)
}

/// Three absolute axes and a MSC_SCAN, no buttons
pub fn rudder_caps() -> CapabilitySet {
    let mut caps = CapabilitySet::new();
    caps.enable_type(EV_SYN);
    caps.enable_code(EV_MSC, 0x04, None);
    caps.enable_code(
        EV_ABS,
        0x00,
        Some(AxisInfo {
            value: 8192,
            minimum: 0,
            maximum: 16383,
            fuzz: 63,
            flat: 1023,
            resolution: 0,
        }),
    );
    caps.enable_code(EV_ABS, 0x01, Some(AxisInfo::with_range(0, 1023)));
    caps.enable_code(EV_ABS, 0x02, Some(AxisInfo::with_range(0, 1023)));
    caps
}

pub fn keyboard_caps() -> CapabilitySet {
    let mut caps = CapabilitySet::new();
    caps.enable_code(EV_KEY, 0x1e, None);
    caps
}

/// A key and a caps lock LED; LEDs have no uinput builder call
pub fn keyboard_with_led_caps() -> CapabilitySet {
    let mut caps = keyboard_caps();
    caps.enable_code(EV_LED, 0x01, None);
    caps
}

/// World with the rudder plugged in at RUDDER_NODE
pub fn world_with_rudder() -> World {
    let world = world();
    world
        .borrow_mut()
        .plug(RUDDER_NODE, rudder_identity(), rudder_caps());
    world
}

pub fn rudder_ids() -> UsbIds {
    UsbIds::new("044f", "b68f")
}

/// Add notification for the rudder's input device with its event child
pub fn rudder_add() -> HotplugEvent {
    HotplugEvent::add(RUDDER_SYSPATH, Some(rudder_ids())).with_event_node(RUDDER_NODE)
}

/// Remove notification for the rudder's USB interface
pub fn rudder_remove() -> HotplugEvent {
    HotplugEvent::remove("/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0")
}

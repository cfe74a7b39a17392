//! Device lifecycle manager and feature-module registry.
//!
//! One [`Device`] record exists per physical attach. Connection state,
//! capabilities, identity and the module slots live under the state mutex;
//! the session and transport live inside [`Ptp`] under the protocol mutex.
//! The two are never nested, so a state query never waits on an in-flight
//! exchange.
//!
//! Records are reference counted: the [`DeviceManager`] arena holds one
//! `Arc`, feature modules clone their own, and the record is destroyed when
//! the last clone drops.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::Config;
use crate::events::{DeviceEvent, EventSink, EventWorker};
use crate::ptp::Ptp;
use crate::transport::Transport;

// ── Capability bits ──

pub const CAP_VIDEO: u32 = 1 << 0;
pub const CAP_STILL: u32 = 1 << 1;
pub const CAP_AUDIO: u32 = 1 << 2;
pub const CAP_STORAGE: u32 = 1 << 3;
pub const CAP_WIRELESS: u32 = 1 << 4;
pub const CAP_GPS: u32 = 1 << 5;
pub const CAP_TOUCHSCREEN: u32 = 1 << 6;

// ── Error type ──

/// Lifecycle and registry errors.
#[derive(Debug)]
pub enum DeviceError {
    /// Unknown device id or otherwise invalid caller input.
    InvalidArgument(String),
    /// Device initialization failed; the record stays usable for a retry.
    Init(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            DeviceError::Init(msg) => write!(f, "device init failed: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── State machine ──

/// Connection lifecycle of one device.
///
/// `Disconnected → Connected → Initialized → Ready`, with `Error` reachable
/// from any of the latter three. There is no recovery transition out of
/// `Error`; a fresh attach allocates a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Disconnected,
    Connected,
    Initialized,
    Ready,
    Error,
}

// ── Feature modules ──

/// The fixed set of feature-module slots.
///
/// This is a flat registry of compiled-in collaborators, not a plugin
/// loader: each kind has exactly one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Video,
    Still,
    Audio,
    Storage,
    Control,
    Power,
    Input,
    Lens,
    Display,
    Wireless,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 10] = [
        ModuleKind::Video,
        ModuleKind::Still,
        ModuleKind::Audio,
        ModuleKind::Storage,
        ModuleKind::Control,
        ModuleKind::Power,
        ModuleKind::Input,
        ModuleKind::Lens,
        ModuleKind::Display,
        ModuleKind::Wireless,
    ];

    fn index(self) -> usize {
        match self {
            ModuleKind::Video => 0,
            ModuleKind::Still => 1,
            ModuleKind::Audio => 2,
            ModuleKind::Storage => 3,
            ModuleKind::Control => 4,
            ModuleKind::Power => 5,
            ModuleKind::Input => 6,
            ModuleKind::Lens => 7,
            ModuleKind::Display => 8,
            ModuleKind::Wireless => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Video => "video",
            ModuleKind::Still => "still",
            ModuleKind::Audio => "audio",
            ModuleKind::Storage => "storage",
            ModuleKind::Control => "control",
            ModuleKind::Power => "power",
            ModuleKind::Input => "input",
            ModuleKind::Lens => "lens",
            ModuleKind::Display => "display",
            ModuleKind::Wireless => "wireless",
        }
    }
}

/// Private state a feature module attaches to a device.
///
/// `as_any` lets the owning module downcast its own handle back to its
/// concrete type; the core never looks inside.
pub trait FeatureModule: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub type ModuleHandle = Arc<dyn FeatureModule>;

// ── Device record ──

/// Opaque device identity (the minor id assigned at allocation).
pub type DeviceId = u32;

#[derive(Default)]
struct StateFields {
    state: DeviceState,
    capabilities: u32,
    serial_number: Option<String>,
    firmware_version: Option<String>,
    modules: [Option<ModuleHandle>; 10],
    worker: Option<EventWorker>,
}

/// One attached camera.
pub struct Device {
    id: DeviceId,
    state: Mutex<StateFields>,
    ptp: Ptp,
}

impl Device {
    fn new(id: DeviceId) -> Self {
        Device {
            id,
            state: Mutex::new(StateFields::default()),
            ptp: Ptp::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateFields> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// The protocol engine for this device.
    pub fn ptp(&self) -> &Ptp {
        &self.ptp
    }

    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    /// Unconditional state write; writing the current state again succeeds.
    pub fn set_state(&self, new_state: DeviceState) {
        let mut fields = self.lock();
        let old = fields.state;
        fields.state = new_state;
        drop(fields);
        if old != new_state {
            log::debug!("device {} state {:?} -> {:?}", self.id, old, new_state);
        }
    }

    /// Mark the device usable. The manager never advances past
    /// `Initialized` on its own.
    pub fn set_ready(&self) {
        self.set_state(DeviceState::Ready);
    }

    pub fn capabilities(&self) -> u32 {
        self.lock().capabilities
    }

    pub fn set_capabilities(&self, caps: u32) {
        self.lock().capabilities = caps;
    }

    pub fn has_capability(&self, cap: u32) -> bool {
        self.capabilities() & cap != 0
    }

    pub fn serial_number(&self) -> Option<String> {
        self.lock().serial_number.clone()
    }

    pub fn firmware_version(&self) -> Option<String> {
        self.lock().firmware_version.clone()
    }

    pub fn set_identity(&self, serial: Option<String>, firmware: Option<String>) {
        let mut fields = self.lock();
        fields.serial_number = serial;
        fields.firmware_version = firmware;
    }

    /// Attach the transport and advance to `Connected`.
    pub fn attach_transport(&self, transport: Box<dyn Transport>) {
        self.ptp.attach_transport(transport);
        self.set_state(DeviceState::Connected);
    }

    /// Construct the event worker and advance to `Initialized`.
    ///
    /// On failure the worker is not left behind and the state is untouched
    /// (`Connected` in the normal flow), so the caller may retry or give up.
    pub fn initialize(
        &self,
        event_queue_capacity: usize,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<()> {
        log::info!("initializing device {}", self.id);

        let worker = EventWorker::spawn(event_queue_capacity, sink)
            .map_err(|e| DeviceError::Init(format!("event worker: {e}")))?;

        let mut fields = self.lock();
        fields.worker = Some(worker);
        fields.state = DeviceState::Initialized;
        drop(fields);

        log::info!("device {} initialized", self.id);
        Ok(())
    }

    /// Queue a device event for the worker. Dropped with a warning if the
    /// queue is full or the device was never initialized.
    pub fn notify_event(&self, code: u16, params: Vec<u32>) {
        let fields = self.lock();
        match &fields.worker {
            Some(worker) => {
                worker.notify(DeviceEvent::new(code, params));
            }
            None => log::debug!(
                "device {}: event 0x{code:04x} before initialization, ignored",
                self.id
            ),
        }
    }

    /// Attach a module handle. A later register for the same kind silently
    /// replaces the earlier handle.
    pub fn register(&self, kind: ModuleKind, handle: ModuleHandle) {
        let mut fields = self.lock();
        if fields.modules[kind.index()].is_some() {
            log::debug!("device {}: replacing {} module", self.id, kind.name());
        }
        fields.modules[kind.index()] = Some(handle);
        drop(fields);
        log::debug!("device {}: {} module registered", self.id, kind.name());
    }

    pub fn unregister(&self, kind: ModuleKind) {
        let removed = self.lock().modules[kind.index()].take();
        if removed.is_some() {
            log::debug!("device {}: {} module unregistered", self.id, kind.name());
        }
    }

    pub fn module(&self, kind: ModuleKind) -> Option<ModuleHandle> {
        self.lock().modules[kind.index()].clone()
    }

    fn unregister_all(&self) {
        let mut fields = self.lock();
        for slot in fields.modules.iter_mut() {
            *slot = None;
        }
    }

    /// Tear the device down: clear every module slot, best-effort close the
    /// session, stop the event worker (queued events are discarded), release
    /// the transport, and land in `Disconnected`.
    ///
    /// An in-flight exchange finishes naturally first — closing the session
    /// takes the protocol mutex like any other caller.
    pub fn teardown(&self) {
        log::info!("tearing down device {}", self.id);

        self.unregister_all();

        if self.ptp.session_open() {
            let _ = self.ptp.terminate_release_control();
            let _ = self.ptp.close_session();
        }

        // Take the worker out from under the lock before joining it, so a
        // sink that queries this device cannot deadlock against us.
        let worker = self.lock().worker.take();
        if let Some(worker) = worker {
            worker.shutdown();
        }

        self.ptp.release_transport();
        self.set_state(DeviceState::Disconnected);
    }
}

// ── Manager ──

/// Arena of live device records, keyed by the opaque device id.
///
/// Holds one reference per record; [`teardown`](Self::teardown) drops it,
/// and the record is destroyed once every feature module has dropped its
/// clone too.
pub struct DeviceManager {
    devices: Mutex<HashMap<DeviceId, Arc<Device>>>,
    next_id: AtomicU32,
    config: Config,
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        DeviceManager {
            devices: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
            config,
        }
    }

    fn devices(&self) -> MutexGuard<'_, HashMap<DeviceId, Arc<Device>>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a fresh record in `Disconnected` and hand back a reference.
    pub fn allocate(&self) -> Arc<Device> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let device = Arc::new(Device::new(id));
        device
            .ptp()
            .set_receive_capacity(self.config.receive_capacity);
        self.devices().insert(id, Arc::clone(&device));
        log::info!("device {id} allocated");
        device
    }

    /// Look up a record by id.
    pub fn get(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices().get(&id).cloned()
    }

    /// State of a device; unknown ids read as `Disconnected` rather than
    /// erroring.
    pub fn get_state(&self, id: DeviceId) -> DeviceState {
        self.get(id)
            .map(|dev| dev.state())
            .unwrap_or(DeviceState::Disconnected)
    }

    pub fn set_state(&self, id: DeviceId, state: DeviceState) -> Result<()> {
        let device = self.lookup(id)?;
        device.set_state(state);
        Ok(())
    }

    /// Attach a transport to a record and advance it to `Connected`.
    pub fn attach_transport(&self, id: DeviceId, transport: Box<dyn Transport>) -> Result<()> {
        let device = self.lookup(id)?;
        device.attach_transport(transport);
        Ok(())
    }

    /// Initialize a record with this manager's configured queue capacity.
    pub fn initialize(&self, id: DeviceId, sink: Option<Arc<dyn EventSink>>) -> Result<()> {
        let device = self.lookup(id)?;
        device.initialize(self.config.event_queue_capacity, sink)
    }

    pub fn register(&self, id: DeviceId, kind: ModuleKind, handle: ModuleHandle) -> Result<()> {
        let device = self.lookup(id)?;
        device.register(kind, handle);
        Ok(())
    }

    /// Clear a slot. Unknown ids are tolerated — unregister is a cleanup
    /// path and must always make progress.
    pub fn unregister(&self, id: DeviceId, kind: ModuleKind) {
        if let Some(device) = self.get(id) {
            device.unregister(kind);
        }
    }

    pub fn module(&self, id: DeviceId, kind: ModuleKind) -> Option<ModuleHandle> {
        self.get(id).and_then(|dev| dev.module(kind))
    }

    pub fn notify_event(&self, id: DeviceId, code: u16, params: Vec<u32>) {
        if let Some(device) = self.get(id) {
            device.notify_event(code, params);
        }
    }

    /// Tear a device down and drop the arena's reference. The record itself
    /// is destroyed once the last outstanding clone drops.
    pub fn teardown(&self, id: DeviceId) {
        let device = self.devices().remove(&id);
        if let Some(device) = device {
            device.teardown();
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices().len()
    }

    fn lookup(&self, id: DeviceId) -> Result<Arc<Device>> {
        self.get(id)
            .ok_or_else(|| DeviceError::InvalidArgument(format!("unknown device id {id}")))
    }
}

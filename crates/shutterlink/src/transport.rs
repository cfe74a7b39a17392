//! Transport layer — trait + USB bulk backend.
//!
//! The protocol engine never touches hardware; it talks to a [`Transport`],
//! which moves opaque byte buffers over a bulk pipe. The concrete backend on
//! Linux drives the camera's still-imaging interface through `nusb`. A mock
//! transport for tests lives in [`mock`].

use std::fmt;

use serde::Serialize;

// ── Error type ──

/// Transport-level failures.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the operation (e.g. `"bulk_out"`, `"claim interface"`).
#[derive(Debug, Clone)]
pub enum TransportError {
    /// No matching camera is attached.
    NotFound,
    /// The device was found but could not be opened or claimed.
    Open(String),
    /// The pipe is gone (detached device, released transport).
    Disconnected,
    /// A send on the bulk OUT pipe failed.
    Send(String),
    /// A receive on the bulk IN pipe failed.
    Receive(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotFound => write!(f, "camera not found"),
            TransportError::Open(e) => write!(f, "failed to open camera: {e}"),
            TransportError::Disconnected => write!(f, "transport disconnected"),
            TransportError::Send(e) => write!(f, "bulk send failed: {e}"),
            TransportError::Receive(e) => write!(f, "bulk receive failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

// ── Trait ──

/// A bulk command/data pipe to one camera.
///
/// Implementations are exclusively owned by one device record; the engine
/// serializes access, so no internal locking is required.
pub trait Transport: Send {
    /// Send one buffer on the bulk OUT pipe.
    fn bulk_send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive up to `max_len` bytes from the bulk IN pipe.
    fn bulk_receive(&mut self, max_len: usize) -> Result<Vec<u8>>;
}

// ── Enumeration ──

/// A discovered camera (not yet opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredCamera {
    /// Bus path, e.g. `usb:001/004 [04a9:32f4]`.
    pub path: String,
    /// USB serial number, if the descriptor carries one.
    pub serial: Option<String>,
    /// Product string, if available.
    pub product: Option<String>,
}

/// Enumerate attached cameras without opening them.
///
/// Returns an empty list on unsupported platforms.
pub fn discover() -> Vec<DiscoveredCamera> {
    #[cfg(target_os = "linux")]
    {
        usb_impl::discover_linux()
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

/// Open the first attached camera.
pub fn open() -> Result<Box<dyn Transport>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(usb_impl::UsbTransport::open()?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(TransportError::NotFound)
    }
}

/// Open the camera with the given serial number.
///
/// An empty `serial` auto-selects the first camera, as [`open`] does.
pub fn open_by_serial(serial: &str) -> Result<Box<dyn Transport>> {
    let serial = serial.trim();
    if serial.is_empty() {
        return open();
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(usb_impl::UsbTransport::open_by_serial(serial)?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(TransportError::NotFound)
    }
}

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod usb_impl {
    use super::*;
    use futures_lite::future::block_on;
    use nusb::transfer::RequestBuffer;

    use crate::protocol::{CANON_USB_VID, EP_BULK_IN, EP_BULK_OUT, USB_CLASS_IMAGE};

    pub struct UsbTransport {
        interface: nusb::Interface,
        path: String,
    }

    pub(super) fn discover_linux() -> Vec<DiscoveredCamera> {
        let Ok(devices) = nusb::list_devices() else {
            return Vec::new();
        };

        devices
            .filter(|dev| dev.vendor_id() == CANON_USB_VID)
            .filter(|dev| {
                dev.interfaces()
                    .any(|iface| iface.class() == USB_CLASS_IMAGE)
            })
            .map(|dev| DiscoveredCamera {
                path: format!(
                    "usb:{:03}/{:03} [{:04x}:{:04x}]",
                    dev.bus_number(),
                    dev.device_address(),
                    dev.vendor_id(),
                    dev.product_id(),
                ),
                serial: dev.serial_number().map(|s| s.to_string()),
                product: dev.product_string().map(|s| s.to_string()),
            })
            .collect()
    }

    impl UsbTransport {
        pub fn open() -> Result<Self> {
            Self::open_matching(|_| true)
        }

        pub fn open_by_serial(serial: &str) -> Result<Self> {
            Self::open_matching(|dev| {
                dev.serial_number()
                    .is_some_and(|s| s.eq_ignore_ascii_case(serial))
            })
        }

        fn open_matching(matches: impl Fn(&nusb::DeviceInfo) -> bool) -> Result<Self> {
            let device_info = nusb::list_devices()
                .map_err(|e| TransportError::Open(format!("USB enumeration: {e}")))?
                .filter(|dev| dev.vendor_id() == CANON_USB_VID)
                .find(|dev| matches(dev))
                .ok_or(TransportError::NotFound)?;

            let path = format!(
                "usb:{:03}/{:03}",
                device_info.bus_number(),
                device_info.device_address()
            );

            let iface_num = device_info
                .interfaces()
                .find(|iface| iface.class() == USB_CLASS_IMAGE)
                .map(|iface| iface.interface_number())
                .ok_or_else(|| TransportError::Open("no still-imaging interface".into()))?;

            let usb_device = device_info
                .open()
                .map_err(|e| TransportError::Open(format!("USB open: {e}")))?;

            // nusb auto-detaches any kernel driver on claim
            let interface = usb_device
                .claim_interface(iface_num)
                .map_err(|e| TransportError::Open(format!("claim interface {iface_num}: {e}")))?;

            log::info!("opened camera transport at {path}");

            Ok(UsbTransport { interface, path })
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Transport for UsbTransport {
        fn bulk_send(&mut self, data: &[u8]) -> Result<()> {
            let completion = block_on(self.interface.bulk_out(EP_BULK_OUT, data.to_vec()));
            completion
                .into_result()
                .map_err(|e| TransportError::Send(format!("bulk_out: {e}")))?;
            Ok(())
        }

        fn bulk_receive(&mut self, max_len: usize) -> Result<Vec<u8>> {
            let completion =
                block_on(self.interface.bulk_in(EP_BULK_IN, RequestBuffer::new(max_len)));
            completion
                .into_result()
                .map_err(|e| TransportError::Receive(format!("bulk_in: {e}")))
        }
    }
}

#[cfg(target_os = "linux")]
pub use usb_impl::UsbTransport;

// ── Mock transport for testing ──

/// In-memory transport for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::protocol::RC_OK;
    use crate::ptp::container::{self, ContainerKind};

    /// One scripted reply for [`MockTransport::bulk_receive`].
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Respond with this code, echoing the last command's transaction id.
        Code(u16),
        /// Respond with this code and an inline payload.
        CodeWithPayload(u16, Vec<u8>),
        /// Feed these bytes back verbatim.
        Raw(Vec<u8>),
        /// Fail the receive with this error.
        Error(TransportError),
    }

    #[derive(Default)]
    struct MockState {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<MockReply>,
        last_transaction_id: u32,
        send_error: Option<TransportError>,
    }

    /// Scripted transport backed by shared state.
    ///
    /// Cloning yields a handle onto the same state, so a test can keep one
    /// clone for inspection after handing the other to a device. With no
    /// scripted replies queued, every receive answers `RC_OK` echoing the
    /// transaction id of the last command sent.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a reply with the given response code.
        pub fn queue_response(&self, code: u16) {
            self.lock().replies.push_back(MockReply::Code(code));
        }

        /// Queue a reply carrying a payload.
        pub fn queue_response_with_payload(&self, code: u16, payload: Vec<u8>) {
            self.lock()
                .replies
                .push_back(MockReply::CodeWithPayload(code, payload));
        }

        /// Queue raw bytes to be returned verbatim.
        pub fn queue_raw(&self, bytes: Vec<u8>) {
            self.lock().replies.push_back(MockReply::Raw(bytes));
        }

        /// Queue a receive failure.
        pub fn queue_error(&self, err: TransportError) {
            self.lock().replies.push_back(MockReply::Error(err));
        }

        /// Make every subsequent send fail with this error.
        pub fn fail_sends(&self, err: TransportError) {
            self.lock().send_error = Some(err);
        }

        /// Every buffer handed to `bulk_send`, in order.
        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.lock().sent.clone()
        }

        /// Number of buffers sent so far.
        pub fn sent_count(&self) -> usize {
            self.lock().sent.len()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.inner.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    impl Transport for MockTransport {
        fn bulk_send(&mut self, data: &[u8]) -> Result<()> {
            let mut state = self.lock();
            if let Some(err) = state.send_error.clone() {
                return Err(err);
            }
            // Track the transaction id of command frames so default replies
            // can echo it.
            if let Ok(frame) = container::decode(data)
                && frame.kind == ContainerKind::Command
            {
                state.last_transaction_id = frame.transaction_id;
            }
            state.sent.push(data.to_vec());
            Ok(())
        }

        fn bulk_receive(&mut self, _max_len: usize) -> Result<Vec<u8>> {
            let mut state = self.lock();
            let tid = state.last_transaction_id;
            match state.replies.pop_front() {
                None => Ok(container::encode(ContainerKind::Response, RC_OK, tid, &[])),
                Some(MockReply::Code(code)) => {
                    Ok(container::encode(ContainerKind::Response, code, tid, &[]))
                }
                Some(MockReply::CodeWithPayload(code, payload)) => Ok(
                    container::encode_with_payload(ContainerKind::Response, code, tid, &payload),
                ),
                Some(MockReply::Raw(bytes)) => Ok(bytes),
                Some(MockReply::Error(err)) => Err(err),
            }
        }
    }
}

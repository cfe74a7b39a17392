//! PTP transaction engine.
//!
//! One [`Ptp`] instance owns the session sub-record and the transport for a
//! single camera. [`Ptp::execute`] drives one command → (optional data) →
//! response exchange under the protocol mutex, so at most one transaction is
//! ever in flight per device — the wire protocol allows no more. Higher
//! level operations (capture, focus, live view, properties, storage) are
//! thin wrappers in [`ops`].

pub mod container;
mod ops;

pub use ops::{AutofocusStatus, BatteryInfo, ImageQuality, LiveviewHeader, PtpDeviceInfo};

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::protocol::{OP_CLOSE_SESSION, OP_OPEN_SESSION, RC_OK};
use crate::transport::{Transport, TransportError};
use self::container::{ContainerKind, CONTAINER_SIZE, HEADER_SIZE};

/// Default cap on inbound payload bytes per exchange.
///
/// Large enough for a live-view frame; callers with bigger transfers raise
/// it via [`Ptp::set_receive_capacity`].
pub const DEFAULT_RECEIVE_CAPACITY: usize = 64 * 1024;

// ── Error type ──

/// Protocol-level failures.
#[derive(Debug)]
pub enum ProtocolError {
    /// Bad caller-supplied value, detected before any transport I/O.
    InvalidArgument(String),
    /// A command other than OpenSession was issued with no session open.
    SessionNotOpen,
    /// The transport failed; never retried here — retry policy belongs to
    /// the caller because some operations are not idempotent.
    Transport(TransportError),
    /// Fewer bytes than a container header on decode.
    FrameTooShort { len: usize },
    /// The response was shorter than a container header.
    ShortResponse { len: usize },
    /// The inbound frame was not of the expected kind.
    UnexpectedFrameType(u16),
    /// The response answered a different transaction.
    TransactionMismatch { expected: u32, got: u32 },
    /// A well-formed response carrying a non-success code.
    DeviceRejected(u16),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ProtocolError::SessionNotOpen => write!(f, "session not open"),
            ProtocolError::Transport(e) => write!(f, "{e}"),
            ProtocolError::FrameTooShort { len } => {
                write!(f, "frame too short: {len} bytes")
            }
            ProtocolError::ShortResponse { len } => {
                write!(f, "response too short: {len} bytes")
            }
            ProtocolError::UnexpectedFrameType(kind) => {
                write!(f, "unexpected frame type: 0x{kind:04x}")
            }
            ProtocolError::TransactionMismatch { expected, got } => {
                write!(
                    f,
                    "transaction id mismatch: expected {expected}, got {got}"
                )
            }
            ProtocolError::DeviceRejected(code) => {
                write!(f, "device rejected command: 0x{code:04x}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ProtocolError {
    fn from(e: TransportError) -> Self {
        ProtocolError::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

// ── Response ──

/// Outcome of one successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpResponse {
    /// Response code (always [`RC_OK`] on the success path).
    pub code: u16,
    /// Response parameters, in wire order.
    pub params: Vec<u32>,
    /// Inbound payload bytes, if the response carried any.
    pub payload: Vec<u8>,
}

// ── Engine ──

struct PtpInner {
    transport: Option<Box<dyn Transport>>,
    session_id: u32,
    next_transaction_id: u32,
    session_open: bool,
    receive_capacity: usize,
}

/// Session state and transaction serialization for one camera.
///
/// All fields live behind one mutex — the protocol mutex — held for the
/// duration of a full exchange including the transport round-trip. Session
/// queries take the same mutex briefly; connection-state queries live on the
/// device record under a separate lock and never wait on an exchange.
pub struct Ptp {
    inner: Mutex<PtpInner>,
}

impl Default for Ptp {
    fn default() -> Self {
        Self::new()
    }
}

impl Ptp {
    pub fn new() -> Self {
        Ptp {
            inner: Mutex::new(PtpInner {
                transport: None,
                session_id: 0,
                next_transaction_id: 1,
                session_open: false,
                receive_capacity: DEFAULT_RECEIVE_CAPACITY,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PtpInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach the transport for this camera, replacing any previous one.
    pub fn attach_transport(&self, transport: Box<dyn Transport>) {
        self.lock().transport = Some(transport);
    }

    /// Drop the transport. Waits for any in-flight exchange to finish —
    /// there is no mid-transaction cancellation.
    pub fn release_transport(&self) -> Option<Box<dyn Transport>> {
        self.lock().transport.take()
    }

    pub fn has_transport(&self) -> bool {
        self.lock().transport.is_some()
    }

    /// Cap on inbound payload bytes accepted per exchange.
    pub fn set_receive_capacity(&self, capacity: usize) {
        self.lock().receive_capacity = capacity;
    }

    pub fn session_open(&self) -> bool {
        self.lock().session_open
    }

    pub fn session_id(&self) -> u32 {
        self.lock().session_id
    }

    #[cfg(test)]
    pub(crate) fn set_next_transaction_id(&self, id: u32) {
        self.lock().next_transaction_id = id;
    }

    /// Drive one command → (optional data) → response exchange.
    ///
    /// Serialized on the protocol mutex; the transaction id is allocated
    /// under the same lock, so ids are strictly increasing (wrapping at
    /// 2^32 — wrap-around collisions are accepted as-is). A response code
    /// other than [`RC_OK`] comes back as
    /// [`ProtocolError::DeviceRejected`] carrying the code, so callers can
    /// branch on specific values.
    pub fn execute(
        &self,
        opcode: u16,
        params: &[u32],
        data: Option<&[u8]>,
    ) -> Result<PtpResponse> {
        let mut inner = self.lock();

        if !inner.session_open && opcode != OP_OPEN_SESSION {
            log::warn!("session not open for command 0x{opcode:04x}");
            return Err(ProtocolError::SessionNotOpen);
        }

        let transaction_id = inner.next_transaction_id;
        inner.next_transaction_id = inner.next_transaction_id.wrapping_add(1);

        let receive_max = CONTAINER_SIZE + inner.receive_capacity;
        let transport = inner
            .transport
            .as_mut()
            .ok_or(ProtocolError::Transport(TransportError::Disconnected))?;

        let cmd = container::encode(ContainerKind::Command, opcode, transaction_id, params);
        transport.bulk_send(&cmd)?;
        log::debug!("sent command 0x{opcode:04x} (transaction {transaction_id})");

        if let Some(payload) = data
            && !payload.is_empty()
        {
            let header = container::encode_data_header(opcode, transaction_id, payload.len());
            transport.bulk_send(&header)?;
            transport.bulk_send(payload)?;
            log::debug!("sent data phase ({} bytes)", payload.len());
        }

        let raw = transport.bulk_receive(receive_max)?;

        if raw.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortResponse { len: raw.len() });
        }

        let frame = container::decode(&raw)?;

        if frame.kind != ContainerKind::Response {
            return Err(ProtocolError::UnexpectedFrameType(frame.kind as u16));
        }

        if frame.transaction_id != transaction_id {
            return Err(ProtocolError::TransactionMismatch {
                expected: transaction_id,
                got: frame.transaction_id,
            });
        }

        log::debug!(
            "received response 0x{:04x} for command 0x{opcode:04x}",
            frame.code
        );

        if frame.code != RC_OK {
            return Err(ProtocolError::DeviceRejected(frame.code));
        }

        Ok(PtpResponse {
            code: frame.code,
            params: frame.params,
            payload: frame.payload,
        })
    }

    /// Open a session. Proposes session id 1; if the device's response
    /// carries a different non-zero id in params\[0\], that one is stored.
    pub fn open_session(&self) -> Result<()> {
        log::info!("opening session");

        let proposed = 1u32;
        let resp = self.execute(OP_OPEN_SESSION, &[proposed], None)?;

        let granted = resp
            .params
            .first()
            .copied()
            .filter(|&id| id != 0)
            .unwrap_or(proposed);

        let mut inner = self.lock();
        inner.session_id = granted;
        inner.session_open = true;
        drop(inner);

        log::info!("session opened (id {granted})");
        Ok(())
    }

    /// Close the session.
    ///
    /// The session is marked closed even when the exchange fails: a session
    /// the local side believes closed must never be reused. Always succeeds.
    pub fn close_session(&self) -> Result<()> {
        if !self.lock().session_open {
            return Ok(());
        }

        log::info!("closing session");
        let result = self.execute(OP_CLOSE_SESSION, &[], None);

        let mut inner = self.lock();
        inner.session_open = false;
        inner.session_id = 0;
        drop(inner);

        match result {
            Ok(_) => log::info!("session closed"),
            Err(e) => log::warn!("failed to close session cleanly: {e}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        OP_CAPTURE, OP_GET_DEVICE_INFO, RC_DEVICE_BUSY, RC_GENERAL_ERROR, RC_OK,
    };
    use crate::transport::mock::MockTransport;

    fn open_ptp() -> (Ptp, MockTransport) {
        let mock = MockTransport::new();
        let ptp = Ptp::new();
        ptp.attach_transport(Box::new(mock.clone()));
        ptp.open_session().unwrap();
        (ptp, mock)
    }

    #[test]
    fn execute_before_open_session_fails() {
        let mock = MockTransport::new();
        let ptp = Ptp::new();
        ptp.attach_transport(Box::new(mock.clone()));

        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(err, ProtocolError::SessionNotOpen));
        // Rejected before any transport I/O
        assert_eq!(mock.sent_count(), 0);
    }

    #[test]
    fn execute_without_transport_fails() {
        let ptp = Ptp::new();
        let err = ptp.execute(crate::protocol::OP_OPEN_SESSION, &[1], None).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Transport(TransportError::Disconnected)
        ));
    }

    #[test]
    fn open_session_flips_state_and_stores_id() {
        let mock = MockTransport::new();
        let ptp = Ptp::new();
        ptp.attach_transport(Box::new(mock.clone()));

        assert!(!ptp.session_open());
        ptp.open_session().unwrap();
        assert!(ptp.session_open());
        assert_eq!(ptp.session_id(), 1);
    }

    #[test]
    fn open_session_prefers_device_granted_id() {
        let mock = MockTransport::new();
        let ptp = Ptp::new();
        ptp.attach_transport(Box::new(mock.clone()));

        // Device answers with a different session id in params[0]
        let raw = container::encode(ContainerKind::Response, RC_OK, 1, &[7]);
        mock.queue_raw(raw);
        ptp.open_session().unwrap();
        assert_eq!(ptp.session_id(), 7);
    }

    #[test]
    fn transaction_ids_increase() {
        let (ptp, mock) = open_ptp();
        for _ in 0..5 {
            ptp.execute(OP_GET_DEVICE_INFO, &[], None).unwrap();
        }

        let tids: Vec<u32> = mock
            .sent()
            .iter()
            .filter_map(|buf| container::decode(buf).ok())
            .filter(|f| f.kind == ContainerKind::Command)
            .map(|f| f.transaction_id)
            .collect();
        assert_eq!(tids.len(), 6); // open session + 5 commands
        for pair in tids.windows(2) {
            assert_eq!(pair[1], pair[0] + 1, "ids must be consecutive");
        }
    }

    #[test]
    fn transaction_id_wraps_at_u32_max() {
        let (ptp, mock) = open_ptp();
        ptp.set_next_transaction_id(u32::MAX);

        ptp.execute(OP_GET_DEVICE_INFO, &[], None).unwrap();
        ptp.execute(OP_GET_DEVICE_INFO, &[], None).unwrap();

        let tids: Vec<u32> = mock
            .sent()
            .iter()
            .filter_map(|buf| container::decode(buf).ok())
            .map(|f| f.transaction_id)
            .collect();
        assert_eq!(&tids[tids.len() - 2..], &[u32::MAX, 0]);
    }

    #[test]
    fn mismatched_transaction_id_rejected() {
        let (ptp, mock) = open_ptp();
        // Session opened with transaction 1; next command uses 2 but the
        // device echoes 99.
        mock.queue_raw(container::encode(ContainerKind::Response, RC_OK, 99, &[]));

        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TransactionMismatch {
                expected: 2,
                got: 99
            }
        ));
    }

    #[test]
    fn short_response_rejected() {
        let (ptp, mock) = open_ptp();
        mock.queue_raw(vec![0u8; 8]);

        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortResponse { len: 8 }));
    }

    #[test]
    fn non_response_frame_rejected() {
        let (ptp, mock) = open_ptp();
        mock.queue_raw(container::encode(ContainerKind::Event, RC_OK, 2, &[]));

        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedFrameType(4)));
    }

    #[test]
    fn rejected_code_carried_in_error() {
        let (ptp, mock) = open_ptp();
        mock.queue_response(RC_DEVICE_BUSY);

        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(err, ProtocolError::DeviceRejected(c) if c == RC_DEVICE_BUSY));
    }

    #[test]
    fn transport_send_failure_propagates_verbatim() {
        let (ptp, mock) = open_ptp();
        mock.fail_sends(TransportError::Disconnected);

        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Transport(TransportError::Disconnected)
        ));
    }

    #[test]
    fn data_phase_sends_header_then_payload() {
        let (ptp, mock) = open_ptp();
        let payload = vec![0xAB; 10];
        ptp.execute(OP_CAPTURE, &[], Some(&payload)).unwrap();

        let sent = mock.sent();
        // open-session command, capture command, data header, raw payload
        assert_eq!(sent.len(), 4);
        let header = container::decode(&sent[2]).unwrap();
        assert_eq!(header.kind, ContainerKind::Data);
        assert_eq!(header.code, OP_CAPTURE);
        assert_eq!(header.length as usize, CONTAINER_SIZE + payload.len());
        assert_eq!(sent[3], payload);
    }

    #[test]
    fn empty_data_skips_data_phase() {
        let (ptp, mock) = open_ptp();
        ptp.execute(OP_CAPTURE, &[], Some(&[])).unwrap();
        // open-session command + capture command only
        assert_eq!(mock.sent_count(), 2);
    }

    #[test]
    fn close_session_flips_closed_even_on_transport_error() {
        let (ptp, mock) = open_ptp();
        mock.fail_sends(TransportError::Disconnected);

        ptp.close_session().unwrap();
        assert!(!ptp.session_open());
        assert_eq!(ptp.session_id(), 0);

        // A closed session must never be reused
        let err = ptp.execute(OP_CAPTURE, &[], None).unwrap_err();
        assert!(matches!(err, ProtocolError::SessionNotOpen));
    }

    #[test]
    fn close_session_when_closed_is_a_no_op() {
        let mock = MockTransport::new();
        let ptp = Ptp::new();
        ptp.attach_transport(Box::new(mock.clone()));

        ptp.close_session().unwrap();
        assert_eq!(mock.sent_count(), 0);
    }

    #[test]
    fn rejection_does_not_reopen_session_gate() {
        let (ptp, mock) = open_ptp();
        mock.queue_response(RC_GENERAL_ERROR);
        assert!(ptp.execute(OP_CAPTURE, &[], None).is_err());
        // Session stays open after a device rejection
        assert!(ptp.session_open());
        ptp.execute(OP_CAPTURE, &[], None).unwrap();
    }

    #[test]
    fn error_display_formats() {
        assert_eq!(
            ProtocolError::SessionNotOpen.to_string(),
            "session not open"
        );
        assert_eq!(
            ProtocolError::DeviceRejected(0x2019).to_string(),
            "device rejected command: 0x2019"
        );
        assert_eq!(
            ProtocolError::TransactionMismatch {
                expected: 3,
                got: 9
            }
            .to_string(),
            "transaction id mismatch: expected 3, got 9"
        );
    }

    #[test]
    fn transport_error_source_chained() {
        let err = ProtocolError::Transport(TransportError::Disconnected);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "transport disconnected");
    }
}

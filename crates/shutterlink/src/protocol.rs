//! PTP protocol constants for Canon R-series bodies.
//!
//! Operation codes in the `0x1xxx` range are standard PTP (ISO 15740);
//! `0x9xxx` codes are Canon vendor extensions observed on the R5. Response
//! codes in `0x2xxx` are standard, `0xAxxx` Canon-specific. Event codes in
//! `0x4xxx` are standard, `0xC1xx` Canon-specific.

// ── USB identifiers ──

/// Canon vendor ID.
pub const CANON_USB_VID: u16 = 0x04A9;

/// Interrupt IN endpoint (device events).
pub const EP_INT_IN: u8 = 0x81;

/// Bulk IN endpoint (data and response phases).
pub const EP_BULK_IN: u8 = 0x82;

/// Bulk OUT endpoint (command and data phases).
pub const EP_BULK_OUT: u8 = 0x03;

/// USB still-imaging interface class (PTP).
pub const USB_CLASS_IMAGE: u8 = 0x06;

// ── Standard PTP operation codes ──

pub const OP_GET_DEVICE_INFO: u16 = 0x1001;
pub const OP_OPEN_SESSION: u16 = 0x1002;
pub const OP_CLOSE_SESSION: u16 = 0x1003;
pub const OP_GET_STORAGE_IDS: u16 = 0x1004;
pub const OP_GET_STORAGE_INFO: u16 = 0x1005;
pub const OP_GET_NUM_OBJECTS: u16 = 0x1006;
pub const OP_GET_OBJECT_HANDLES: u16 = 0x1007;
pub const OP_GET_OBJECT_INFO: u16 = 0x1008;
pub const OP_GET_OBJECT: u16 = 0x1009;
pub const OP_DELETE_OBJECT: u16 = 0x100A;
pub const OP_INITIATE_CAPTURE: u16 = 0x100E;
pub const OP_GET_DEVICE_PROP_DESC: u16 = 0x1014;
pub const OP_GET_DEVICE_PROP_VALUE: u16 = 0x1015;
pub const OP_SET_DEVICE_PROP_VALUE: u16 = 0x1016;

// ── Canon vendor operation codes ──

/// Read a byte range out of a stored object.
pub const OP_GET_PARTIAL_OBJECT: u16 = 0x9107;

/// Write a device property; the value travels in the data phase.
pub const OP_SET_PROPERTY: u16 = 0x9110;

/// Single-frame shutter release.
pub const OP_CAPTURE: u16 = 0x9116;

/// Read a device property; the value comes back in the response payload.
pub const OP_GET_PROPERTY: u16 = 0x9127;

/// Must be issued before any capture/focus command is accepted.
pub const OP_INITIATE_RELEASE_CONTROL: u16 = 0x9128;
pub const OP_TERMINATE_RELEASE_CONTROL: u16 = 0x9129;

pub const OP_LIVEVIEW_START: u16 = 0x9153;
pub const OP_LIVEVIEW_STOP: u16 = 0x9154;

/// Fetch one live-view frame (payload carries header + JPEG data).
pub const OP_GET_LIVEVIEW: u16 = 0x9155;

pub const OP_LIVEVIEW_LOCK: u16 = 0x9156;
pub const OP_LIVEVIEW_UNLOCK: u16 = 0x9157;

pub const OP_SET_IMAGE_QUALITY: u16 = 0x9158;
pub const OP_GET_IMAGE_QUALITY: u16 = 0x9159;

/// Open the shutter for a bulb exposure; paired with [`OP_BULB_END`].
pub const OP_BULB_START: u16 = 0x915A;
pub const OP_BULB_END: u16 = 0x915B;

pub const OP_AUTOFOCUS: u16 = 0x915C;

/// Drive the focus motor to an absolute position (params\[0\]).
pub const OP_MANUAL_FOCUS: u16 = 0x915D;

pub const OP_MOVIE_START: u16 = 0x915E;
pub const OP_MOVIE_STOP: u16 = 0x915F;

/// Burst capture; params\[0\] carries the frame count (1..=999).
pub const OP_CAPTURE_BURST: u16 = 0x9160;

pub const OP_GET_BATTERY: u16 = 0x9162;

// ── Response codes ──

/// The canonical success code.
pub const RC_OK: u16 = 0x2001;
pub const RC_GENERAL_ERROR: u16 = 0x2002;
pub const RC_SESSION_NOT_OPEN: u16 = 0x2003;
pub const RC_INVALID_TRANSACTION_ID: u16 = 0x2004;
pub const RC_OPERATION_NOT_SUPPORTED: u16 = 0x2005;
pub const RC_PARAMETER_NOT_SUPPORTED: u16 = 0x2006;
pub const RC_INCOMPLETE_TRANSFER: u16 = 0x2007;
pub const RC_INVALID_STORAGE_ID: u16 = 0x2008;
pub const RC_INVALID_OBJECT_HANDLE: u16 = 0x2009;
pub const RC_STORAGE_FULL: u16 = 0x200C;
pub const RC_ACCESS_DENIED: u16 = 0x200F;
pub const RC_CAPTURE_ALREADY_ACTIVE: u16 = 0x2018;

/// The device cannot service the command right now. Autofocus treats this
/// as a retryable outcome rather than a failure.
pub const RC_DEVICE_BUSY: u16 = 0x2019;

pub const RC_INVALID_PARAMETER: u16 = 0x201D;
pub const RC_SESSION_ALREADY_OPEN: u16 = 0x201E;
pub const RC_TRANSACTION_CANCELLED: u16 = 0x201F;

// ── Canon response codes ──

pub const RC_CANON_UNKNOWN_COMMAND: u16 = 0xA001;
pub const RC_CANON_OPERATION_REFUSED: u16 = 0xA005;
pub const RC_CANON_LENS_COVER_CLOSED: u16 = 0xA006;
pub const RC_CANON_LOW_BATTERY: u16 = 0xA101;
pub const RC_CANON_OBJECT_NOT_READY: u16 = 0xA102;
pub const RC_CANON_MEMORY_NOT_READY: u16 = 0xA105;
pub const RC_CANON_DEVICE_BUSY: u16 = 0xA108;

// ── Event codes ──

pub const EC_CANCEL_TRANSACTION: u16 = 0x4001;
pub const EC_OBJECT_ADDED: u16 = 0x4002;
pub const EC_OBJECT_REMOVED: u16 = 0x4003;
pub const EC_STORE_ADDED: u16 = 0x4004;
pub const EC_STORE_REMOVED: u16 = 0x4005;
pub const EC_DEVICE_PROP_CHANGED: u16 = 0x4006;
pub const EC_STORE_FULL: u16 = 0x400A;
pub const EC_DEVICE_RESET: u16 = 0x400B;
pub const EC_CAPTURE_COMPLETE: u16 = 0x400D;

// ── Canon event codes ──

pub const EC_CANON_OBJECT_CREATED: u16 = 0xC181;
pub const EC_CANON_OBJECT_REMOVED: u16 = 0xC182;
pub const EC_CANON_REQUEST_OBJECT_TRANSFER: u16 = 0xC183;
pub const EC_CANON_SHUTDOWN: u16 = 0xC184;
pub const EC_CANON_CAPTURE_COMPLETE: u16 = 0xC186;
pub const EC_CANON_STATUS_CHANGED: u16 = 0xC187;
pub const EC_CANON_WILL_SHUTDOWN: u16 = 0xC188;
pub const EC_CANON_SHUTTER_DOWN: u16 = 0xC189;
pub const EC_CANON_SHUTTER_UP: u16 = 0xC18A;
pub const EC_CANON_BULB_EXPOSURE_TIME: u16 = 0xC18B;

// ── Device property codes ──

pub const DPC_BATTERY_LEVEL: u16 = 0x5001;
pub const DPC_IMAGE_SIZE: u16 = 0x5003;
pub const DPC_WHITE_BALANCE: u16 = 0x5005;
pub const DPC_F_NUMBER: u16 = 0x5007;
pub const DPC_FOCUS_MODE: u16 = 0x500A;
pub const DPC_EXPOSURE_TIME: u16 = 0x500D;
pub const DPC_EXPOSURE_INDEX: u16 = 0x500F;
pub const DPC_CAPTURE_DELAY: u16 = 0x5012;

pub const DPC_CANON_BEEP: u16 = 0xD001;
pub const DPC_CANON_BATTERY_STATUS: u16 = 0xD004;
pub const DPC_CANON_CAMERA_MODE: u16 = 0xD006;
pub const DPC_CANON_IMAGE_QUALITY: u16 = 0xD007;
pub const DPC_CANON_DRIVE_MODE: u16 = 0xD00F;

// ── Burst limits ──

/// Smallest accepted burst count.
pub const BURST_COUNT_MIN: u32 = 1;

/// Largest accepted burst count.
pub const BURST_COUNT_MAX: u32 = 999;

/// True for response codes that indicate a transient busy condition.
pub fn is_busy_code(code: u16) -> bool {
    code == RC_DEVICE_BUSY || code == RC_CANON_DEVICE_BUSY
}

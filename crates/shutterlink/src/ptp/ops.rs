//! High-level camera operations.
//!
//! Each operation is a thin wrapper around [`Ptp::execute`] supplying a
//! fixed opcode and interpreting the response against its own success set.
//! Stop/terminate operations are best-effort: they log and succeed even when
//! the device or transport misbehaves, so teardown always makes progress.

use serde::Serialize;

use super::{ProtocolError, Ptp, Result};
use crate::protocol::*;

/// Outcome of an autofocus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofocusStatus {
    /// Focus achieved.
    Focused,
    /// The device reported busy; the caller may retry.
    Busy,
}

/// Basic device identification, parsed from a GetDeviceInfo response.
#[derive(Debug, Clone, Serialize)]
pub struct PtpDeviceInfo {
    pub standard_version: u16,
    pub vendor_extension_id: u32,
    /// Raw dataset for callers that parse further fields.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Still image quality triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageQuality {
    pub format: u32,
    pub size: u32,
    pub quality: u32,
}

/// Battery charge and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryInfo {
    /// Charge level in percent.
    pub level: u32,
    pub status: u32,
}

/// Header preceding the JPEG data in a live-view frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveviewHeader {
    pub length: u32,
    pub frame_type: u32,
    pub width: u32,
    pub height: u32,
    pub data_offset: u32,
    pub timestamp: u32,
}

impl LiveviewHeader {
    /// Size of the encoded header (six `u32` fields + 8 reserved bytes).
    pub const SIZE: usize = 32;

    /// Parse the header from the front of a live-view payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::SIZE {
            return None;
        }
        let word = |i: usize| {
            u32::from_le_bytes(payload[i * 4..i * 4 + 4].try_into().unwrap_or_default())
        };
        Some(LiveviewHeader {
            length: word(0),
            frame_type: word(1),
            width: word(2),
            height: word(3),
            data_offset: word(4),
            timestamp: word(5),
        })
    }
}

/// Parse a count-prefixed PTP `u32` array, tolerating truncation.
fn parse_u32_array(payload: &[u8]) -> Vec<u32> {
    if payload.len() < 4 {
        return Vec::new();
    }
    let declared = u32::from_le_bytes(payload[0..4].try_into().unwrap_or_default()) as usize;
    let available = (payload.len() - 4) / 4;
    let count = declared.min(available);
    (0..count)
        .map(|i| {
            let off = 4 + i * 4;
            u32::from_le_bytes(payload[off..off + 4].try_into().unwrap_or_default())
        })
        .collect()
}

impl Ptp {
    /// Fetch and partially parse the device info dataset.
    pub fn device_info(&self) -> Result<PtpDeviceInfo> {
        let resp = self.execute(OP_GET_DEVICE_INFO, &[], None)?;
        let standard_version = if resp.payload.len() >= 2 {
            u16::from_le_bytes([resp.payload[0], resp.payload[1]])
        } else {
            0x0100
        };
        let vendor_extension_id = if resp.payload.len() >= 6 {
            u32::from_le_bytes(resp.payload[2..6].try_into().unwrap_or_default())
        } else {
            u32::from(CANON_USB_VID)
        };
        Ok(PtpDeviceInfo {
            standard_version,
            vendor_extension_id,
            raw: resp.payload,
        })
    }

    /// Take remote control of the shutter. Required before capture and
    /// focus commands are accepted.
    pub fn initiate_release_control(&self) -> Result<()> {
        log::info!("initiating release control");
        self.execute(OP_INITIATE_RELEASE_CONTROL, &[], None)?;
        Ok(())
    }

    /// Give remote control back. Best-effort.
    pub fn terminate_release_control(&self) -> Result<()> {
        if let Err(e) = self.execute(OP_TERMINATE_RELEASE_CONTROL, &[], None) {
            log::warn!("failed to terminate release control: {e}");
        }
        Ok(())
    }

    /// Release the shutter for a single frame.
    pub fn capture(&self) -> Result<()> {
        log::info!("capturing image");
        self.execute(OP_CAPTURE, &[], None)?;
        Ok(())
    }

    /// Start a burst of `count` frames (1..=999).
    pub fn capture_burst(&self, count: u32) -> Result<()> {
        if !(BURST_COUNT_MIN..=BURST_COUNT_MAX).contains(&count) {
            return Err(ProtocolError::InvalidArgument(format!(
                "burst count {count} out of range {BURST_COUNT_MIN}..={BURST_COUNT_MAX}"
            )));
        }
        log::info!("starting burst capture of {count} images");
        self.execute(OP_CAPTURE_BURST, &[count], None)?;
        Ok(())
    }

    /// Run autofocus. A device-busy response is a retryable outcome, not a
    /// failure; any other rejection is.
    pub fn autofocus(&self) -> Result<AutofocusStatus> {
        match self.execute(OP_AUTOFOCUS, &[], None) {
            Ok(_) => Ok(AutofocusStatus::Focused),
            Err(ProtocolError::DeviceRejected(code)) if is_busy_code(code) => {
                log::debug!("autofocus busy: 0x{code:04x}");
                Ok(AutofocusStatus::Busy)
            }
            Err(e) => Err(e),
        }
    }

    /// Drive the focus motor to an absolute position.
    pub fn manual_focus(&self, position: u32) -> Result<()> {
        self.execute(OP_MANUAL_FOCUS, &[position], None)?;
        Ok(())
    }

    pub fn liveview_start(&self) -> Result<()> {
        log::info!("starting live view");
        self.execute(OP_LIVEVIEW_START, &[], None)?;
        Ok(())
    }

    /// Stop live view. Best-effort.
    pub fn liveview_stop(&self) -> Result<()> {
        if let Err(e) = self.execute(OP_LIVEVIEW_STOP, &[], None) {
            log::warn!("failed to stop live view: {e}");
        }
        Ok(())
    }

    /// Fetch one live-view frame; the payload starts with a
    /// [`LiveviewHeader`].
    pub fn liveview_frame(&self) -> Result<Vec<u8>> {
        let resp = self.execute(OP_GET_LIVEVIEW, &[], None)?;
        Ok(resp.payload)
    }

    pub fn movie_start(&self) -> Result<()> {
        log::info!("starting movie recording");
        self.execute(OP_MOVIE_START, &[], None)?;
        Ok(())
    }

    /// Stop movie recording. Best-effort.
    pub fn movie_stop(&self) -> Result<()> {
        if let Err(e) = self.execute(OP_MOVIE_STOP, &[], None) {
            log::warn!("failed to stop movie recording: {e}");
        }
        Ok(())
    }

    /// Open the shutter for a bulb exposure.
    pub fn bulb_start(&self) -> Result<()> {
        self.execute(OP_BULB_START, &[], None)?;
        Ok(())
    }

    /// End a bulb exposure. Best-effort — the shutter must close.
    pub fn bulb_end(&self) -> Result<()> {
        if let Err(e) = self.execute(OP_BULB_END, &[], None) {
            log::warn!("failed to end bulb exposure: {e}");
        }
        Ok(())
    }

    /// Read a device property; returns the raw value bytes.
    pub fn get_property(&self, property: u16) -> Result<Vec<u8>> {
        let resp = self.execute(OP_GET_PROPERTY, &[u32::from(property)], None)?;
        Ok(resp.payload)
    }

    /// Write a device property; the value travels in the data phase.
    pub fn set_property(&self, property: u16, value: &[u8]) -> Result<()> {
        self.execute(OP_SET_PROPERTY, &[u32::from(property)], Some(value))?;
        Ok(())
    }

    pub fn set_image_quality(&self, quality: ImageQuality) -> Result<()> {
        self.execute(
            OP_SET_IMAGE_QUALITY,
            &[quality.format, quality.size, quality.quality],
            None,
        )?;
        Ok(())
    }

    pub fn get_image_quality(&self) -> Result<ImageQuality> {
        let resp = self.execute(OP_GET_IMAGE_QUALITY, &[], None)?;
        if resp.payload.len() < 12 {
            return Err(ProtocolError::ShortResponse {
                len: resp.payload.len(),
            });
        }
        let word =
            |i: usize| u32::from_le_bytes(resp.payload[i..i + 4].try_into().unwrap_or_default());
        Ok(ImageQuality {
            format: word(0),
            size: word(4),
            quality: word(8),
        })
    }

    pub fn battery(&self) -> Result<BatteryInfo> {
        let resp = self.execute(OP_GET_BATTERY, &[], None)?;
        if resp.payload.len() < 8 {
            return Err(ProtocolError::ShortResponse {
                len: resp.payload.len(),
            });
        }
        Ok(BatteryInfo {
            level: u32::from_le_bytes(resp.payload[0..4].try_into().unwrap_or_default()),
            status: u32::from_le_bytes(resp.payload[4..8].try_into().unwrap_or_default()),
        })
    }

    // ── Storage and object primitives ──

    /// Ids of all attached stores.
    pub fn storage_ids(&self) -> Result<Vec<u32>> {
        let resp = self.execute(OP_GET_STORAGE_IDS, &[], None)?;
        Ok(parse_u32_array(&resp.payload))
    }

    /// Raw storage-info dataset for one store.
    pub fn storage_info(&self, storage_id: u32) -> Result<Vec<u8>> {
        let resp = self.execute(OP_GET_STORAGE_INFO, &[storage_id], None)?;
        Ok(resp.payload)
    }

    /// Object handles on a store, optionally filtered by format code and
    /// parent object (`0` means "all" for either).
    pub fn object_handles(&self, storage_id: u32, format: u32, parent: u32) -> Result<Vec<u32>> {
        let resp = self.execute(OP_GET_OBJECT_HANDLES, &[storage_id, format, parent], None)?;
        Ok(parse_u32_array(&resp.payload))
    }

    /// Raw object-info dataset for one object.
    pub fn object_info(&self, handle: u32) -> Result<Vec<u8>> {
        let resp = self.execute(OP_GET_OBJECT_INFO, &[handle], None)?;
        Ok(resp.payload)
    }

    /// Full object data.
    pub fn object(&self, handle: u32) -> Result<Vec<u8>> {
        let resp = self.execute(OP_GET_OBJECT, &[handle], None)?;
        Ok(resp.payload)
    }

    /// A byte range out of an object.
    pub fn partial_object(&self, handle: u32, offset: u32, len: u32) -> Result<Vec<u8>> {
        let resp = self.execute(OP_GET_PARTIAL_OBJECT, &[handle, offset, len], None)?;
        Ok(resp.payload)
    }

    pub fn delete_object(&self, handle: u32) -> Result<()> {
        self.execute(OP_DELETE_OBJECT, &[handle], None)?;
        Ok(())
    }
}

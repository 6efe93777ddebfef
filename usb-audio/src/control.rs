//! Control-surface handler: the mute/volume feature unit.
//!
//! The host manipulates exactly two controls over the control endpoint —
//! mute (boolean, 1 byte) and volume (unsigned, 2 bytes little-endian, with
//! a fixed min/max/step). Both are plain shared state with a "changed" flag
//! the owning application polls; there is no state machine here and no
//! concurrency hazard beyond atomic reads and writes of small integers.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::constants::{VOLUME_MAX, VOLUME_MIN, VOLUME_RES};

/// Feature-unit control selectors.
pub const MUTE_CONTROL: u8 = 0x01;
pub const VOLUME_CONTROL: u8 = 0x02;

/// Class-specific request codes.
pub const SET_CUR: u8 = 0x01;
pub const GET_CUR: u8 = 0x81;
pub const GET_MIN: u8 = 0x82;
pub const GET_MAX: u8 = 0x83;
pub const GET_RES: u8 = 0x84;

/// The master channel; per-channel controls are not exposed.
const MASTER_CHANNEL: u8 = 0;

/// Rejection reasons for feature requests. The transport answers the host
/// with a request error; nothing here is fatal to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlError {
    UnknownSelector,
    UnknownRequest,
    InvalidChannel,
    BadPayload,
}

/// Mute/volume state shared between the control request handler and the
/// owning application.
pub struct FeatureUnit {
    muted: AtomicBool,
    volume: AtomicU16,
    changed: AtomicBool,
}

impl FeatureUnit {
    /// Create a feature unit: unmuted, full volume.
    pub const fn new() -> Self {
        FeatureUnit {
            muted: AtomicBool::new(false),
            volume: AtomicU16::new(VOLUME_MAX),
            changed: AtomicBool::new(false),
        }
    }

    /// Service a GET request. Writes the reply into `buf` and returns the
    /// reply length.
    pub fn get_feature(
        &self,
        selector: u8,
        request: u8,
        channel: u8,
        buf: &mut [u8],
    ) -> Result<usize, ControlError> {
        if channel != MASTER_CHANNEL {
            return Err(ControlError::InvalidChannel);
        }
        match (selector, request) {
            (MUTE_CONTROL, GET_CUR) => {
                let reply = buf.first_mut().ok_or(ControlError::BadPayload)?;
                *reply = self.muted.load(Ordering::Relaxed) as u8;
                Ok(1)
            }
            (MUTE_CONTROL, _) => Err(ControlError::UnknownRequest),
            (VOLUME_CONTROL, GET_CUR) => reply_u16(buf, self.volume.load(Ordering::Relaxed)),
            (VOLUME_CONTROL, GET_MIN) => reply_u16(buf, VOLUME_MIN),
            (VOLUME_CONTROL, GET_MAX) => reply_u16(buf, VOLUME_MAX),
            (VOLUME_CONTROL, GET_RES) => reply_u16(buf, VOLUME_RES),
            (VOLUME_CONTROL, _) => Err(ControlError::UnknownRequest),
            _ => Err(ControlError::UnknownSelector),
        }
    }

    /// Service a SET_CUR request and mark the change for the application.
    pub fn set_feature(
        &self,
        selector: u8,
        channel: u8,
        data: &[u8],
    ) -> Result<(), ControlError> {
        if channel != MASTER_CHANNEL {
            return Err(ControlError::InvalidChannel);
        }
        match selector {
            MUTE_CONTROL => {
                let &mute = data.first().ok_or(ControlError::BadPayload)?;
                self.muted.store(mute != 0, Ordering::Relaxed);
                trace!("set mute: {=u8}", mute);
            }
            VOLUME_CONTROL => {
                let volume = match data {
                    &[lo, hi, ..] => u16::from_le_bytes([lo, hi]),
                    _ => return Err(ControlError::BadPayload),
                };
                self.volume.store(volume.min(VOLUME_MAX), Ordering::Relaxed);
                trace!("set volume: {=u16}", volume);
            }
            _ => return Err(ControlError::UnknownSelector),
        }
        self.changed.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Poll-and-clear the changed flag. The owning application calls this
    /// once per period and re-reads the settings when it returns `true`.
    pub fn take_change(&self) -> bool {
        self.changed.swap(false, Ordering::Relaxed)
    }

    /// Current mute state.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Current raw volume setting.
    pub fn volume(&self) -> u16 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Current volume as a unit-range multiplier for the audio graph;
    /// zero while muted.
    pub fn volume_scale(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.volume() as f32 / VOLUME_MAX as f32
        }
    }
}

impl Default for FeatureUnit {
    fn default() -> Self {
        Self::new()
    }
}

fn reply_u16(buf: &mut [u8], value: u16) -> Result<usize, ControlError> {
    let reply = buf.get_mut(..2).ok_or(ControlError::BadPayload)?;
    reply.copy_from_slice(&value.to_le_bytes());
    Ok(2)
}

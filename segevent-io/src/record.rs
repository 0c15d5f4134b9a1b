//! On-disk record layouts.
//!
//! Pulse records follow the digital readout's raw tree; event records follow
//! the sorted tree (`xpos, ypos, ToTx, ...`).

use crate::{Error, Result};
use segevent_core::{Axis, Classification, FormedEvent, RawPulse};

/// Size of one little-endian binary pulse record in bytes.
///
/// `xpos u16 | ypos u16 | amp u16 | time u64 | eventID u8 | eventTS u32 |
/// mcpdID u8 | status u8 | param0..param3 u64`
pub const PULSE_RECORD_SIZE: usize = 53;

/// Pulse column names in file order.
pub const PULSE_COLUMNS: [&str; 12] = [
    "xpos", "ypos", "amp", "time", "eventID", "eventTS", "mcpdID", "status", "param0", "param1",
    "param2", "param3",
];

/// Event columns always written.
pub const EVENT_COLUMNS: [&str; 12] = [
    "xpos",
    "ypos",
    "ToTx",
    "ToTy",
    "multx",
    "multy",
    "time",
    "rawevtnum",
    "seg",
    "widthx",
    "widthy",
    "dtime",
];

/// Fit columns, written when [`EventFields::fit`] is set.
pub const FIT_COLUMNS: [&str; 2] = ["xfit", "yfit"];

/// Boundary time column, written when [`EventFields::boundary_dt`] is set.
pub const BOUNDARY_DT_COLUMN: &str = "boundtime";

/// One raw readout record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PulseRecord {
    /// Wire channel, 0 for stripe pulses.
    pub xpos: u16,
    /// Stripe channel (with electronics offset), 0 for wire pulses.
    pub ypos: u16,
    /// Time over threshold in clock cycles.
    pub amp: u16,
    /// Full timestamp in clock cycles.
    pub time: u64,
    /// 0 for physical pulses, anything else for self-triggers.
    pub event_id: u8,
    /// Timestamp within the readout buffer.
    pub event_ts: u32,
    /// 1-based segment.
    pub mcpd_id: u8,
    /// Readout status bits.
    pub status: u8,
    /// Unused readout parameters.
    pub params: [u64; 4],
}

impl PulseRecord {
    /// Interprets the record as a pulse originating at `row`.
    #[must_use]
    pub fn to_pulse(&self, row: u64) -> RawPulse {
        let (axis, channel) = if self.ypos == 0 {
            (Axis::Wire, self.xpos)
        } else {
            (Axis::Stripe, self.ypos)
        };
        let classification = if self.event_id == 0 {
            Classification::Physical
        } else {
            Classification::SelfTrigger
        };
        RawPulse {
            axis,
            channel,
            amplitude: self.amp,
            timestamp: self.time,
            segment: self.mcpd_id,
            classification,
            source_index: row,
        }
    }

    /// Builds the record a readout would have produced for `pulse`.
    #[must_use]
    pub fn from_pulse(pulse: &RawPulse) -> Self {
        let (xpos, ypos) = match pulse.axis {
            Axis::Wire => (pulse.channel, 0),
            Axis::Stripe => (0, pulse.channel),
        };
        Self {
            xpos,
            ypos,
            amp: pulse.amplitude,
            time: pulse.timestamp,
            event_id: u8::from(!pulse.is_physical()),
            mcpd_id: pulse.segment,
            ..Self::default()
        }
    }

    /// Decodes one binary record.
    ///
    /// # Errors
    /// Returns `Error::InvalidFormat` if `bytes` is not exactly one record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; PULSE_RECORD_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidFormat(format!(
                "pulse record is {} bytes, expected {PULSE_RECORD_SIZE}",
                bytes.len()
            ))
        })?;
        let mut cursor = Cursor { bytes, pos: 0 };
        Ok(Self {
            xpos: u16::from_le_bytes(cursor.take()),
            ypos: u16::from_le_bytes(cursor.take()),
            amp: u16::from_le_bytes(cursor.take()),
            time: u64::from_le_bytes(cursor.take()),
            event_id: u8::from_le_bytes(cursor.take()),
            event_ts: u32::from_le_bytes(cursor.take()),
            mcpd_id: u8::from_le_bytes(cursor.take()),
            status: u8::from_le_bytes(cursor.take()),
            params: [
                u64::from_le_bytes(cursor.take()),
                u64::from_le_bytes(cursor.take()),
                u64::from_le_bytes(cursor.take()),
                u64::from_le_bytes(cursor.take()),
            ],
        })
    }

    /// Encodes the record in its binary layout.
    #[must_use]
    pub fn encode(&self) -> [u8; PULSE_RECORD_SIZE] {
        let mut out = [0u8; PULSE_RECORD_SIZE];
        let mut pos = 0;
        let mut put = |bytes: &[u8]| {
            out[pos..pos + bytes.len()].copy_from_slice(bytes);
            pos += bytes.len();
        };
        put(&self.xpos.to_le_bytes());
        put(&self.ypos.to_le_bytes());
        put(&self.amp.to_le_bytes());
        put(&self.time.to_le_bytes());
        put(&[self.event_id]);
        put(&self.event_ts.to_le_bytes());
        put(&[self.mcpd_id]);
        put(&[self.status]);
        for param in &self.params {
            put(&param.to_le_bytes());
        }
        out
    }
}

struct Cursor<'a> {
    bytes: &'a [u8; PULSE_RECORD_SIZE],
    pos: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

/// Optional event columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventFields {
    /// Write `xfit` and `yfit`.
    pub fit: bool,
    /// Write `boundtime`.
    pub boundary_dt: bool,
}

impl EventFields {
    /// Column names in file order.
    #[must_use]
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = EVENT_COLUMNS.to_vec();
        if self.fit {
            columns.extend(FIT_COLUMNS);
        }
        if self.boundary_dt {
            columns.push(BOUNDARY_DT_COLUMN);
        }
        columns
    }

    /// Size of one binary event record with these columns.
    #[must_use]
    pub fn record_size(&self) -> usize {
        EVENT_RECORD_SIZE
            + if self.fit { 16 } else { 0 }
            + if self.boundary_dt { 8 } else { 0 }
    }

    /// Picks the columns needed to carry every value in `events`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn covering(events: &[FormedEvent]) -> Self {
        Self {
            fit: events.iter().any(|e| e.x_fit != e.x || e.y_fit != e.y),
            boundary_dt: events.iter().any(|e| e.boundary_dt.is_some()),
        }
    }
}

/// Size of the fixed part of a binary event record.
///
/// `xpos f64 | ypos f64 | ToTx u64 | ToTy u64 | multx u32 | multy u32 |
/// time u64 | rawevtnum u64 | seg i32 | widthx u32 | widthy u32 | dtime u64`
pub const EVENT_RECORD_SIZE: usize = 76;

/// Encodes an event in the binary layout selected by `fields`.
pub(crate) fn encode_event(event: &FormedEvent, fields: EventFields, out: &mut Vec<u8>) {
    out.extend_from_slice(&event.x.to_le_bytes());
    out.extend_from_slice(&event.y.to_le_bytes());
    out.extend_from_slice(&event.tot_x.to_le_bytes());
    out.extend_from_slice(&event.tot_y.to_le_bytes());
    out.extend_from_slice(&event.mult_x.to_le_bytes());
    out.extend_from_slice(&event.mult_y.to_le_bytes());
    out.extend_from_slice(&event.time.to_le_bytes());
    out.extend_from_slice(&event.source_index.to_le_bytes());
    out.extend_from_slice(&event.segment.to_le_bytes());
    out.extend_from_slice(&event.width_x.to_le_bytes());
    out.extend_from_slice(&event.width_y.to_le_bytes());
    out.extend_from_slice(&event.dtime.to_le_bytes());
    if fields.fit {
        out.extend_from_slice(&event.x_fit.to_le_bytes());
        out.extend_from_slice(&event.y_fit.to_le_bytes());
    }
    if fields.boundary_dt {
        out.extend_from_slice(&event.boundary_dt.unwrap_or(0).to_le_bytes());
    }
}

/// Decodes one binary event record laid out per `fields`.
pub(crate) fn decode_event(bytes: &[u8], fields: EventFields) -> FormedEvent {
    fn read<const N: usize>(bytes: &[u8], pos: &mut usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes[*pos..*pos + N]);
        *pos += N;
        out
    }

    let mut pos = 0;
    let x = f64::from_le_bytes(read(bytes, &mut pos));
    let y = f64::from_le_bytes(read(bytes, &mut pos));
    let mut event = FormedEvent {
        x,
        y,
        tot_x: u64::from_le_bytes(read(bytes, &mut pos)),
        tot_y: u64::from_le_bytes(read(bytes, &mut pos)),
        mult_x: u32::from_le_bytes(read(bytes, &mut pos)),
        mult_y: u32::from_le_bytes(read(bytes, &mut pos)),
        time: u64::from_le_bytes(read(bytes, &mut pos)),
        source_index: u64::from_le_bytes(read(bytes, &mut pos)),
        segment: i32::from_le_bytes(read(bytes, &mut pos)),
        width_x: u32::from_le_bytes(read(bytes, &mut pos)),
        width_y: u32::from_le_bytes(read(bytes, &mut pos)),
        dtime: u64::from_le_bytes(read(bytes, &mut pos)),
        x_fit: x,
        y_fit: y,
        boundary_dt: None,
    };
    if fields.fit {
        event.x_fit = f64::from_le_bytes(read(bytes, &mut pos));
        event.y_fit = f64::from_le_bytes(read(bytes, &mut pos));
    }
    if fields.boundary_dt {
        event.boundary_dt = Some(u64::from_le_bytes(read(bytes, &mut pos)));
    }
    event
}

//! Pure frame assembly, validation, and fixed-point numeric conversions.
//!
//! No shared state lives here — every function is a plain transform over
//! a `u32` frame. See `DESIGN.md` for the note on this crate's parity
//! convention (total frame popcount is always even, not odd).

/// The 3-bit message type field (bits 30-28 of a frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ReadData = 0,
    WriteData = 1,
    InvalidData = 2,
    Reserved = 3,
    ReadAck = 4,
    WriteAck = 5,
    DataInvalid = 6,
    UnknownDataId = 7,
}

impl MessageType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => MessageType::ReadData,
            1 => MessageType::WriteData,
            2 => MessageType::InvalidData,
            3 => MessageType::Reserved,
            4 => MessageType::ReadAck,
            5 => MessageType::WriteAck,
            6 => MessageType::DataInvalid,
            _ => MessageType::UnknownDataId,
        }
    }
}

/// Returns true iff `frame` has an odd number of set bits.
pub fn parity_odd(frame: u32) -> bool {
    frame.count_ones() & 1 == 1
}

/// Message type field (bits 30-28).
pub fn message_type(frame: u32) -> MessageType {
    MessageType::from_bits(frame >> 28)
}

/// Data-ID field (bits 23-16).
pub fn data_id(frame: u32) -> u8 {
    (frame >> 16) as u8
}

/// Lower 16 bits, as an unsigned integer.
pub fn get_uint(frame: u32) -> u16 {
    frame as u16
}

/// Lower 16 bits, interpreted as signed Q8.8 fixed point.
pub fn get_float(frame: u32) -> f32 {
    let raw = frame as u16 as i16;
    raw as f32 / 256.0
}

/// Clamps `t` to [0, 100] and converts to the Q8.8 payload the wire uses,
/// truncating toward zero.
pub fn temp_to_data(t: f32) -> u16 {
    let clamped = if t < 0.0 {
        0.0
    } else if t > 100.0 {
        100.0
    } else {
        t
    };
    (clamped * 256.0) as u16
}

/// Builds a 32-bit frame from its fields, setting bit 31 so that the
/// complete frame has even total popcount — the parity convention used by
/// real OpenTherm traffic (see `DESIGN.md`).
pub fn build(msg_type: MessageType, id: u8, data: u16) -> u32 {
    let body = ((msg_type as u32) << 28) | ((id as u32) << 16) | data as u32;
    let parity_bit = if parity_odd(body) { 1 } else { 0 };
    body | (parity_bit << 31)
}

/// A request frame is well-formed iff its total popcount is even and its
/// message type is one a master is allowed to send.
pub fn is_valid_request(frame: u32) -> bool {
    if parity_odd(frame) {
        return false;
    }
    matches!(
        message_type(frame),
        MessageType::ReadData | MessageType::WriteData
    )
}

/// A response frame is well-formed iff its total popcount is even and its
/// message type is one a slave is allowed to send back.
pub fn is_valid_response(frame: u32) -> bool {
    if parity_odd(frame) {
        return false;
    }
    matches!(
        message_type(frame),
        MessageType::ReadAck | MessageType::WriteAck
    )
}

/// The OpenTherm data-ID catalog, carried as plain constants rather than a
/// checked enum: arbitrary unrecognized IDs must still round-trip through
/// the codec, since `data_id()` just reads 8 bits off the wire. Only the
/// subset the dispatcher uses is documented beyond its numeric value.
pub mod ids {
    pub const STATUS: u8 = 0;
    pub const T_SET: u8 = 1;
    pub const M_CONFIG: u8 = 2;
    pub const S_CONFIG: u8 = 3;
    pub const REMOTE_REQUEST: u8 = 4;
    pub const ASF_FLAGS: u8 = 5;
    pub const COOLING_CONTROL: u8 = 7;
    pub const T_SET_CH2: u8 = 8;
    pub const TR_OVERRIDE: u8 = 9;
    pub const MAX_REL_MOD_LEVEL: u8 = 14;
    pub const TR_SET: u8 = 16;
    pub const REL_MOD_LEVEL: u8 = 17;
    pub const CH_PRESSURE: u8 = 18;
    pub const DHW_FLOW_RATE: u8 = 19;
    pub const TR: u8 = 24;
    pub const TBOILER: u8 = 25;
    pub const TDHW: u8 = 26;
    pub const TOUTSIDE: u8 = 27;
    pub const TRET: u8 = 28;
    pub const TDHW_SET: u8 = 56;
    pub const MAX_TSET: u8 = 57;
    pub const OT_VERSION_MASTER: u8 = 124;
    pub const OT_VERSION_SLAVE: u8 = 125;
    pub const MASTER_VERSION: u8 = 126;
    pub const SLAVE_VERSION: u8 = 127;
}

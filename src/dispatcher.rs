//! Thin, named application operations over the codec and the link state
//! machine. Each is a one-liner: assemble a frame, submit it through
//! [`Link::request`], decode the result.

use bitflags::bitflags;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::clock::Clock;
use crate::codec::{self, ids, MessageType};
use crate::link::{Link, ResponseStatus};

bitflags! {
    /// Slave status-response flags, read off the low byte of the 16-bit
    /// data field (the slave places its reply flags there; the master's
    /// own request flags occupy the high byte instead — see
    /// `set_boiler_status`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const FAULT = 1 << 0;
        const CH_ACTIVE = 1 << 1;
        const DHW_ACTIVE = 1 << 2;
        const FLAME = 1 << 3;
        const COOLING = 1 << 4;
        const DIAGNOSTIC = 1 << 6;
    }
}

impl<O, I, C> Link<O, I, C>
where
    O: OutputPin,
    I: InputPin,
    C: Clock,
{
    /// Sends the master status request with the given flags in the high
    /// byte, returning the slave's status flags on success.
    pub fn set_boiler_status(
        &self,
        ch_enable: bool,
        dhw_enable: bool,
        cooling_enable: bool,
        otc_active: bool,
        ch2_enable: bool,
    ) -> Option<StatusFlags> {
        let mut master_flags = 0u16;
        master_flags |= (ch_enable as u16) << 8;
        master_flags |= (dhw_enable as u16) << 9;
        master_flags |= (cooling_enable as u16) << 10;
        master_flags |= (otc_active as u16) << 11;
        master_flags |= (ch2_enable as u16) << 12;

        let frame = codec::build(MessageType::ReadData, ids::STATUS, master_flags);
        let response = self.request(frame);
        if self.last_response_status() != ResponseStatus::Success {
            return None;
        }
        Some(StatusFlags::from_bits_truncate(codec::get_uint(response) as u8))
    }

    pub fn set_boiler_temp(&self, celsius: f32) -> bool {
        let data = codec::temp_to_data(celsius);
        let frame = codec::build(MessageType::WriteData, ids::T_SET, data);
        self.request(frame);
        self.last_response_status() == ResponseStatus::Success
    }

    pub fn get_boiler_temp(&self) -> f32 {
        self.read_float(ids::TBOILER)
    }

    pub fn get_return_temp(&self) -> f32 {
        self.read_float(ids::TRET)
    }

    pub fn set_dhw_setpoint(&self, celsius: f32) -> bool {
        let data = codec::temp_to_data(celsius);
        let frame = codec::build(MessageType::WriteData, ids::TDHW_SET, data);
        self.request(frame);
        self.last_response_status() == ResponseStatus::Success
    }

    pub fn get_dhw_temp(&self) -> f32 {
        self.read_float(ids::TDHW)
    }

    pub fn get_modulation(&self) -> f32 {
        self.read_float(ids::REL_MOD_LEVEL)
    }

    pub fn get_pressure(&self) -> f32 {
        self.read_float(ids::CH_PRESSURE)
    }

    pub fn get_fault(&self) -> Option<u8> {
        let frame = codec::build(MessageType::ReadData, ids::ASF_FLAGS, 0);
        let response = self.request(frame);
        if self.last_response_status() != ResponseStatus::Success {
            return None;
        }
        Some((codec::get_uint(response) >> 8) as u8)
    }

    pub fn get_slave_version(&self) -> Option<u32> {
        let frame = codec::build(MessageType::ReadData, ids::SLAVE_VERSION, 0);
        let response = self.request(frame);
        if self.last_response_status() != ResponseStatus::Success {
            return None;
        }
        Some(response)
    }

    pub fn get_slave_ot_version(&self) -> f32 {
        self.read_float(ids::OT_VERSION_SLAVE)
    }

    pub fn reset(&self) -> bool {
        let frame = codec::build(MessageType::WriteData, ids::REMOTE_REQUEST, 0x0100);
        self.request(frame);
        self.last_response_status() == ResponseStatus::Success
    }

    /// Returns `0.0` on any non-`Success` response, per the documented
    /// propagation policy for float-returning operations.
    fn read_float(&self, id: u8) -> f32 {
        let frame = codec::build(MessageType::ReadData, id, 0);
        let response = self.request(frame);
        if self.last_response_status() != ResponseStatus::Success {
            return 0.0;
        }
        codec::get_float(response)
    }
}

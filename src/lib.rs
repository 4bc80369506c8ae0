//! Bit-banged OpenTherm master/slave link core.
//!
//! Drives one digital output line and samples one digital input line
//! whose edges drive an external interrupt, to exchange 34-bit
//! Manchester-encoded frames per the OpenTherm Lite physical layer. GPIO
//! peripheral setup, interrupt-controller wiring, and any application
//! beyond the flat dispatcher table are left to the caller.
#![no_std]

#[cfg(test)]
extern crate std;

pub mod clock;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod link;
mod sync;

pub use clock::Clock;
pub use codec::MessageType;
pub use dispatcher::StatusFlags;
pub use error::{LinkError, LinkResult};
pub use link::{Link, LinkStatus, ResponseCallback, ResponseStatus, Role};

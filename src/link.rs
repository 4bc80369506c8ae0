//! The link state machine: transmitter, edge-triggered receiver, and the
//! foreground `tick`/`request` pair. This is the core of the crate.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::clock::Clock;
use crate::error::{LinkError, LinkResult};
use crate::sync::IrqMutex;

const BIT_US: u32 = 500;
const MASTER_GAP_US: u64 = 100_000;
const SLAVE_GAP_US: u64 = 20_000;
const TIMEOUT_US: u64 = 1_000_000;
/// Distinguishes a mid-cell Manchester transition from a cell-boundary
/// edge. Half the nominal 1 ms bit cell, with margin for jitter.
const EDGE_THRESHOLD_US: u64 = 750;

/// Which side of the link this instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// The link's current phase. Owned exclusively by [`Link`]; both the edge
/// handler and the foreground path read and transition it under the same
/// critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    NotInitialized,
    Ready,
    Delay,
    RequestSending,
    ResponseWaiting,
    ResponseStartBit,
    ResponseReceiving,
    ResponseReady,
    ResponseInvalid,
}

/// Classification of the most recently completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    None,
    Success,
    Invalid,
    Timeout,
}

/// Invoked from `tick`, never from interrupt context. Must not call back
/// into [`Link::request`] — see `DESIGN.md` for what happens if it does.
pub type ResponseCallback = fn(u32, ResponseStatus);

struct Shared<O, I> {
    output: O,
    input: I,
    status: LinkStatus,
    response: u32,
    bit_index: u8,
    last_edge_us: u64,
    response_ts_us: u64,
    last_status: ResponseStatus,
    in_callback: bool,
}

/// The OpenTherm link core: generic over the output pin, input pin, and
/// clock the caller provides. All methods take `&self` — mutable state
/// lives behind a critical-section mutex, mirroring the original C
/// implementation's raw-volatile-global-variable approach while staying
/// memory-safe.
pub struct Link<O, I, C> {
    shared: IrqMutex<Shared<O, I>>,
    clock: C,
    role: Role,
    on_response: ResponseCallback,
}

impl<O, I, C> Link<O, I, C>
where
    O: OutputPin,
    I: InputPin,
    C: Clock,
{
    /// Constructs a link over already-configured pins and a clock. Pin
    /// muxing and interrupt-controller registration are the caller's
    /// responsibility.
    pub fn new(
        output: O,
        input: I,
        clock: C,
        role: Role,
        on_response: ResponseCallback,
    ) -> LinkResult<Self> {
        let t0 = clock.now_micros();
        let t1 = clock.now_micros();
        if t1 < t0 {
            return Err(LinkError::ClockNotMonotonic);
        }
        Ok(Self {
            shared: IrqMutex::new(Shared {
                output,
                input,
                status: LinkStatus::Ready,
                response: 0,
                bit_index: 0,
                last_edge_us: t1,
                response_ts_us: t1,
                last_status: ResponseStatus::None,
                in_callback: false,
            }),
            clock,
            role,
            on_response,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.shared.with(|s| s.status == LinkStatus::Ready)
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.with(|s| s.status)
    }

    pub fn last_response(&self) -> u32 {
        self.shared.with(|s| s.response)
    }

    pub fn last_response_status(&self) -> ResponseStatus {
        self.shared.with(|s| s.last_status)
    }

    fn drive_active(&self) {
        self.shared.with(|s| {
            let _ = s.output.set_low();
        });
    }

    fn drive_idle(&self) {
        self.shared.with(|s| {
            let _ = s.output.set_high();
        });
    }

    fn read_line(&self) -> bool {
        self.shared.with(|s| s.input.is_high().unwrap_or(false))
    }

    fn encode_bit(&self, bit: bool) {
        if bit {
            self.drive_active();
            self.clock.delay_us(BIT_US);
            self.drive_idle();
            self.clock.delay_us(BIT_US);
        } else {
            self.drive_idle();
            self.clock.delay_us(BIT_US);
            self.drive_active();
            self.clock.delay_us(BIT_US);
        }
    }

    /// Begins transmitting `frame` if the link is `Ready`. Busy-waits for
    /// the full ~34 ms frame; returns `false` immediately without
    /// transmitting anything if the link was not ready.
    pub fn send_frame(&self, frame: u32) -> bool {
        let started = self.shared.with(|s| {
            if s.status != LinkStatus::Ready {
                return false;
            }
            s.status = LinkStatus::RequestSending;
            s.response = 0;
            s.bit_index = 0;
            s.last_status = ResponseStatus::None;
            true
        });
        if !started {
            return false;
        }

        #[cfg(feature = "log")]
        log::trace!("send_frame: transmitting {:#010x}", frame);

        self.encode_bit(true); // start bit
        for i in (0..32).rev() {
            self.encode_bit((frame >> i) & 1 == 1);
        }
        self.encode_bit(true); // stop bit
        self.drive_idle();

        let now = self.clock.now_micros();
        self.shared.with(|s| {
            s.response_ts_us = now;
            s.last_edge_us = now;
            s.status = LinkStatus::ResponseWaiting;
        });
        true
    }

    /// Called from the input line's edge interrupt. Reconstructs the
    /// incoming 32-bit frame using midpoint sampling: an edge arriving
    /// less than [`EDGE_THRESHOLD_US`] after the previous one is the
    /// mid-cell transition that carries the bit value; an edge arriving
    /// at a full cell boundary repeats the previous bit and carries no
    /// new information.
    pub fn handle_edge(&self) {
        let now = self.clock.now_micros();
        let level = self.read_line();

        self.shared.with(|s| {
            let dt = now.saturating_sub(s.last_edge_us);
            s.last_edge_us = now;

            match s.status {
                LinkStatus::Ready => {
                    // a slave notices an incoming request by the line going
                    // high with the link otherwise idle; a master has no
                    // unsolicited-edge path and ignores this.
                    if self.role == Role::Slave && level {
                        s.status = LinkStatus::ResponseWaiting;
                    }
                }
                LinkStatus::ResponseWaiting => {
                    if level {
                        s.status = LinkStatus::ResponseStartBit;
                    } else {
                        s.status = LinkStatus::ResponseInvalid;
                    }
                }
                LinkStatus::ResponseStartBit => {
                    if dt < EDGE_THRESHOLD_US && !level {
                        s.status = LinkStatus::ResponseReceiving;
                        s.response = 0;
                        s.bit_index = 0;
                    } else {
                        // start bit never completed its mid-cell transition
                        // to active, or arrived at a full cell boundary
                        s.status = LinkStatus::ResponseInvalid;
                    }
                }
                LinkStatus::ResponseReceiving => {
                    if dt < EDGE_THRESHOLD_US {
                        // active (electrical 0) after the transition = logical 1
                        let bit = !level;
                        s.response = (s.response << 1) | (bit as u32);
                        s.bit_index += 1;
                        if s.bit_index == 32 {
                            s.status = LinkStatus::ResponseReady;
                        }
                    }
                    // else: cell-boundary edge repeating the previous bit;
                    // nothing to decode.
                }
                _ => {
                    // edge outside an active receive window: ignore
                }
            }
        });
    }

    /// Enforces the 1-second response timeout, classifies a completed
    /// receive, and enforces the post-frame inter-frame gap. Must be
    /// called periodically by the caller, typically in the `request`
    /// spin loop below.
    pub fn tick(&self) {
        let now = self.clock.now_micros();

        let (status, ts) = self.shared.with(|s| (s.status, s.response_ts_us));

        match status {
            LinkStatus::Ready => {}
            LinkStatus::NotInitialized => {}
            LinkStatus::Delay => {
                let gap = match self.role {
                    Role::Master => MASTER_GAP_US,
                    Role::Slave => SLAVE_GAP_US,
                };
                if now.saturating_sub(ts) > gap {
                    self.shared.with(|s| s.status = LinkStatus::Ready);
                }
            }
            LinkStatus::ResponseInvalid => {
                self.finish(ResponseStatus::Invalid, now);
            }
            LinkStatus::ResponseReady => {
                let frame = self.shared.with(|s| s.response);
                let ok = match self.role {
                    Role::Slave => crate::codec::is_valid_request(frame),
                    Role::Master => crate::codec::is_valid_response(frame),
                };
                self.finish(
                    if ok {
                        ResponseStatus::Success
                    } else {
                        ResponseStatus::Invalid
                    },
                    now,
                );
            }
            _ => {
                if now.saturating_sub(ts) > TIMEOUT_US {
                    self.finish(ResponseStatus::Timeout, now);
                }
            }
        }
    }

    fn finish(&self, result: ResponseStatus, now: u64) {
        let frame = self.shared.with(|s| {
            s.status = LinkStatus::Delay;
            s.response_ts_us = now;
            s.last_status = result;
            s.in_callback = true;
            s.response
        });

        #[cfg(feature = "log")]
        log::debug!("response classified as {:?}", result);

        (self.on_response)(frame, result);

        self.shared.with(|s| s.in_callback = false);
    }

    /// Sends `frame` and spins on `tick` until the link returns to
    /// `Ready`, returning the received frame (0 on timeout or invalid —
    /// use `last_response_status` to distinguish those two).
    ///
    /// Returns 0 without transmitting if called reentrantly from within
    /// the response callback; the link's own `Delay` state during
    /// callback execution already guarantees `send_frame` fails in that
    /// case, but the explicit check here also logs the misuse.
    pub fn request(&self, frame: u32) -> u32 {
        if self.shared.with(|s| s.in_callback) {
            #[cfg(feature = "log")]
            log::warn!("request() called reentrantly from response callback");
            return 0;
        }
        if !self.send_frame(frame) {
            return 0;
        }
        loop {
            self.tick();
            if self.is_ready() {
                break;
            }
            self.clock.yield_now();
        }
        self.last_response()
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction};

    use super::*;
    use crate::clock::test_clock::TestClock;
    use crate::codec::{build, ids, MessageType};

    fn never_called(_frame: u32, _status: ResponseStatus) {
        panic!("callback should not be invoked in this test");
    }

    #[test]
    fn new_link_starts_ready() {
        let out = PinMock::new(&[]);
        let inp = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        assert!(link.is_ready());
    }

    #[test]
    fn send_frame_fails_when_not_ready() {
        let out_expectations: [Transaction; 0] = [];
        let out = PinMock::new(&out_expectations);
        let inp = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        link.shared.with(|s| s.status = LinkStatus::RequestSending);
        assert!(!link.send_frame(0));
    }

    #[test]
    fn full_round_trip_classifies_success() {
        // 34 output transitions for the request (start + 32 bits + stop),
        // each bit as a high/low pair.
        let mut out_tx = Vec::new();
        let frame_out = build(MessageType::ReadData, ids::TBOILER, 0);
        let bits: Vec<bool> = core::iter::once(true)
            .chain((0..32).rev().map(|i| (frame_out >> i) & 1 == 1))
            .chain(core::iter::once(true))
            .collect();
        for bit in &bits {
            if *bit {
                out_tx.push(Transaction::set(PinState::Low));
                out_tx.push(Transaction::set(PinState::High));
            } else {
                out_tx.push(Transaction::set(PinState::High));
                out_tx.push(Transaction::set(PinState::Low));
            }
        }
        out_tx.push(Transaction::set(PinState::High)); // final drive_idle

        let out = PinMock::new(&out_tx);
        let inp = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();

        assert!(link.send_frame(frame_out));
        assert_eq!(link.status(), LinkStatus::ResponseWaiting);
    }

    /// Feeds `handle_edge` a start bit followed by the 32 data bits of
    /// `frame`, one edge per bit, each within the mid-cell threshold.
    /// Returns the expected `Transaction::get` sequence for the input
    /// mock: a `High` to complete the start bit, a `Low` mid-cell
    /// transition to enter reception, then one level per data bit (a bit
    /// decodes as `!level`, so `Low` encodes 1 and `High` encodes 0).
    fn reply_edge_levels(frame: u32) -> Vec<PinState> {
        let mut levels = Vec::new();
        levels.push(PinState::High); // ResponseWaiting -> ResponseStartBit
        levels.push(PinState::Low); // ResponseStartBit -> ResponseReceiving
        for i in (0..32).rev() {
            let bit = (frame >> i) & 1 == 1;
            levels.push(if bit { PinState::Low } else { PinState::High });
        }
        levels
    }

    fn feed_edges(link: &Link<PinMock, PinMock, TestClock>, count: usize) {
        for _ in 0..count {
            link.clock.delay_us(500);
            link.handle_edge();
        }
    }

    #[test]
    fn s1_successful_read_classifies_success() {
        let frame = build(MessageType::ReadAck, ids::TBOILER, 0x3C80);
        let levels = reply_edge_levels(frame);
        let inp_tx: Vec<Transaction> = levels.iter().map(|l| Transaction::get(*l)).collect();
        let inp = PinMock::new(&inp_tx);
        let out = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        link.shared.with(|s| s.status = LinkStatus::ResponseWaiting);

        feed_edges(&link, levels.len());

        assert_eq!(link.status(), LinkStatus::ResponseReady);
        link.tick();
        assert_eq!(link.last_response_status(), ResponseStatus::Success);
        assert_eq!(link.last_response(), frame);
    }

    #[test]
    fn s2_timeout_when_no_reply_arrives() {
        let out = PinMock::new(&[]);
        let inp = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        link.shared.with(|s| {
            s.status = LinkStatus::ResponseWaiting;
            s.response_ts_us = 0;
        });

        link.clock.delay_us(1_000_001);
        link.tick();

        assert_eq!(link.last_response_status(), ResponseStatus::Timeout);
        assert_eq!(link.status(), LinkStatus::Delay);
    }

    #[test]
    fn s3_parity_corruption_classifies_invalid() {
        let frame = build(MessageType::ReadAck, ids::TBOILER, 0x3C80);
        let mut levels = reply_edge_levels(frame);
        // flip the final data bit's level to corrupt parity
        let last = levels.len() - 1;
        levels[last] = match levels[last] {
            PinState::High => PinState::Low,
            PinState::Low => PinState::High,
        };
        let inp_tx: Vec<Transaction> = levels.iter().map(|l| Transaction::get(*l)).collect();
        let inp = PinMock::new(&inp_tx);
        let out = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        link.shared.with(|s| s.status = LinkStatus::ResponseWaiting);

        feed_edges(&link, levels.len());

        assert_eq!(link.status(), LinkStatus::ResponseReady);
        link.tick();
        assert_eq!(link.last_response_status(), ResponseStatus::Invalid);
    }

    #[test]
    fn s4_master_gap_enforced_before_ready() {
        let out = PinMock::new(&[]);
        let inp = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        link.shared.with(|s| {
            s.status = LinkStatus::Delay;
            s.response_ts_us = 0;
        });

        link.clock.delay_us(50_000);
        link.tick();
        assert_eq!(link.status(), LinkStatus::Delay);

        link.clock.delay_us(60_000); // total elapsed 110_000 > 100_000 gap
        link.tick();
        assert_eq!(link.status(), LinkStatus::Ready);
    }

    #[test]
    fn s5_start_bit_violation_classifies_invalid() {
        let inp_tx = [Transaction::get(PinState::Low)];
        let inp = PinMock::new(&inp_tx);
        let out = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Master, never_called).unwrap();
        link.shared.with(|s| s.status = LinkStatus::ResponseWaiting);

        link.handle_edge();
        assert_eq!(link.status(), LinkStatus::ResponseInvalid);

        link.tick();
        assert_eq!(link.last_response_status(), ResponseStatus::Invalid);
    }

    #[test]
    fn slave_notices_incoming_request_on_ready_edge() {
        let inp_tx = [Transaction::get(PinState::High)];
        let inp = PinMock::new(&inp_tx);
        let out = PinMock::new(&[]);
        let clock = TestClock::new();
        let link = Link::new(out, inp, clock, Role::Slave, never_called).unwrap();
        assert_eq!(link.status(), LinkStatus::Ready);

        link.handle_edge();

        assert_eq!(link.status(), LinkStatus::ResponseWaiting);
    }
}

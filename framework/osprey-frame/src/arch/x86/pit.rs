//! The 8253 programmable interval timer, driving IRQ 0 at `TIMER_FREQ`.

use x86::io;

use crate::config::TIMER_FREQ;

const PIT_BASE_FREQ: u64 = 1_193_182;

const CHANNEL0: u16 = 0x40;
const COMMAND: u16 = 0x43;

pub(crate) fn init() {
    let divisor = PIT_BASE_FREQ / TIMER_FREQ;
    assert!(divisor <= u16::MAX as u64);
    unsafe {
        // Channel 0, lobyte/hibyte, rate generator.
        io::outb(COMMAND, 0x34);
        io::outb(CHANNEL0, (divisor & 0xFF) as u8);
        io::outb(CHANNEL0, (divisor >> 8) as u8);
    }
}

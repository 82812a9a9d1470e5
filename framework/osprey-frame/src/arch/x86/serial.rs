//! The 16550 UART on COM1, polled. The console and the logger sit on
//! top of this.

use x86::io;

const COM1: u16 = 0x3F8;

const DATA: u16 = COM1;
const INT_ENABLE: u16 = COM1 + 1;
const FIFO_CTRL: u16 = COM1 + 2;
const LINE_CTRL: u16 = COM1 + 3;
const MODEM_CTRL: u16 = COM1 + 4;
const LINE_STATUS: u16 = COM1 + 5;

pub fn init() {
    unsafe {
        io::outb(INT_ENABLE, 0x00); // no interrupts, we poll
        io::outb(LINE_CTRL, 0x80); // DLAB on
        io::outb(DATA, 0x03); // divisor 3: 38400 baud
        io::outb(INT_ENABLE, 0x00);
        io::outb(LINE_CTRL, 0x03); // 8N1, DLAB off
        io::outb(FIFO_CTRL, 0xC7); // FIFO on, cleared, 14-byte threshold
        io::outb(MODEM_CTRL, 0x0B);
    }
}

pub fn send(byte: u8) {
    unsafe {
        while io::inb(LINE_STATUS) & 0x20 == 0 {
            core::hint::spin_loop();
        }
        if byte == b'\n' {
            io::outb(DATA, b'\r');
            while io::inb(LINE_STATUS) & 0x20 == 0 {
                core::hint::spin_loop();
            }
        }
        io::outb(DATA, byte);
    }
}

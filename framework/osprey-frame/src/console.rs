//! Console output over the serial line.

use core::fmt::{self, Write};

use crate::arch::serial;

struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            serial::send(byte);
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments) {
    // Serial output is polled; serialise whole lines by disabling
    // interrupts so a timer tick cannot interleave two writers.
    let _guard = crate::trap::disable_local();
    Stdout.write_fmt(args).unwrap();
}

#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    }
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n") };
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?))
    }
}

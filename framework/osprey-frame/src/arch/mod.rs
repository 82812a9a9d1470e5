cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86")] {
        mod x86;
        pub use self::x86::*;
    } else {
        compile_error!("osprey-frame only targets 32-bit x86");
    }
}

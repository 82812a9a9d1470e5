//! The module to parse kernel command-line arguments.
//!
//! Recognised tokens, all optional:
//!
//! - `-q`           power off once the boot actions complete
//! - `-f`           format the file system before mounting
//! - `-sched=X`     scheduling policy: `fifo`, `prio` or `mlfqs`
//! - `-T<secs>`     watchdog timeout for the boot actions
//! - `-rs=<seed>`   seed for the kernel's test randomness
//! - `run <prog..>` user program (and arguments) to run; consumes the
//!   rest of the line

use alloc::string::{String, ToString};

use log::warn;

/// Which scheduling policy to install at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Fifo,
    Priority,
    Mlfqs,
}

/// The struct to store the parsed kernel command-line arguments.
#[derive(Debug, Clone)]
pub struct KCmdlineArg {
    pub quiet_shutdown: bool,
    pub format_filesys: bool,
    pub scheduler: SchedulerKind,
    pub timeout_secs: Option<u64>,
    pub rng_seed: Option<u64>,
    pub run: Option<String>,
}

impl Default for KCmdlineArg {
    fn default() -> Self {
        KCmdlineArg {
            quiet_shutdown: false,
            format_filesys: false,
            scheduler: SchedulerKind::Priority,
            timeout_secs: None,
            rng_seed: None,
            run: None,
        }
    }
}

impl From<&str> for KCmdlineArg {
    fn from(cmdline: &str) -> Self {
        let mut result = KCmdlineArg::default();
        let mut tokens = cmdline.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "-q" => result.quiet_shutdown = true,
                "-f" => result.format_filesys = true,
                "run" => {
                    // Everything after `run` belongs to the program.
                    let rest: alloc::vec::Vec<&str> = tokens.by_ref().collect();
                    if rest.is_empty() {
                        warn!("kcmdline: `run` without a program");
                    } else {
                        result.run = Some(rest.join(" "));
                    }
                }
                _ => {
                    if let Some(policy) = token.strip_prefix("-sched=") {
                        result.scheduler = match policy {
                            "fifo" => SchedulerKind::Fifo,
                            "prio" => SchedulerKind::Priority,
                            "mlfqs" => SchedulerKind::Mlfqs,
                            other => {
                                warn!("kcmdline: unknown scheduler '{}'", other);
                                result.scheduler
                            }
                        };
                    } else if let Some(secs) = token.strip_prefix("-T") {
                        result.timeout_secs = secs.parse().ok();
                    } else if let Some(seed) = token.strip_prefix("-rs=") {
                        result.rng_seed = seed.parse().ok();
                    } else {
                        warn!("kcmdline: ignoring unknown token '{}'", token);
                    }
                }
            }
        }
        result
    }
}

impl KCmdlineArg {
    /// The program name and its arguments from the `run` clause.
    pub fn run_argv(&self) -> Option<alloc::vec::Vec<String>> {
        self.run
            .as_ref()
            .map(|line| line.split_whitespace().map(|s| s.to_string()).collect())
    }
}

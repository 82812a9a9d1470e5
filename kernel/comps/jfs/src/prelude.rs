#![allow(unused)]

pub(crate) use alloc::{
    boxed::Box,
    collections::{BTreeMap, VecDeque},
    string::{String, ToString},
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
pub(crate) use core::fmt::Debug;

pub(crate) use log::{debug, error, info, trace, warn};
pub(crate) use osprey_block::{BlockDevice, Partition, Sid, SECTOR_SIZE};

pub(crate) use crate::error::{Errno, Error};
pub(crate) use crate::{return_errno, return_errno_with_message};

pub(crate) type Result<T> = core::result::Result<T, Error>;

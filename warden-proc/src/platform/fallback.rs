//! Stub substrate for hosts without `/proc`. Enumeration reports an error
//! that the poll loop logs and survives; nothing is ever observed.

use std::io;

use super::RawProcess;

pub(crate) fn enumerate() -> io::Result<Vec<RawProcess>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process enumeration is only implemented for /proc hosts",
    ))
}

pub(crate) fn read_one(_pid: u32) -> Option<RawProcess> {
    None
}

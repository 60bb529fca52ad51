//! Ambient concerns shared by the mpx binaries

pub mod logging;

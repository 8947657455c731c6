//! UI module root: drawing functions for the session panels and the server overview.

pub mod browser;
pub mod cpu;
pub mod disks;
pub mod header;
pub mod mem;
pub mod net;
pub mod popup;
pub mod processes;
pub mod theme;
pub mod util;

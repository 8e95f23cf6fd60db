//! Failure injection for heap-file I/O.
//!
//! Each [`FailPoint`] guards one I/O path. A point fires when it is armed on
//! the current thread, or when its name appears in the comma-separated
//! `GRANITE_FAILPOINTS` environment variable.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::io;

pub const FAILPOINTS_VAR: &str = "GRANITE_FAILPOINTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Before a page is read from its table file.
    ReadPage,
    /// Before a page is written, including pages appended by inserts.
    WritePage,
}

impl FailPoint {
    pub const ALL: [FailPoint; 2] = [FailPoint::ReadPage, FailPoint::WritePage];

    pub fn name(self) -> &'static str {
        match self {
            FailPoint::ReadPage => "heap_file::read_page",
            FailPoint::WritePage => "heap_file::write_page",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|point| point.name() == name)
    }
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

thread_local! {
    static ARMED: RefCell<HashSet<FailPoint>> = RefCell::new(HashSet::new());
}

/// Arms `point` on the current thread.
pub fn enable(point: FailPoint) {
    ARMED.with(|armed| {
        armed.borrow_mut().insert(point);
    });
}

pub fn disable(point: FailPoint) {
    ARMED.with(|armed| {
        armed.borrow_mut().remove(&point);
    });
}

/// Disarms every point on the current thread.
pub fn clear() {
    ARMED.with(|armed| armed.borrow_mut().clear());
}

/// Points named in a `GRANITE_FAILPOINTS` value. Unknown names are ignored.
pub fn parse_list(raw: &str) -> Vec<FailPoint> {
    raw.split(',')
        .filter_map(|name| FailPoint::from_name(name.trim()))
        .collect()
}

pub fn is_enabled(point: FailPoint) -> bool {
    if ARMED.with(|armed| armed.borrow().contains(&point)) {
        return true;
    }
    std::env::var(FAILPOINTS_VAR)
        .map(|raw| parse_list(&raw).contains(&point))
        .unwrap_or(false)
}

/// An injected I/O error if `point` is enabled.
pub fn maybe_fail(point: FailPoint) -> io::Result<()> {
    if is_enabled(point) {
        Err(io::Error::other(format!("failpoint triggered: {point}")))
    } else {
        Ok(())
    }
}

//! Version overlay
//!
//! Which plan revision is on screen decides what the session allows. The
//! latest revision is fully editable. A historical revision is read-only:
//! pins are hidden, drawing tools are off and history cannot be replayed.
//! Annotations are not tied to revisions and pass through unchanged.

use crate::pin::Pin;

/// Current and viewed plan revision numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionOverlay {
    current_version: u32,
    viewed_version: u32,
}

impl VersionOverlay {
    /// Viewing the current revision
    pub fn new(current_version: u32) -> Self {
        Self {
            current_version,
            viewed_version: current_version,
        }
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn viewed_version(&self) -> u32 {
        self.viewed_version
    }

    /// Switch the viewed revision
    pub fn view(&mut self, version: u32) {
        self.viewed_version = version;
    }

    /// A newer revision was uploaded; follow it if the latest was on screen
    pub fn set_current(&mut self, version: u32) {
        let following = !self.is_historical();
        self.current_version = version;
        if following {
            self.viewed_version = version;
        }
    }

    /// Whether an older revision is on screen
    pub fn is_historical(&self) -> bool {
        self.viewed_version != self.current_version
    }

    pub fn editing_enabled(&self) -> bool {
        !self.is_historical()
    }

    /// Pins to show for the viewed revision
    pub fn visible_pins<'a>(&self, pins: &'a [Pin]) -> Vec<&'a Pin> {
        if self.is_historical() {
            return Vec::new();
        }
        pins.iter().collect()
    }
}

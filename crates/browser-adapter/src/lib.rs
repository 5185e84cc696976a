//! Chromium page driver for runcast.
//!
//! The orchestrator talks to pages through the [`DriverPage`] trait; the
//! concrete [`ChromiumDriver`] wires it to a Chromium process over CDP via
//! chromiumoxide. Tests substitute their own `DriverPage` implementations.

pub mod chromium;
pub mod error;
pub mod page;

pub use chromium::{ChromiumDriver, ChromiumPage, LaunchOptions};
pub use error::{DriverError, DriverErrorKind};
pub use page::{ConsoleNotice, DriverPage};

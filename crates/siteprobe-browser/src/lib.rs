//! Browser sessions for website audits.
//!
//! Provides a bounded pool of isolated Chromium sessions sharing one
//! lazily-launched browser process, behind traits the scan orchestrator
//! depends on.

pub mod console;
pub mod engine;
pub mod error;
pub mod page;
pub mod viewport;

pub use console::{ConsoleCapture, ConsoleLevel, ConsoleMessage};
pub use engine::{ChromiumPage, PooledSession, SessionPool};
pub use error::{BrowserError, Result};
pub use page::{BrowserPage, BrowserSession, NavigationResponse, SessionProvider};
pub use viewport::{ClientIdentity, Viewport};

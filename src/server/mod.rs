//! Server identity and launch plumbing.
//!
//! Covers the two supported runner kinds, the positional launch argument
//! contract, the classpath manifest, and browser URL construction.

pub mod browser;
pub mod classpath;
pub mod kind;
pub mod launch;

pub use browser::{BrowserLaunchRequest, BrowserOpener, SystemBrowser};
pub use classpath::ClasspathJarBuilder;
pub use kind::ServerKind;
pub use launch::LaunchDescriptor;

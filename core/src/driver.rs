//! Automation driver capability set. The authenticator and the orchestrator
//! see only this trait; selector lists are tried in order and the first
//! (visible) match wins, which tolerates target-markup drift across revisions.
//! The chromiumoxide backend lives in browser.rs behind the `browser` feature.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser backend: {0}")]
    Backend(String),
}

/// Opaque handle to an element the driver located. Valid until the next
/// navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub u64);

#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// First visible element matching any selector in the list, tried in
    /// order. Absence is a normal outcome, not an error.
    async fn find_visible(&self, selectors: &[&str]) -> Result<Option<ElementHandle>, DriverError>;

    /// First element present in the DOM, visible or not. Needed for hidden
    /// file inputs.
    async fn find_present(&self, selectors: &[&str]) -> Result<Option<ElementHandle>, DriverError>;

    async fn click(&self, el: &ElementHandle) -> Result<(), DriverError>;

    async fn type_text(&self, el: &ElementHandle, text: &str) -> Result<(), DriverError>;

    /// Empty an input or contenteditable element.
    async fn clear(&self, el: &ElementHandle) -> Result<(), DriverError>;

    /// Hand a local file to a file input (the CDP-native equivalent of typing
    /// a path into it).
    async fn upload_file(&self, el: &ElementHandle, path: &Path) -> Result<(), DriverError>;

    async fn attribute_of(
        &self,
        el: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn text_of(&self, el: &ElementHandle) -> Result<String, DriverError>;

    async fn is_displayed(&self, el: &ElementHandle) -> Result<bool, DriverError>;

    /// Point-in-time visual snapshot for diagnostics. Best effort; failures
    /// are logged by callers, never propagated into publish outcomes.
    async fn capture_snapshot(&self, label: &str) -> Result<PathBuf, DriverError>;

    /// Release the underlying browser. Called exactly once, last.
    async fn quit(&self) -> Result<(), DriverError>;
}

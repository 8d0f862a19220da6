//! Headless Chromium backend for the driver trait, CDP-native through
//! chromiumoxide. Element handles index into a per-page table that is cleared
//! on every navigation; a stale handle surfaces as NotFound, never as a panic.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::driver::{Driver, DriverError, ElementHandle};
use crate::log::prefix;

const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-notifications",
];

/// Visibility the way a user would judge it: a laid-out box that is not
/// display:none or visibility:hidden.
const IS_DISPLAYED_FN: &str = "function() {
    const r = this.getBoundingClientRect();
    const s = window.getComputedStyle(this);
    return r.width > 0 && r.height > 0
        && s.visibility !== 'hidden' && s.display !== 'none';
}";

/// Works for both value-carrying inputs and contenteditable nodes.
const CLEAR_FN: &str = "function() {
    if ('value' in this) { this.value = ''; }
    if (this.isContentEditable) { this.innerText = ''; }
    this.dispatchEvent(new Event('input', { bubbles: true }));
}";

pub struct HeadlessChrome {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
    elements: DashMap<u64, Arc<Element>>,
    next_handle: AtomicU64,
    snapshot_dir: PathBuf,
}

impl HeadlessChrome {
    pub async fn launch(snapshot_dir: &Path) -> Result<Self, DriverError> {
        let config = BrowserConfig::builder()
            .window_size(1920, 1080)
            .args(LAUNCH_ARGS.to_vec())
            .build()
            .map_err(DriverError::Backend)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(backend)?;

        // The handler stream must be drained for the CDP connection to make
        // progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    eprintln!("{} event=cdp_error error={}", prefix("browser"), e);
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(backend)?;
        std::fs::create_dir_all(snapshot_dir)
            .map_err(|e| DriverError::Backend(format!("snapshot dir: {}", e)))?;
        eprintln!("{} event=launched", prefix("browser"));

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
            elements: DashMap::new(),
            next_handle: AtomicU64::new(0),
            snapshot_dir: snapshot_dir.to_path_buf(),
        })
    }

    fn store(&self, element: Element) -> ElementHandle {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.elements.insert(id, Arc::new(element));
        ElementHandle(id)
    }

    fn lookup(&self, handle: &ElementHandle) -> Result<Arc<Element>, DriverError> {
        self.elements
            .get(&handle.0)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| DriverError::NotFound(format!("stale element handle {}", handle.0)))
    }

    async fn element_displayed(&self, element: &Element) -> Result<bool, DriverError> {
        let returns = element
            .call_js_fn(IS_DISPLAYED_FN, false)
            .await
            .map_err(backend)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn find(
        &self,
        selectors: &[&str],
        require_visible: bool,
    ) -> Result<Option<ElementHandle>, DriverError> {
        for selector in selectors.iter().copied() {
            // A selector matching nothing is reported as an error by the
            // protocol layer; try the next one.
            let Ok(found) = self.page.find_elements(selector).await else {
                continue;
            };
            for element in found {
                if require_visible && !self.element_displayed(&element).await? {
                    continue;
                }
                return Ok(Some(self.store(element)));
            }
        }
        Ok(None)
    }
}

fn backend(e: impl std::fmt::Display) -> DriverError {
    DriverError::Backend(e.to_string())
}

#[async_trait]
impl Driver for HeadlessChrome {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        eprintln!("{} event=navigate url={}", prefix("browser"), url);
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        // Handles from the previous document are dead now.
        self.elements.clear();
        Ok(())
    }

    async fn find_visible(&self, selectors: &[&str]) -> Result<Option<ElementHandle>, DriverError> {
        self.find(selectors, true).await
    }

    async fn find_present(&self, selectors: &[&str]) -> Result<Option<ElementHandle>, DriverError> {
        self.find(selectors, false).await
    }

    async fn click(&self, el: &ElementHandle) -> Result<(), DriverError> {
        self.lookup(el)?.click().await.map_err(backend)?;
        Ok(())
    }

    async fn type_text(&self, el: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let element = self.lookup(el)?;
        element.click().await.map_err(backend)?;
        element.type_str(text).await.map_err(backend)?;
        Ok(())
    }

    async fn clear(&self, el: &ElementHandle) -> Result<(), DriverError> {
        self.lookup(el)?
            .call_js_fn(CLEAR_FN, false)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn upload_file(&self, el: &ElementHandle, path: &Path) -> Result<(), DriverError> {
        let element = self.lookup(el)?;
        let params = SetFileInputFilesParams::builder()
            .file(path.to_string_lossy().to_string())
            .backend_node_id(element.backend_node_id.clone())
            .build()
            .map_err(DriverError::Backend)?;
        self.page.execute(params).await.map_err(backend)?;
        Ok(())
    }

    async fn attribute_of(
        &self,
        el: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.lookup(el)?.attribute(name).await.map_err(backend)
    }

    async fn text_of(&self, el: &ElementHandle) -> Result<String, DriverError> {
        Ok(self
            .lookup(el)?
            .inner_text()
            .await
            .map_err(backend)?
            .unwrap_or_default())
    }

    async fn is_displayed(&self, el: &ElementHandle) -> Result<bool, DriverError> {
        let element = self.lookup(el)?;
        self.element_displayed(&element).await
    }

    async fn capture_snapshot(&self, label: &str) -> Result<PathBuf, DriverError> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = self.snapshot_dir.join(format!("{}_{}.png", label, stamp));
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), &path)
            .await
            .map_err(backend)?;
        Ok(path)
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        browser.close().await.map_err(backend)?;
        let _ = browser.wait().await;
        self.handler_task.abort();
        eprintln!("{} event=closed", prefix("browser"));
        Ok(())
    }
}

//! In-memory fakes of the control channel and the automation driver, shared by
//! the unit tests across modules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::channel::transport::{
    ChannelError, ControlChannel, Cursor, MediaAttachment, RawMessage, MAX_ATTACHMENT_BYTES,
};
use crate::driver::{Driver, DriverError, ElementHandle};

// ---------------------------------------------------------------------------
// FakeChannel
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeChannelState {
    /// Messages that existed before the run started (drained by receive_tail).
    backlog: Vec<RawMessage>,
    /// Messages visible to receive_since, keyed off their update_id.
    live: Vec<RawMessage>,
    /// Cursor of every receive_since call, in order.
    receive_cursors: Vec<Cursor>,
    /// Next N receive_since calls fail with a transport error.
    receive_failures: u32,
    /// Next N receive_tail calls fail with a transport error.
    tail_failures: u32,
    sent: Vec<String>,
    attachments: HashMap<String, Vec<u8>>,
    fetch_calls: u32,
}

pub(crate) struct FakeChannel {
    state: Mutex<FakeChannelState>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeChannelState::default()),
        }
    }

    pub fn push_backlog(&self, msg: RawMessage) {
        self.state.lock().unwrap().backlog.push(msg);
    }

    pub fn push_live(&self, msg: RawMessage) {
        self.state.lock().unwrap().live.push(msg);
    }

    pub fn fail_receives(&self, n: u32) {
        self.state.lock().unwrap().receive_failures = n;
    }

    pub fn fail_tails(&self, n: u32) {
        self.state.lock().unwrap().tail_failures = n;
    }

    pub fn receive_cursors(&self) -> Vec<Cursor> {
        self.state.lock().unwrap().receive_cursors.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn put_attachment(&self, file_id: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .attachments
            .insert(file_id.to_string(), bytes);
    }

    pub fn fetch_calls(&self) -> u32 {
        self.state.lock().unwrap().fetch_calls
    }
}

#[async_trait]
impl ControlChannel for FakeChannel {
    async fn receive_since(&self, cursor: Cursor) -> Result<Vec<RawMessage>, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if state.receive_failures > 0 {
            state.receive_failures -= 1;
            return Err(ChannelError::Transport("injected".into()));
        }
        state.receive_cursors.push(cursor);
        Ok(state
            .live
            .iter()
            .filter(|m| m.update_id >= cursor.0)
            .cloned()
            .collect())
    }

    async fn receive_tail(&self) -> Result<Vec<RawMessage>, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if state.tail_failures > 0 {
            state.tail_failures -= 1;
            return Err(ChannelError::Transport("injected".into()));
        }
        Ok(state.backlog.clone())
    }

    async fn fetch_attachment(
        &self,
        attachment: &MediaAttachment,
    ) -> Result<Vec<u8>, ChannelError> {
        if attachment.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(ChannelError::SizeExceeded {
                size: attachment.size_bytes,
                limit: MAX_ATTACHMENT_BYTES,
            });
        }
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;
        state
            .attachments
            .get(&attachment.file_id)
            .cloned()
            .ok_or_else(|| ChannelError::Transport("no such attachment".into()))
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.state.lock().unwrap().sent.push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeDriver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeElement {
    pub visible: bool,
    pub text: String,
    pub attrs: HashMap<String, String>,
}

impl FakeElement {
    pub fn visible() -> Self {
        Self {
            visible: true,
            ..Default::default()
        }
    }

    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }
}

#[derive(Default)]
struct FakeDriverState {
    /// Selector -> element. Presence in the map is DOM presence.
    elements: HashMap<String, FakeElement>,
    /// Handle id -> selector it was resolved from.
    handles: Vec<String>,
    /// (selector, attr) -> number of attribute_of calls observed so far.
    attr_queries: HashMap<(String, String), u32>,
    /// (selector, attr) -> query count after which the attribute reads absent.
    /// Models e.g. the submit button losing `disabled` once an upload finishes.
    attr_gone_after: HashMap<(String, String), u32>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    cleared: Vec<String>,
    uploads: Vec<(String, String)>,
    snapshots: Vec<String>,
    quit: bool,
}

pub(crate) struct FakeDriver {
    state: Mutex<FakeDriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeDriverState::default()),
        }
    }

    pub fn put_element(&self, selector: &str, el: FakeElement) {
        self.state
            .lock()
            .unwrap()
            .elements
            .insert(selector.to_string(), el);
    }

    pub fn remove_element(&self, selector: &str) {
        self.state.lock().unwrap().elements.remove(selector);
    }

    /// After `n` attribute_of(selector, attr) calls, the attribute disappears.
    pub fn drop_attr_after(&self, selector: &str, attr: &str, n: u32) {
        self.state
            .lock()
            .unwrap()
            .attr_gone_after
            .insert((selector.to_string(), attr.to_string()), n);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.state.lock().unwrap().snapshots.clone()
    }

    pub fn did_quit(&self) -> bool {
        self.state.lock().unwrap().quit
    }

    fn selector_of(&self, el: &ElementHandle) -> Result<String, DriverError> {
        self.state
            .lock()
            .unwrap()
            .handles
            .get(el.0 as usize)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(format!("stale handle {}", el.0)))
    }

    fn resolve(&self, selectors: &[&str], require_visible: bool) -> Option<ElementHandle> {
        let mut state = self.state.lock().unwrap();
        for sel in selectors {
            if let Some(el) = state.elements.get(*sel) {
                if require_visible && !el.visible {
                    continue;
                }
                state.handles.push(sel.to_string());
                return Some(ElementHandle(state.handles.len() as u64 - 1));
            }
        }
        None
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.state.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn find_visible(&self, selectors: &[&str]) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self.resolve(selectors, true))
    }

    async fn find_present(&self, selectors: &[&str]) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self.resolve(selectors, false))
    }

    async fn click(&self, el: &ElementHandle) -> Result<(), DriverError> {
        let sel = self.selector_of(el)?;
        self.state.lock().unwrap().clicks.push(sel);
        Ok(())
    }

    async fn type_text(&self, el: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let sel = self.selector_of(el)?;
        self.state
            .lock()
            .unwrap()
            .typed
            .push((sel, text.to_string()));
        Ok(())
    }

    async fn clear(&self, el: &ElementHandle) -> Result<(), DriverError> {
        let sel = self.selector_of(el)?;
        self.state.lock().unwrap().cleared.push(sel);
        Ok(())
    }

    async fn upload_file(&self, el: &ElementHandle, path: &Path) -> Result<(), DriverError> {
        let sel = self.selector_of(el)?;
        self.state
            .lock()
            .unwrap()
            .uploads
            .push((sel, path.to_string_lossy().to_string()));
        Ok(())
    }

    async fn attribute_of(
        &self,
        el: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let sel = self.selector_of(el)?;
        let mut state = self.state.lock().unwrap();
        let key = (sel.clone(), name.to_string());
        let count = state.attr_queries.entry(key.clone()).or_insert(0);
        let seen = *count;
        *count += 1;
        if let Some(limit) = state.attr_gone_after.get(&key) {
            if seen >= *limit {
                return Ok(None);
            }
        }
        Ok(state
            .elements
            .get(&sel)
            .and_then(|e| e.attrs.get(name))
            .cloned())
    }

    async fn text_of(&self, el: &ElementHandle) -> Result<String, DriverError> {
        let sel = self.selector_of(el)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .elements
            .get(&sel)
            .map(|e| e.text.clone())
            .unwrap_or_default())
    }

    async fn is_displayed(&self, el: &ElementHandle) -> Result<bool, DriverError> {
        let sel = self.selector_of(el)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .elements
            .get(&sel)
            .map(|e| e.visible)
            .unwrap_or(false))
    }

    async fn capture_snapshot(&self, label: &str) -> Result<PathBuf, DriverError> {
        self.state.lock().unwrap().snapshots.push(label.to_string());
        Ok(PathBuf::from(format!("{}.png", label)))
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}

//! In-memory collaborators for unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::download_slots::{CompletionSender, DownloadHandle, ImageDownloader};
use crate::host::{EventTiming, Host, ScheduledTask, TaskKind};
use crate::model::{DownloadState, MaterialId, PanelScale, PeerId, SlideUrl, SyncedState, TextureId, WrapMode};
use crate::presentation::Surface;

pub(crate) fn urls(count: usize) -> Vec<SlideUrl> {
    (0..count)
        .map(|i| SlideUrl::parse(&format!("https://images.example.com/{}.png", i)).unwrap())
        .collect()
}

pub(crate) struct FakeHost {
    pub local: PeerId,
    pub owner: PeerId,
    pub authority: bool,
    pub serialized: Vec<SyncedState>,
    pub scheduled: Vec<(ScheduledTask, Duration, EventTiming)>,
    pub ownership_requests: Vec<PeerId>,
}

impl FakeHost {
    pub fn new(local: u32, owner: u32) -> Self {
        Self {
            local: PeerId(local),
            owner: PeerId(owner),
            authority: false,
            serialized: Vec::new(),
            scheduled: Vec::new(),
            ownership_requests: Vec::new(),
        }
    }

    /// Removes and returns the oldest scheduled task of `kind`.
    pub fn take_task(&mut self, kind: TaskKind) -> Option<(ScheduledTask, Duration, EventTiming)> {
        let position = self.scheduled.iter().position(|(task, _, _)| task.kind == kind)?;
        Some(self.scheduled.remove(position))
    }

    pub fn count(&self, kind: TaskKind) -> usize {
        self.scheduled.iter().filter(|(task, _, _)| task.kind == kind).count()
    }
}

impl Host for FakeHost {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn owner(&self) -> PeerId {
        self.owner
    }

    fn request_ownership(&mut self, peer: PeerId) {
        self.ownership_requests.push(peer);
        self.owner = peer;
    }

    fn is_session_authority(&self) -> bool {
        self.authority
    }

    fn request_serialization(&mut self, state: SyncedState) {
        self.serialized.push(state);
    }

    fn schedule(&mut self, task: ScheduledTask, delay: Duration, timing: EventTiming) {
        self.scheduled.push((task, delay, timing));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DownloadLog {
    Issued { id: usize, url: String },
    Released(usize),
}

#[derive(Default)]
pub(crate) struct FakeDownloader {
    log: Rc<RefCell<Vec<DownloadLog>>>,
    states: Vec<Rc<Cell<DownloadState>>>,
    pub receivers: Vec<CompletionSender>,
    pub wraps: Vec<WrapMode>,
}

impl FakeDownloader {
    pub fn log(&self) -> Vec<DownloadLog> {
        self.log.borrow().clone()
    }

    pub fn issued(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                DownloadLog::Issued { url, .. } => Some(url.clone()),
                DownloadLog::Released(_) => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<usize> {
        self.log
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                DownloadLog::Released(id) => Some(*id),
                DownloadLog::Issued { .. } => None,
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.states.iter().filter(|s| s.get() == DownloadState::Pending).count()
    }

    pub fn last_id(&self) -> usize {
        self.states.len() - 1
    }

    pub fn finish(&self, id: usize, state: DownloadState) {
        self.states[id].set(state);
    }
}

pub(crate) struct FakeHandle {
    id: usize,
    state: Rc<Cell<DownloadState>>,
    log: Rc<RefCell<Vec<DownloadLog>>>,
}

impl DownloadHandle for FakeHandle {
    fn state(&self) -> DownloadState {
        self.state.get()
    }

    fn release(self) {
        self.log.borrow_mut().push(DownloadLog::Released(self.id));
    }
}

impl ImageDownloader for FakeDownloader {
    type Handle = FakeHandle;

    fn download(
        &mut self,
        url: &SlideUrl,
        _material: &MaterialId,
        receiver: CompletionSender,
        wrap: WrapMode,
    ) -> FakeHandle {
        let id = self.states.len();
        let state = Rc::new(Cell::new(DownloadState::Pending));
        self.states.push(state.clone());
        self.receivers.push(receiver);
        self.wraps.push(wrap);
        self.log.borrow_mut().push(DownloadLog::Issued { id, url: url.to_string() });
        FakeHandle { id, state, log: self.log.clone() }
    }
}

pub(crate) struct FakeSurface {
    pub scale: PanelScale,
    pub error_visible: bool,
    pub error_text: String,
    pub textures: Vec<(MaterialId, TextureId)>,
    pub controls: Option<(bool, bool)>,
}

impl FakeSurface {
    pub fn with_scale(x: f32, y: f32) -> Self {
        Self {
            scale: PanelScale { x, y, z: 1.0 },
            error_visible: false,
            error_text: String::new(),
            textures: Vec::new(),
            controls: None,
        }
    }
}

impl Surface for FakeSurface {
    fn panel_scale(&self) -> PanelScale {
        self.scale
    }

    fn set_panel_scale(&mut self, scale: PanelScale) {
        self.scale = scale;
    }

    fn set_error_visible(&mut self, visible: bool) {
        self.error_visible = visible;
    }

    fn set_error_text(&mut self, text: &str) {
        self.error_text = text.to_string();
    }

    fn set_material_texture(&mut self, material: &MaterialId, texture: &TextureId) {
        self.textures.push((material.clone(), texture.clone()));
    }

    fn set_controls(&mut self, play_visible: bool, stop_visible: bool) {
        self.controls = Some((play_visible, stop_visible));
    }
}

//! Custom cursor state: pointer mirroring, hover and loading affordances.
//!
//! Anchor elements are destroyed by every content swap, so hover targets
//! are rebuilt wholesale after each navigation. Rebinding replaces the
//! target set under a generation counter; nothing accumulates across
//! swaps.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// Device capability query the cursor behavior splits on.
pub trait Detection: Send + Sync {
    fn is_desktop(&self) -> bool;
}

/// Fixed capability answer, for construction-time wiring and tests.
pub struct StaticDetection {
    desktop: bool,
}

impl StaticDetection {
    pub fn desktop() -> Self {
        Self { desktop: true }
    }

    pub fn touch() -> Self {
        Self { desktop: false }
    }
}

impl Detection for StaticDetection {
    fn is_desktop(&self) -> bool {
        self.desktop
    }
}

/// Transient action label shown inside the cursor; reset after every
/// navigation so a stale label never survives a content swap.
pub const DEFAULT_CURSOR_LABEL: &str = "Play";

#[derive(Debug, Clone, PartialEq)]
pub struct CursorSnapshot {
    pub x: f64,
    pub y: f64,
    pub hovering: bool,
    pub loading: bool,
    pub visible: bool,
    pub label: String,
}

#[derive(Debug)]
struct CursorState {
    x: f64,
    y: f64,
    hovering: bool,
    loading: bool,
    visible: bool,
    label: String,
    targets: HashSet<String>,
    generation: u64,
}

pub struct CursorController {
    detection: Arc<dyn Detection>,
    state: Mutex<CursorState>,
}

impl CursorController {
    pub fn new(detection: Arc<dyn Detection>) -> Self {
        let desktop = detection.is_desktop();
        Self {
            detection,
            state: Mutex::new(CursorState {
                // Touch devices park the hidden cursor at the viewport center.
                x: if desktop { 0.0 } else { 0.5 },
                y: if desktop { 0.0 } else { 0.5 },
                hovering: false,
                loading: false,
                visible: desktop,
                label: DEFAULT_CURSOR_LABEL.to_string(),
                targets: HashSet::new(),
                generation: 0,
            }),
        }
    }

    /// Mirrors the pointer position. A no-op on touch devices, which have
    /// no pointer to follow.
    pub fn on_pointer_move(&self, x: f64, y: f64) {
        if !self.detection.is_desktop() {
            return;
        }
        let mut state = self.state.lock();
        state.x = x;
        state.y = y;
    }

    pub fn on_pointer_over(&self, href: &str) {
        let mut state = self.state.lock();
        if state.targets.contains(href) {
            state.hovering = true;
        }
    }

    pub fn on_pointer_out(&self, href: &str) {
        let mut state = self.state.lock();
        if state.targets.contains(href) {
            state.hovering = false;
        }
    }

    /// Navigation started: loading affordance on. Touch devices reveal the
    /// cursor for the duration of the load.
    pub fn begin_loading(&self) {
        let mut state = self.state.lock();
        state.loading = true;
        if !self.detection.is_desktop() {
            state.visible = true;
        }
    }

    /// Navigation finished (success or failure): loading affordance off.
    pub fn end_loading(&self) {
        let mut state = self.state.lock();
        state.loading = false;
        if !self.detection.is_desktop() {
            state.visible = false;
        }
    }

    /// Replaces the hover target set after a content swap. Old targets are
    /// gone with the old anchors; hover state never carries over.
    pub fn rebind_hover_targets(&self, anchors: &[String]) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.targets = anchors.iter().cloned().collect();
        state.hovering = false;
        trace!(
            generation = state.generation,
            targets = state.targets.len(),
            "hover targets rebound"
        );
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.state.lock().label = label.into();
    }

    pub fn reset_label(&self) {
        self.state.lock().label = DEFAULT_CURSOR_LABEL.to_string();
    }

    /// How many times the hover targets have been rebuilt.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        let state = self.state.lock();
        CursorSnapshot {
            x: state.x,
            y: state.y,
            hovering: state.hovering,
            loading: state.loading,
            visible: state.visible,
            label: state.label.clone(),
        }
    }
}

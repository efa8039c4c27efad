//! Camera state shared between the main thread and a render thread.
//!
//! Eight f32 slots, each stored as an atomic 32-bit word. There is no lock:
//! a reader may see fields from two different writes. Readers treat the
//! dirty slot as the only signal that matters and recompute the frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const POSITION_X: usize = 0;
pub const POSITION_Y: usize = 1;
pub const SCALE: usize = 2;
pub const DPR: usize = 3;
pub const WIDTH: usize = 4;
pub const HEIGHT: usize = 5;
pub const DIRTY: usize = 6;
pub const RESERVED: usize = 7;

pub const VIEWPORT_SLOTS: usize = 8;
pub const VIEWPORT_BYTES: usize = VIEWPORT_SLOTS * 4;

/// Smallest scale used for geometry; a zero scale would divide by zero.
pub const MIN_SCALE: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct ViewportBuffer {
    slots: Arc<[AtomicU32; VIEWPORT_SLOTS]>,
}

impl ViewportBuffer {
    /// All zero except scale 1.0 and dirty set.
    pub fn create() -> Self {
        let buffer = Self {
            slots: Arc::new(std::array::from_fn(|_| AtomicU32::new(0))),
        };
        buffer.set(SCALE, 1.0);
        buffer.set(DIRTY, 1.0);
        buffer
    }

    /// Rebuild a buffer from its 32-byte little-endian image.
    pub fn from_bytes(bytes: &[u8; VIEWPORT_BYTES]) -> Self {
        let slots = std::array::from_fn(|i| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            AtomicU32::new(u32::from_le_bytes(word))
        });
        Self {
            slots: Arc::new(slots),
        }
    }

    pub fn to_bytes(&self) -> [u8; VIEWPORT_BYTES] {
        let mut out = [0u8; VIEWPORT_BYTES];
        for (i, slot) in self.slots.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&slot.load(Ordering::Relaxed).to_le_bytes());
        }
        out
    }

    fn get(&self, slot: usize) -> f32 {
        f32::from_bits(self.slots[slot].load(Ordering::Relaxed))
    }

    fn set(&self, slot: usize, value: f32) {
        self.slots[slot].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Store the fields present in `update`; the rest keep their value.
    pub fn write(&self, update: &ViewportUpdate) {
        let fields = [
            (POSITION_X, update.position_x),
            (POSITION_Y, update.position_y),
            (SCALE, update.scale),
            (DPR, update.dpr),
            (WIDTH, update.width),
            (HEIGHT, update.height),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                self.set(slot, value);
            }
        }
        if let Some(dirty) = update.dirty {
            self.set(DIRTY, if dirty { 1.0 } else { 0.0 });
        }
    }

    pub fn read(&self) -> ViewportState {
        ViewportState {
            position_x: self.get(POSITION_X),
            position_y: self.get(POSITION_Y),
            scale: self.get(SCALE),
            dpr: self.get(DPR),
            width: self.get(WIDTH),
            height: self.get(HEIGHT),
            dirty: self.get(DIRTY) != 0.0,
        }
    }

    pub fn mark_dirty(&self) {
        self.set(DIRTY, 1.0);
    }

    pub fn mark_clean(&self) {
        self.set(DIRTY, 0.0);
    }

    pub fn is_dirty(&self) -> bool {
        self.get(DIRTY) != 0.0
    }

    /// Clear the dirty flag and report whether it was set, in one step.
    pub fn take_dirty(&self) -> bool {
        f32::from_bits(self.slots[DIRTY].swap(0.0f32.to_bits(), Ordering::Relaxed)) != 0.0
    }
}

impl Default for ViewportBuffer {
    fn default() -> Self {
        Self::create()
    }
}

/// Partial write; `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewportUpdate {
    pub position_x: Option<f32>,
    pub position_y: Option<f32>,
    pub scale: Option<f32>,
    pub dpr: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub dirty: Option<bool>,
}

impl ViewportUpdate {
    pub fn position(mut self, x: f32, y: f32) -> Self {
        self.position_x = Some(x);
        self.position_y = Some(y);
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn dpr(mut self, dpr: f32) -> Self {
        self.dpr = Some(dpr);
        self
    }

    pub fn size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn dirty(mut self, dirty: bool) -> Self {
        self.dirty = Some(dirty);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub position_x: f32,
    pub position_y: f32,
    pub scale: f32,
    pub dpr: f32,
    pub width: f32,
    pub height: f32,
    pub dirty: bool,
}

/// Visible area in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleBounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportState {
    /// Scale times device pixel ratio, with both clamped to sane minimums.
    pub fn effective_scale(&self) -> f32 {
        self.scale.max(MIN_SCALE) * self.dpr.max(1.0)
    }

    /// Device pixels to world coordinates.
    pub fn screen_to_world(&self, screen_x: f32, screen_y: f32) -> (f32, f32) {
        let s = self.effective_scale();
        (self.position_x + screen_x / s, self.position_y + screen_y / s)
    }

    pub fn world_to_screen(&self, world_x: f32, world_y: f32) -> (f32, f32) {
        let s = self.effective_scale();
        ((world_x - self.position_x) * s, (world_y - self.position_y) * s)
    }

    pub fn visible_bounds(&self) -> VisibleBounds {
        let (left, top) = self.screen_to_world(0.0, 0.0);
        let (right, bottom) = self.screen_to_world(self.width, self.height);
        VisibleBounds {
            left,
            top,
            right,
            bottom,
            width: right - left,
            height: bottom - top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn create_defaults() {
        let state = ViewportBuffer::create().read();
        assert_eq!(state.scale, 1.0);
        assert!(state.dirty);
        assert_eq!(
            (state.position_x, state.position_y, state.dpr, state.width, state.height),
            (0.0, 0.0, 0.0, 0.0, 0.0)
        );
    }

    #[test]
    fn partial_write_keeps_other_fields() {
        let buffer = ViewportBuffer::create();
        buffer.mark_clean();
        buffer.write(&ViewportUpdate::default().size(800.0, 600.0));
        buffer.write(&ViewportUpdate::default().position(10.0, 20.0));
        let state = buffer.read();
        assert_eq!((state.width, state.height), (800.0, 600.0));
        assert_eq!((state.position_x, state.position_y), (10.0, 20.0));
        assert_eq!(state.scale, 1.0);
        assert!(!state.dirty);
    }

    #[test]
    fn dirty_flag_helpers() {
        let buffer = ViewportBuffer::create();
        assert!(buffer.take_dirty());
        assert!(!buffer.is_dirty());
        assert!(!buffer.take_dirty());
        buffer.mark_dirty();
        assert!(buffer.is_dirty());
    }

    #[test]
    fn byte_image_layout() {
        let buffer = ViewportBuffer::create();
        buffer.write(&ViewportUpdate::default().dpr(2.0));
        let bytes = buffer.to_bytes();
        assert_eq!(&bytes[SCALE * 4..SCALE * 4 + 4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[DPR * 4..DPR * 4 + 4], &2.0f32.to_le_bytes());
        assert_eq!(ViewportBuffer::from_bytes(&bytes).read(), buffer.read());
    }

    #[test]
    fn geometry_clamps_scale_and_dpr() {
        let state = ViewportState {
            position_x: 100.0,
            position_y: 50.0,
            scale: 0.0,
            dpr: 0.0,
            width: 10.0,
            height: 5.0,
            dirty: false,
        };
        assert_eq!(state.effective_scale(), MIN_SCALE);

        let state = ViewportState {
            scale: 2.0,
            dpr: 1.5,
            ..state
        };
        assert_eq!(state.world_to_screen(110.0, 50.0), (30.0, 0.0));
        assert_eq!(state.screen_to_world(30.0, 0.0), (110.0, 50.0));
        let bounds = state.visible_bounds();
        assert_eq!((bounds.left, bounds.top), (100.0, 50.0));
        assert!((bounds.width - 10.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn writes_are_visible_across_threads() {
        let buffer = ViewportBuffer::create();
        buffer.mark_clean();
        let writer = buffer.clone();
        thread::spawn(move || {
            writer.write(&ViewportUpdate::default().scale(4.0).dirty(true));
        })
        .join()
        .unwrap();
        assert!(buffer.take_dirty());
        assert_eq!(buffer.read().scale, 4.0);
    }
}

//! Transient camera frames.
//!
//! - `Frame`: RGB24 pixel buffer owned by a frame source and reused between
//!   reads.
//! - `FrameView`: borrow-only view handed to inference. Estimators read the
//!   pixels during `estimate` and cannot keep them: the view and every slice
//!   obtained from it are tied to the source's borrow.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// One RGB24 frame.
///
/// Deliberately not `Clone`: a frame lives in its source's buffer and is
/// overwritten by the next read.
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        check_len(data.len(), width, height)?;
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Blank frame used as a reusable buffer before the first read.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; rgb_len(width, height)],
            width,
            height,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Overwrite this frame in place, reusing the allocation.
    pub fn refill(&mut self, pixels: &[u8], width: u32, height: u32, sequence: u64) -> Result<()> {
        check_len(pixels.len(), width, height)?;
        self.data.clear();
        self.data.extend_from_slice(pixels);
        self.width = width;
        self.height = height;
        self.sequence = sequence;
        self.captured_at = Instant::now();
        Ok(())
    }

    /// Overwrite this frame by filling each pixel from a generator.
    pub fn fill_with(
        &mut self,
        width: u32,
        height: u32,
        sequence: u64,
        mut pixel: impl FnMut(u32, u32) -> [u8; 3],
    ) {
        self.data.resize(rgb_len(width, height), 0);
        for y in 0..height {
            for x in 0..width {
                let offset = ((y * width + x) * 3) as usize;
                self.data[offset..offset + 3].copy_from_slice(&pixel(x, y));
            }
        }
        self.width = width;
        self.height = height;
        self.sequence = sequence;
        self.captured_at = Instant::now();
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView { frame: self }
    }
}

/// Read-only view of a frame for the duration of one inference call.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
}

impl<'a> FrameView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence
    }

    /// Packed RGB24 rows.
    pub fn pixels(&self) -> &[u8] {
        &self.frame.data
    }

    /// RGB value at `(x, y)`, or `None` outside the frame.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.frame.width || y >= self.frame.height {
            return None;
        }
        let offset = ((y * self.frame.width + x) * 3) as usize;
        let px = &self.frame.data[offset..offset + 3];
        Some([px[0], px[1], px[2]])
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn check_len(len: usize, width: u32, height: u32) -> Result<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if len != expected {
        return Err(anyhow!(
            "expected {} RGB bytes for {}x{}, received {}",
            expected,
            width,
            height,
            len
        ));
    }
    Ok(())
}

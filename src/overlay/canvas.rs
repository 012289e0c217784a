use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

/// Drawing target for the overlay renderer.
///
/// Colors are packed 0xRRGGBB. Coordinates outside the surface are clipped.
pub trait OverlaySurface: Send {
    fn size(&self) -> (u32, u32);

    /// Match the surface to the frame it is drawn over.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) -> Result<()>;

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) -> Result<()>;

    /// Make the finished drawing visible.
    fn present(&mut self) -> Result<()>;
}

/// In-memory overlay buffer.
pub struct Canvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    presented: u64,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: vec![0u32; width as usize * height as usize],
            width: width as usize,
            height: height as usize,
            presented: 0,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.buffer[y * self.width + x])
    }

    /// Number of non-background pixels.
    pub fn painted(&self) -> usize {
        self.buffer.iter().filter(|&&p| p != 0).count()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    fn set_pixel(&mut self, x: i64, y: i64, color: u32) {
        if x >= 0 && x < self.width as i64 && y >= 0 && y < self.height as i64 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }

    /// Liang-Barsky clip of a segment to the canvas rectangle, rounded back
    /// to pixel endpoints. `None` when nothing of it is visible.
    fn clip(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Option<(i64, i64, i64, i64)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let (x0, y0) = (f64::from(x0), f64::from(y0));
        let (dx, dy) = (f64::from(x1) - x0, f64::from(y1) - y0);
        let (max_x, max_y) = ((self.width - 1) as f64, (self.height - 1) as f64);

        let (mut t0, mut t1) = (0.0f64, 1.0f64);
        for (p, q) in [(-dx, x0), (dx, max_x - x0), (-dy, y0), (dy, max_y - y0)] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
            if t0 > t1 {
                return None;
            }
        }

        let point = |t: f64| {
            (
                (x0 + t * dx).round().clamp(0.0, max_x) as i64,
                (y0 + t * dy).round().clamp(0.0, max_y) as i64,
            )
        };
        let ((cx0, cy0), (cx1, cy1)) = (point(t0), point(t1));
        Some((cx0, cy0, cx1, cy1))
    }
}

impl OverlaySurface for Canvas {
    fn size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width as usize;
        self.height = height as usize;
        self.buffer.clear();
        self.buffer.resize(self.width * self.height, 0);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.buffer.fill(0);
        Ok(())
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) -> Result<()> {
        if radius < 0 || self.width == 0 || self.height == 0 {
            return Ok(());
        }
        let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(radius));
        let (max_x, max_y) = (self.width as i64 - 1, self.height as i64 - 1);
        let (x_lo, x_hi) = ((cx - r).max(0), (cx + r).min(max_x));
        let (y_lo, y_hi) = ((cy - r).max(0), (cy + r).min(max_y));
        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r * r {
                    self.buffer[y as usize * self.width + x as usize] = color;
                }
            }
        }
        Ok(())
    }

    /// Bresenham over the part of the segment inside the canvas.
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) -> Result<()> {
        let Some((x0, y0, x1, y1)) = self.clip(x0, y0, x1, y1) else {
            return Ok(());
        };
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}

/// Lets a caller keep a handle on a surface the controller draws into.
impl<S: OverlaySurface> OverlaySurface for Arc<Mutex<S>> {
    fn size(&self) -> (u32, u32) {
        self.lock().map(|s| s.size()).unwrap_or((0, 0))
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        locked(self)?.resize(width, height)
    }

    fn clear(&mut self) -> Result<()> {
        locked(self)?.clear()
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) -> Result<()> {
        locked(self)?.fill_circle(cx, cy, radius, color)
    }

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) -> Result<()> {
        locked(self)?.draw_line(x0, y0, x1, y1, color)
    }

    fn present(&mut self) -> Result<()> {
        locked(self)?.present()
    }
}

fn locked<S>(shared: &Arc<Mutex<S>>) -> Result<std::sync::MutexGuard<'_, S>> {
    shared
        .lock()
        .map_err(|_| anyhow!("overlay surface lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_covers_both_endpoints() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line(1, 1, 8, 5, 0xFF).unwrap();
        assert_eq!(canvas.pixel(1, 1), Some(0xFF));
        assert_eq!(canvas.pixel(8, 5), Some(0xFF));
    }

    #[test]
    fn drawing_is_clipped_to_bounds() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_circle(-10, -10, 3, 0xFF).unwrap();
        canvas.draw_line(-5, 2, 20, 2, 0xAA).unwrap();
        assert_eq!(canvas.painted(), 4);
    }

    #[test]
    fn far_off_canvas_coordinates_are_clipped() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line(i32::MIN, 5, i32::MAX, 5, 0xAA).unwrap();
        assert_eq!(canvas.painted(), 10);
        assert_eq!(canvas.pixel(0, 5), Some(0xAA));
        assert_eq!(canvas.pixel(9, 5), Some(0xAA));

        canvas.clear().unwrap();
        canvas.draw_line(-2_147_483_000, 10, 2_147_483_000, 10, 0xAA).unwrap();
        canvas.draw_line(i32::MAX, i32::MIN, i32::MAX, i32::MAX, 0xAA).unwrap();
        assert_eq!(canvas.painted(), 0);

        canvas.draw_line(i32::MIN, i32::MIN, i32::MAX, i32::MAX, 0xBB).unwrap();
        assert!(canvas.painted() > 0);
    }

    #[test]
    fn huge_radius_fills_only_the_canvas() {
        let mut canvas = Canvas::new(6, 4);
        canvas.fill_circle(i32::MAX, i32::MAX, 4, 0xFF).unwrap();
        assert_eq!(canvas.painted(), 0);
        canvas.fill_circle(3, 2, i32::MAX, 0xFF).unwrap();
        assert_eq!(canvas.painted(), 24);
        canvas.clear().unwrap();
        canvas.fill_circle(i32::MIN, 0, i32::MAX, 0xFF).unwrap();
    }

    #[test]
    fn resize_resets_buffer() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_circle(1, 1, 1, 0xFF).unwrap();
        canvas.resize(8, 2).unwrap();
        assert_eq!(canvas.size(), (8, 2));
        assert_eq!(canvas.painted(), 0);
    }
}

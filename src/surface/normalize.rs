//! Conversion of camera pixel formats into packed RGB24.
//!
//! Output is written into a caller-owned buffer so capture threads can reuse
//! one allocation per stream.

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    /// Bytes a frame of this format occupies.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let len = match self {
            Self::Rgb24 => pixels.checked_mul(3),
            Self::Nv12 => pixels.checked_add(pixels / 2),
            Self::Yuyv => pixels.checked_mul(2),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

/// Convert `pixels` into RGB24, replacing the contents of `out`.
pub fn to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    out: &mut Vec<u8>,
) -> Result<()> {
    let expected = format.frame_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    out.clear();
    match format {
        PixelFormat::Rgb24 => out.extend_from_slice(pixels),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width as usize, height as usize, out),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, out),
    }
    Ok(())
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize, out: &mut Vec<u8>) {
    let y_plane = w * h;
    out.reserve(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            out.extend_from_slice(&yuv_to_rgb(
                pixels[j * w + i],
                pixels[uv_index],
                pixels[uv_index + 1],
            ));
        }
    }
}

// Packed 4:2:2, two pixels per Y0 U Y1 V quad.
fn yuyv_to_rgb(pixels: &[u8], out: &mut Vec<u8>) {
    out.reserve(pixels.len() / 2 * 3);
    for quad in pixels.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        out.extend_from_slice(&yuv_to_rgb(y0, u, v));
        out.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let mut rgb = Vec::new();
        to_rgb(&nv12, 2, 2, PixelFormat::Nv12, &mut rgb)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn yuyv_conversion_expands_pairs() -> Result<()> {
        let yuyv = [16u8, 128, 235, 128];
        let mut rgb = vec![9u8; 3];
        to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv, &mut rgb)?;
        assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let mut rgb = Vec::new();
        to_rgb(&pixels, 1, 3, PixelFormat::Rgb24, &mut rgb)?;
        assert_eq!(rgb, pixels);
        assert!(to_rgb(&pixels, 2, 3, PixelFormat::Rgb24, &mut rgb).is_err());
        Ok(())
    }
}

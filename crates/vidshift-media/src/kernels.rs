//! Per-frame pixel kernels.

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use vidshift_models::FrameFilter;

/// Gaussian sigma matching a 15x15 kernel.
pub const BLUR_SIGMA: f32 = 2.6;

/// 3x3 sharpening kernel (sums to 1).
pub const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Hysteresis thresholds for edge detection.
pub const EDGE_LOW_THRESHOLD: u32 = 100;
pub const EDGE_HIGH_THRESHOLD: u32 = 200;

/// Apply a frame filter. `FrameFilter::None` returns the frame unchanged.
pub fn apply_frame_filter(filter: FrameFilter, frame: RgbImage) -> RgbImage {
    match filter {
        FrameFilter::None => frame,
        FrameFilter::Blur => imageops::blur(&frame, BLUR_SIGMA),
        FrameFilter::Sharpen => imageops::filter3x3(&frame, &SHARPEN_KERNEL),
        FrameFilter::EdgeDetect => {
            let edges = detect_edges(&imageops::grayscale(&frame), EDGE_LOW_THRESHOLD, EDGE_HIGH_THRESHOLD);
            gray_to_rgb(&edges)
        }
    }
}

/// Canny-style edge map: Sobel gradients, non-maximum suppression and
/// hysteresis. Edge pixels are 255, everything else 0.
pub fn detect_edges(gray: &GrayImage, low: u32, high: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut out = GrayImage::new(width, height);
    if w < 3 || h < 3 {
        return out;
    }

    let px = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32)[0] as i32;

    let mut magnitude = vec![0u32; w * h];
    let mut direction = vec![0u8; w * h];

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = -px(x - 1, y - 1) - 2 * px(x - 1, y) - px(x - 1, y + 1)
                + px(x + 1, y - 1)
                + 2 * px(x + 1, y)
                + px(x + 1, y + 1);
            let gy = -px(x - 1, y - 1) - 2 * px(x, y - 1) - px(x + 1, y - 1)
                + px(x - 1, y + 1)
                + 2 * px(x, y + 1)
                + px(x + 1, y + 1);

            let idx = y * w + x;
            magnitude[idx] = gx.unsigned_abs() + gy.unsigned_abs();
            direction[idx] = quantize_direction(gx, gy);
        }
    }

    // 0 = none, 1 = weak, 2 = strong
    let mut class = vec![0u8; w * h];
    let mut stack = Vec::new();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let (a, b) = match direction[idx] {
                0 => (idx - 1, idx + 1),
                1 => (idx - w + 1, idx + w - 1),
                2 => (idx - w, idx + w),
                _ => (idx - w - 1, idx + w + 1),
            };
            if m < magnitude[a] || m < magnitude[b] {
                continue;
            }

            if m > high {
                class[idx] = 2;
                stack.push(idx);
            } else {
                class[idx] = 1;
            }
        }
    }

    while let Some(idx) = stack.pop() {
        let (x, y) = (idx % w, idx / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if class[n] == 1 {
                    class[n] = 2;
                    stack.push(n);
                }
            }
        }
    }

    for (idx, c) in class.iter().enumerate() {
        if *c == 2 {
            out.put_pixel((idx % w) as u32, (idx / w) as u32, Luma([255]));
        }
    }
    out
}

/// Gradient direction in four bins: horizontal, 45°, vertical, 135°.
fn quantize_direction(gx: i32, gy: i32) -> u8 {
    let angle = (gy as f64).atan2(gx as f64).to_degrees();
    let angle = if angle < 0.0 { angle + 180.0 } else { angle };
    if !(22.5..157.5).contains(&angle) {
        0
    } else if angle < 67.5 {
        1
    } else if angle < 112.5 {
        2
    } else {
        3
    }
}

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

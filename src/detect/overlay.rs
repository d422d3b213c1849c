use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use super::types::{DetectionResult, Landmark};

const POINT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const EDGE_COLOR: Rgb<u8> = Rgb([200, 200, 200]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MASK_COLOR: Rgb<u8> = Rgb([0, 160, 255]);
const MASK_OPACITY: f32 = 0.4;
const POINT_RADIUS: i32 = 3;

/// Landmarks below this visibility are not drawn.
const MIN_VISIBILITY: f32 = 0.3;

/// Draw the mask, skeletons, edges and (optionally) boxes of `result`
/// onto `frame`.
pub fn draw_result(
    frame: &mut RgbImage,
    result: &DetectionResult,
    edges: &[(usize, usize)],
    draw_bbox: bool,
) {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    if let Some(mask) = &result.mask {
        blend_mask(frame, mask);
    }

    if draw_bbox {
        for bbox in &result.boxes {
            let (x1, y1, x2, y2) = bbox.to_pixels(width, height);
            let w = (x2 - x1).round().max(1.0) as u32;
            let h = (y2 - y1).round().max(1.0) as u32;
            draw_hollow_rect_mut(
                frame,
                Rect::at(x1.round() as i32, y1.round() as i32).of_size(w, h),
                BOX_COLOR,
            );
        }
    }

    for skeleton in &result.skeletons {
        for &(a, b) in edges {
            let (Some(pa), Some(pb)) = (skeleton.get(a), skeleton.get(b)) else {
                continue;
            };
            if !visible(pa) || !visible(pb) {
                continue;
            }
            draw_line_segment_mut(
                frame,
                to_pixel(pa, width, height),
                to_pixel(pb, width, height),
                EDGE_COLOR,
            );
        }

        for landmark in skeleton.iter().filter(|lm| visible(lm)) {
            let (x, y) = to_pixel(landmark, width, height);
            draw_filled_circle_mut(
                frame,
                (x.round() as i32, y.round() as i32),
                POINT_RADIUS,
                POINT_COLOR,
            );
        }
    }
}

/// Tint the subject area of `frame`, weighted by the matte value.
///
/// A mask of a different size is stretched to the frame first.
pub fn blend_mask(frame: &mut RgbImage, mask: &GrayImage) {
    let (width, height) = frame.dimensions();
    if mask.width() == 0 || mask.height() == 0 || width == 0 || height == 0 {
        return;
    }

    let resized;
    let mask = if mask.dimensions() == (width, height) {
        mask
    } else {
        resized = imageops::resize(mask, width, height, FilterType::Triangle);
        &resized
    };

    for (pixel, alpha) in frame.pixels_mut().zip(mask.pixels()) {
        let weight = MASK_OPACITY * f32::from(alpha[0]) / 255.0;
        for channel in 0..3 {
            let mixed = f32::from(pixel[channel]) * (1.0 - weight)
                + f32::from(MASK_COLOR[channel]) * weight;
            pixel[channel] = mixed.round() as u8;
        }
    }
}

fn visible(landmark: &Landmark) -> bool {
    landmark.visibility >= MIN_VISIBILITY
}

fn to_pixel(landmark: &Landmark, width: u32, height: u32) -> (f32, f32) {
    (
        landmark.x.clamp(0.0, 1.0) * (width - 1) as f32,
        landmark.y.clamp(0.0, 1.0) * (height - 1) as f32,
    )
}

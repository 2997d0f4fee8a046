//! Content-aware crop selection
//!
//! Scores candidate crop rectangles of a target aspect ratio against an
//! importance map built from edge detail, skin tones and saturation, and
//! returns the best one. Analysis runs on a downsampled copy; the winning
//! rectangle is mapped back to source coordinates.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

/// Shorter side of the analysis image
const ANALYSIS_MIN_SIDE: u32 = 256;
/// Upper bound on the longer side of the analysis image
const ANALYSIS_MAX_SIDE: u32 = 1024;

const DETAIL_WEIGHT: f64 = 0.2;
const SKIN_COLOR: [f64; 3] = [0.78, 0.57, 0.44];
const SKIN_BIAS: f64 = 0.01;
const SKIN_BRIGHTNESS_MIN: f64 = 0.2;
const SKIN_BRIGHTNESS_MAX: f64 = 1.0;
const SKIN_THRESHOLD: f64 = 0.8;
const SKIN_WEIGHT: f64 = 1.8;
const SATURATION_BRIGHTNESS_MIN: f64 = 0.05;
const SATURATION_BRIGHTNESS_MAX: f64 = 0.9;
const SATURATION_THRESHOLD: f64 = 0.4;
const SATURATION_BIAS: f64 = 0.2;
const SATURATION_WEIGHT: f64 = 0.3;
const SCORE_DOWN_SAMPLE: u32 = 8;
const STEP: u32 = 8;
const MAX_SCALE: f64 = 1.0;
const MIN_SCALE: f64 = 0.6;
const SCALE_STEP: f64 = 0.1;
const EDGE_RADIUS: f64 = 0.4;
const EDGE_WEIGHT: f64 = -20.0;
const OUTSIDE_IMPORTANCE: f64 = -0.5;

/// A crop rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-pixel features, each in `0.0..=1.0`
struct FeatureMap {
    width: u32,
    height: u32,
    detail: Vec<f64>,
    skin: Vec<f64>,
    saturation: Vec<f64>,
}

impl FeatureMap {
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }
}

/// Find the best crop of `img` for a `target_width` x `target_height` output.
///
/// Returns `None` for an empty image or a zero-sized target. The returned
/// rectangle always lies inside the image and has (approximately) the target
/// aspect ratio; it is not guaranteed to be exactly the target size.
pub fn find_best_crop(
    img: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Option<CropRect> {
    let (img_w, img_h) = img.dimensions();
    if img_w == 0 || img_h == 0 || target_width == 0 || target_height == 0 {
        return None;
    }

    // Largest rectangle of the target aspect ratio that fits the image
    let fit = f64::min(
        img_w as f64 / target_width as f64,
        img_h as f64 / target_height as f64,
    );
    let crop_w = ((target_width as f64 * fit).floor() as u32).clamp(1, img_w);
    let crop_h = ((target_height as f64 * fit).floor() as u32).clamp(1, img_h);

    let prescale = analysis_scale(img_w, img_h);
    let analysis = if prescale < 1.0 {
        let w = ((img_w as f64 * prescale).round() as u32).max(1);
        let h = ((img_h as f64 * prescale).round() as u32).max(1);
        img.resize_exact(w, h, FilterType::Triangle).to_rgb8()
    } else {
        img.to_rgb8()
    };

    let features = analyse(&analysis);
    let scaled_w = ((crop_w as f64 * prescale).floor() as u32).clamp(1, features.width);
    let scaled_h = ((crop_h as f64 * prescale).floor() as u32).clamp(1, features.height);

    let best = candidate_crops(features.width, features.height, scaled_w, scaled_h)
        .into_iter()
        .map(|crop| (score(&features, &crop), crop))
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, crop)| crop)?;

    Some(to_source(best, prescale, img_w, img_h))
}

/// Downscale factor for analysis: the shorter side is brought down to
/// `ANALYSIS_MIN_SIDE` unless that would leave the longer side above
/// `ANALYSIS_MAX_SIDE`
fn analysis_scale(img_w: u32, img_h: u32) -> f64 {
    let short = img_w.min(img_h) as f64;
    let long = img_w.max(img_h) as f64;

    (ANALYSIS_MIN_SIDE as f64 / short)
        .min(ANALYSIS_MAX_SIDE as f64 / long)
        .min(1.0)
}

/// Map an analysis-space rectangle back to the source image
fn to_source(crop: CropRect, prescale: f64, img_w: u32, img_h: u32) -> CropRect {
    let x = ((crop.x as f64 / prescale).floor() as u32).min(img_w - 1);
    let y = ((crop.y as f64 / prescale).floor() as u32).min(img_h - 1);
    let width = ((crop.width as f64 / prescale).floor() as u32).clamp(1, img_w - x);
    let height = ((crop.height as f64 / prescale).floor() as u32).clamp(1, img_h - y);

    CropRect { x, y, width, height }
}

fn analyse(img: &RgbImage) -> FeatureMap {
    let (width, height) = img.dimensions();
    let len = (width * height) as usize;

    let lightness: Vec<f64> = img
        .pixels()
        .map(|p| cie(p[0], p[1], p[2]))
        .collect();

    let mut detail = vec![0.0; len];
    let mut skin = vec![0.0; len];
    let mut saturation = vec![0.0; len];

    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) as usize;
            let l = lightness[i];

            // Laplacian on lightness; border pixels keep their raw value
            detail[i] = if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                l
            } else {
                (l * 4.0
                    - lightness[i - 1]
                    - lightness[i + 1]
                    - lightness[i - width as usize]
                    - lightness[i + width as usize])
                    .clamp(0.0, 1.0)
            };

            let p = img.get_pixel(x, y);
            skin[i] = skin_score(p[0], p[1], p[2], l);
            saturation[i] = saturation_score(p[0], p[1], p[2], l);
        }
    }

    FeatureMap {
        width,
        height,
        detail,
        skin,
        saturation,
    }
}

/// Perceived lightness in `0.0..=1.0`
fn cie(r: u8, g: u8, b: u8) -> f64 {
    (0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64) / 255.0
}

fn skin_score(r: u8, g: u8, b: u8, lightness: f64) -> f64 {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let mag = (r * r + g * g + b * b).sqrt();
    if mag == 0.0 {
        return 0.0;
    }

    let rd = r / mag - SKIN_COLOR[0];
    let gd = g / mag - SKIN_COLOR[1];
    let bd = b / mag - SKIN_COLOR[2];
    let closeness = 1.0 - (rd * rd + gd * gd + bd * bd).sqrt();

    let bright_enough = (SKIN_BRIGHTNESS_MIN..=SKIN_BRIGHTNESS_MAX).contains(&lightness);
    if closeness > SKIN_THRESHOLD && bright_enough {
        (closeness - SKIN_THRESHOLD) / (1.0 - SKIN_THRESHOLD)
    } else {
        0.0
    }
}

fn saturation_score(r: u8, g: u8, b: u8, lightness: f64) -> f64 {
    let max = r.max(g).max(b) as f64 / 255.0;
    let min = r.min(g).min(b) as f64 / 255.0;
    if max == min {
        return 0.0;
    }

    let l = (max + min) / 2.0;
    let d = max - min;
    let sat = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };

    let in_range = (SATURATION_BRIGHTNESS_MIN..=SATURATION_BRIGHTNESS_MAX).contains(&lightness);
    if sat > SATURATION_THRESHOLD && in_range {
        (sat - SATURATION_THRESHOLD) / (1.0 - SATURATION_THRESHOLD)
    } else {
        0.0
    }
}

fn candidate_crops(width: u32, height: u32, crop_w: u32, crop_h: u32) -> Vec<CropRect> {
    let mut crops = Vec::new();
    let mut scale = MAX_SCALE;

    while scale >= MIN_SCALE - f64::EPSILON {
        let w = ((crop_w as f64 * scale) as u32).max(1);
        let h = ((crop_h as f64 * scale) as u32).max(1);

        for y in (0..=height - h).step_by(STEP as usize) {
            for x in (0..=width - w).step_by(STEP as usize) {
                crops.push(CropRect {
                    x,
                    y,
                    width: w,
                    height: h,
                });
            }
        }

        scale -= SCALE_STEP;
    }

    crops
}

fn score(features: &FeatureMap, crop: &CropRect) -> f64 {
    let mut detail_total = 0.0;
    let mut skin_total = 0.0;
    let mut saturation_total = 0.0;

    for y in (0..features.height).step_by(SCORE_DOWN_SAMPLE as usize) {
        for x in (0..features.width).step_by(SCORE_DOWN_SAMPLE as usize) {
            let i = features.index(x, y);
            let weight = importance(crop, x, y);
            let detail = features.detail[i];

            detail_total += detail * weight;
            skin_total += features.skin[i] * (detail + SKIN_BIAS) * weight;
            saturation_total += features.saturation[i] * (detail + SATURATION_BIAS) * weight;
        }
    }

    (detail_total * DETAIL_WEIGHT + skin_total * SKIN_WEIGHT + saturation_total * SATURATION_WEIGHT)
        / (crop.width as f64 * crop.height as f64)
}

/// Weight of a sample point relative to a crop: highest near the centre and
/// on the rule-of-thirds lines, negative near the edges and outside
fn importance(crop: &CropRect, x: u32, y: u32) -> f64 {
    if x < crop.x || x >= crop.x + crop.width || y < crop.y || y >= crop.y + crop.height {
        return OUTSIDE_IMPORTANCE;
    }

    let xf = (x - crop.x) as f64 / crop.width as f64;
    let yf = (y - crop.y) as f64 / crop.height as f64;
    let px = (0.5 - xf).abs() * 2.0;
    let py = (0.5 - yf).abs() * 2.0;

    let dx = (px - 1.0 + EDGE_RADIUS).max(0.0);
    let dy = (py - 1.0 + EDGE_RADIUS).max(0.0);
    let edge = (dx * dx + dy * dy) * EDGE_WEIGHT;

    let mut s = 1.41 - (px * px + py * py).sqrt();
    s += (s + edge + 0.5).max(0.0) * 1.2 * (thirds(px) + thirds(py));
    s + edge
}

fn thirds(v: f64) -> f64 {
    let v = (((v - 1.0 / 3.0 + 1.0) % 2.0) * 0.5 - 0.5) * 16.0;
    (1.0 - v * v).max(0.0)
}

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageReader};
use std::io::Cursor;

pub const NUM_BINS: usize = 64;
const HISTOGRAM_SIZE: u32 = 64;

/// Everything the analyzer needs from one decoded frame.
pub struct FrameFeatures {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub mean_luma: f64,
    pub histogram: [f64; NUM_BINS],
    pub hash: Vec<bool>,
}

/// Decode a JPEG and extract luma statistics, a normalized 64-bin histogram
/// and an average hash of `hash_size * hash_size` bits.
pub fn extract(jpeg: &[u8], hash_size: u32) -> Result<FrameFeatures, image::ImageError> {
    let img = ImageReader::new(Cursor::new(jpeg))
        .with_guessed_format()?
        .decode()?;

    let channels = img.color().channel_count();
    let gray = img.to_luma8();
    let pixel_count = gray.pixels().len().max(1) as f64;
    let mean_luma = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / pixel_count;

    let histogram = histogram(&imageops::resize(
        &gray,
        HISTOGRAM_SIZE,
        HISTOGRAM_SIZE,
        FilterType::Nearest,
    ));
    let hash = ahash(&imageops::resize(&gray, hash_size, hash_size, FilterType::Nearest));

    Ok(FrameFeatures {
        width: img.width(),
        height: img.height(),
        channels,
        mean_luma,
        histogram,
        hash,
    })
}

fn histogram(gray: &GrayImage) -> [f64; NUM_BINS] {
    let mut bins = [0u64; NUM_BINS];
    let total_pixels = gray.pixels().len().max(1) as f64;

    for pixel in gray.pixels() {
        let bin = (pixel.0[0] as usize * NUM_BINS) / 256;
        bins[bin.min(NUM_BINS - 1)] += 1;
    }

    // Normalize
    let mut hist = [0.0f64; NUM_BINS];
    for (i, &count) in bins.iter().enumerate() {
        hist[i] = count as f64 / total_pixels;
    }
    hist
}

/// 1 where the pixel is brighter than the mean, 0 otherwise.
fn ahash(gray: &GrayImage) -> Vec<bool> {
    let pixels: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
    let mean: f64 = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len().max(1) as f64;
    pixels.iter().map(|&p| p as f64 > mean).collect()
}

/// Compute the hamming distance between two binary hashes.
pub fn hamming(a: &[bool], b: &[bool]) -> u32 {
    a.iter().zip(b.iter()).filter(|(a, b)| a != b).count() as u32
}

/// Chi-squared distance between two normalized histograms.
pub fn chi_squared(a: &[f64; NUM_BINS], b: &[f64; NUM_BINS]) -> f64 {
    let mut sum = 0.0;
    for i in 0..NUM_BINS {
        let denom = a[i] + b[i];
        if denom > 1e-10 {
            let diff = a[i] - b[i];
            sum += (diff * diff) / denom;
        }
    }
    sum
}

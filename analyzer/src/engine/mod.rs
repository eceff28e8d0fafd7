pub mod features;

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use frame_pacer::{InferenceEngine, InferenceError};
use frame_pacer_common::config::AnalysisConfig;
use frame_pacer_common::frame::Frame;
use serde::Serialize;
use tracing::debug;

use features::{chi_squared, hamming, FrameFeatures, NUM_BINS};

/// Result record for one analysed frame.
#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub seq: u64,
    pub captured_at_ms: i64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bytes: usize,
    pub mean_luma: f64,
    /// Hamming distance to the previous analysed frame's average hash.
    pub motion: Option<u32>,
    /// Chi-squared distance to the previous analysed frame's luma histogram.
    pub histogram_distance: Option<f64>,
    /// Sequence number of the frame these distances were measured against.
    pub compared_to: Option<u64>,
    pub scene_change: bool,
}

struct Baseline {
    seq: u64,
    hash: Vec<bool>,
    histogram: [f64; NUM_BINS],
}

/// Stateful scene analysis: decodes each frame and compares it to the last
/// frame it analysed.
///
/// Decoding runs on the blocking pool, so latency grows with resolution and
/// frames arriving meanwhile are handled by the pacing controller.
pub struct SceneAnalyzer {
    config: AnalysisConfig,
    previous: Mutex<Option<Baseline>>,
}

impl SceneAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            previous: Mutex::new(None),
        }
    }

    fn compare(&self, frame_seq: u64, captured_at_ms: i64, bytes: usize, features: FrameFeatures) -> SceneReport {
        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);

        let (motion, histogram_distance, compared_to) = match previous.as_ref() {
            Some(prev) => (
                Some(hamming(&prev.hash, &features.hash)),
                Some(chi_squared(&prev.histogram, &features.histogram)),
                Some(prev.seq),
            ),
            None => (None, None, None),
        };

        let scene_change = motion.is_some_and(|d| d > self.config.motion_threshold)
            || histogram_distance.is_some_and(|d| d > self.config.histogram_threshold);

        *previous = Some(Baseline {
            seq: frame_seq,
            hash: features.hash,
            histogram: features.histogram,
        });

        SceneReport {
            seq: frame_seq,
            captured_at_ms,
            width: features.width,
            height: features.height,
            channels: features.channels,
            bytes,
            mean_luma: features.mean_luma,
            motion,
            histogram_distance,
            compared_to,
            scene_change,
        }
    }
}

impl InferenceEngine for SceneAnalyzer {
    type Output = SceneReport;

    fn infer(&self, frame: Frame) -> impl Future<Output = Result<SceneReport, InferenceError>> + Send {
        let hash_size = self.config.hash_size;
        async move {
            let seq = frame.seq;
            let captured_at_ms = frame.captured_at_ms;
            let bytes = frame.payload_size();

            let features = tokio::task::spawn_blocking(move || features::extract(&frame.jpeg, hash_size))
                .await
                .map_err(|e| InferenceError::Engine(format!("decode task failed: {e}")))?
                .map_err(|e| InferenceError::Decode(e.to_string()))?;

            debug!(
                seq,
                bytes,
                width = features.width,
                height = features.height,
                channels = features.channels,
                "input frame decoded"
            );

            Ok(self.compare(seq, captured_at_ms, bytes, features))
        }
    }

    fn name(&self) -> &str {
        "scene"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    /// Half black, half white, split vertically.
    fn split_frame(dark_left: bool) -> Vec<u8> {
        let img = GrayImage::from_fn(64, 64, |x, _| {
            let left = x < 32;
            if left == dark_left {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        encode(DynamicImage::ImageLuma8(img))
    }

    fn analyzer() -> SceneAnalyzer {
        SceneAnalyzer::new(AnalysisConfig::default())
    }

    #[tokio::test]
    async fn first_frame_has_no_baseline() {
        let img = RgbImage::from_pixel(40, 30, image::Rgb([10, 120, 200]));
        let jpeg = encode(DynamicImage::ImageRgb8(img));
        let report = analyzer().infer(Frame::new(jpeg, 1708300000000, 1)).await.unwrap();

        assert_eq!(report.seq, 1);
        assert_eq!((report.width, report.height, report.channels), (40, 30, 3));
        assert!(report.motion.is_none());
        assert!(report.compared_to.is_none());
        assert!(!report.scene_change);
    }

    #[tokio::test]
    async fn same_scene_is_not_a_change() {
        let analyzer = analyzer();
        analyzer.infer(Frame::new(split_frame(true), 0, 1)).await.unwrap();
        let report = analyzer.infer(Frame::new(split_frame(true), 0, 2)).await.unwrap();

        assert_eq!(report.motion, Some(0));
        assert_eq!(report.compared_to, Some(1));
        assert!(report.histogram_distance.unwrap() < 1e-6);
        assert!(!report.scene_change);
    }

    #[tokio::test]
    async fn mirrored_scene_is_a_change() {
        let analyzer = analyzer();
        analyzer.infer(Frame::new(split_frame(true), 0, 1)).await.unwrap();
        let report = analyzer.infer(Frame::new(split_frame(false), 0, 5)).await.unwrap();

        assert!(report.motion.unwrap() > 26);
        assert!(report.scene_change);
    }

    #[tokio::test]
    async fn baseline_follows_last_analysed_frame() {
        let analyzer = analyzer();
        analyzer.infer(Frame::new(split_frame(true), 0, 1)).await.unwrap();
        analyzer.infer(Frame::new(split_frame(false), 0, 4)).await.unwrap();
        let report = analyzer.infer(Frame::new(split_frame(false), 0, 9)).await.unwrap();

        assert_eq!(report.compared_to, Some(4));
        assert!(!report.scene_change);
    }

    #[tokio::test]
    async fn undecodable_frame_is_decode_error() {
        let err = analyzer()
            .infer(Frame::new(vec![0xFF, 0xD8, 0x12, 0xFF, 0xD9], 0, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }

    #[tokio::test]
    async fn report_serializes_to_json() {
        let report = analyzer().infer(Frame::new(split_frame(true), 42, 7)).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["captured_at_ms"], 42);
        assert!(json["motion"].is_null());
        assert_eq!(json["scene_change"], false);
    }

    #[tokio::test]
    async fn paced_through_controller() {
        use frame_pacer::{ChannelSink, DropPolicy, PacerEvent, PacingController};

        let (sink, mut rx) = ChannelSink::new();
        let mut pacer = PacingController::new(analyzer(), sink, DropPolicy::Drop);
        pacer.on_frame(Frame::new(split_frame(true), 0, 1));
        pacer.on_frame(Frame::new(split_frame(false), 0, 2));
        pacer.wait_idle().await;

        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PacerEvent::InferenceCompleted { output, .. } = event {
                completed.push(output.seq);
            }
        }
        assert_eq!(completed, vec![1]);
        assert_eq!(pacer.stats().dropped, 1);
    }
}

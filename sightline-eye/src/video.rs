//! Bounded video sampling and cross-sample aggregation
//!
//! One frame is taken every `sample_interval_secs` (seeking straight to it), up to
//! `max_samples` frames. Each sample runs through the normal pipeline; samples whose summary text
//! repeats an earlier one are dropped before counts and the overall summary are computed.

use crate::error::VisionError;
use crate::frame::{prepare_frame_blocking, resize_to_budget};
use crate::modes::surveillance::summarize;
use crate::pipeline::PipelineOrchestrator;
use async_trait::async_trait;
use bytes::Bytes;
use image::RgbImage;
use serde::Serialize;
use sightline_core::{Detection, Mode, Navigation, VideoConfig};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Frame rate assumed when a source reports none.
pub const FALLBACK_FPS: f64 = 30.0;

/// Number of labels named in the overall summary.
pub const TOP_LABELS: usize = 3;

/// Random-access frame source.
#[async_trait]
pub trait VideoSource: Send {
    fn fps(&self) -> f64;

    fn frame_count(&self) -> u64;

    /// Decode the frame at `index` without decoding the frames before it.
    async fn read_frame(&mut self, index: u64) -> Result<Option<RgbImage>, VisionError>;
}

/// Already-decoded frames held in memory.
pub struct FrameSequence {
    frames: Vec<RgbImage>,
    fps: f64,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self { frames, fps }
    }
}

#[async_trait]
impl VideoSource for FrameSequence {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    async fn read_frame(&mut self, index: u64) -> Result<Option<RgbImage>, VisionError> {
        Ok(self.frames.get(index as usize).cloned())
    }
}

/// Encoded frames (JPEG, PNG, ...) decoded only when sampled.
pub struct EncodedFrames {
    frames: Vec<Bytes>,
    fps: f64,
}

impl EncodedFrames {
    pub fn new(frames: Vec<Bytes>, fps: f64) -> Self {
        Self { frames, fps }
    }
}

#[async_trait]
impl VideoSource for EncodedFrames {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    async fn read_frame(&mut self, index: u64) -> Result<Option<RgbImage>, VisionError> {
        let Some(data) = self.frames.get(index as usize).cloned() else {
            return Ok(None);
        };
        let frame = prepare_frame_blocking(data, u32::MAX).await?;
        Ok(Some(frame.rgb))
    }
}

/// Frame indices to sample: every `round(fps * interval)` frames, at most `max_samples`.
pub fn sample_indices(frame_count: u64, fps: f64, interval_secs: f64, max_samples: usize) -> Vec<u64> {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
    let stride = ((fps * interval_secs).round() as u64).max(1);
    (0..frame_count).step_by(stride as usize).take(max_samples).collect()
}

/// One retained sample.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub timestamp_sec: f64,
    pub summary: String,
    pub navigation: Navigation,
    pub detections: Vec<Detection>,
    pub processing_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub mode: Mode,
    /// Samples that went through the pipeline, before deduplication
    pub total_frames_analyzed: usize,
    pub total_processing_ms: f64,
    pub frame_summaries: Vec<FrameSummary>,
    pub object_counts: BTreeMap<String, usize>,
    pub top_labels: Vec<String>,
    pub video_summary: String,
}

/// Most frequent labels, ties broken alphabetically.
pub fn top_labels(counts: &BTreeMap<String, usize>, n: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1));
    ranked.into_iter().take(n).map(|(label, _)| label.clone()).collect()
}

fn join_natural(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Overall sentence for a processed video.
pub fn summarize_video(
    samples: usize,
    duration_secs: f64,
    counts: &BTreeMap<String, usize>,
    top: &[String],
) -> String {
    if samples == 0 {
        return "No frames could be analyzed.".to_string();
    }
    let moments = if samples == 1 { "moment" } else { "moments" };
    if top.is_empty() {
        return format!(
            "No notable objects were detected across {} sampled {} ({:.0} s of video).",
            samples, moments, duration_secs
        );
    }
    let named: Vec<String> = top
        .iter()
        .map(|label| format!("{} ({})", label, counts.get(label).copied().unwrap_or(0)))
        .collect();
    format!(
        "Across {} sampled {} ({:.0} s of video), the most frequent objects were {}.",
        samples,
        moments,
        duration_secs,
        join_natural(&named)
    )
}

/// Samples a video and aggregates per-sample pipeline output.
pub struct VideoSampler {
    orchestrator: PipelineOrchestrator,
    config: VideoConfig,
}

impl VideoSampler {
    pub fn new(orchestrator: PipelineOrchestrator, config: VideoConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub async fn analyze(
        &self,
        source: &mut dyn VideoSource,
        mode: Mode,
        want_caption: bool,
    ) -> Result<VideoReport, VisionError> {
        let started = Instant::now();
        let frame_count = source.frame_count();
        if frame_count == 0 {
            return Err(VisionError::Video("video contains no frames".to_string()));
        }

        let fps = match source.fps() {
            f if f.is_finite() && f > 0.0 => f,
            _ => FALLBACK_FPS,
        };
        let indices = sample_indices(
            frame_count,
            fps,
            self.config.sample_interval_secs,
            self.config.max_samples,
        );
        debug!("Sampling {} of {} frames at {:.1} fps", indices.len(), frame_count, fps);

        let mut analyzed = 0usize;
        let mut seen: HashSet<String> = HashSet::new();
        let mut summaries: Vec<FrameSummary> = Vec::new();

        for index in indices {
            let frame = match source.read_frame(index).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    warn!("Frame {} could not be read, skipping", index);
                    continue;
                }
                Err(e) => {
                    warn!("Frame {} failed to decode: {}", index, e);
                    continue;
                }
            };

            let t = Instant::now();
            let frame = Arc::new(resize_to_budget(frame, self.config.max_edge));
            let result = self
                .orchestrator
                .run_pipeline(frame, mode, want_caption, true)
                .await;
            analyzed += 1;

            let summary = match mode {
                Mode::Surveillance => summarize(&result.detections),
                _ => result.scene_description.clone(),
            };
            if !seen.insert(summary.clone()) {
                debug!("Frame {} repeats an earlier summary, dropped", index);
                continue;
            }

            summaries.push(FrameSummary {
                frame_index: index,
                timestamp_sec: (index as f64 / fps * 100.0).round() / 100.0,
                summary,
                navigation: result.navigation,
                detections: result.detections,
                processing_ms: (t.elapsed().as_secs_f64() * 1000.0 * 10.0).round() / 10.0,
            });
        }

        let mut object_counts: BTreeMap<String, usize> = BTreeMap::new();
        for det in summaries.iter().flat_map(|s| s.detections.iter()) {
            *object_counts.entry(det.label.to_lowercase()).or_insert(0) += 1;
        }
        let top = top_labels(&object_counts, TOP_LABELS);
        let duration_secs = frame_count as f64 / fps;
        let video_summary = summarize_video(summaries.len(), duration_secs, &object_counts, &top);
        let total_processing_ms = (started.elapsed().as_secs_f64() * 1000.0 * 10.0).round() / 10.0;

        info!(
            "Video [{}]: {} samples analyzed, {} unique, {:.1} ms",
            mode,
            analyzed,
            summaries.len(),
            total_processing_ms
        );

        Ok(VideoReport {
            mode,
            total_frames_analyzed: analyzed,
            total_processing_ms,
            frame_summaries: summaries,
            object_counts,
            top_labels: top,
            video_summary,
        })
    }
}

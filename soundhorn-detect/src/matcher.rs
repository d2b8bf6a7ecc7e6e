//! Normalized cross-correlation over a decimated sliding window
//!
//! The stream and every template are reduced by block means of `D` samples.
//! Blocks are aligned to absolute stream position, so a template recorded
//! from the same source lines up with the window block for block.
//!
//! A partly covered window scores at most `sqrt(coverage)`, so a sound
//! first reaches threshold `t` at coverage `t²`. Each template therefore
//! holds a crossing for `(1 - t²) · len` blocks and fires once with the
//! best score seen, and re-arms only after staying below threshold for the
//! same span.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use soundhorn_audio::AudioFrame;

use crate::error::{DetectError, Result};
use crate::template::SoundTemplate;
use crate::MatcherConfig;

/// Emitted when a template's similarity reaches the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEvent {
    /// Template name
    pub template: String,
    /// Registration index of the template
    pub template_index: usize,
    /// Best similarity score of the match, in [-1, 1]
    pub confidence: f32,
    /// Sequence number of the frame whose window scored best
    pub seq: u64,
    /// Listen window the event was accepted into (0 until stamped by a gate)
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    /// Ready to fire on the next crossing
    Armed,
    /// Crossed the threshold; tracking the peak until `remaining` blocks pass
    Holding { peak: f32, peak_seq: u64, remaining: usize },
    /// Fired; re-arms after `quiet` blocks below threshold
    Latched { quiet: usize },
}

impl Trigger {
    fn step(self, above: bool, score: f32, seq: u64, advanced: usize, hold: usize) -> Self {
        match self {
            Trigger::Armed if above => Trigger::Holding {
                peak: score,
                peak_seq: seq,
                remaining: hold,
            },
            Trigger::Armed => Trigger::Armed,
            Trigger::Holding { peak, peak_seq, remaining } => {
                let (peak, peak_seq) = if score > peak { (score, seq) } else { (peak, peak_seq) };
                Trigger::Holding {
                    peak,
                    peak_seq,
                    remaining: remaining.saturating_sub(advanced),
                }
            }
            Trigger::Latched { .. } if above => Trigger::Latched { quiet: 0 },
            Trigger::Latched { quiet } => {
                let quiet = quiet + advanced;
                if quiet >= hold.max(1) {
                    Trigger::Armed
                } else {
                    Trigger::Latched { quiet }
                }
            }
        }
    }
}

struct PreparedTemplate {
    name: String,
    /// Decimated, zero-mean samples
    decimated: Vec<f32>,
    /// L2 norm of `decimated`
    norm: f64,
    /// Blocks to wait for the peak after a crossing, and to stay quiet
    /// before firing again
    hold: usize,
    trigger: Trigger,
}

/// Streaming template matcher.
///
/// Runs on the capture thread: no allocation after construction, cost per
/// new block is O(Σ template_len / D).
pub struct TemplateMatcher {
    threshold: f32,
    decimation: usize,
    templates: Vec<PreparedTemplate>,
    window: VecDeque<f32>,
    window_capacity: usize,
    block_sum: f64,
    block_fill: usize,
    scores: Vec<f32>,
    /// Only this template may fire (None = any)
    focus: Option<usize>,
}

impl TemplateMatcher {
    /// Prepare `templates` for matching.
    ///
    /// An empty template list is allowed; the matcher then never fires.
    pub fn new(config: MatcherConfig, templates: Vec<SoundTemplate>) -> Result<Self> {
        config.validate()?;

        let mut prepared = Vec::with_capacity(templates.len());
        for template in templates {
            if template.sample_rate() != config.sample_rate {
                return Err(DetectError::config(format!(
                    "Template '{}' is {} Hz, capture runs at {} Hz",
                    template.name(),
                    template.sample_rate(),
                    config.sample_rate
                )));
            }

            let mut decimated = decimate(template.samples(), config.decimation);
            if decimated.len() < 2 {
                return Err(DetectError::config(format!(
                    "Template '{}' is too short for decimation factor {}",
                    template.name(),
                    config.decimation
                )));
            }

            let norm = center(&mut decimated);
            if norm <= f64::EPSILON {
                return Err(DetectError::config(format!(
                    "Template '{}' is constant and cannot be matched",
                    template.name()
                )));
            }

            let coverage = f64::from(config.threshold).powi(2);
            let hold = ((1.0 - coverage) * decimated.len() as f64).ceil() as usize;

            debug!(
                "Prepared template '{}': {} -> {} samples, hold {} blocks",
                template.name(),
                template.len(),
                decimated.len(),
                hold
            );
            prepared.push(PreparedTemplate {
                name: template.name().to_string(),
                decimated,
                norm,
                hold,
                trigger: Trigger::Armed,
            });
        }

        let window_capacity = prepared.iter().map(|t| t.decimated.len()).max().unwrap_or(0);
        let scores = vec![0.0; prepared.len()];

        Ok(Self {
            threshold: config.threshold,
            decimation: config.decimation,
            templates: prepared,
            window: VecDeque::with_capacity(window_capacity),
            window_capacity,
            block_sum: 0.0,
            block_fill: 0,
            scores,
            focus: None,
        })
    }

    /// Feed one frame. Returns at most one event.
    pub fn process(&mut self, frame: &AudioFrame) -> Option<MatchEvent> {
        self.process_samples(frame.seq(), frame.samples())
    }

    /// Feed raw PCM16 samples tagged with a frame sequence number.
    pub fn process_samples(&mut self, seq: u64, samples: &[i16]) -> Option<MatchEvent> {
        if self.templates.is_empty() {
            return None;
        }

        let mut advanced = 0;
        for &sample in samples {
            self.block_sum += sample as f64;
            self.block_fill += 1;
            if self.block_fill == self.decimation {
                let mean = (self.block_sum / self.decimation as f64) as f32;
                if self.window.len() == self.window_capacity {
                    self.window.pop_front();
                }
                self.window.push_back(mean);
                self.block_sum = 0.0;
                self.block_fill = 0;
                advanced += 1;
            }
        }

        if advanced == 0 {
            return None;
        }
        self.evaluate(seq, advanced)
    }

    fn evaluate(&mut self, seq: u64, advanced: usize) -> Option<MatchEvent> {
        for (index, template) in self.templates.iter_mut().enumerate() {
            let len = template.decimated.len();
            let score = if self.window.len() < len {
                0.0
            } else {
                let recent = self.window.range(self.window.len() - len..);
                correlate(&template.decimated, template.norm, recent)
            };
            self.scores[index] = score;

            if self.focus.is_some_and(|focus| focus != index) {
                continue;
            }
            let above = score >= self.threshold;
            template.trigger = template.trigger.step(above, score, seq, advanced, template.hold);
        }

        // Highest peak among overlapping candidates; strict comparison keeps
        // the earliest registration on ties
        let mut best: Option<(usize, f32, u64, bool)> = None;
        for (index, template) in self.templates.iter().enumerate() {
            if let Trigger::Holding { peak, peak_seq, remaining } = template.trigger {
                if best.map_or(true, |(_, top, _, _)| peak > top) {
                    best = Some((index, peak, peak_seq, remaining == 0));
                }
            }
        }

        let (index, confidence, peak_seq, ready) = best?;
        if !ready {
            return None;
        }
        for template in self.templates.iter_mut() {
            if matches!(template.trigger, Trigger::Holding { .. }) {
                template.trigger = Trigger::Latched { quiet: 0 };
            }
        }

        let template = &self.templates[index];
        debug!(
            "Template '{}' matched at frame {} (score {:.3}, reported at frame {})",
            template.name, peak_seq, confidence, seq
        );
        Some(MatchEvent {
            template: template.name.clone(),
            template_index: index,
            confidence,
            seq: peak_seq,
            generation: 0,
        })
    }

    /// Restrict firing to one template by name, or lift the restriction.
    ///
    /// Other templates are still scored.
    pub fn focus(&mut self, name: Option<&str>) -> Result<()> {
        self.focus = match name {
            None => None,
            Some(name) => Some(
                self.templates
                    .iter()
                    .position(|t| t.name == name)
                    .ok_or_else(|| DetectError::config(format!("Unknown template '{}'", name)))?,
            ),
        };
        for template in self.templates.iter_mut() {
            template.trigger = Trigger::Armed;
        }
        Ok(())
    }

    /// Most recent score per template, in registration order
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.name.as_str())
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Decimated samples currently held
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Forget buffered audio and debounce state
    pub fn reset(&mut self) {
        self.window.clear();
        self.block_sum = 0.0;
        self.block_fill = 0;
        self.scores.iter_mut().for_each(|s| *s = 0.0);
        self.templates.iter_mut().for_each(|t| t.trigger = Trigger::Armed);
    }
}

/// Pearson correlation of two equal-length signals.
///
/// Returns 0 when either side has no variance.
pub fn normalized_cross_correlation(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len < 2 {
        return 0.0;
    }
    let mut reference = a[..len].to_vec();
    let norm = center(&mut reference);
    if norm <= f64::EPSILON {
        return 0.0;
    }
    correlate(&reference, norm, b[..len].iter())
}

/// Block means of `factor` samples; a trailing partial block is dropped.
fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    samples
        .chunks_exact(factor)
        .map(|block| (block.iter().map(|&s| s as f64).sum::<f64>() / factor as f64) as f32)
        .collect()
}

/// Subtract the mean in place, return the resulting L2 norm.
fn center(samples: &mut [f32]) -> f64 {
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    let mut energy = 0.0;
    for s in samples.iter_mut() {
        let centered = *s as f64 - mean;
        *s = centered as f32;
        energy += centered * centered;
    }
    energy.sqrt()
}

/// Correlate a zero-mean reference against a raw window.
///
/// The reference sums to zero, so the window mean drops out of the dot
/// product and only its variance is needed.
fn correlate<'a, I>(reference: &[f32], reference_norm: f64, window: I) -> f32
where
    I: Iterator<Item = &'a f32>,
{
    let n = reference.len() as f64;
    let mut dot = 0.0f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for (&r, &w) in reference.iter().zip(window) {
        let w = w as f64;
        dot += r as f64 * w;
        sum += w;
        sum_sq += w * w;
    }

    let variance = sum_sq - sum * sum / n;
    if variance <= sum_sq * 1e-9 || variance <= 0.0 {
        return 0.0;
    }

    (dot / (reference_norm * variance.sqrt())).clamp(-1.0, 1.0) as f32
}

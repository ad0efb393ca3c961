//! Single-pass event builder for wire/strip readouts.
//!
//! Readouts of one module arrive interleaved from two channel groups. The
//! first accepted readout anchors a time window; every readout within
//! `time_window` ticks of the anchor joins the wire or strip sub-cluster.
//! The first readout outside the window closes it and seeds the next one.

use efu_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Event builder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventBuilderConfig {
    /// Window length in clock ticks, inclusive. Must be positive.
    pub time_window: u64,
    /// Channels `0..wire_channels` are wires.
    pub wire_channels: u16,
    /// Channels `wire_channels..wire_channels + strip_channels` are strips.
    pub strip_channels: u16,
    /// Readouts with a smaller amplitude are dropped.
    pub amplitude_threshold: u16,
    /// Amplitude-weighted mean channel, else the channel with the largest amplitude.
    pub weighted_average: bool,
}

impl Default for EventBuilderConfig {
    fn default() -> Self {
        Self {
            time_window: 185,
            wire_channels: 32,
            strip_channels: 32,
            amplitude_threshold: 0,
            weighted_average: true,
        }
    }
}

impl EventBuilderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_time_window(mut self, window: u64) -> Self {
        self.time_window = window;
        self
    }

    /// Sets the wire/strip channel split.
    #[must_use]
    pub fn with_channels(mut self, wire_channels: u16, strip_channels: u16) -> Self {
        self.wire_channels = wire_channels;
        self.strip_channels = strip_channels;
        self
    }

    #[must_use]
    pub fn with_amplitude_threshold(mut self, threshold: u16) -> Self {
        self.amplitude_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_weighted_average(mut self, weighted: bool) -> Self {
        self.weighted_average = weighted;
        self
    }

    /// Total number of valid channels.
    #[must_use]
    pub fn channel_count(&self) -> u32 {
        u32::from(self.wire_channels) + u32::from(self.strip_channels)
    }

    /// # Errors
    /// Returns an error for a zero time window or zero channels.
    pub fn validate(&self) -> Result<()> {
        if self.time_window == 0 {
            return Err(Error::ConfigError(
                "event builder time window must be positive".to_string(),
            ));
        }
        if self.channel_count() == 0 {
            return Err(Error::ConfigError(
                "event builder needs at least one channel".to_string(),
            ));
        }
        Ok(())
    }
}

/// Position of the last accepted event.
///
/// Positions are in channel units; a side without a usable sub-cluster is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BladePosition {
    pub wire: Option<f64>,
    pub strip: Option<f64>,
    /// Clock of the window anchor.
    pub time: u64,
}

/// Event builder counters.
///
/// The size histograms count accepted events by the number of readouts in a
/// sub-cluster: index `n - 1` for `n` readouts, sizes above five in index 5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventBuilderStatistics {
    pub datapoints_received: u64,
    pub events: u64,
    pub rejected_threshold: u64,
    pub rejected_channel: u64,
    pub rejected_adjacency: u64,
    pub rejected_position: u64,
    pub wires_2d: [u64; 6],
    pub strips_2d: [u64; 6],
    pub wires_1d: [u64; 6],
    pub strips_1d: [u64; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Readout {
    channel: u16,
    amplitude: u16,
}

/// Windowed wire/strip event builder.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    config: EventBuilderConfig,
    wires: Vec<Readout>,
    strips: Vec<Readout>,
    anchor: Option<u64>,
    position: BladePosition,
    stats: EventBuilderStatistics,
}

impl EventBuilder {
    /// Creates an event builder.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EventBuilderConfig) -> Result<Self> {
        config.validate()?;
        log::debug!("building event builder: {config:?}");
        Ok(Self {
            config,
            wires: Vec::new(),
            strips: Vec::new(),
            anchor: None,
            position: BladePosition::default(),
            stats: EventBuilderStatistics::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EventBuilderConfig {
        &self.config
    }

    /// Adds one readout. Returns true if it closed a window holding a valid event.
    pub fn add_data_point(&mut self, channel: u16, amplitude: u16, clock: u64) -> bool {
        self.stats.datapoints_received += 1;

        if amplitude < self.config.amplitude_threshold {
            self.stats.rejected_threshold += 1;
            return false;
        }
        if u32::from(channel) >= self.config.channel_count() {
            self.stats.rejected_channel += 1;
            return false;
        }

        let Some(anchor) = self.anchor else {
            self.anchor = Some(clock);
            self.push(channel, amplitude);
            return false;
        };
        if clock.saturating_sub(anchor) <= self.config.time_window {
            self.push(channel, amplitude);
            return false;
        }

        let accepted = self.close_window(anchor);
        self.anchor = Some(clock);
        self.push(channel, amplitude);
        accepted
    }

    /// Closes the open window at the end of a stream.
    pub fn last_point(&mut self) -> bool {
        match self.anchor.take() {
            Some(anchor) => self.close_window(anchor),
            None => false,
        }
    }

    /// Position of the last accepted event.
    #[must_use]
    pub fn position(&self) -> BladePosition {
        self.position
    }

    #[must_use]
    pub fn statistics(&self) -> EventBuilderStatistics {
        self.stats
    }

    pub fn reset_counters(&mut self) {
        self.stats = EventBuilderStatistics::default();
    }

    /// Readouts in the open window: (wires, strips).
    #[must_use]
    pub fn window_size(&self) -> (usize, usize) {
        (self.wires.len(), self.strips.len())
    }

    fn push(&mut self, channel: u16, amplitude: u16) {
        let readout = Readout { channel, amplitude };
        if channel < self.config.wire_channels {
            self.wires.push(readout);
        } else {
            self.strips.push(readout);
        }
    }

    fn close_window(&mut self, anchor: u64) -> bool {
        let mut wires = std::mem::take(&mut self.wires);
        let mut strips = std::mem::take(&mut self.strips);
        let accepted = self.evaluate(&mut wires, &mut strips, anchor);
        wires.clear();
        strips.clear();
        self.wires = wires;
        self.strips = strips;
        accepted
    }

    fn evaluate(&mut self, wires: &mut [Readout], strips: &mut [Readout], anchor: u64) -> bool {
        if !adjacent(wires) || !adjacent(strips) {
            self.stats.rejected_adjacency += 1;
            return false;
        }

        let wire = self.calculate_position(wires);
        let strip = self.calculate_position(strips);
        if wire.is_none() && strip.is_none() {
            self.stats.rejected_position += 1;
            return false;
        }

        self.position = BladePosition {
            wire,
            strip,
            time: anchor,
        };
        self.count_sizes(wires.len(), strips.len());
        self.stats.events += 1;
        true
    }

    #[allow(clippy::cast_precision_loss)]
    fn calculate_position(&self, readouts: &[Readout]) -> Option<f64> {
        if self.config.weighted_average {
            let (numerator, denominator) =
                readouts.iter().fold((0u64, 0u64), |(num, den), r| {
                    let amplitude = u64::from(r.amplitude);
                    (num + u64::from(r.channel) * amplitude, den + amplitude)
                });
            (denominator > 0).then(|| numerator as f64 / denominator as f64)
        } else {
            readouts
                .iter()
                .filter(|r| r.amplitude > 0)
                .fold(None, |best: Option<Readout>, r| match best {
                    Some(b) if b.amplitude >= r.amplitude => Some(b),
                    _ => Some(*r),
                })
                .map(|r| f64::from(r.channel))
        }
    }

    fn count_sizes(&mut self, wires: usize, strips: usize) {
        let bin = |n: usize| n.min(6) - 1;
        match (wires, strips) {
            (0, 0) => {}
            (w, 0) => self.stats.wires_1d[bin(w)] += 1,
            (0, s) => self.stats.strips_1d[bin(s)] += 1,
            (w, s) => {
                self.stats.wires_2d[bin(w)] += 1;
                self.stats.strips_2d[bin(s)] += 1;
            }
        }
    }
}

/// True if the readouts cover a contiguous channel range.
fn adjacent(readouts: &mut [Readout]) -> bool {
    readouts.sort_unstable();
    readouts
        .windows(2)
        .all(|pair| pair[1].channel - pair[0].channel <= 1)
}

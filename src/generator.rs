//! Sample Generator (spec.md §4.2): deterministic per-channel synthetic
//! data, grounded in the channel-function dispatch used by
//! `TestStream.generate_channel_data` in the Python original, with the
//! `sine`/`sine+` tags added as pure math (no precedent in the source).

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorTag {
    StreamId,
    StreamSeq,
    Counter,
    CounterPlus,
    CounterModFs,
    Impulse,
    Sine,
    SinePlus,
}

impl std::str::FromStr for GeneratorTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream-id" => Ok(GeneratorTag::StreamId),
            "stream-seq" => Ok(GeneratorTag::StreamSeq),
            "counter" => Ok(GeneratorTag::Counter),
            "counter+" => Ok(GeneratorTag::CounterPlus),
            "counter-mod-fs" => Ok(GeneratorTag::CounterModFs),
            "impulse" => Ok(GeneratorTag::Impulse),
            "sine" => Ok(GeneratorTag::Sine),
            "sine+" => Ok(GeneratorTag::SinePlus),
            other => Err(format!("unknown generator tag: {other}")),
        }
    }
}

impl GeneratorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorTag::StreamId => "stream-id",
            GeneratorTag::StreamSeq => "stream-seq",
            GeneratorTag::Counter => "counter",
            GeneratorTag::CounterPlus => "counter+",
            GeneratorTag::CounterModFs => "counter-mod-fs",
            GeneratorTag::Impulse => "impulse",
            GeneratorTag::Sine => "sine",
            GeneratorTag::SinePlus => "sine+",
        }
    }

    /// `"counter"` for the counter family, `"stim"` for impulse, `"misc"`
    /// otherwise (spec.md §4.2).
    pub fn type_tag(&self) -> &'static str {
        match self {
            GeneratorTag::Counter | GeneratorTag::CounterPlus | GeneratorTag::CounterModFs => "counter",
            GeneratorTag::Impulse => "stim",
            _ => "misc",
        }
    }
}

/// Per-channel generator assignment for a stream with `channel_count`
/// channels, built from a (possibly shorter) list of tags. If there are
/// fewer tags than channels, the last tag extends to the remaining
/// channels (spec.md §4.2) — this differs deliberately from the Python
/// original's round-robin `generators[i % len(generators)]`, which only
/// coincides with "last tag extends" for a single-tag list.
pub struct ChannelGenerators {
    assignments: Vec<GeneratorTag>,
}

impl ChannelGenerators {
    pub fn new(tags: &[GeneratorTag], channel_count: usize) -> Self {
        assert!(!tags.is_empty(), "at least one generator tag is required");
        let mut assignments = Vec::with_capacity(channel_count);
        for c in 0..channel_count {
            let tag = if c < tags.len() { tags[c] } else { *tags.last().unwrap() };
            assignments.push(tag);
        }
        Self { assignments }
    }

    /// Channel label defaults to `"<tag> <k>"` where `k` is the k-th
    /// occurrence of that tag (1-indexed); `sine+` becomes `"sine 2^c Hz"`
    /// using the channel's own index `c`.
    pub fn default_labels(&self) -> Vec<String> {
        let mut occurrence = std::collections::HashMap::new();
        self.assignments
            .iter()
            .enumerate()
            .map(|(c, tag)| {
                if *tag == GeneratorTag::SinePlus {
                    format!("sine 2^{c} Hz")
                } else {
                    let k = occurrence.entry(*tag).or_insert(0);
                    *k += 1;
                    format!("{} {}", tag.as_str(), k)
                }
            })
            .collect()
    }

    pub fn default_types(&self) -> Vec<String> {
        self.assignments.iter().map(|t| t.type_tag().to_string()).collect()
    }

    /// Produce one sample vector for sample index `n` at elapsed time `t`
    /// (seconds since the stream's own `start_time`), per the formulas in
    /// spec.md §4.2.
    pub fn sample(&self, stream_idx: u64, n: u64, t: f64, nominal_srate: f64) -> Vec<f64> {
        let channel_count = self.assignments.len() as u64;
        self.assignments
            .iter()
            .enumerate()
            .map(|(c, tag)| value(*tag, stream_idx, n, c as u64, channel_count, t, nominal_srate))
            .collect()
    }
}

fn value(tag: GeneratorTag, stream_idx: u64, n: u64, c: u64, channel_count: u64, t: f64, nominal_srate: f64) -> f64 {
    match tag {
        GeneratorTag::StreamId => stream_idx as f64,
        GeneratorTag::StreamSeq => (stream_idx + c) as f64,
        GeneratorTag::Counter => n as f64,
        // counter+: a running count across the whole sample matrix, i.e.
        // n*channel_count + c (spec.md §4.2, verified against S1).
        GeneratorTag::CounterPlus => (n * channel_count + c) as f64,
        GeneratorTag::CounterModFs => {
            if nominal_srate > 0.0 {
                (n % nominal_srate as u64) as f64
            } else {
                n as f64
            }
        }
        GeneratorTag::Impulse => {
            if nominal_srate > 0.0 && n % nominal_srate as u64 == 0 {
                1.0
            } else {
                0.0
            }
        }
        GeneratorTag::Sine => (2.0 * PI * t).sin(),
        GeneratorTag::SinePlus => (2.0 * PI * 2f64.powi(c as i32) * t).sin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<GeneratorTag> {
        names.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn s1_counter_plus_500hz_4ch() {
        let gens = ChannelGenerators::new(&tags(&["counter+"]), 4);
        for n in 0..500u64 {
            let t = n as f64 / 500.0;
            let sample = gens.sample(0, n, t, 500.0);
            let expected: Vec<f64> = (0..4).map(|c| (n * 4 + c) as f64).collect();
            assert_eq!(sample, expected, "sample {n}");
        }
    }

    #[test]
    fn s2_impulse_at_multiples_of_nominal_srate() {
        let gens = ChannelGenerators::new(&tags(&["impulse"]), 1);
        for n in 0..300u64 {
            let t = n as f64 / 100.0;
            let sample = gens.sample(0, n, t, 100.0);
            let expected = if n % 100 == 0 { 1.0 } else { 0.0 };
            assert_eq!(sample, vec![expected], "sample {n}");
        }
    }

    #[test]
    fn s3_sine_plus_at_quarter_second() {
        let gens = ChannelGenerators::new(&tags(&["sine+"]), 3);
        let n = 250u64;
        let t = n as f64 / 1000.0;
        let sample = gens.sample(0, n, t, 1000.0);
        assert!((sample[0] - 1.0).abs() < 1e-9);
        assert!(sample[1].abs() < 1e-9);
        assert!(sample[2].abs() < 1e-9);
    }

    #[test]
    fn last_tag_extends_to_remaining_channels() {
        let gens = ChannelGenerators::new(&tags(&["stream-id", "counter"]), 4);
        let sample = gens.sample(7, 3, 0.0, 0.0);
        assert_eq!(sample, vec![7.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn labels_count_occurrences_per_tag() {
        let gens = ChannelGenerators::new(&tags(&["counter", "counter", "sine+"]), 3);
        let labels = gens.default_labels();
        assert_eq!(labels, vec!["counter 1", "counter 2", "sine 2^2 Hz"]);
    }

    #[test]
    fn type_tags_group_counter_family_and_impulse() {
        let gens = ChannelGenerators::new(&tags(&["counter+", "impulse", "sine"]), 3);
        assert_eq!(gens.default_types(), vec!["counter", "stim", "misc"]);
    }
}

//! Stream descriptors and sample payloads shared by every component that
//! pushes to or pulls from an LSL outlet/inlet.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// LSL channel format, named after `lsl::ChannelFormat`'s wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelFormat {
    Float32,
    Double64,
    String,
    Int32,
    Int16,
    Int8,
    Int64,
}

impl fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelFormat::Float32 => write!(f, "float32"),
            ChannelFormat::Double64 => write!(f, "double64"),
            ChannelFormat::String => write!(f, "string"),
            ChannelFormat::Int32 => write!(f, "int32"),
            ChannelFormat::Int16 => write!(f, "int16"),
            ChannelFormat::Int8 => write!(f, "int8"),
            ChannelFormat::Int64 => write!(f, "int64"),
        }
    }
}

impl std::str::FromStr for ChannelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float32" => Ok(ChannelFormat::Float32),
            "double64" | "float64" => Ok(ChannelFormat::Double64),
            "string" => Ok(ChannelFormat::String),
            "int32" => Ok(ChannelFormat::Int32),
            "int16" => Ok(ChannelFormat::Int16),
            "int8" => Ok(ChannelFormat::Int8),
            "int64" => Ok(ChannelFormat::Int64),
            other => Err(format!("unknown channel format: {other}")),
        }
    }
}

impl ChannelFormat {
    pub fn to_lsl(self) -> lsl::ChannelFormat {
        match self {
            ChannelFormat::Float32 => lsl::ChannelFormat::Float32,
            ChannelFormat::Double64 => lsl::ChannelFormat::Double64,
            ChannelFormat::String => lsl::ChannelFormat::String,
            ChannelFormat::Int32 => lsl::ChannelFormat::Int32,
            ChannelFormat::Int16 => lsl::ChannelFormat::Int16,
            ChannelFormat::Int8 => lsl::ChannelFormat::Int8,
            ChannelFormat::Int64 => lsl::ChannelFormat::Int64,
        }
    }

    pub fn from_lsl(fmt: lsl::ChannelFormat) -> Self {
        match fmt {
            lsl::ChannelFormat::Float32 => ChannelFormat::Float32,
            lsl::ChannelFormat::Double64 => ChannelFormat::Double64,
            lsl::ChannelFormat::String => ChannelFormat::String,
            lsl::ChannelFormat::Int8 => ChannelFormat::Int8,
            lsl::ChannelFormat::Int16 => ChannelFormat::Int16,
            lsl::ChannelFormat::Int32 => ChannelFormat::Int32,
            lsl::ChannelFormat::Int64 => ChannelFormat::Int64,
            _ => ChannelFormat::Float32,
        }
    }
}

/// An immutable description of a stream, independent of any particular
/// outlet/inlet instance. Corresponds to spec's `StreamDescriptor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub content_type: String,
    pub channel_count: u32,
    /// 0 means irregular rate.
    pub nominal_srate: f64,
    pub channel_format: ChannelFormat,
    pub source_id: String,
    pub hostname: String,
    pub channel_labels: Vec<String>,
    pub channel_types: Vec<String>,
    pub channel_units: Vec<String>,
    pub desc: HashMap<String, String>,
}

impl StreamDescriptor {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        channel_count: u32,
        nominal_srate: f64,
        channel_format: ChannelFormat,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            channel_count,
            nominal_srate,
            channel_format,
            source_id: source_id.into(),
            hostname: String::new(),
            channel_labels: Vec::new(),
            channel_types: Vec::new(),
            channel_units: Vec::new(),
            desc: HashMap::new(),
        }
    }

    /// A single-channel irregular-rate string marker stream, the shape used
    /// by control and monitor streams.
    pub fn marker(name: impl Into<String>, content_type: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self::new(name, content_type, 1, 0.0, ChannelFormat::String, source_id)
    }

    /// Validate channel_labels/types/units against channel_count, falling
    /// back to defaults and returning whether a mismatch was corrected.
    /// See spec.md §7 "Channel-metadata mismatch".
    pub fn normalize_metadata(&mut self) -> bool {
        let mut corrected = false;
        if !self.channel_labels.is_empty() && self.channel_labels.len() != self.channel_count as usize {
            self.channel_labels.clear();
            corrected = true;
        }
        if !self.channel_types.is_empty() && self.channel_types.len() != self.channel_count as usize {
            self.channel_types.clear();
            corrected = true;
        }
        if !self.channel_units.is_empty() && self.channel_units.len() != self.channel_count as usize {
            self.channel_units.clear();
            corrected = true;
        }
        corrected
    }
}

/// Data payload for one sample, channel format already fixed by the owning
/// stream descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SampleData {
    Float32(Vec<f32>),
    Double64(Vec<f64>),
    String(Vec<String>),
    Int32(Vec<i32>),
    Int16(Vec<i16>),
    Int8(Vec<i8>),
    Int64(Vec<i64>),
}

impl SampleData {
    pub fn channel_count(&self) -> usize {
        match self {
            SampleData::Float32(v) => v.len(),
            SampleData::Double64(v) => v.len(),
            SampleData::String(v) => v.len(),
            SampleData::Int32(v) => v.len(),
            SampleData::Int16(v) => v.len(),
            SampleData::Int8(v) => v.len(),
            SampleData::Int64(v) => v.len(),
        }
    }

    pub fn marker(payload: String) -> Self {
        SampleData::String(vec![payload])
    }

    pub fn from_f64(values: &[f64], format: ChannelFormat) -> Self {
        match format {
            ChannelFormat::Float32 => SampleData::Float32(values.iter().map(|&v| v as f32).collect()),
            ChannelFormat::Double64 => SampleData::Double64(values.to_vec()),
            ChannelFormat::Int32 => SampleData::Int32(values.iter().map(|&v| v as i32).collect()),
            ChannelFormat::Int16 => SampleData::Int16(values.iter().map(|&v| v as i16).collect()),
            ChannelFormat::Int8 => SampleData::Int8(values.iter().map(|&v| v as i8).collect()),
            ChannelFormat::Int64 => SampleData::Int64(values.iter().map(|&v| v as i64).collect()),
            ChannelFormat::String => SampleData::String(values.iter().map(|v| v.to_string()).collect()),
        }
    }
}

/// A timestamped sample ready to push through an outlet, or as pulled from
/// an inlet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub data: SampleData,
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_format_round_trips_through_strings() {
        for fmt in [
            ChannelFormat::Float32,
            ChannelFormat::Double64,
            ChannelFormat::String,
            ChannelFormat::Int32,
            ChannelFormat::Int16,
            ChannelFormat::Int8,
            ChannelFormat::Int64,
        ] {
            let parsed: ChannelFormat = fmt.to_string().parse().unwrap();
            assert_eq!(parsed, fmt);
        }
    }

    #[test]
    fn metadata_mismatch_is_cleared() {
        let mut desc = StreamDescriptor::new("s", "data", 4, 100.0, ChannelFormat::Float32, "src");
        desc.channel_labels = vec!["a".into(), "b".into()];
        assert!(desc.normalize_metadata());
        assert!(desc.channel_labels.is_empty());
    }

    #[test]
    fn from_f64_converts_to_requested_format() {
        let data = SampleData::from_f64(&[1.0, -2.0, 3.5], ChannelFormat::Int32);
        assert_eq!(data, SampleData::Int32(vec![1, -2, 3]));
    }
}

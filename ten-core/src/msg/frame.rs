use super::{Buf, MsgHeader, MsgKind, impl_buf_envelope};
use serde::{Deserialize, Serialize};

/// One-way byte payload.
#[derive(Debug, Clone)]
pub struct Data {
    header: MsgHeader,
    buf: Buf,
}

impl Data {
    /// A new, empty data message named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::new(name),
            buf: Buf::default(),
        }
    }
}

impl_buf_envelope!(Data, MsgKind::Data);

/// Sample layout of an [`AudioFrame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFrameDataFmt {
    /// Channels interleaved sample by sample.
    #[default]
    Interleave,
    /// One plane per channel.
    NonInterleave,
}

/// A block of PCM audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    header: MsgHeader,
    buf: Buf,
    timestamp: i64,
    sample_rate: u32,
    bytes_per_sample: u32,
    samples_per_channel: u32,
    number_of_channels: u32,
    channel_layout: u64,
    data_fmt: AudioFrameDataFmt,
    line_size: u32,
    is_eof: bool,
}

impl AudioFrame {
    /// A new, empty audio frame named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::new(name),
            buf: Buf::default(),
            timestamp: 0,
            sample_rate: 0,
            bytes_per_sample: 0,
            samples_per_channel: 0,
            number_of_channels: 0,
            channel_layout: 0,
            data_fmt: AudioFrameDataFmt::Interleave,
            line_size: 0,
            is_eof: false,
        }
    }

    /// Capture timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Set the capture timestamp.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// Samples per second.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Set samples per second.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Bytes per sample.
    pub fn bytes_per_sample(&self) -> u32 {
        self.bytes_per_sample
    }

    /// Set bytes per sample.
    pub fn set_bytes_per_sample(&mut self, bytes: u32) {
        self.bytes_per_sample = bytes;
    }

    /// Samples per channel.
    pub fn samples_per_channel(&self) -> u32 {
        self.samples_per_channel
    }

    /// Set samples per channel.
    pub fn set_samples_per_channel(&mut self, samples: u32) {
        self.samples_per_channel = samples;
    }

    /// Channel count.
    pub fn number_of_channels(&self) -> u32 {
        self.number_of_channels
    }

    /// Set the channel count.
    pub fn set_number_of_channels(&mut self, channels: u32) {
        self.number_of_channels = channels;
    }

    /// Channel layout mask.
    pub fn channel_layout(&self) -> u64 {
        self.channel_layout
    }

    /// Set the channel layout mask.
    pub fn set_channel_layout(&mut self, layout: u64) {
        self.channel_layout = layout;
    }

    /// Sample layout.
    pub fn data_fmt(&self) -> AudioFrameDataFmt {
        self.data_fmt
    }

    /// Set the sample layout.
    pub fn set_data_fmt(&mut self, fmt: AudioFrameDataFmt) {
        self.data_fmt = fmt;
    }

    /// Bytes per line (plane).
    pub fn line_size(&self) -> u32 {
        self.line_size
    }

    /// Set bytes per line.
    pub fn set_line_size(&mut self, line_size: u32) {
        self.line_size = line_size;
    }

    /// Whether this frame ends the stream.
    pub fn is_eof(&self) -> bool {
        self.is_eof
    }

    /// Mark the end of the stream.
    pub fn set_eof(&mut self, eof: bool) {
        self.is_eof = eof;
    }
}

impl_buf_envelope!(AudioFrame, MsgKind::AudioFrame);

/// Pixel layout of a [`VideoFrame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFmt {
    /// Packed 8-bit RGB.
    Rgb24,
    /// Packed 8-bit RGBA.
    #[default]
    Rgba,
    /// Packed 8-bit BGR.
    Bgr24,
    /// Packed 8-bit BGRA.
    Bgra,
    /// Planar YUV 4:2:0.
    I420,
    /// Planar YUV 4:2:2.
    I422,
    /// Semi-planar YUV 4:2:0, VU order.
    Nv21,
    /// Semi-planar YUV 4:2:0, UV order.
    Nv12,
}

/// A video picture.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    header: MsgHeader,
    buf: Buf,
    width: u32,
    height: u32,
    pixel_fmt: PixelFmt,
    timestamp: i64,
    is_eof: bool,
}

impl VideoFrame {
    /// A new, empty video frame named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::new(name),
            buf: Buf::default(),
            width: 0,
            height: 0,
            pixel_fmt: PixelFmt::Rgba,
            timestamp: 0,
            is_eof: false,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Set the width.
    pub fn set_width(&mut self, width: u32) {
        self.width = width;
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Set the height.
    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    /// Pixel layout.
    pub fn pixel_fmt(&self) -> PixelFmt {
        self.pixel_fmt
    }

    /// Set the pixel layout.
    pub fn set_pixel_fmt(&mut self, fmt: PixelFmt) {
        self.pixel_fmt = fmt;
    }

    /// Capture timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Set the capture timestamp.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// Whether this frame ends the stream.
    pub fn is_eof(&self) -> bool {
        self.is_eof
    }

    /// Mark the end of the stream.
    pub fn set_eof(&mut self, eof: bool) {
        self.is_eof = eof;
    }
}

impl_buf_envelope!(VideoFrame, MsgKind::VideoFrame);

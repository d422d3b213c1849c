//! Video file source using FFmpeg.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::CaptureSource;

pub struct VideoFile {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl VideoFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ffmpeg::init().context("initialize ffmpeg")?;

        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open {} with ffmpeg", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("{} has no video track", path.display()))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        tracing::info!(
            "Opened {} ({}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path,
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }

    fn receive(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        frame_to_image(&rgb_frame).map(Some)
    }
}

impl CaptureSource for VideoFile {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(frame) = self.receive()? {
            return Ok(Some(frame));
        }

        loop {
            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            let Some((index, packet)) = next else {
                break;
            };
            if index != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
        }

        // Drain frames still buffered in the decoder.
        if !self.eof_sent {
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            self.eof_sent = true;
        }
        self.receive()
    }

    fn rewind(&mut self) -> Result<bool> {
        self.input
            .seek(0, ..)
            .with_context(|| format!("failed to seek {} to start", self.path.display()))?;
        self.decoder.flush();
        self.eof_sent = false;
        Ok(true)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    RgbImage::from_raw(width, height, pixels).context("ffmpeg frame has unexpected size")
}

//! Looping frame-by-frame video playback.
//!
//! [`FfmpegSource`] demuxes and decodes with FFmpeg (through
//! `ffmpeg-the-third`) and scales every frame to RGB24 at the decode size.
//! [`VideoPlayer`] turns those into display-ready [`Frame`]s and seeks back to
//! the start whenever the stream ends, so playback never finishes.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::format::context::Input;
use ffmpeg::software::scaling;
use ffmpeg::{Packet, codec, decoder, frame, media};
use tracing::{debug, info};

use crate::{Error, Result};

/// Decoded image in softbuffer layout: one `0x00RRGGBB` word per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// Converts packed `R, G, B` bytes into `0x00RRGGBB` words.
    pub fn from_rgb24(width: u32, height: u32, rgb: &[u8]) -> Self {
        let mut frame = Self::new(width, height);
        frame.fill_from_rgb24(rgb);
        frame
    }

    fn fill_from_rgb24(&mut self, rgb: &[u8]) {
        for (pixel, chunk) in self.pixels.iter_mut().zip(rgb.chunks_exact(3)) {
            *pixel = (u32::from(chunk[0]) << 16) | (u32::from(chunk[1]) << 8) | u32::from(chunk[2]);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// A decoder producing fixed-size RGB24 frames.
pub trait FrameSource {
    fn dimensions(&self) -> (u32, u32);

    /// Fills `rgb` with the next frame. Returns `Ok(false)` at end of stream.
    fn read_frame(&mut self, rgb: &mut [u8]) -> Result<bool>;

    /// Seeks back to the first frame.
    fn rewind(&mut self) -> Result<()>;
}

fn decoder_error(e: ffmpeg::Error) -> Error {
    Error::Decoder(e.to_string())
}

/// FFmpeg demuxer, decoder and RGB24 scaler for one video stream.
pub struct FfmpegSource {
    path: PathBuf,
    width: u32,
    height: u32,
    input: Input,
    decoder: decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    decoded: frame::Video,
    scaled: frame::Video,
    // Demuxer hit end of file; only frames buffered in the decoder remain.
    draining: bool,
    // First frame, decoded at open time to prove the file decodes.
    primed: Option<Vec<u8>>,
}

impl FfmpegSource {
    /// Opens `path`, scaling every frame to `width` x `height`.
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::VideoNotFound(path));
        }
        let unreadable = |reason: String| Error::VideoUnreadable {
            path: path.clone(),
            reason,
        };

        ffmpeg::init().map_err(|e| unreadable(format!("ffmpeg init failed: {e}")))?;
        let input = ffmpeg::format::input(&path).map_err(|e| unreadable(e.to_string()))?;
        let (stream_index, decoder) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| unreadable("no video stream".to_string()))?;
            let decoder = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|e| unreadable(e.to_string()))?;
            (stream.index(), decoder)
        };
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| unreadable(e.to_string()))?;
        debug!(
            "Decoding {}x{} {:?} stream #{stream_index}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        let mut source = Self {
            path: path.clone(),
            width,
            height,
            input,
            decoder,
            scaler,
            stream_index,
            decoded: frame::Video::empty(),
            scaled: frame::Video::empty(),
            draining: false,
            primed: None,
        };

        let mut first = vec![0; frame_len(width, height)];
        match source.decode_into(&mut first) {
            Ok(true) => {}
            Ok(false) => return Err(unreadable("no decodable video frames".to_string())),
            Err(e) => return Err(unreadable(e.to_string())),
        }
        source.primed = Some(first);

        info!("Opened {} ({width}x{height})", path.display());
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Feeds packets to the decoder until it yields a frame, then scales it
    /// into `rgb`. Returns `Ok(false)` once the decoder is fully drained.
    fn decode_into(&mut self, rgb: &mut [u8]) -> Result<bool> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                self.scaler
                    .run(&self.decoded, &mut self.scaled)
                    .map_err(decoder_error)?;
                self.copy_scaled(rgb);
                return Ok(true);
            }
            if self.draining {
                return Ok(false);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => {
                    self.decoder.send_packet(&packet).map_err(decoder_error)?;
                }
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    self.draining = true;
                    self.decoder.send_eof().map_err(decoder_error)?;
                }
                Err(e) => return Err(decoder_error(e)),
            }
        }
    }

    /// Copies plane 0 of the scaled frame, dropping per-row padding.
    fn copy_scaled(&self, rgb: &mut [u8]) {
        let row = self.width as usize * 3;
        let stride = self.scaled.stride(0);
        let data = self.scaled.data(0);
        for (y, out) in rgb.chunks_exact_mut(row).enumerate() {
            let at = y * stride;
            out.copy_from_slice(&data[at..at + row]);
        }
    }
}

fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

impl FrameSource for FfmpegSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, rgb: &mut [u8]) -> Result<bool> {
        if let Some(first) = self.primed.take() {
            rgb.copy_from_slice(&first);
            return Ok(true);
        }
        self.decode_into(rgb)
    }

    fn rewind(&mut self) -> Result<()> {
        self.input.seek(0, ..).map_err(decoder_error)?;
        self.decoder.flush();
        self.draining = false;
        Ok(())
    }
}

/// Endless playback over a [`FrameSource`].
pub struct VideoPlayer<S: FrameSource = FfmpegSource> {
    source: S,
    rgb: Vec<u8>,
    frame: Frame,
    frames_shown: u64,
    loops: u64,
}

impl VideoPlayer<FfmpegSource> {
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        FfmpegSource::open(path, width, height).map(Self::new)
    }
}

impl<S: FrameSource> VideoPlayer<S> {
    pub fn new(source: S) -> Self {
        let (width, height) = source.dimensions();
        Self {
            source,
            rgb: vec![0; frame_len(width, height)],
            frame: Frame::new(width, height),
            frames_shown: 0,
            loops: 0,
        }
    }

    /// Decodes the next frame; at end of stream restarts from the first one.
    pub fn next_frame(&mut self) -> Result<&Frame> {
        if !self.source.read_frame(&mut self.rgb)? {
            self.loops += 1;
            debug!("End of stream after {} frames, looping", self.frames_shown);
            self.source.rewind()?;
            if !self.source.read_frame(&mut self.rgb)? {
                return Err(Error::Decoder("stream is empty after rewind".to_string()));
            }
        }
        self.frame.fill_from_rgb24(&self.rgb);
        self.frames_shown += 1;
        Ok(&self.frame)
    }

    /// Last decoded frame (black before the first call to `next_frame`).
    pub fn current_frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Number of times playback wrapped around to the first frame.
    pub fn loops(&self) -> u64 {
        self.loops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `len` frames of 2x1 pixels; frame `i` is `(i, 0x80, 0xff)` everywhere.
    struct Counter {
        len: u8,
        pos: u8,
        rewinds: u32,
    }

    impl FrameSource for Counter {
        fn dimensions(&self) -> (u32, u32) {
            (2, 1)
        }

        fn read_frame(&mut self, rgb: &mut [u8]) -> Result<bool> {
            if self.pos == self.len {
                return Ok(false);
            }
            for chunk in rgb.chunks_exact_mut(3) {
                chunk.copy_from_slice(&[self.pos, 0x80, 0xff]);
            }
            self.pos += 1;
            Ok(true)
        }

        fn rewind(&mut self) -> Result<()> {
            self.pos = 0;
            self.rewinds += 1;
            Ok(())
        }
    }

    #[test]
    fn converts_rgb_bytes_to_display_words() {
        let frame = Frame::from_rgb24(2, 1, &[0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc]);
        assert_eq!(frame.pixels(), &[0x0011_2233, 0x00aa_bbcc]);
        assert_eq!(frame.pixel(1, 0), 0x00aa_bbcc);
    }

    #[test]
    fn loops_back_to_first_frame() {
        let mut player = VideoPlayer::new(Counter {
            len: 3,
            pos: 0,
            rewinds: 0,
        });
        let firsts: Vec<u32> = (0..7)
            .map(|_| player.next_frame().unwrap().pixel(0, 0) >> 16)
            .collect();
        assert_eq!(firsts, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(player.loops(), 2);
        assert_eq!(player.source.rewinds, 2);
        assert_eq!(player.frames_shown(), 7);
    }

    #[test]
    fn keeps_advancing_across_many_end_of_stream_events() {
        let mut player = VideoPlayer::new(Counter {
            len: 1,
            pos: 0,
            rewinds: 0,
        });
        for n in 1..=50u64 {
            player.next_frame().unwrap();
            assert_eq!(player.frames_shown(), n);
        }
        assert_eq!(player.loops(), 49);
    }

    #[test]
    fn empty_stream_is_a_decoder_error() {
        let mut player = VideoPlayer::new(Counter {
            len: 0,
            pos: 0,
            rewinds: 0,
        });
        assert!(matches!(player.next_frame(), Err(Error::Decoder(_))));
    }

    #[test]
    fn missing_file_is_not_found() {
        let result = VideoPlayer::open("/definitely/not/here.mp4", 64, 36);
        assert!(matches!(result, Err(Error::VideoNotFound(_))));
    }

    /// Uncompressed 8x8 YUV4MPEG2 clip, one grey frame per luma value.
    fn write_y4m(path: &Path, lumas: &[u8]) {
        let mut data = b"YUV4MPEG2 W8 H8 F30:1 Ip A1:1 C444\n".to_vec();
        for &luma in lumas {
            data.extend_from_slice(b"FRAME\n");
            data.extend(std::iter::repeat_n(luma, 64));
            data.extend(std::iter::repeat_n(128u8, 128));
        }
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn decodes_and_seeks_back_in_a_real_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("steps.y4m");
        write_y4m(&path, &[16, 126, 235]);

        let mut player = VideoPlayer::open(&path, 8, 8).unwrap();
        let reds: Vec<u32> = (0..5)
            .map(|_| player.next_frame().unwrap().pixel(3, 3) >> 16)
            .collect();
        assert!(reds[0] < 40, "{reds:?}");
        assert!(reds[1] > 90 && reds[1] < 170, "{reds:?}");
        assert!(reds[2] > 215, "{reds:?}");
        assert_eq!(&reds[3..], &reds[..2]);
        assert_eq!(player.loops(), 1);
    }

    #[test]
    fn frames_are_scaled_to_the_decode_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("one.y4m");
        write_y4m(&path, &[235]);

        let mut player = VideoPlayer::open(&path, 16, 4).unwrap();
        let frame = player.next_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 4));
        assert!(frame.pixels().iter().all(|&p| p >> 16 > 215));
    }

    #[test]
    fn garbage_file_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("noise.mp4");
        std::fs::write(&path, b"this is not a video").unwrap();
        let result = VideoPlayer::open(&path, 64, 36);
        assert!(matches!(result, Err(Error::VideoUnreadable { .. })));
    }
}

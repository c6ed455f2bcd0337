use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context as _;

use crate::draw::FrameRGBA;
use crate::export::{CaptureConfig, CaptureSink, MixedAudio};
use crate::foundation::core::{Fps, FrameIndex, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::mul_div255_u16;

/// Options for [`FfmpegCapture`].
#[derive(Clone, Debug)]
pub struct FfmpegOpts {
    /// Final MP4 path.
    pub out_path: PathBuf,
    /// Overwrite `out_path` if it already exists.
    pub overwrite: bool,
}

impl FfmpegOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
        }
    }
}

/// Temporary files, removed when dropped.
#[derive(Debug, Default)]
struct Temporaries(Vec<PathBuf>);

impl Temporaries {
    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.0.push(path.clone());
        path
    }
}

impl Drop for Temporaries {
    fn drop(&mut self) {
        for path in self.0.drain(..) {
            if path.exists()
                && let Err(e) = std::fs::remove_file(&path)
            {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary");
            }
        }
    }
}

struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl Encoder {
    fn spawn(mut cmd: Command) -> ReelResult<Self> {
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            ReelError::export_setup(format!("failed to spawn ffmpeg (is it on PATH?): {e}"))
        })?;
        let stdin = child.stdin.take();
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::export_setup("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });
        Ok(Self {
            child,
            stdin,
            stderr_drain: Some(stderr_drain),
        })
    }

    fn wait(mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let status = self.child.wait().context("wait for ffmpeg")?;
        let stderr = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("ffmpeg stderr drain thread panicked"))?
                .context("read ffmpeg stderr")?,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(anyhow::anyhow!(
                "ffmpeg exited with status {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            )
            .into());
        }
        Ok(())
    }

    fn kill(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Records into an MP4 through the system `ffmpeg`.
///
/// Frames stream as raw RGBA into an H.264 intermediate next to the output; `finish` then muxes
/// the narration track as AAC (or just moves the intermediate when there is no audio).
pub struct FfmpegCapture {
    opts: FfmpegOpts,
    encoder: Option<Encoder>,
    temps: Temporaries,
    intermediate: Option<PathBuf>,
    scratch: Vec<u8>,
    cfg: Option<CaptureConfig>,
    last_idx: Option<FrameIndex>,
}

impl std::fmt::Debug for FfmpegCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegCapture")
            .field("out_path", &self.opts.out_path)
            .field("running", &self.encoder.is_some())
            .field("last_idx", &self.last_idx)
            .finish()
    }
}

impl FfmpegCapture {
    pub fn new(opts: FfmpegOpts) -> Self {
        Self {
            opts,
            encoder: None,
            temps: Temporaries::default(),
            intermediate: None,
            scratch: Vec::new(),
            cfg: None,
            last_idx: None,
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self
            .opts
            .out_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_owned());
        self.opts
            .out_path
            .with_file_name(format!(".{stem}.{}.{suffix}", std::process::id()))
    }
}

impl CaptureSink for FfmpegCapture {
    fn begin(&mut self, cfg: CaptureConfig) -> ReelResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelError::validation("capture width/height must be non-zero"));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "capture width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReelError::export_setup(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }
        ensure_parent_dir(&self.opts.out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(ReelError::export_setup(
                "ffmpeg is required for MP4 export, but was not found on PATH",
            ));
        }

        let intermediate = self.temps.track(self.sibling("video.mp4"));
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args([
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&intermediate);

        let encoder = Encoder::spawn(cmd)?;
        if encoder.stdin.is_none() {
            encoder.kill();
            return Err(ReelError::export_setup("failed to open ffmpeg stdin"));
        }
        tracing::debug!(path = %intermediate.display(), "ffmpeg encoder started");

        self.scratch = vec![0u8; (cfg.width * cfg.height * 4) as usize];
        self.encoder = Some(encoder);
        self.intermediate = Some(intermediate);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::export_setup("ffmpeg capture not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(ReelError::validation(format!(
                "out-of-order frame {} after {}",
                idx.0, last.0
            )));
        }
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        self.last_idx = Some(idx);

        flatten_to_opaque_rgba8(
            &mut self.scratch,
            &frame.data,
            frame.premultiplied,
            cfg.background,
        )?;

        let stdin = self
            .encoder
            .as_mut()
            .and_then(|e| e.stdin.as_mut())
            .ok_or_else(|| ReelError::export_setup("ffmpeg capture already finalized"))?;
        stdin
            .write_all(&self.scratch)
            .context("write frame to ffmpeg stdin")?;
        Ok(())
    }

    fn finish(&mut self, audio: Option<&MixedAudio>) -> ReelResult<Option<PathBuf>> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| ReelError::export_setup("ffmpeg capture not started"))?;
        encoder.wait()?;
        let intermediate = self
            .intermediate
            .take()
            .ok_or_else(|| ReelError::export_setup("ffmpeg capture not started"))?;

        match audio.filter(|a| !a.samples.is_empty()) {
            Some(audio) => {
                let track = self.temps.track(self.sibling("narration.f32le"));
                audio.write_f32le(&track)?;

                let mut cmd = Command::new("ffmpeg");
                cmd.stdin(Stdio::null());
                cmd.args(["-y", "-loglevel", "error", "-i"])
                    .arg(&intermediate)
                    .args([
                        "-f",
                        "f32le",
                        "-ar",
                        &audio.sample_rate.to_string(),
                        "-ac",
                        &audio.channels.to_string(),
                        "-i",
                    ])
                    .arg(&track)
                    .args([
                        "-map",
                        "0:v:0",
                        "-map",
                        "1:a:0",
                        "-c:v",
                        "copy",
                        "-c:a",
                        "aac",
                        "-movflags",
                        "+faststart",
                    ])
                    .arg(&self.opts.out_path);
                Encoder::spawn(cmd)?.wait()?;
            }
            None => {
                std::fs::rename(&intermediate, &self.opts.out_path).with_context(|| {
                    format!(
                        "move '{}' to '{}'",
                        intermediate.display(),
                        self.opts.out_path.display()
                    )
                })?;
            }
        }

        self.temps = Temporaries::default();
        self.cfg = None;
        tracing::info!(path = %self.opts.out_path.display(), "recording written");
        Ok(Some(self.opts.out_path.clone()))
    }

    fn abort(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            encoder.kill();
        }
        self.intermediate = None;
        self.cfg = None;
        self.temps = Temporaries::default();
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        if self.encoder.is_some() {
            tracing::debug!("ffmpeg capture dropped while running; aborting");
            self.abort();
        }
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

/// Composite `src` over `bg` into fully opaque RGBA8.
fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    premultiplied: bool,
    bg: Rgba8,
) -> ReelResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::validation(
            "flatten expects equal-length rgba8 buffers",
        ));
    }

    let bg_rgb = [u16::from(bg.r), u16::from(bg.g), u16::from(bg.b)];
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let fg = if premultiplied {
                u16::from(s[c])
            } else {
                mul_div255_u16(u16::from(s[c]), a)
            };
            d[c] = (fg + mul_div255_u16(bg_rgb[c], inv)).min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgba8 = Rgba8 {
        r: 10,
        g: 20,
        b: 30,
        a: 255,
    };

    #[test]
    fn flatten_transparent_pixel_yields_background() {
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &[0, 0, 0, 0], true, BG).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255]);
    }

    #[test]
    fn flatten_opaque_pixel_is_identity() {
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &[1, 2, 3, 255], false, BG).unwrap();
        assert_eq!(dst, vec![1, 2, 3, 255]);
    }

    #[test]
    fn flatten_straight_alpha_is_premultiplied_first() {
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &[255, 0, 0, 128], false, Rgba8::rgb(0, 0, 0)).unwrap();
        assert_eq!(dst, vec![128, 0, 0, 255]);
    }

    #[test]
    fn begin_rejects_odd_dimensions_before_spawning() {
        let mut sink = FfmpegCapture::new(FfmpegOpts::new(std::env::temp_dir().join("odd.mp4")));
        let err = sink
            .begin(CaptureConfig {
                width: 3,
                height: 2,
                fps: Fps::new(30, 1).unwrap(),
                background: Rgba8::WHITE,
            })
            .unwrap_err();
        assert!(matches!(err, ReelError::Validation(_)));
    }

    #[test]
    fn push_before_begin_is_an_error() {
        let mut sink = FfmpegCapture::new(FfmpegOpts::new(std::env::temp_dir().join("x.mp4")));
        let frame = FrameRGBA {
            width: 2,
            height: 2,
            data: vec![0; 16],
            premultiplied: true,
        };
        assert!(sink.push_frame(FrameIndex(0), &frame).is_err());
    }
}

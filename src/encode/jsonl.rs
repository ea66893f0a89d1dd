use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::audio::features::{BassPulse, SpectrumFrame};

#[derive(Serialize)]
struct FrameRecord<'a> {
    index: usize,
    time: f32,
    #[serde(flatten)]
    frame: &'a SpectrumFrame,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pulse: Option<PulseRecord>,
}

#[derive(Serialize)]
struct PulseRecord {
    pulse: f32,
    pulse_scale: f32,
    glow: f32,
}

/// Writes one JSON object per analysed frame, newline separated.
pub struct FrameWriter {
    out: BufWriter<File>,
    path: PathBuf,
    frames: usize,
}

impl FrameWriter {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create frame output: {}", path.display()))?;
        log::info!("Writing frames to {}", path.display());
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            frames: 0,
        })
    }

    /// `pulse` is `None` when the image pulse is off; the record then
    /// carries no pulse fields.
    pub fn write_frame(
        &mut self,
        index: usize,
        time: f32,
        frame: &SpectrumFrame,
        pulse: Option<&BassPulse>,
    ) -> Result<()> {
        let record = FrameRecord {
            index,
            time,
            frame,
            pulse: pulse.map(|p| PulseRecord {
                pulse: p.level,
                pulse_scale: p.scale(),
                glow: p.glow(),
            }),
        };
        serde_json::to_writer(&mut self.out, &record).context("Failed to serialize frame")?;
        self.out.write_all(b"\n").context("Failed to write frame")?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.out
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        log::info!("Wrote {} frames to {}", self.frames, self.path.display());
        Ok(self.frames)
    }
}

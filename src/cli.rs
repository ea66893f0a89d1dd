use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bandscope",
    about = "20-band equalizer and spectrum analyzer over an audio file"
)]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Output JSON-lines file with one analysed frame per line
    #[arg(short, long, default_value = "frames.jsonl")]
    pub output: PathBuf,

    /// Performance mode (low, medium, high)
    #[arg(short, long, default_value = "medium")]
    pub mode: String,

    /// Physical bands the software effect exposes
    #[arg(long, default_value_t = 5)]
    pub hardware_bands: usize,

    /// Band level in millibels, as INDEX=LEVEL (repeatable)
    #[arg(long = "band", value_parser = parse_band_level)]
    pub bands: Vec<(usize, i32)>,

    /// Level applied to every band at or above 4 kHz, in millibels
    #[arg(long)]
    pub treble: Option<i32>,

    /// Bass boost strength (0-1000)
    #[arg(long, default_value_t = 0)]
    pub bass_boost: i32,

    /// Virtualizer strength (0-1000)
    #[arg(long, default_value_t = 0)]
    pub virtualizer: i32,

    /// Reverb level (0-100)
    #[arg(long, default_value_t = 0)]
    pub reverb: i32,

    /// Attach to the system output mix instead of the file session
    #[arg(long)]
    pub system_audio: bool,

    /// Rotate the signal between the left and right channel
    #[arg(long = "8d")]
    pub eight_d: bool,

    /// Print the band layout and exit
    #[arg(long)]
    pub list_bands: bool,

    /// Config file (defaults to bandscope.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_band_level(s: &str) -> Result<(usize, i32), String> {
    let (index, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=LEVEL, got '{}'", s))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("bad band index '{}': {}", index, e))?;
    let level = level
        .trim()
        .parse()
        .map_err(|e| format!("bad band level '{}': {}", level, e))?;
    Ok((index, level))
}

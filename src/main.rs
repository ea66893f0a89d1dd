mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use bandscope::audio::capture::{CaptureSettings, CaptureSource, FileCapture};
use bandscope::audio::decode::decode_audio;
use bandscope::audio::features::{BassPulse, SpectrumFrame};
use bandscope::audio::smoothing::SmoothingFactors;
use bandscope::audio::visualizer::Visualizer;
use bandscope::encode::jsonl::FrameWriter;
use bandscope::equalizer::engine::{AudioMode, EffectEngine};
use bandscope::equalizer::software::SoftwareProvider;
use bandscope::{PerformanceConfig, PerformanceMode};
use cli::Cli;

/// Session id the file player hands out.
const FILE_SESSION: i32 = 1;
/// Stereo samples per 8D rotation step.
const ROTATION_BLOCK: usize = 2048;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect bandscope.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("bandscope.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("bandscope").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("bandscope").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut smoothing = SmoothingFactors::default();
    let mut band_levels = Vec::new();
    if let Some(ref path) = config_path {
        match config::load_config(path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Merge: config values apply only when CLI is at its default
                if cli.mode == "medium" { cli.mode = cfg.performance.mode.clone(); }
                if cli.hardware_bands == 5 { cli.hardware_bands = cfg.equalizer.hardware_bands; }
                if cli.treble.is_none() { cli.treble = cfg.equalizer.treble; }
                if cli.bass_boost == 0 { cli.bass_boost = cfg.equalizer.bass_boost; }
                if cli.virtualizer == 0 { cli.virtualizer = cfg.equalizer.virtualizer; }
                if cli.reverb == 0 { cli.reverb = cfg.equalizer.reverb; }
                band_levels = cfg.equalizer.band_levels();
                smoothing = cfg.smoothing;
            }
            Err(e) => log::warn!("Ignoring config: {:#}", e),
        }
    }
    // Per-band flags go last so they win over config levels for the same band.
    band_levels.extend(cli.bands.iter().copied());
    let smoothing = smoothing.sanitized();

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let mode = PerformanceMode::from_name(&cli.mode);
    let performance = PerformanceConfig::for_mode(mode);

    log::info!("bandscope - equalizer and spectrum analyzer");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!(
        "Performance: {:?} ({} points, capture size {}, sub-bass {})",
        mode,
        performance.waveform_points,
        performance.effective_capture_size(),
        if performance.enable_sub_bass { "on" } else { "off" }
    );

    // 1. Decode audio
    log::info!("Decoding audio...");
    let mut audio = decode_audio(input)?;

    // 2. Attach effects
    let provider = Arc::new(SoftwareProvider::new(audio.sample_rate, cli.hardware_bands));
    let engine = EffectEngine::new(Arc::clone(&provider));
    if cli.system_audio {
        engine.switch_mode(AudioMode::SystemAudio, 0);
        if engine.initialization_failed() {
            log::warn!("System audio is not reachable from this process; using the file session");
        }
    }
    if engine.session().is_none() {
        engine.switch_mode(AudioMode::FilePlayback, FILE_SESSION);
    }
    if engine.initialization_failed() {
        anyhow::bail!("Audio effects could not be attached");
    }

    engine.set_bass_boost(cli.bass_boost);
    engine.set_virtualizer(cli.virtualizer);
    engine.set_reverb(cli.reverb);
    if let Some(level) = cli.treble {
        engine.set_treble(level);
    }
    for &(index, level) in &band_levels {
        engine.set_band_level(index, level);
    }
    engine.set_8d(cli.eight_d);

    let bands = engine.bands();
    let hardware = bands.iter().filter(|b| !b.is_virtual).count();
    log::info!(
        "Equalizer: {} bands ({} physical, {} virtual), treble {} mB",
        bands.len(),
        hardware,
        bands.len() - hardware,
        engine.treble_level()
    );

    if cli.list_bands {
        println!("{:>5} {:>8} {:>17} {:>7}  kind", "band", "center", "range", "level");
        for band in &bands {
            println!(
                "{:>5} {:>6}Hz {:>7}-{:>7}Hz {:>5}mB  {}",
                band.index,
                band.center_hz,
                band.min_hz,
                band.max_hz,
                band.level,
                if band.is_virtual { "virtual" } else { "hardware" }
            );
        }
        return Ok(());
    }

    // 3. Play the file through the effect chain
    if let Some(unit) = provider.current() {
        log::info!("Applying equalizer to {} samples...", audio.samples.len());
        unit.process(&mut audio.samples);
    }
    if engine.is_8d_enabled() {
        log::info!("Applying 8D rotation...");
        let mut stereo = audio.to_stereo_i16();
        for block in stereo.chunks_mut(ROTATION_BLOCK) {
            engine.process_8d(block);
        }
        audio.replace_from_stereo_i16(&stereo);
    }

    // 4. Capture and analyse
    let sample_rate = audio.sample_rate;
    let total_samples = audio.samples.len();
    let capture = FileCapture::new(audio.samples, sample_rate);
    let settings = CaptureSettings::from_config(&performance, capture.max_capture_rate());
    let hop = capture.hop_size(settings.capture_rate);

    let visualizer = Visualizer::new(performance);
    visualizer.set_source(Box::new(capture));
    let session = engine.session().unwrap_or(FILE_SESSION);
    if !visualizer.attach(session) {
        anyhow::bail!("Capture could not be attached to session {}", session);
    }

    let mut writer = FrameWriter::new(&cli.output)?;
    let mut smoothed = SpectrumFrame::silent(performance.waveform_points);
    let mut pulse = BassPulse::default();
    let mut peak_pulse = 0.0f32;

    let pb = ProgressBar::new(total_samples.div_ceil(hop) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} periods ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut index = 0usize;
    while visualizer.pump()? {
        let raw = visualizer.frame();
        smoothed = smoothing.apply(&smoothed, &raw);
        if performance.enable_image_pulse {
            peak_pulse = peak_pulse.max(pulse.update(&smoothed.bass_buckets));
        }
        let time = (index * hop) as f32 / sample_rate as f32;
        writer.write_frame(
            index,
            time,
            &smoothed,
            performance.enable_image_pulse.then_some(&pulse),
        )?;
        index += 1;
        pb.set_position(index as u64);
    }
    pb.finish_with_message("Analysis complete");

    let written = writer.finish()?;
    visualizer.release();
    engine.release();

    log::info!(
        "Done! {} frames at {:.1} per second, peak pulse {:.2}. Output: {}",
        written,
        settings.capture_rate as f32 / 1000.0,
        peak_pulse,
        cli.output.display()
    );
    Ok(())
}

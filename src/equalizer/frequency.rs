//! Log-spaced frequency points and display bandwidths for synthesized bands.

/// `count` points spaced evenly in log-frequency over `[min_hz, max_hz]`.
///
/// The last point is pinned to `max_hz` so rounding never drifts the top of
/// the grid. Returns an empty list when `count < 2`, `min_hz == 0` or
/// `min_hz >= max_hz`.
pub fn generate_log_frequencies(count: usize, min_hz: u32, max_hz: u32) -> Vec<u32> {
    if count < 2 || min_hz == 0 || min_hz >= max_hz {
        log::debug!(
            "Rejecting log grid request: count={}, range={}..{} Hz",
            count, min_hz, max_hz
        );
        return Vec::new();
    }

    let log_min = (min_hz as f64).ln();
    let log_max = (max_hz as f64).ln();
    let step = (log_max - log_min) / (count - 1) as f64;

    (0..count)
        .map(|i| {
            if i == count - 1 {
                max_hz
            } else {
                let freq = (log_min + i as f64 * step).exp().round();
                (freq as u32).clamp(min_hz, max_hz)
            }
        })
        .collect()
}

/// Separation width for a synthetic band. Tiered for display, not a Q value.
pub fn bandwidth_for(center_hz: u32) -> u32 {
    match center_hz {
        0..=99 => 20,
        100..=999 => 50,
        1000..=4999 => 100,
        _ => 200,
    }
}

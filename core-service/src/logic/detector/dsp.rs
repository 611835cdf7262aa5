//! Audio Feature Extraction
//!
//! Framing, a radix-2 FFT and the per-frame features the audio detector
//! summarises: spectral centroid / rolloff / bandwidth, zero-crossing rate,
//! RMS envelope and an autocorrelation pitch tracker.

use std::f64::consts::PI;

use thiserror::Error;

// ============================================================================
// STATISTICS
// ============================================================================

pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|v| *v as f64).sum::<f64>() as f32 / values.len() as f32)
}

/// Population standard deviation
pub fn std_dev(values: &[f32]) -> Option<f32> {
    let m = mean(values)? as f64;
    let var = values.iter().map(|v| (*v as f64 - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt() as f32)
}

// ============================================================================
// FRAMING
// ============================================================================

/// Overlapping frames. Input shorter than one frame yields a single short frame.
pub fn frames(samples: &[f32], frame_len: usize, hop: usize) -> Vec<&[f32]> {
    if samples.is_empty() || frame_len == 0 {
        return vec![];
    }
    if samples.len() <= frame_len {
        return vec![samples];
    }
    let hop = hop.max(1);
    (0..=samples.len() - frame_len)
        .step_by(hop)
        .map(|start| &samples[start..start + frame_len])
        .collect()
}

/// Periodic Hann window
fn hann(i: usize, n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()
}

// ============================================================================
// FFT
// ============================================================================

/// In-place iterative radix-2 FFT. `re.len()` must be a power of two.
fn fft(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());

    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let (mut c_re, mut c_im) = (1.0, 0.0);
            for k in 0..len / 2 {
                let a = start + k;
                let b = a + len / 2;
                let t_re = re[b] * c_re - im[b] * c_im;
                let t_im = re[b] * c_im + im[b] * c_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next = c_re * w_re - c_im * w_im;
                c_im = c_re * w_im + c_im * w_re;
                c_re = next;
            }
        }
        len <<= 1;
    }
}

/// Hann-windowed magnitude spectrum, bins `0..=n_fft/2`
fn magnitude_spectrum(frame: &[f32], n_fft: usize) -> Vec<f64> {
    let mut re = vec![0.0; n_fft];
    let mut im = vec![0.0; n_fft];
    for (i, s) in frame.iter().enumerate().take(n_fft) {
        re[i] = *s as f64 * hann(i, frame.len());
    }
    fft(&mut re, &mut im);
    (0..=n_fft / 2).map(|k| (re[k] * re[k] + im[k] * im[k]).sqrt()).collect()
}

// ============================================================================
// SPECTRAL FEATURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralFrame {
    pub centroid: f32,
    pub rolloff: f32,
    pub bandwidth: f32,
}

/// Per-frame spectral shape. Silent frames are skipped.
pub fn spectral_frames(
    samples: &[f32],
    sample_rate: u32,
    frame_len: usize,
    hop: usize,
    rolloff_percent: f32,
) -> Vec<SpectralFrame> {
    let n_fft = frame_len.max(2).next_power_of_two();
    let bin_hz = sample_rate as f64 / n_fft as f64;

    frames(samples, frame_len, hop)
        .into_iter()
        .filter_map(|frame| {
            let spectrum = magnitude_spectrum(frame, n_fft);
            let total: f64 = spectrum.iter().sum();
            if total < 1e-10 {
                return None;
            }

            let centroid = spectrum
                .iter()
                .enumerate()
                .map(|(k, m)| k as f64 * bin_hz * m)
                .sum::<f64>()
                / total;

            let target = total * rolloff_percent as f64;
            let mut cumulative = 0.0;
            let mut rolloff_bin = spectrum.len() - 1;
            for (k, m) in spectrum.iter().enumerate() {
                cumulative += m;
                if cumulative >= target {
                    rolloff_bin = k;
                    break;
                }
            }

            let spread = spectrum
                .iter()
                .enumerate()
                .map(|(k, m)| m * (k as f64 * bin_hz - centroid).powi(2))
                .sum::<f64>()
                / total;

            Some(SpectralFrame {
                centroid: centroid as f32,
                rolloff: (rolloff_bin as f64 * bin_hz) as f32,
                bandwidth: spread.sqrt() as f32,
            })
        })
        .collect()
}

// ============================================================================
// AMPLITUDE FEATURES
// ============================================================================

/// Fraction of adjacent sample pairs whose sign differs
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let power = frame.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / frame.len() as f64;
    power.sqrt() as f32
}

/// max |x| / mean |x|; zero for digital silence
pub fn peak_to_mean(samples: &[f32]) -> f32 {
    let abs_mean = mean(&samples.iter().map(|s| s.abs()).collect::<Vec<_>>()).unwrap_or(0.0);
    if abs_mean <= f32::EPSILON {
        return 0.0;
    }
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    peak / abs_mean
}

// ============================================================================
// PITCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PitchError {
    #[error("pitch search range {min_hz}-{max_hz} Hz does not fit {frame_len}-sample frames at {sample_rate} Hz")]
    SearchRange {
        min_hz: f32,
        max_hz: f32,
        frame_len: usize,
        sample_rate: u32,
    },
    #[error("non-finite sample at index {0}")]
    NonFinite(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct PitchParams {
    pub frame_len: usize,
    pub hop: usize,
    pub min_hz: f32,
    pub max_hz: f32,
    pub voicing_threshold: f32,
    pub min_rms: f32,
}

/// Autocorrelation pitch tracker. Returns the pitch of voiced frames only;
/// unvoiced frames are dropped.
pub fn pitch_track(samples: &[f32], sample_rate: u32, params: &PitchParams) -> Result<Vec<f32>, PitchError> {
    if let Some(i) = samples.iter().position(|s| !s.is_finite()) {
        return Err(PitchError::NonFinite(i));
    }

    let min_lag = (sample_rate as f32 / params.max_hz).ceil() as usize;
    let max_lag = (sample_rate as f32 / params.min_hz).floor() as usize;
    // max_lag saturates for a vanishing lower bound
    if params.min_hz <= 0.0
        || min_lag < 2
        || max_lag >= params.frame_len.saturating_sub(1)
        || min_lag >= max_lag
    {
        return Err(PitchError::SearchRange {
            min_hz: params.min_hz,
            max_hz: params.max_hz,
            frame_len: params.frame_len,
            sample_rate,
        });
    }

    let n_fft = (params.frame_len * 2).next_power_of_two();
    let mut pitches = Vec::new();

    for frame in frames(samples, params.frame_len, params.hop) {
        if frame.len() <= max_lag + 1 || rms(frame) < params.min_rms {
            continue;
        }

        let r = autocorrelation(frame, n_fft);
        if r[0] <= 0.0 {
            continue;
        }

        let (best, peak) = (min_lag..=max_lag)
            .map(|lag| (lag, r[lag]))
            .fold((min_lag, f64::MIN), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

        if peak / r[0] < params.voicing_threshold as f64 {
            continue;
        }

        // Parabolic refinement around the peak
        let (y0, y1, y2) = (r[best - 1], r[best], r[best + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        let offset = if denom.abs() > 1e-12 { 0.5 * (y0 - y2) / denom } else { 0.0 };
        let lag = best as f64 + offset.clamp(-0.5, 0.5);

        pitches.push((sample_rate as f64 / lag) as f32);
    }

    Ok(pitches)
}

/// Raw (biased) autocorrelation through the power spectrum
fn autocorrelation(frame: &[f32], n_fft: usize) -> Vec<f64> {
    let mut re = vec![0.0; n_fft];
    let mut im = vec![0.0; n_fft];
    for (i, s) in frame.iter().enumerate() {
        re[i] = *s as f64;
    }
    fft(&mut re, &mut im);
    for k in 0..n_fft {
        re[k] = re[k] * re[k] + im[k] * im[k];
        im[k] = 0.0;
    }
    // Inverse of a real, even spectrum: forward transform and rescale
    fft(&mut re, &mut im);
    re.iter().map(|v| v / n_fft as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * amp)
            .collect()
    }

    fn params() -> PitchParams {
        PitchParams {
            frame_len: 2048,
            hop: 512,
            min_hz: 40.0,
            max_hz: 1000.0,
            voicing_threshold: 0.5,
            min_rms: 0.01,
        }
    }

    #[test]
    fn test_mean_and_std() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_frames_short_input() {
        let samples = [0.1; 100];
        let f = frames(&samples, 2048, 512);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].len(), 100);
    }

    #[test]
    fn test_frames_count() {
        let samples = vec![0.0; 4096];
        assert_eq!(frames(&samples, 2048, 512).len(), 5);
    }

    #[test]
    fn test_centroid_of_tone() {
        let samples = sine(2000.0, 16_000, 8192, 0.5);
        let frames = spectral_frames(&samples, 16_000, 2048, 512, 0.85);
        let centroid = mean(&frames.iter().map(|f| f.centroid).collect::<Vec<_>>()).unwrap();
        assert!((centroid - 2000.0).abs() < 50.0, "centroid {}", centroid);
    }

    #[test]
    fn test_silent_frames_skipped() {
        let samples = vec![0.0; 4096];
        assert!(spectral_frames(&samples, 16_000, 2048, 512, 0.85).is_empty());
    }

    #[test]
    fn test_zero_crossing_rate() {
        assert_eq!(zero_crossing_rate(&[1.0, -1.0, 1.0, -1.0]), 0.75);
        assert_eq!(zero_crossing_rate(&[1.0, 1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_peak_to_mean() {
        assert_eq!(peak_to_mean(&[0.0; 16]), 0.0);
        assert!((peak_to_mean(&[0.5, -0.5, 0.5, -0.5]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_of_tone() {
        let samples = sine(220.0, 16_000, 16_000, 0.5);
        let pitches = pitch_track(&samples, 16_000, &params()).unwrap();
        assert!(!pitches.is_empty());
        let m = mean(&pitches).unwrap();
        assert!((m - 220.0).abs() < 5.0, "pitch {}", m);
        assert!(std_dev(&pitches).unwrap() < 1.0);
    }

    #[test]
    fn test_pitch_silence_is_unvoiced() {
        let pitches = pitch_track(&vec![0.0; 16_000], 16_000, &params()).unwrap();
        assert!(pitches.is_empty());
    }

    #[test]
    fn test_pitch_low_rate_is_error() {
        // At 1 kHz the 1000 Hz upper bound needs a lag of one sample
        let result = pitch_track(&vec![0.1; 4096], 1_000, &params());
        assert!(matches!(result, Err(PitchError::SearchRange { .. })));
    }

    #[test]
    fn test_pitch_tiny_lower_bound_is_error() {
        let tiny = PitchParams { min_hz: 1e-6, ..params() };
        let result = pitch_track(&vec![0.1; 4096], 16_000, &tiny);
        assert!(matches!(result, Err(PitchError::SearchRange { .. })));
    }
}

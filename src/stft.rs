//! Short-time Fourier transform and its inverse, as used by the denoiser.
//!
//! Frames are centred: the signal is reflect-padded by `n_fft / 2` on both
//! sides before framing, and the inverse trims that padding again. The
//! inverse divides by the summed squared window so an unmodified spectrum
//! reconstructs the input.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Magnitude and phase, row-major `frames × bins` with `bins = n_fft / 2 + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frames: usize,
    pub bins: usize,
    pub magnitude: Vec<f32>,
    pub phase: Vec<f32>,
}

impl Spectrum {
    pub fn magnitude_frame(&self, frame: usize) -> &[f32] {
        &self.magnitude[frame * self.bins..(frame + 1) * self.bins]
    }
}

pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    /// Periodic Hann of `win_length`, zero-padded and centred to `n_fft`.
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// `win_length` must not exceed `n_fft`; `hop_length` must be positive.
    pub fn new(n_fft: usize, hop_length: usize, win_length: usize) -> Self {
        let win_length = win_length.min(n_fft);
        let offset = (n_fft - win_length) / 2;
        let mut window = vec![0.0f32; n_fft];
        for (i, w) in hann_window(win_length).into_iter().enumerate() {
            window[offset + i] = w;
        }

        let mut planner = FftPlanner::<f32>::new();
        Self {
            n_fft,
            hop_length: hop_length.max(1),
            window,
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn forward(&self, signal: &[f32]) -> Spectrum {
        let pad = self.n_fft / 2;
        let padded = pad_reflect(signal, pad);
        let frames = 1 + (padded.len() - self.n_fft) / self.hop_length;
        let bins = self.n_bins();

        let mut magnitude = Vec::with_capacity(frames * bins);
        let mut phase = Vec::with_capacity(frames * bins);
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.n_fft];

        for f in 0..frames {
            let start = f * self.hop_length;
            for (i, c) in buf.iter_mut().enumerate() {
                *c = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            self.forward.process(&mut buf);
            for c in &buf[..bins] {
                magnitude.push(c.norm());
                phase.push(c.arg());
            }
        }

        Spectrum { frames, bins, magnitude, phase }
    }

    /// Overlap-add reconstruction, cut to `len` samples.
    pub fn inverse(&self, spec: &Spectrum, len: usize) -> Vec<f32> {
        let n = self.n_fft;
        let pad = n / 2;
        let total = (spec.frames.saturating_sub(1)) * self.hop_length + n;
        let mut out = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];
        let mut buf = vec![Complex::new(0.0f32, 0.0); n];
        let scale = 1.0 / n as f32;

        for f in 0..spec.frames {
            let row = f * spec.bins;
            for k in 0..spec.bins {
                buf[k] = Complex::from_polar(spec.magnitude[row + k], spec.phase[row + k]);
            }
            // Hermitian half
            for k in spec.bins..n {
                buf[k] = buf[n - k].conj();
            }
            self.inverse.process(&mut buf);

            let start = f * self.hop_length;
            for i in 0..n {
                let w = self.window[i];
                out[start + i] += buf[i].re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        let tiny = f32::MIN_POSITIVE.sqrt();
        for (s, &ws) in out.iter_mut().zip(&window_sum) {
            if ws > tiny {
                *s /= ws;
            }
        }

        let mut trimmed: Vec<f32> = out.into_iter().skip(pad).take(len).collect();
        trimmed.resize(len, 0.0);
        trimmed
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    let factor = 2.0 * std::f32::consts::PI / size as f32;
    (0..size).map(|i| 0.5 - 0.5 * (i as f32 * factor).cos()).collect()
}

/// Mirror index `i` (may be negative or past the end) into `0..n`, reflecting
/// repeatedly for signals shorter than the padding.
fn reflect_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

/// Reflect-pad `pad` samples on each side (edge sample not repeated).
pub fn pad_reflect(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return vec![0.0; 2 * pad];
    }
    (0..n + 2 * pad)
        .map(|i| samples[reflect_index(i as isize - pad as isize, n)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.07).sin() * 0.5 + (i as f32 * 0.31).cos() * 0.2).collect()
    }

    #[test]
    fn test_pad_reflect() {
        assert_eq!(pad_reflect(&[1.0, 2.0, 3.0, 4.0], 2), vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
        // shorter than the padding: keep bouncing
        assert_eq!(pad_reflect(&[1.0, 2.0], 3), vec![2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0]);
        assert_eq!(pad_reflect(&[5.0], 2), vec![5.0; 5]);
        assert_eq!(pad_reflect(&[], 2), vec![0.0; 4]);
    }

    #[test]
    fn test_hann_is_periodic() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[1] - w[7]).abs() < 1e-6);
    }

    #[test]
    fn test_frame_count() {
        let stft = Stft::new(1024, 256, 1024);
        let spec = stft.forward(&vec![0.0; 256 * 10]);
        assert_eq!(spec.frames, 11);
        assert_eq!(spec.bins, 513);
        assert_eq!(spec.magnitude.len(), 11 * 513);
    }

    #[test]
    fn test_roundtrip_reconstructs_signal() {
        let stft = Stft::new(1024, 256, 1024);
        for len in [256 * 20, 5000, 300] {
            let x = sine(len);
            let y = stft.inverse(&stft.forward(&x), x.len());
            assert_eq!(y.len(), x.len());
            let err = x.iter().zip(&y).map(|(a, b)| (a - b).abs()).fold(0.0f32, f32::max);
            assert!(err < 1e-3, "len {len}: max error {err}");
        }
    }

    #[test]
    fn test_magnitude_of_dc() {
        let stft = Stft::new(16, 4, 16);
        let spec = stft.forward(&vec![1.0; 64]);
        // sum of a periodic Hann of length N is N/2
        let mid = spec.magnitude_frame(spec.frames / 2);
        assert!((mid[0] - 8.0).abs() < 1e-4, "dc {}", mid[0]);
        assert!(mid[3..].iter().all(|&m| m < 1e-4));
    }
}

//! Per-modality signal cleaners applied after rate regularization.
//!
//! All filtering is built from second-order IIR sections (biquads) with
//! cookbook coefficients. Cleaners operate on resampled trial matrices
//! (rows of channel values) and filter each channel column independently.

/// One direct-form-II-transposed biquad section.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn from_normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Biquad {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Second-order Butterworth low-pass (Q = 1/sqrt(2)).
    pub fn lowpass(cutoff_hz: f64, sampling_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sampling_rate;
        let alpha = w0.sin() / (2.0 * std::f64::consts::FRAC_1_SQRT_2);
        let cos_w0 = w0.cos();
        Biquad::from_normalized(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Second-order Butterworth high-pass (Q = 1/sqrt(2)).
    pub fn highpass(cutoff_hz: f64, sampling_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sampling_rate;
        let alpha = w0.sin() / (2.0 * std::f64::consts::FRAC_1_SQRT_2);
        let cos_w0 = w0.cos();
        Biquad::from_normalized(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Narrow band-reject centered on `center_hz`; higher `q` is narrower.
    pub fn notch(center_hz: f64, sampling_rate: f64, q: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * center_hz / sampling_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        Biquad::from_normalized(
            1.0,
            -2.0 * cos_w0,
            1.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    fn run(&mut self, signal: &[f64]) -> Vec<f64> {
        self.reset();
        signal.iter().map(|&x| self.process(x)).collect()
    }
}

/// High-pass at `low_hz` then low-pass at `high_hz`.
pub fn bandpass(signal: &[f64], low_hz: f64, high_hz: f64, sampling_rate: f64) -> Vec<f64> {
    let highpassed = Biquad::highpass(low_hz, sampling_rate).run(signal);
    Biquad::lowpass(high_hz, sampling_rate).run(&highpassed)
}

pub fn notch(signal: &[f64], center_hz: f64, sampling_rate: f64, q: f64) -> Vec<f64> {
    Biquad::notch(center_hz, sampling_rate, q).run(signal)
}

/// Sliding-median despiking. The window is centered and shrinks at the
/// signal edges.
pub fn median_despike(signal: &[f64], window: usize) -> Vec<f64> {
    if signal.is_empty() || window < 2 {
        return signal.to_vec();
    }
    let half = window / 2;
    let mut scratch = Vec::with_capacity(window);
    signal
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(signal.len());
            scratch.clear();
            scratch.extend_from_slice(&signal[lo..hi]);
            scratch.sort_by(|a, b| a.total_cmp(b));
            scratch[scratch.len() / 2]
        })
        .collect()
}

fn filter_columns<F>(data: &[Vec<f32>], mut filter: F) -> Vec<Vec<f32>>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    if data.is_empty() {
        return Vec::new();
    }
    let n_channels = data[0].len();
    let mut out = vec![vec![0.0f32; n_channels]; data.len()];
    for ch in 0..n_channels {
        let column: Vec<f64> = data.iter().map(|row| row[ch] as f64).collect();
        for (row, value) in out.iter_mut().zip(filter(&column)) {
            row[ch] = value as f32;
        }
    }
    out
}

/// EEG: 1-45 Hz band-pass plus a 60 Hz mains notch.
pub fn clean_eeg(data: &[Vec<f32>], sampling_rate: usize) -> Vec<Vec<f32>> {
    let rate = sampling_rate as f64;
    filter_columns(data, |column| {
        let passed = bandpass(column, 1.0, 45.0, rate);
        notch(&passed, 60.0, rate, 30.0)
    })
}

/// GSR: 0.1-15 Hz band-pass followed by a kernel-5 median despike.
pub fn clean_gsr(data: &[Vec<f32>], sampling_rate: usize) -> Vec<Vec<f32>> {
    let rate = sampling_rate as f64;
    filter_columns(data, |column| {
        let passed = bandpass(column, 0.1, 15.0, rate);
        median_despike(&passed, 5)
    })
}

/// PPG: 0.7-2.5 Hz band-pass, isolating the cardiac component.
pub fn clean_ppg(data: &[Vec<f32>], sampling_rate: usize) -> Vec<Vec<f32>> {
    let rate = sampling_rate as f64;
    filter_columns(data, |column| bandpass(column, 0.7, 2.5, rate))
}

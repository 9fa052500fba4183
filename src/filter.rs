// src/filter.rs
// Butterworth IIR design and zero-phase filtering

use crate::error::{Error, Result};
use rustfft::{FftPlanner, num_complex::Complex};
use std::f64::consts::PI;

type C64 = Complex<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
}

/// Designs a digital Butterworth filter and returns `(b, a)`, the feedforward
/// and feedback coefficients with `a[0] == 1`.
///
/// `cutoffs` holds one edge frequency in Hz for low/high-pass and two
/// (low, high) for band-pass. A band-pass design has order `2 * order`.
///
/// The expanded polynomials lose their poles to rounding once a high order
/// meets a narrow band at a high sample rate; [`SosFilter`] runs the same
/// design as a cascade of sections and stays stable there.
pub fn design_filter(
    order: usize,
    cutoffs: &[f64],
    filter_type: FilterType,
    sample_rate: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let zpk = design_zpk(order, cutoffs, filter_type, sample_rate)?;
    let b: Vec<f64> = poly(&zpk.zeros).iter().map(|c| c.re * zpk.gain).collect();
    let a: Vec<f64> = poly(&zpk.poles).iter().map(|c| c.re).collect();
    Ok((b, a))
}

/// Digital zeros, poles and overall gain of a design.
struct Zpk {
    zeros: Vec<C64>,
    poles: Vec<C64>,
    gain: f64,
}

fn design_zpk(order: usize, cutoffs: &[f64], filter_type: FilterType, sample_rate: f64) -> Result<Zpk> {
    if order == 0 {
        return Err(invalid("filter order must be at least 1"));
    }
    if !(sample_rate > 0.0) {
        return Err(invalid(format!("invalid sample rate: {}", sample_rate)));
    }
    let nyquist = sample_rate / 2.0;
    for &f in cutoffs {
        if !(f > 0.0 && f < nyquist) {
            return Err(invalid(format!("cutoff {} Hz outside (0, {}) Hz", f, nyquist)));
        }
    }

    // Pre-warped analog edge frequencies, rad/s.
    let warp = |f: f64| 2.0 * sample_rate * (PI * f / sample_rate).tan();
    let prototype = butterworth_poles(order);

    let (zeros, poles, gain) = match (filter_type, cutoffs) {
        (FilterType::LowPass, &[fc]) => {
            let wo = warp(fc);
            let poles: Vec<C64> = prototype.iter().map(|&p| p * wo).collect();
            (Vec::new(), poles, wo.powi(order as i32))
        }
        (FilterType::HighPass, &[fc]) => {
            let wo = warp(fc);
            let poles: Vec<C64> = prototype.iter().map(|&p| wo / p).collect();
            let gain = (C64::new(1.0, 0.0) / product(prototype.iter().map(|&p| -p))).re;
            (vec![C64::new(0.0, 0.0); order], poles, gain)
        }
        (FilterType::BandPass, &[low, high]) => {
            if low >= high {
                return Err(invalid(format!(
                    "band-pass edges must satisfy low < high, got {} and {}",
                    low, high
                )));
            }
            let (w1, w2) = (warp(low), warp(high));
            let bw = w2 - w1;
            let wo2 = w1 * w2;
            let scaled: Vec<C64> = prototype.iter().map(|&p| p * (bw / 2.0)).collect();
            let mut poles = Vec::with_capacity(2 * order);
            for &p in &scaled {
                poles.push(p + (p * p - wo2).sqrt());
            }
            for &p in &scaled {
                poles.push(p - (p * p - wo2).sqrt());
            }
            (vec![C64::new(0.0, 0.0); order], poles, bw.powi(order as i32))
        }
        (kind, edges) => {
            return Err(invalid(format!(
                "{:?} filter takes {} cutoff(s), got {}",
                kind,
                if kind == FilterType::BandPass { 2 } else { 1 },
                edges.len()
            )));
        }
    };

    let (zeros, poles, gain) = bilinear(&zeros, &poles, gain, sample_rate);
    Ok(Zpk { zeros, poles, gain })
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidFilter { msg: msg.into() }
}

/// Poles of the normalized analog Butterworth prototype (unit cutoff).
fn butterworth_poles(order: usize) -> Vec<C64> {
    let n = order as f64;
    (0..order)
        .map(|k| {
            let m = -n + 1.0 + 2.0 * k as f64;
            -C64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect()
}

fn bilinear(zeros: &[C64], poles: &[C64], gain: f64, sample_rate: f64) -> (Vec<C64>, Vec<C64>, f64) {
    let fs2 = 2.0 * sample_rate;
    let mut z: Vec<C64> = zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    let p: Vec<C64> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    // Zeros at infinity map to Nyquist.
    z.resize(p.len(), C64::new(-1.0, 0.0));
    let k = gain * (product(zeros.iter().map(|&z| fs2 - z)) / product(poles.iter().map(|&p| fs2 - p))).re;
    (z, p, k)
}

fn product(values: impl Iterator<Item = C64>) -> C64 {
    values.fold(C64::new(1.0, 0.0), |acc, v| acc * v)
}

/// Polynomial coefficients (highest power first) with the given roots.
fn poly(roots: &[C64]) -> Vec<C64> {
    let mut coeffs = vec![C64::new(1.0, 0.0)];
    for &r in roots {
        let mut next = coeffs.clone();
        next.push(C64::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= r * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs
}

/// Splits roots into conjugate pairs, then pairs of real roots. An odd real
/// root ends up alone in the last group.
fn pair_roots(roots: &[C64]) -> Vec<Vec<C64>> {
    const IMAG_EPS: f64 = 1e-9;
    let mut groups: Vec<Vec<C64>> = roots
        .iter()
        .filter(|r| r.im > IMAG_EPS)
        .map(|&r| vec![r, r.conj()])
        .collect();
    let mut reals: Vec<f64> = roots
        .iter()
        .filter(|r| r.im.abs() <= IMAG_EPS)
        .map(|r| r.re)
        .collect();
    reals.sort_by(f64::total_cmp);
    groups.extend(
        reals
            .chunks(2)
            .map(|chunk| chunk.iter().map(|&r| C64::new(r, 0.0)).collect()),
    );
    groups
}

/// Direct-form II transposed IIR filter over whole buffers.
#[derive(Debug, Clone)]
pub struct IirFilter {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl IirFilter {
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Result<Self> {
        if b.is_empty() || a.is_empty() {
            return Err(invalid("IIR filter needs at least one coefficient in b and a"));
        }
        if a[0] == 0.0 {
            return Err(invalid("first feedback coefficient a[0] cannot be zero"));
        }
        let n = b.len().max(a.len());
        let a0 = a[0];
        let mut b: Vec<f64> = b.iter().map(|c| c / a0).collect();
        let mut a: Vec<f64> = a.iter().map(|c| c / a0).collect();
        b.resize(n, 0.0);
        a.resize(n, 0.0);
        Ok(Self { b, a })
    }

    /// Gain at DC, `sum(b) / sum(a)`.
    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Causal filtering from the given delay-line state (zero if `None`).
    pub fn filter(&self, input: &[f64], initial: Option<&[f64]>) -> Vec<f64> {
        let n = self.b.len();
        let mut state = match initial {
            Some(zi) => zi.to_vec(),
            None => vec![0.0; n - 1],
        };
        let mut output = Vec::with_capacity(input.len());
        for &x in input {
            let y = self.b[0] * x + state.first().copied().unwrap_or(0.0);
            for i in 0..n.saturating_sub(1) {
                let carry = if i + 1 < n - 1 { state[i + 1] } else { 0.0 };
                state[i] = self.b[i + 1] * x + carry - self.a[i + 1] * y;
            }
            output.push(y);
        }
        output
    }

    /// Delay-line state for a step response already in steady state.
    pub fn steady_state(&self) -> Vec<f64> {
        let n = self.b.len();
        if n < 2 {
            return Vec::new();
        }
        let m = n - 1;
        // (I - A^T) zi = b[1..] - a[1..] * b[0], A being the companion matrix of a.
        let mut matrix = vec![vec![0.0; m]; m];
        let mut rhs = vec![0.0; m];
        for i in 0..m {
            matrix[i][i] += 1.0;
            matrix[i][0] += self.a[i + 1];
            if i + 1 < m {
                matrix[i][i + 1] -= 1.0;
            }
            rhs[i] = self.b[i + 1] - self.a[i + 1] * self.b[0];
        }
        solve(matrix, rhs).unwrap_or_else(|| vec![0.0; m])
    }

    /// Forward-backward filtering with odd-extension padding. The result has
    /// zero phase, so features stay aligned with the input.
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        if input.is_empty() {
            return Vec::new();
        }
        let edge = (3 * self.b.len()).min(input.len() - 1);
        let extended = odd_extend(input, edge);

        let zi = self.steady_state();
        let scaled = |x0: f64| zi.iter().map(|z| z * x0).collect::<Vec<f64>>();

        let forward = self.filter(&extended, Some(scaled(extended[0]).as_slice()));
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let mut backward = self.filter(&reversed, Some(scaled(reversed[0]).as_slice()));
        backward.reverse();

        backward[edge..edge + input.len()].to_vec()
    }
}

/// Cascade of first- and second-order [`IirFilter`] sections.
///
/// Each section holds one conjugate pole pair (or a pair of real poles) with
/// a matching zero pair, so rounding moves poles far less than in one expanded
/// high-order polynomial. The overall gain sits on the first section.
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<IirFilter>,
}

impl SosFilter {
    /// Same arguments as [`design_filter`].
    pub fn design(
        order: usize,
        cutoffs: &[f64],
        filter_type: FilterType,
        sample_rate: f64,
    ) -> Result<Self> {
        let zpk = design_zpk(order, cutoffs, filter_type, sample_rate)?;
        let pole_groups = pair_roots(&zpk.poles);
        let zero_groups = pair_roots(&zpk.zeros);

        let mut sections = Vec::with_capacity(pole_groups.len());
        for (i, (poles, zeros)) in pole_groups.iter().zip(&zero_groups).enumerate() {
            let gain = if i == 0 { zpk.gain } else { 1.0 };
            let b: Vec<f64> = poly(zeros).iter().map(|c| c.re * gain).collect();
            let a: Vec<f64> = poly(poles).iter().map(|c| c.re).collect();
            sections.push(IirFilter::new(b, a)?);
        }
        log::debug!(
            "Designed {:?} order {} at {} Hz as {} sections",
            filter_type,
            order,
            sample_rate,
            sections.len()
        );
        Ok(Self { sections })
    }

    /// Causal filtering from rest.
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        self.sections
            .iter()
            .fold(input.to_vec(), |signal, section| section.filter(&signal, None))
    }

    /// Causal filtering with every section already settled on the constant
    /// input `x0`.
    fn filter_settled(&self, input: &[f64], x0: f64) -> Vec<f64> {
        let mut signal = input.to_vec();
        let mut level = x0;
        for section in &self.sections {
            let zi: Vec<f64> = section.steady_state().iter().map(|z| z * level).collect();
            signal = section.filter(&signal, Some(zi.as_slice()));
            level *= section.dc_gain();
        }
        signal
    }

    /// Forward-backward filtering over the whole cascade, padded by odd
    /// extension like [`IirFilter::filtfilt`].
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        if input.is_empty() {
            return Vec::new();
        }
        let edge = (3 * (2 * self.sections.len() + 1)).min(input.len() - 1);
        let extended = odd_extend(input, edge);

        let forward = self.filter_settled(&extended, extended[0]);
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let mut backward = self.filter_settled(&reversed, reversed[0]);
        backward.reverse();

        backward[edge..edge + input.len()].to_vec()
    }

    /// Magnitude response of the cascade, bins as in [`frequency_response`].
    pub fn frequency_response(&self, points: usize) -> Result<Vec<f64>> {
        let mut total = vec![1.0; points];
        for section in &self.sections {
            let response = frequency_response(&section.b, &section.a, points)?;
            for (gain, r) in total.iter_mut().zip(response) {
                *gain *= r;
            }
        }
        Ok(total)
    }
}

/// Pads `edge` samples on both ends, reflecting the signal through its end
/// points.
fn odd_extend(input: &[f64], edge: usize) -> Vec<f64> {
    let len = input.len();
    let first = input[0];
    let last = input[len - 1];

    let mut extended = Vec::with_capacity(len + 2 * edge);
    extended.extend((1..=edge).rev().map(|i| 2.0 * first - input[i]));
    extended.extend_from_slice(input);
    extended.extend((1..=edge).map(|i| 2.0 * last - input[len - 1 - i]));
    extended
}

/// Gaussian elimination with partial pivoting. `None` if the system is singular.
fn solve(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| matrix[i][col].abs().total_cmp(&matrix[j][col].abs()))?;
        if matrix[pivot][col].abs() < 1e-300 {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);
        let pivot_row = matrix[col].clone();
        let pivot_rhs = rhs[col];
        for row in col + 1..n {
            let factor = matrix[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                matrix[row][k] -= factor * pivot_row[k];
            }
            rhs[row] -= factor * pivot_rhs;
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Some(x)
}

/// Magnitude response |H| at `points` frequencies evenly spaced over
/// [0, Nyquist). Bin `k` corresponds to `k * sample_rate / (2 * points)` Hz.
pub fn frequency_response(b: &[f64], a: &[f64], points: usize) -> Result<Vec<f64>> {
    let fft_size = 2 * points;
    if points == 0 || b.len() > fft_size || a.len() > fft_size {
        return Err(invalid(format!(
            "{} points cannot resolve {} coefficients",
            points,
            b.len().max(a.len())
        )));
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let spectrum = |coeffs: &[f64]| {
        let mut buffer: Vec<C64> = coeffs.iter().map(|&c| C64::new(c, 0.0)).collect();
        buffer.resize(fft_size, C64::new(0.0, 0.0));
        fft.process(&mut buffer);
        buffer
    };
    let num = spectrum(b);
    let den = spectrum(a);

    Ok(num
        .iter()
        .zip(den.iter())
        .take(points)
        .map(|(&n, &d)| (n / d).norm())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (x, y) in actual.iter().zip(expected) {
            assert!((x - y).abs() < tol, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_first_order_lowpass_at_quarter_rate() {
        let (b, a) = design_filter(1, &[1000.0], FilterType::LowPass, 4000.0).unwrap();
        assert_close(&b, &[0.5, 0.5], 1e-12);
        assert_close(&a, &[1.0, 0.0], 1e-12);
    }

    #[test]
    fn test_second_order_lowpass_coefficients() {
        let (b, a) = design_filter(2, &[1000.0], FilterType::LowPass, 4000.0).unwrap();
        assert_close(&b, &[0.292_893_2, 0.585_786_4, 0.292_893_2], 1e-6);
        assert_close(&a, &[1.0, 0.0, 0.171_572_9], 1e-6);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let (b, a) = design_filter(3, &[300.0], FilterType::HighPass, 8000.0).unwrap();
        assert_eq!(b.len(), 4);
        let dc = b.iter().sum::<f64>() / a.iter().sum::<f64>();
        assert!(dc.abs() < 1e-9);
        // z = -1
        let alternating = |coeffs: &[f64]| -> f64 {
            coeffs
                .iter()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { *c } else { -c })
                .sum()
        };
        let nyquist_gain = alternating(&b) / alternating(&a);
        assert!((nyquist_gain.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bandpass_response() {
        let sr = 22050.0;
        let (b, a) = design_filter(5, &[500.0, 2000.0], FilterType::BandPass, sr).unwrap();
        assert_eq!(b.len(), 11);
        assert_eq!(a.len(), 11);
        assert!((a[0] - 1.0).abs() < 1e-12);

        let points = 2048;
        let response = frequency_response(&b, &a, points).unwrap();
        let at = |hz: f64| response[(hz * 2.0 * points as f64 / sr).round() as usize];
        assert!(at(0.0) < 1e-6);
        assert!((at(1000.0) - 1.0).abs() < 0.01);
        assert!(at(100.0) < 0.01);
        assert!(at(8000.0) < 0.01);
    }

    #[test]
    fn test_invalid_designs() {
        assert!(design_filter(0, &[100.0], FilterType::LowPass, 8000.0).is_err());
        assert!(design_filter(2, &[5000.0], FilterType::LowPass, 8000.0).is_err());
        assert!(design_filter(2, &[100.0], FilterType::BandPass, 8000.0).is_err());
        assert!(design_filter(2, &[900.0, 100.0], FilterType::BandPass, 8000.0).is_err());
        assert!(design_filter(2, &[100.0, 200.0], FilterType::HighPass, 8000.0).is_err());
    }

    #[test]
    fn test_causal_filter_matches_difference_equation() {
        let filter = IirFilter::new(vec![0.5, 0.5], vec![1.0, -0.5]).unwrap();
        let y = filter.filter(&[1.0, 0.0, 0.0, 0.0], None);
        // y[n] = 0.5 x[n] + 0.5 x[n-1] + 0.5 y[n-1]
        assert_close(&y, &[0.5, 0.75, 0.375, 0.1875], 1e-12);
    }

    #[test]
    fn test_steady_state_holds_constant_input() {
        let (b, a) = design_filter(2, &[500.0], FilterType::LowPass, 8000.0).unwrap();
        let filter = IirFilter::new(b, a).unwrap();
        let zi: Vec<f64> = filter.steady_state().iter().map(|z| z * 3.0).collect();
        let y = filter.filter(&[3.0; 50], Some(zi.as_slice()));
        assert!(y.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_filtfilt_has_no_phase_lag() {
        let sr = 22050.0;
        let (b, a) = design_filter(5, &[500.0, 2000.0], FilterType::BandPass, sr).unwrap();
        let filter = IirFilter::new(b, a).unwrap();
        let input: Vec<f64> = (0..4410)
            .map(|i| (2.0 * PI * 800.0 * i as f64 / sr).sin())
            .collect();
        let output = filter.filtfilt(&input);
        assert_eq!(output.len(), input.len());
        // Away from the edges the passband tone comes through unchanged.
        for i in 1000..3400 {
            assert!((output[i] - input[i]).abs() < 0.02, "sample {i}");
        }
    }

    #[test]
    fn test_filtfilt_short_inputs() {
        let (b, a) = design_filter(2, &[500.0], FilterType::LowPass, 8000.0).unwrap();
        let filter = IirFilter::new(b, a).unwrap();
        assert!(filter.filtfilt(&[]).is_empty());
        assert_eq!(filter.filtfilt(&[1.0]).len(), 1);
        assert_eq!(filter.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_sections_pair_conjugate_poles() {
        let filter = SosFilter::design(5, &[500.0, 2000.0], FilterType::BandPass, 22050.0).unwrap();
        assert_eq!(filter.sections.len(), 5);
        for section in &filter.sections {
            assert_eq!(section.a.len(), 3);
            // |z| < 1 for both roots of z^2 + a1 z + a2 means a2 < 1 and |a1| < 1 + a2.
            assert!(section.a[2] < 1.0 && section.a[1].abs() < 1.0 + section.a[2]);
        }

        let odd = SosFilter::design(3, &[1000.0], FilterType::LowPass, 8000.0).unwrap();
        assert_eq!(odd.sections.len(), 2);
        assert_eq!(odd.sections[1].a.len(), 2);
    }

    #[test]
    fn test_sections_match_expanded_design() {
        let sr = 22050.0;
        let (b, a) = design_filter(5, &[500.0, 2000.0], FilterType::BandPass, sr).unwrap();
        let expanded = frequency_response(&b, &a, 1024).unwrap();
        let cascade = SosFilter::design(5, &[500.0, 2000.0], FilterType::BandPass, sr)
            .unwrap()
            .frequency_response(1024)
            .unwrap();
        assert_close(&cascade, &expanded, 1e-6);

        let impulse: Vec<f64> = (0..200).map(|i| if i == 0 { 1.0 } else { 0.0 }).collect();
        let direct = IirFilter::new(b, a).unwrap().filter(&impulse, None);
        let sectioned = SosFilter::design(5, &[500.0, 2000.0], FilterType::BandPass, sr)
            .unwrap()
            .filter(&impulse);
        assert_close(&sectioned, &direct, 1e-9);
    }

    #[test]
    fn test_bandpass_stays_stable_at_high_rates() {
        for sr in [96000.0, 176400.0, 192000.0] {
            let filter = SosFilter::design(5, &[500.0, 2000.0], FilterType::BandPass, sr).unwrap();
            let points = 8192;
            let response = filter.frequency_response(points).unwrap();
            let at = |hz: f64| response[(hz * 2.0 * points as f64 / sr).round() as usize];
            assert!((at(1000.0) - 1.0).abs() < 0.01, "{sr} Hz");
            assert!(at(8000.0) < 0.01, "{sr} Hz");

            let len = (0.2 * sr) as usize;
            let input: Vec<f64> = (0..len)
                .map(|i| (2.0 * PI * 800.0 * i as f64 / sr).sin())
                .collect();
            let output = filter.filtfilt(&input);
            assert!(output.iter().all(|v| v.is_finite()), "{sr} Hz");
            for i in len / 4..3 * len / 4 {
                assert!((output[i] - input[i]).abs() < 0.02, "{sr} Hz, sample {i}");
            }
        }
    }

    #[test]
    fn test_cascade_steady_state_holds_constant_input() {
        let filter = SosFilter::design(4, &[300.0], FilterType::LowPass, 8000.0).unwrap();
        let y = filter.filter_settled(&[2.0; 50], 2.0);
        assert!(y.iter().all(|v| (v - 2.0).abs() < 1e-9));
        assert!(filter.filtfilt(&[]).is_empty());
        assert_eq!(filter.filtfilt(&[1.0, 2.0]).len(), 2);
    }
}

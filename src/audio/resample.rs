#[cfg(feature = "high-quality-audio")]
use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
use std::f32::consts::PI;
#[cfg(all(test, feature = "high-quality-audio"))]
use std::sync::atomic::AtomicUsize;
#[cfg(feature = "high-quality-audio")]
use std::sync::atomic::{AtomicBool, Ordering};

pub(super) const MIN_DEVICE_RATE: u32 = 2_000;
pub(super) const MAX_DEVICE_RATE: u32 = 1_600_000;
pub(super) const MIN_RESAMPLE_RATIO: f64 = 1.0 / 32.0;
pub(super) const MAX_RESAMPLE_RATIO: f64 = 32.0;
const MAX_DOWNSAMPLING_TAPS: usize = 129;

#[cfg(feature = "high-quality-audio")]
pub(super) static RESAMPLER_WARNING_SHOWN: AtomicBool = AtomicBool::new(false);
#[cfg(all(test, feature = "high-quality-audio"))]
pub(super) static RESAMPLE_FALLBACK_COUNT: AtomicUsize = AtomicUsize::new(0);
#[cfg(all(test, feature = "high-quality-audio"))]
pub(super) static RESAMPLE_WARN_COUNT: AtomicUsize = AtomicUsize::new(0);
#[cfg(all(test, feature = "high-quality-audio"))]
pub(super) static FORCE_RUBATO_ERROR: AtomicBool = AtomicBool::new(false);

fn rates_supported(from_rate: u32, to_rate: u32) -> bool {
    (MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&from_rate)
        && (MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&to_rate)
}

/// True when audio at `from_rate` can be brought to `to_rate` without
/// distorting its frequencies. Callers must refuse other inputs.
pub(super) fn conversion_supported(from_rate: u32, to_rate: u32) -> bool {
    if from_rate == to_rate {
        return from_rate > 0;
    }
    if !rates_supported(from_rate, to_rate) {
        return false;
    }
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    (MIN_RESAMPLE_RATIO..=MAX_RESAMPLE_RATIO).contains(&ratio)
}

/// Convert `input` sampled at `from_rate` into `to_rate`. Unsupported rates
/// pass the audio through untouched; sources check [`conversion_supported`]
/// before getting here.
pub(super) fn resample_between(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate || !rates_supported(from_rate, to_rate) {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match resample_with_rubato(input, from_rate, to_rate) {
            Ok(output) => output,
            Err(err) => {
                #[cfg(test)]
                RESAMPLE_FALLBACK_COUNT.fetch_add(1, Ordering::Relaxed);
                if !RESAMPLER_WARNING_SHOWN.swap(true, Ordering::AcqRel) {
                    #[cfg(test)]
                    RESAMPLE_WARN_COUNT.fetch_add(1, Ordering::Relaxed);
                    log_debug(&format!(
                        "high-quality resampler failed ({err}); falling back to basic path"
                    ));
                }
                basic_resample(input, from_rate, to_rate)
            }
        }
    }

    #[cfg(not(feature = "high-quality-audio"))]
    {
        basic_resample(input, from_rate, to_rate)
    }
}

#[cfg(feature = "high-quality-audio")]
pub(super) fn resample_with_rubato(
    input: &[f32],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>> {
    if input.is_empty() || from_rate == to_rate {
        return Ok(input.to_vec());
    }
    if !rates_supported(from_rate, to_rate) {
        return Err(anyhow!(
            "unsupported sample rate pair {from_rate}Hz -> {to_rate}Hz for resampling"
        ));
    }
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    if !(MIN_RESAMPLE_RATIO..=MAX_RESAMPLE_RATIO).contains(&ratio) {
        return Err(anyhow!("invalid resample ratio {ratio}"));
    }

    #[cfg(test)]
    if FORCE_RUBATO_ERROR.swap(false, Ordering::Relaxed) {
        return Err(anyhow!("forced rubato error"));
    }

    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    //           ratio,  drift, params, chunk_size, channels
    let mut rs = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expect = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(expect + chunk);

    let mut seg = vec![0.0f32; chunk];
    for block in input.chunks(chunk) {
        let pad = block.last().copied().unwrap_or(0.0);
        seg.fill(pad);
        seg[..block.len()].copy_from_slice(block);
        let produced = rs
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        out.extend_from_slice(&produced[0]);
    }

    Ok(adjust_frame_length(out, expect))
}

pub(super) fn basic_resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate || !rates_supported(from_rate, to_rate) {
        return input.to_vec();
    }

    // Ratio > 1 means upsampling, < 1 means downsampling.
    let ratio = (f64::from(to_rate) / f64::from(from_rate))
        .clamp(MIN_RESAMPLE_RATIO, MAX_RESAMPLE_RATIO) as f32;
    let filtered = if from_rate > to_rate {
        // Band-limit before decimating so content above the new Nyquist can't alias
        // into the whistle band.
        let taps = downsampling_tap_count(from_rate, to_rate);
        low_pass_fir(input, from_rate, to_rate, taps)
    } else {
        input.to_vec()
    };
    resample_linear(&filtered, ratio)
}

/// Linear interpolation resampler; cheap enough to run once per frame.
pub(super) fn resample_linear(input: &[f32], ratio: f32) -> Vec<f32> {
    let input_len = input.len();
    let output_len = (input_len as f32 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx - idx as f32;

        if idx + 1 < input_len {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input.last().copied().unwrap_or(0.0));
        }
    }

    output
}

/// Longer filters for steeper decimation, short ones for near-equal rates.
pub(super) fn downsampling_tap_count(from_rate: u32, to_rate: u32) -> usize {
    let decimation_ratio = from_rate as f32 / to_rate.max(1) as f32;
    let mut taps = (decimation_ratio * 4.0).ceil().max(11.0) as usize;
    if taps.is_multiple_of(2) {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

/// FIR low-pass at the target Nyquist frequency.
pub(super) fn low_pass_fir(input: &[f32], from_rate: u32, to_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }

    let normalized_cutoff = (to_rate as f32 * 0.5 / from_rate as f32).min(0.499);
    let coeffs = design_low_pass(normalized_cutoff, taps);
    let half = taps / 2;
    let mut output = Vec::with_capacity(input.len());

    for n in 0..input.len() {
        let mut acc = 0.0;
        for (k, coeff) in coeffs.iter().enumerate() {
            if let Some(idx) = (n + k).checked_sub(half) {
                if let Some(sample) = input.get(idx) {
                    acc += *sample * coeff;
                }
            }
        }
        output.push(acc);
    }

    output
}

/// Bring one captured device frame to the detector's rate and exact length.
pub(super) fn convert_frame_to_target(
    frame: Vec<f32>,
    device_rate: u32,
    target_rate: u32,
    desired_len: usize,
) -> Vec<f32> {
    if device_rate == target_rate {
        return adjust_frame_length(frame, desired_len);
    }
    let resampled = resample_between(&frame, device_rate, target_rate);
    adjust_frame_length(resampled, desired_len)
}

pub(super) fn adjust_frame_length(mut data: Vec<f32>, desired: usize) -> Vec<f32> {
    match data.len().cmp(&desired) {
        CmpOrdering::Greater => data.truncate(desired),
        CmpOrdering::Less => {
            let pad = data.last().copied().unwrap_or(0.0);
            data.resize(desired, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}

/// Normalized Hamming-windowed sinc taps.
pub(super) fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mut coeffs = Vec::with_capacity(taps);
    let m = taps.saturating_sub(1).max(1) as f32;

    for n in 0..taps {
        let centered = n as f32 - m / 2.0;
        let x = 2.0 * PI * normalized_cutoff * centered;
        let sinc = if centered == 0.0 {
            2.0 * normalized_cutoff
        } else {
            (2.0 * normalized_cutoff * x.sin()) / x
        };
        let window = if taps <= 1 {
            1.0
        } else {
            0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos()
        };
        coeffs.push(sinc * window);
    }

    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        for coeff in coeffs.iter_mut() {
            *coeff /= sum;
        }
    }

    coeffs
}

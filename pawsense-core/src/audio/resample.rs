//! Fixed-ratio sample-rate conversion to the model rate.
//!
//! Microphones usually run at 44.1 or 48 kHz while the classifier wants
//! 16 kHz mono. [`RateConverter`] wraps a rubato `FastFixedIn` session and
//! runs on the feeder thread, never inside the audio callback.
//!
//! Equal rates skip rubato entirely.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{PawsenseError, Result};

/// Input frames per rubato call.
pub const DEFAULT_RESAMPLE_BLOCK: usize = 1024;

pub struct RateConverter {
    inner: Option<Block>,
}

/// Active rubato session plus its staging buffers.
struct Block {
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
    block_len: usize,
    scratch: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `PawsenseError::AudioDevice` if rubato rejects the ratio or block size.
    pub fn new(from_rate: u32, to_rate: u32, block_len: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(PawsenseError::AudioDevice(format!(
                "invalid resample rates {from_rate} -> {to_rate}"
            )));
        }
        if from_rate == to_rate {
            return Ok(Self { inner: None });
        }

        let resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            block_len,
            1,
        )
        .map_err(|e| PawsenseError::AudioDevice(format!("resampler init: {e}")))?;
        let scratch = vec![vec![0.0; resampler.output_frames_max()]];
        info!(from_rate, to_rate, block_len, "resampling enabled");

        Ok(Self {
            inner: Some(Block {
                resampler,
                pending: Vec::with_capacity(block_len * 2),
                block_len,
                scratch,
            }),
        })
    }

    /// Resample `samples`, appending output to `out`.
    ///
    /// Input is staged until a full block is available; the remainder carries
    /// over to the next call.
    pub fn process_into(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(block) = self.inner.as_mut() else {
            out.extend_from_slice(samples);
            return;
        };
        block.pending.extend_from_slice(samples);

        let mut offset = 0;
        while block.pending.len() - offset >= block.block_len {
            let input = &block.pending[offset..offset + block.block_len];
            match block
                .resampler
                .process_into_buffer(&[input], &mut block.scratch, None)
            {
                Ok((_, produced)) => out.extend_from_slice(&block.scratch[0][..produced]),
                Err(e) => error!("resampler process error: {e}"),
            }
            offset += block.block_len;
        }
        block.pending.drain(..offset);
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut out = Vec::new();
        self.process_into(samples, &mut out);
        out
    }

    /// Push any staged partial block through the resampler. Used at the end
    /// of a finite source.
    pub fn flush_into(&mut self, out: &mut Vec<f32>) {
        let Some(block) = self.inner.as_mut() else {
            return;
        };
        if block.pending.is_empty() {
            return;
        }
        let input = std::mem::take(&mut block.pending);
        let wave_in: [&[f32]; 1] = [input.as_slice()];
        match block
            .resampler
            .process_partial_into_buffer(Some(&wave_in[..]), &mut block.scratch, None)
        {
            Ok((_, produced)) => out.extend_from_slice(&block.scratch[0][..produced]),
            Err(e) => error!("resampler flush error: {e}"),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_pass_samples_through() {
        let mut rc = RateConverter::new(16_000, 16_000, DEFAULT_RESAMPLE_BLOCK).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..500).map(|i| i as f32 / 500.0).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn downsampling_by_three_yields_a_third_of_the_frames() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let out = rc.process(&vec![0.0f32; 960 * 4]);
        let expected = 1280isize;
        assert!(
            (out.len() as isize - expected).unsigned_abs() <= 40,
            "got {} frames, expected about {expected}",
            out.len()
        );
    }

    #[test]
    fn short_input_is_staged_until_a_block_fills() {
        let mut rc = RateConverter::new(44_100, 16_000, 1024).unwrap();
        assert!(rc.process(&[0.0; 600]).is_empty());
        assert!(!rc.process(&[0.0; 600]).is_empty());
    }

    #[test]
    fn flush_drains_a_partial_block() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let mut out = Vec::new();
        rc.process_into(&[0.1; 500], &mut out);
        assert!(out.is_empty());
        rc.flush_into(&mut out);
        assert!(!out.is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateConverter::new(0, 16_000, 960).is_err());
    }
}

//! Collapses the network's linear middle segment into one matrix.
//!
//! Average pooling, convolution and the fully-connected layer are all
//! linear maps, so their composition is itself a single matrix. Probing the
//! composition with an identity basis reads that matrix off directly: row
//! `i` of the response to `eye(n)` is the segment's output for unit impulse
//! `i`. A consumer then replaces the whole segment with one multiply,
//! `x_flat @ W_squash`.
//!
//! The technique is only sound while every probed stage stays linear;
//! [`verify`] re-checks the equivalence on an independent random batch and
//! treats any drift beyond a small tolerance as a hard failure.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::Distribution;
use thiserror::Error;

use crate::model::{
    CONV2_SHAPE, FC1_SHAPE, LinearSegment, SEGMENT_INPUT_DIM, SEGMENT_OUTPUT_DIM,
};
use crate::weights::{self, WeightFileError};

/// Maximum absolute elementwise difference tolerated between the segment
/// and the squashed matrix on the verification batch.
pub const TOLERANCE: f32 = 1e-5;

/// Verification batch size.
const VERIFY_SAMPLES: usize = 100;

#[derive(Debug, Error)]
pub enum SquashError {
    #[error(
        "squashed matrix diverges from the pipeline: max |diff| {max_diff:e} exceeds {tolerance:e}"
    )]
    ToleranceExceeded { max_diff: f32, tolerance: f32 },

    #[error(transparent)]
    Weights(#[from] WeightFileError),
}

/// Reads off the matrix representation of a linear pipeline by evaluating
/// it on the identity basis.
///
/// The returned matrix has one row per input dimension and one column per
/// output dimension, oriented so that `pipeline(x) == x @ matrix`. The
/// caller guarantees the pipeline is linear; probing a nonlinear map
/// produces a matrix [`verify`] will reject.
pub fn probe<B: Backend, F>(input_dim: usize, device: &B::Device, pipeline: F) -> Tensor<B, 2>
where
    F: Fn(Tensor<B, 2>) -> Tensor<B, 2>,
{
    pipeline(Tensor::eye(input_dim, device))
}

/// Checks the squashed matrix against the original pipeline on an
/// independent uniform-random batch.
///
/// Returns the observed maximum absolute difference. A difference beyond
/// `TOLERANCE` is a correctness failure, not a recoverable condition.
pub fn verify<B: Backend, F>(
    matrix: &Tensor<B, 2>,
    device: &B::Device,
    pipeline: F,
) -> Result<f32, SquashError>
where
    F: Fn(Tensor<B, 2>) -> Tensor<B, 2>,
{
    let [input_dim, _] = matrix.dims();
    let batch = Tensor::<B, 2>::random([VERIFY_SAMPLES, input_dim], Distribution::Default, device);

    let reference = pipeline(batch.clone());
    let collapsed = batch.matmul(matrix.clone());

    let max_diff = (reference - collapsed)
        .abs()
        .max()
        .into_scalar()
        .elem::<f32>();

    if max_diff > TOLERANCE {
        return Err(SquashError::ToleranceExceeded {
            max_diff,
            tolerance: TOLERANCE,
        });
    }
    Ok(max_diff)
}

/// Probes the segment and verifies the result before handing it back.
pub fn squash_segment<B: Backend>(
    segment: &LinearSegment<B>,
    device: &B::Device,
) -> Result<Tensor<B, 2>, SquashError> {
    let matrix = probe(SEGMENT_INPUT_DIM, device, |x| segment.forward_flat(x));
    let max_diff = verify(&matrix, device, |x| segment.forward_flat(x))?;
    log::info!("segment squashed, max |diff| = {max_diff:e}");

    Ok(matrix)
}

/// Standalone squashing run: load the exported segment weights from
/// `artifact_dir`, squash, persist `W_squash.txt`, then verify against the
/// reassembled segment.
///
/// Mirrors what the trainer does right after exporting its weights, so the
/// artifact can be regenerated at any time from the text files alone.
pub fn squash_from_files<B: Backend>(
    artifact_dir: &Path,
    device: &B::Device,
) -> Result<Tensor<B, 2>, SquashError> {
    println!("Squashing layers");

    let conv2 = weights::load_tensor::<B, 4>(
        &artifact_dir.join(weights::W_CONV2),
        CONV2_SHAPE,
        device,
    )?;
    let fc1 =
        weights::load_tensor::<B, 2>(&artifact_dir.join(weights::W_FC1), FC1_SHAPE, device)?;
    let segment = LinearSegment::from_weights(conv2, fc1);

    let matrix = squash_segment(&segment, device)?;
    debug_assert_eq!(matrix.dims()[1], SEGMENT_OUTPUT_DIM);

    let out_path = artifact_dir.join(weights::W_SQUASH);
    weights::save_matrix(&out_path, matrix.clone())?;
    println!("Saved to {}", out_path.display());
    println!("Squashed layers");

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::activation::relu;

    type TestBackend = NdArray;

    fn max_abs_diff(a: Tensor<TestBackend, 2>, b: Tensor<TestBackend, 2>) -> f32 {
        (a - b).abs().max().into_scalar().elem::<f32>()
    }

    #[test]
    fn probing_the_identity_yields_the_identity() {
        let device = Default::default();

        let matrix = probe::<TestBackend, _>(2, &device, |x| {
            x.matmul(Tensor::eye(2, &device))
        });

        assert!(max_abs_diff(matrix, Tensor::eye(2, &device)) == 0.0);
    }

    #[test]
    fn probing_recovers_a_known_matrix() {
        let device = Default::default();
        let known = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            &device,
        );

        let matrix = probe::<TestBackend, _>(3, &device, |x| x.matmul(known.clone()));

        assert_eq!(matrix.dims(), [3, 2]);
        assert!(max_abs_diff(matrix, known) == 0.0);
    }

    #[test]
    fn verification_accepts_a_linear_pipeline() {
        let device = Default::default();
        TestBackend::seed(7);
        let weight = Tensor::<TestBackend, 2>::from_floats(
            [[0.5, -0.25], [-1.0, 0.75], [0.1, 0.2]],
            &device,
        );
        let pipeline = |x: Tensor<TestBackend, 2>| x.matmul(weight.clone());

        let matrix = probe::<TestBackend, _>(3, &device, &pipeline);
        let max_diff = verify(&matrix, &device, &pipeline).unwrap();

        assert!(max_diff <= TOLERANCE);
    }

    #[test]
    fn nonlinearity_in_the_pipeline_fails_verification() {
        let device = Default::default();
        TestBackend::seed(7);
        let weight = Tensor::<TestBackend, 2>::from_floats([[1.0], [-1.0]], &device);
        // Not a linear map, so basis probing misreads it.
        let pipeline = |x: Tensor<TestBackend, 2>| relu(x.matmul(weight.clone()));

        let matrix = probe::<TestBackend, _>(2, &device, &pipeline);
        let result = verify(&matrix, &device, &pipeline);

        assert!(matches!(
            result,
            Err(SquashError::ToleranceExceeded { .. })
        ));
    }

    #[test]
    fn squashed_segment_matches_its_pipeline() {
        let device = Default::default();
        TestBackend::seed(42);
        let segment = LinearSegment::<TestBackend>::new(&device);

        let matrix = squash_segment(&segment, &device).unwrap();

        assert_eq!(matrix.dims(), [SEGMENT_INPUT_DIM, SEGMENT_OUTPUT_DIM]);
    }
}

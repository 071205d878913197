//! Plain-text weight persistence.
//!
//! Weight tensors travel between the trainer, the squasher and the
//! downstream inference system as whitespace/newline-separated decimal
//! floats, the format `numpy.savetxt` produces. Trained parameters are
//! written flattened, one value per line; the squashed matrix is written
//! one row per line.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use burn::prelude::*;
use thiserror::Error;

/// Conventional file names inside the artifact directory.
pub const W_CONV1: &str = "W_conv1.txt";
pub const W_CONV2: &str = "W_conv2.txt";
pub const W_FC1: &str = "W_fc1.txt";
pub const W_FC2: &str = "W_fc2.txt";
pub const W_SQUASH: &str = "W_squash.txt";

#[derive(Debug, Error)]
pub enum WeightFileError {
    #[error("failed to access weight file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value {token:?} at position {index} in {path:?}")]
    Parse {
        path: PathBuf,
        token: String,
        index: usize,
    },

    #[error("{path:?} holds {found} values, expected {expected} for shape {shape:?}")]
    ShapeMismatch {
        path: PathBuf,
        found: usize,
        expected: usize,
        shape: Vec<usize>,
    },
}

/// Parses a whole weight file and reshapes it.
///
/// Line structure is ignored; only the value count has to match the
/// expected shape. A mismatch is fatal, there is nothing sensible to do
/// with a truncated weight matrix.
pub fn load_tensor<B: Backend, const D: usize>(
    path: &Path,
    shape: [usize; D],
    device: &B::Device,
) -> Result<Tensor<B, D>, WeightFileError> {
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut contents))
        .map_err(|source| WeightFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut values = Vec::new();
    for (index, token) in contents.split_whitespace().enumerate() {
        let value = token
            .parse::<f32>()
            .map_err(|_| WeightFileError::Parse {
                path: path.to_path_buf(),
                token: token.to_string(),
                index,
            })?;
        values.push(value);
    }

    let expected: usize = shape.iter().product();
    if values.len() != expected {
        return Err(WeightFileError::ShapeMismatch {
            path: path.to_path_buf(),
            found: values.len(),
            expected,
            shape: shape.to_vec(),
        });
    }

    let data = TensorData::new(values, shape).convert::<B::FloatElem>();
    log::debug!("loaded {shape:?} weight tensor from {path:?}");
    Ok(Tensor::from_data(data, device))
}

/// Writes a 2-D tensor one matrix row per line.
pub fn save_matrix<B: Backend>(path: &Path, matrix: Tensor<B, 2>) -> Result<(), WeightFileError> {
    let [_, cols] = matrix.dims();
    write_values(path, matrix.into_data(), cols)
}

/// Writes a tensor of any rank flattened, one value per line.
pub fn save_flat<B: Backend, const D: usize>(
    path: &Path,
    tensor: Tensor<B, D>,
) -> Result<(), WeightFileError> {
    write_values(path, tensor.into_data(), 1)
}

fn write_values(path: &Path, data: TensorData, per_line: usize) -> Result<(), WeightFileError> {
    let io_err = |source| WeightFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let values = data
        .convert::<f32>()
        .to_vec::<f32>()
        .expect("weight tensors hold float values");

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    for row in values.chunks(per_line) {
        for (i, value) in row.iter().enumerate() {
            let sep = if i + 1 == row.len() { "\n" } else { " " };
            write!(writer, "{value:.18e}{sep}").map_err(io_err)?;
        }
    }
    writer.flush().map_err(io_err)?;

    log::debug!("saved {} values to {path:?}", values.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(W_SQUASH);
        let device = Default::default();

        let matrix = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, -2.5, 3.0], [0.25, 0.0, -1e-7]],
            &device,
        );
        save_matrix(&path, matrix.clone()).unwrap();

        let loaded = load_tensor::<TestBackend, 2>(&path, [2, 3], &device).unwrap();
        loaded.into_data().assert_eq(&matrix.into_data(), true);
    }

    #[test]
    fn flat_round_trip_reshapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(W_CONV2);
        let device = Default::default();

        let tensor = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]]],
            &device,
        );
        save_flat(&path, tensor.clone()).unwrap();

        let loaded = load_tensor::<TestBackend, 4>(&path, [1, 2, 2, 2], &device).unwrap();
        loaded.into_data().assert_eq(&tensor.into_data(), true);
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(W_FC1);
        std::fs::write(&path, "1.0 2.0 3.0").unwrap();

        let device = Default::default();
        let result = load_tensor::<TestBackend, 2>(&path, [2, 2], &device);

        assert!(matches!(
            result,
            Err(WeightFileError::ShapeMismatch {
                found: 3,
                expected: 4,
                ..
            })
        ));
    }

    #[test]
    fn unparsable_token_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(W_FC1);
        std::fs::write(&path, "1.0 oops 3.0").unwrap();

        let device = Default::default();
        let result = load_tensor::<TestBackend, 2>(&path, [1, 3], &device);

        assert!(matches!(
            result,
            Err(WeightFileError::Parse { index: 1, .. })
        ));
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let result =
            load_tensor::<TestBackend, 2>(&dir.path().join(W_CONV1), [2, 2], &device);

        assert!(matches!(result, Err(WeightFileError::Io { .. })));
    }
}

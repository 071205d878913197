//! Minimal demonstration of building and evaluating an arithmetic tensor
//! expression on the selected backend.

#[cfg(feature = "ndarray")]
fn main() {
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::tensor::Tensor;

    let device = NdArrayDevice::Cpu;
    let a = Tensor::<NdArray, 2>::from_floats([[1.0, 2.0, 3.0, 4.0]], &device);
    let b = Tensor::<NdArray, 2>::ones([1, 4], &device);

    let f = (a.clone() + b.clone()) * a * b;

    println!("Result: {f}");
}

#[cfg(not(feature = "ndarray"))]
fn main() {
    println!("Enable the `ndarray` feature to run this demo.");
}

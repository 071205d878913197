//! Cryptonets-style MNIST training with linear-layer squashing.
//!
//! Trains the small convolutional network whose middle segment
//! (average-pool, convolution, average-pool, fully-connected) is purely
//! linear, exports the learned weights as plain-text files, and collapses
//! that segment into a single equivalent matrix for a downstream
//! encrypted-inference pipeline. See [`squash`] for the collapsing
//! machinery and [`training`] for the end-to-end run.

pub mod cli;
pub mod data;
pub mod model;
pub mod squash;
pub mod training;
pub mod weights;

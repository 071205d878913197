#[cfg(feature = "ndarray")]
mod ndarray {
    use std::path::Path;

    use burn::backend::{
        Autodiff,
        ndarray::{NdArray, NdArrayDevice},
    };
    use burn::optim::AdamConfig;
    use cryptonets::{
        cli::{Cli, Commands},
        model::CryptonetsConfig,
        squash,
        training::{self, TrainingConfig},
    };

    pub fn run(cli: Cli) {
        let device = NdArrayDevice::Cpu;

        match cli.command {
            Commands::Train {
                artifact_dir,
                num_epochs,
                batch_size,
                num_workers,
                seed,
                lr,
            } => {
                let config = TrainingConfig::new(CryptonetsConfig::new(), AdamConfig::new())
                    .with_num_epochs(num_epochs)
                    .with_batch_size(batch_size)
                    .with_num_workers(num_workers)
                    .with_seed(seed)
                    .with_lr(lr);
                training::train::<Autodiff<NdArray>>(&artifact_dir, config, device);
            }
            Commands::Squash { artifact_dir } => {
                if let Err(err) =
                    squash::squash_from_files::<NdArray>(Path::new(&artifact_dir), &device)
                {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
    }
}

#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
mod wgpu {
    use std::path::Path;

    use burn::backend::{
        Autodiff,
        wgpu::{Wgpu, WgpuDevice},
    };
    use burn::optim::AdamConfig;
    use cryptonets::{
        cli::{Cli, Commands},
        model::CryptonetsConfig,
        squash,
        training::{self, TrainingConfig},
    };

    pub fn run(cli: Cli) {
        let device = WgpuDevice::default();

        match cli.command {
            Commands::Train {
                artifact_dir,
                num_epochs,
                batch_size,
                num_workers,
                seed,
                lr,
            } => {
                let config = TrainingConfig::new(CryptonetsConfig::new(), AdamConfig::new())
                    .with_num_epochs(num_epochs)
                    .with_batch_size(batch_size)
                    .with_num_workers(num_workers)
                    .with_seed(seed)
                    .with_lr(lr);
                training::train::<Autodiff<Wgpu>>(&artifact_dir, config, device);
            }
            Commands::Squash { artifact_dir } => {
                if let Err(err) =
                    squash::squash_from_files::<Wgpu>(Path::new(&artifact_dir), &device)
                {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
    }
}

#[cfg(all(feature = "tch-cpu", not(feature = "ndarray"), not(feature = "wgpu")))]
mod tch_cpu {
    use std::path::Path;

    use burn::backend::{
        Autodiff,
        libtorch::{LibTorch, LibTorchDevice},
    };
    use burn::optim::AdamConfig;
    use cryptonets::{
        cli::{Cli, Commands},
        model::CryptonetsConfig,
        squash,
        training::{self, TrainingConfig},
    };

    pub fn run(cli: Cli) {
        let device = LibTorchDevice::Cpu;

        match cli.command {
            Commands::Train {
                artifact_dir,
                num_epochs,
                batch_size,
                num_workers,
                seed,
                lr,
            } => {
                let config = TrainingConfig::new(CryptonetsConfig::new(), AdamConfig::new())
                    .with_num_epochs(num_epochs)
                    .with_batch_size(batch_size)
                    .with_num_workers(num_workers)
                    .with_seed(seed)
                    .with_lr(lr);
                training::train::<Autodiff<LibTorch>>(&artifact_dir, config, device);
            }
            Commands::Squash { artifact_dir } => {
                if let Err(err) =
                    squash::squash_from_files::<LibTorch>(Path::new(&artifact_dir), &device)
                {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
    }
}

use clap::Parser;
use cryptonets::cli::Cli;

fn main() {
    let cli = Cli::parse();

    #[cfg(feature = "ndarray")]
    ndarray::run(cli);
    #[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
    wgpu::run(cli);
    #[cfg(all(feature = "tch-cpu", not(feature = "ndarray"), not(feature = "wgpu")))]
    tch_cpu::run(cli);
}

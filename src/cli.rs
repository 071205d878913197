use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Cryptonets MNIST training and linear-layer squashing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train on MNIST, export weight files and squash the linear segment
    Train {
        /// Directory for weight files and training artifacts
        #[arg(long, default_value = "artifacts")]
        artifact_dir: String,

        /// Number of training epochs
        #[arg(long, default_value_t = 10)]
        num_epochs: usize,

        /// Batch size
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Number of dataloader workers
        #[arg(long, default_value_t = 4)]
        num_workers: usize,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Learning rate
        #[arg(long, default_value_t = 1e-4)]
        lr: f64,
    },

    /// Rebuild W_squash.txt from previously exported weight files
    Squash {
        /// Directory holding W_conv2.txt and W_fc1.txt
        #[arg(long, default_value = "artifacts")]
        artifact_dir: String,
    },
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "trainer", about = "Real-time pitch, tuning and stability readout for a monophonic instrument")]
pub struct Cli {
    /// JSON analysis config; missing fields use defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the requested sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Override the hop size in samples
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Readout refresh interval in milliseconds
    #[arg(long, default_value_t = 50)]
    pub refresh_ms: u64,

    /// Stop after this many seconds (runs until the input ends otherwise)
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Print one JSON object per readout instead of the meter line
    #[arg(long)]
    pub json: bool,

    /// Analyze a synthetic sine tone at this frequency instead of the input device
    #[arg(long, value_name = "HZ")]
    pub simulate: Option<f64>,

    /// Amplitude of the synthetic tone (0.0-1.0)
    #[arg(long, default_value_t = 0.5)]
    pub amplitude: f32,
}

use clap::Parser;
use log::info;
use polishdata::alignment_filter::FilterConfig;
use polishdata::commands::generate::{run_generate, GenerateOptions};
use polishdata::commands::inspect::run_inspect;
use polishdata::commands::stitch::run_stitch;
use polishdata::features::PileupConfig;
use polishdata::pipeline::{GenerateConfig, DEFAULT_FLUSH_INTERVAL};
use polishdata::region::{PlannerConfig, DEFAULT_OVERLAP, DEFAULT_WINDOW};
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;

/// Options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Prepare training and inference examples for sequence polishing.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Generate a dataset from aligned reads (training when a truth alignment is given)
    Generate {
        #[clap(flatten)]
        common: CommonOpts,

        /// Indexed BAM/CRAM of reads aligned to the reference
        #[clap(short = 'r', long, value_parser)]
        reads: String,

        /// Indexed BAM/CRAM of the truth assembly aligned to the reference
        #[clap(short = 'T', long, value_parser)]
        truth: Option<String>,

        /// Reference FASTA
        #[clap(short = 'f', long, value_parser)]
        reference: String,

        /// Output dataset
        #[clap(short = 'o', long, value_parser)]
        output: String,

        /// Number of worker threads
        #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN))]
        threads: NonZeroUsize,

        /// Region size
        #[clap(long, value_parser, default_value_t = DEFAULT_WINDOW)]
        window: i64,

        /// Overlap between consecutive regions
        #[clap(long, value_parser, default_value_t = DEFAULT_OVERLAP)]
        overlap: i64,

        /// Minimum length of a truth alignment after filtering
        #[clap(long, value_parser, default_value_t = 1000)]
        min_len: i64,

        /// Completed regions between two writes to the dataset
        #[clap(long, value_parser, default_value_t = DEFAULT_FLUSH_INTERVAL)]
        flush_interval: usize,

        /// Seed for read sampling
        #[clap(long, value_parser, default_value_t = 42)]
        seed: u64,
    },
    /// Print the layout of a dataset
    Inspect {
        #[clap(flatten)]
        common: CommonOpts,

        /// Dataset to inspect
        #[clap(short = 'i', long, value_parser)]
        input: String,
    },
    /// Build polished contigs from per-position predictions
    Stitch {
        #[clap(flatten)]
        common: CommonOpts,

        /// Dataset whose contigs are polished
        #[clap(short = 'i', long, value_parser)]
        input: String,

        /// Predictions as `contig reference insertion base` TSV (plain or bgzip)
        #[clap(short = 'p', long, value_parser)]
        predictions: String,

        /// Output FASTA
        #[clap(short = 'o', long, value_parser)]
        output: String,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Generate {
            common,
            reads,
            truth,
            reference,
            output,
            threads,
            window,
            overlap,
            min_len,
            flush_interval,
            seed,
        } => {
            init_logger(&common);

            let num_workers: usize = threads.into();
            let options = GenerateOptions {
                reads_path: reads,
                truth_path: truth,
                reference_path: reference,
                output_path: output,
                pipeline: GenerateConfig {
                    planner: PlannerConfig { window, overlap },
                    filter: FilterConfig {
                        min_len,
                        ..FilterConfig::default()
                    },
                    flush_interval,
                    num_workers,
                    queue_capacity: 2 * num_workers,
                },
                pileup: PileupConfig {
                    seed,
                    ..PileupConfig::default()
                },
            };
            let stats = run_generate(options)?;
            info!(
                "Done: {} examples, {} regions, {} skipped",
                stats.examples, stats.regions, stats.skipped
            );
        }
        Args::Inspect { common, input } => {
            init_logger(&common);

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            run_inspect(&input, &mut out)?;
            out.flush()?;
        }
        Args::Stitch {
            common,
            input,
            predictions,
            output,
        } => {
            init_logger(&common);

            run_stitch(&input, &predictions, &output)?;
        }
    }

    Ok(())
}

/// Initialize logger based on verbosity
fn init_logger(common: &CommonOpts) {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();
}

//! Region-parallel dataset generation.
//!
//! Regions are processed on a rayon pool. Each finished region is sent over a
//! bounded channel to a single consumer that owns the [`ExampleStore`] and
//! flushes it every `flush_interval` regions.

use crate::alignment_filter::{collect_truth_alignments, filter_alignments, FilterConfig};
use crate::alignment_record::AlignmentSource;
use crate::assembler::{AssemblyStats, ExampleAssembler, TruthMap};
use crate::container::DatasetWriter;
use crate::error::DataError;
use crate::features::FeatureGenerator;
use crate::labels::{map_labels, LabelTrack};
use crate::region::{plan, PlannerConfig, Region};
use crate::storage::{DatasetMode, ExampleStore, RegionExamples};
use crossbeam_channel::{bounded, Receiver};
use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::io;

pub const DEFAULT_FLUSH_INTERVAL: usize = 10;

#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub planner: PlannerConfig,
    pub filter: FilterConfig,
    /// Completed regions between two flushes of the store
    pub flush_interval: usize,
    pub num_workers: usize,
    /// Finished regions that may wait for the consumer
    pub queue_capacity: usize,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        let num_workers = num_cpus::get();
        GenerateConfig {
            planner: PlannerConfig::default(),
            filter: FilterConfig::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            num_workers,
            queue_capacity: 2 * num_workers,
        }
    }
}

/// Examples produced for one region.
#[derive(Debug)]
pub struct RegionResult {
    pub region: Region,
    pub examples: RegionExamples,
    pub assembly: AssemblyStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerateStats {
    pub regions: usize,
    /// Regions without a usable truth alignment
    pub skipped: usize,
    pub examples: usize,
    /// Windows dropped for touching an unknown truth base
    pub rejected_windows: usize,
}

/// Labelled examples of one region.
///
/// Features are generated separately for the label span of every filtered
/// truth alignment and labelled against the truth of all of them.
pub fn process_training_region<S, G>(
    truth: &S,
    generator: &G,
    reads_path: &str,
    reference: &[u8],
    region: &Region,
    filter: &FilterConfig,
) -> Result<RegionResult, DataError>
where
    S: AlignmentSource,
    G: FeatureGenerator + ?Sized,
{
    let aligns = collect_truth_alignments(truth, region)?;
    let filtered = filter_alignments(aligns, filter);
    if filtered.is_empty() {
        return Err(DataError::NoAlignments {
            region: region.to_string(),
        });
    }

    let tracks: Vec<LabelTrack> = filtered
        .iter()
        .map(|align| map_labels(align, reference, region))
        .collect();
    for (align, track) in filtered.iter().zip(&tracks) {
        debug!(
            "Truth alignment {}-{} on {}: {} columns, {} mismatches",
            align.start,
            align.end,
            region.contig,
            track.len(),
            track.mismatches
        );
    }

    let spans: Vec<(i64, i64)> = filtered.iter().map(|a| (a.start, a.end)).collect();
    let assembler =
        ExampleAssembler::new(&region.contig, TruthMap::from_tracks(&tracks), &spans)?;

    let mut assembly = AssemblyStats::default();
    let mut examples = Vec::new();
    for track in &tracks {
        let Some((start, end)) = track.span() else {
            continue;
        };
        let region_string = Region::new(region.contig.as_str(), start, end).to_region_string();
        let windows = generator.generate(reads_path, reference, &region_string)?;
        examples.extend(assembler.assemble(windows, &mut assembly)?);
    }

    info!(
        "Finished generating {} examples for {} ({} windows rejected)",
        examples.len(),
        region,
        assembly.rejected_unknown
    );
    Ok(RegionResult {
        region: region.clone(),
        examples: RegionExamples::Labeled(examples),
        assembly,
    })
}

/// Unlabelled examples of one region.
pub fn process_inference_region<G>(
    generator: &G,
    reads_path: &str,
    reference: &[u8],
    region: &Region,
) -> Result<RegionResult, DataError>
where
    G: FeatureGenerator + ?Sized,
{
    let windows = generator.generate(reads_path, reference, &region.to_region_string())?;
    info!("Finished generating {} examples for {}", windows.len(), region);
    Ok(RegionResult {
        region: region.clone(),
        assembly: AssemblyStats {
            accepted: windows.len(),
            rejected_unknown: 0,
        },
        examples: RegionExamples::Unlabeled(windows),
    })
}

/// Store results as they arrive, flushing every `flush_interval` completed
/// regions and once the channel closes. Returns on the first fatal error,
/// which drops the receiver and stops the producers.
pub fn consume_results<W: ExampleStore>(
    results: Receiver<Result<RegionResult, DataError>>,
    store: &mut W,
    flush_interval: usize,
) -> Result<GenerateStats, DataError> {
    let mut stats = GenerateStats::default();
    let mut since_flush = 0;

    for result in results {
        match result {
            Ok(result) => {
                stats.regions += 1;
                stats.examples += result.examples.len();
                stats.rejected_windows += result.assembly.rejected_unknown;
                store.store(&result.region.contig, result.examples)?;
            }
            Err(e) if e.is_recoverable() => {
                info!("{}, skipping", e);
                stats.regions += 1;
                stats.skipped += 1;
            }
            Err(e) => return Err(e),
        }

        since_flush += 1;
        if since_flush >= flush_interval.max(1) {
            debug!("Flushing after {} regions", stats.regions);
            store.flush()?;
            since_flush = 0;
        }
    }

    store.flush()?;
    Ok(stats)
}

/// Generate a dataset over every contig of `contigs`.
///
/// `truth` selects training mode and must agree with the writer's mode. The
/// writer is sealed on success; on error the file is left unsealed.
pub fn generate_dataset<S, G>(
    reads_path: &str,
    truth: Option<&S>,
    generator: &G,
    contigs: &[(String, Vec<u8>)],
    mut writer: DatasetWriter,
    config: &GenerateConfig,
) -> Result<GenerateStats, DataError>
where
    S: AlignmentSource,
    G: FeatureGenerator + ?Sized,
{
    let expected = if truth.is_some() {
        DatasetMode::Training
    } else {
        DatasetMode::Inference
    };
    if writer.mode() != expected {
        return Err(DataError::Configuration(format!(
            "{} run cannot write a {} dataset",
            expected,
            writer.mode()
        )));
    }

    let mut tasks: Vec<(Region, &[u8])> = Vec::new();
    for (name, sequence) in contigs {
        for region in plan(name, sequence.len() as i64, config.planner)? {
            tasks.push((region, sequence.as_slice()));
        }
    }
    info!(
        "Processing {} regions over {} contigs with {} workers",
        tasks.len(),
        contigs.len(),
        config.num_workers
    );

    writer.write_contigs(contigs)?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.num_workers)
        .build()
        .map_err(|e| io::Error::other(format!("Failed to build thread pool: {e}")))?;
    let (tx, rx) = bounded(config.queue_capacity.max(1));

    let stats = std::thread::scope(|scope| {
        let tasks = &tasks;
        let pool = &pool;
        scope.spawn(move || {
            pool.install(|| {
                // A send fails once the consumer has given up
                let _ = tasks
                    .par_iter()
                    .try_for_each_with(tx, |tx, (region, reference)| {
                        let result = match truth {
                            Some(truth) => process_training_region(
                                truth,
                                generator,
                                reads_path,
                                reference,
                                region,
                                &config.filter,
                            ),
                            None => process_inference_region(generator, reads_path, reference, region),
                        };
                        tx.send(result)
                    });
            })
        });

        consume_results(rx, &mut writer, config.flush_interval)
    })?;

    writer.finish()?;
    info!(
        "Generated {} examples from {} regions ({} skipped, {} windows rejected)",
        stats.examples, stats.regions, stats.skipped, stats.rejected_windows
    );
    Ok(stats)
}

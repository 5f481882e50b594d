//! Block generation: spec → series → pipeline → block directory.

use anyhow::{Context, Result};
use append_pipeline::append;
use block_writer::{BlockMeta, BlockWriter};
use blockgen_core::{BlockSpec, SpecError};
use series_generator::BlockSeriesSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use ulid::Ulid;

/// Generate one block from `spec` under `output_dir` and return its ULID.
///
/// The block meta is rewritten after flush so it carries the block spec's
/// `thanos` section, compaction level and version.
pub async fn generate(
    cancel: &CancellationToken,
    concurrency: usize,
    output_dir: &Path,
    spec: &BlockSpec,
) -> Result<Ulid> {
    let writer = BlockWriter::new(output_dir)
        .with_context(|| format!("Failed to open block writer in {}", output_dir.display()))?;
    let block_dir = writer.block_dir();

    let stats = append(cancel, concurrency, &writer, BlockSeriesSet::new(spec))
        .await
        .with_context(|| format!("Failed to generate block {}", spec.summary()))?;
    info!(
        "Appended {} series ({} samples) using {} workers",
        stats.series, stats.samples, stats.workers
    );

    let mut meta = writer.flush().context("Failed to flush block")?;
    meta.thanos = spec.thanos.clone();
    meta.compaction.level = spec.compaction.level;
    meta.version = spec.version;
    meta.write_to(&block_dir)
        .with_context(|| format!("Failed to rewrite meta of {}", block_dir.display()))?;

    Ok(meta.ulid)
}

/// Generate every block of a spec stream in turn.
///
/// Stops at the first failing block, or before the next block once `cancel`
/// fires. Returns the directories of the generated blocks.
pub async fn generate_all<I>(
    cancel: &CancellationToken,
    concurrency: usize,
    output_dir: &Path,
    specs: I,
) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = Result<BlockSpec, SpecError>>,
{
    let mut generated = Vec::new();
    for spec in specs {
        if cancel.is_cancelled() {
            anyhow::bail!("Generation cancelled after {} blocks", generated.len());
        }
        let spec = spec.context("Failed to decode block spec")?;
        info!("Generating block {}", spec.summary());

        let ulid = generate(cancel, concurrency, output_dir, &spec).await?;
        let block_dir = output_dir.join(ulid.to_string());
        generated.push(block_dir.clone());
        info!(
            "Generated block {} ({} so far)",
            block_dir.display(),
            generated.len()
        );
    }
    info!("All blocks done, count: {}", generated.len());
    Ok(generated)
}

/// Read back the meta of a generated block.
pub fn read_meta(block_dir: &Path) -> Result<BlockMeta> {
    BlockMeta::read_from(block_dir)
        .with_context(|| format!("Failed to read meta of {}", block_dir.display()))
}

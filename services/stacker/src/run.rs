//! Workflow execution: gather layers, align them, write the stack.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use alignment::Aligner;
use anyhow::{Context, Result};
use collaborators::{
    oblique_layers, ClimateRetriever, CollaboratorConfig, DemSource, ElevationRetriever, FsCache,
    HttpDemSource, HttpFetcher, IndexCalculator, SceneSource, StacSceneSource, TerrainAnalyzer,
};
use covariate_common::{AreaOfInterest, Raster, RasterOrOther};
use tracing::{info, warn};

use crate::config::Workflow;

/// Outcome of one workflow run.
#[derive(Debug)]
pub struct StackReport {
    pub layers: Vec<String>,
    pub files: Vec<PathBuf>,
}

/// Remote services behind the network-backed producers.
pub struct Sources {
    pub dem: Arc<dyn DemSource>,
    pub scenes: Arc<dyn SceneSource>,
}

impl Sources {
    /// HTTP-backed sources from configuration.
    pub fn from_config(collaborators: &CollaboratorConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(collaborators.fetch.clone())?);
        Ok(Self {
            dem: Arc::new(HttpDemSource::new(
                fetcher.clone(),
                &collaborators.elevation_url,
                &collaborators.dem_type,
            )),
            scenes: Arc::new(StacSceneSource::from_config(collaborators, fetcher)),
        })
    }
}

pub async fn run(workflow: &Workflow, collaborators: &CollaboratorConfig) -> Result<StackReport> {
    let sources = Sources::from_config(collaborators)?;
    run_with(workflow, collaborators, &sources).await
}

async fn reference_grid(
    workflow: &Workflow,
    collaborators: &CollaboratorConfig,
    sources: &Sources,
) -> Result<Raster> {
    if let Some(path) = &workflow.reference {
        let reference = raster_io::read(path)
            .with_context(|| format!("Failed to read reference grid: {}", path.display()))?;
        info!(
            path = %path.display(),
            nx = reference.grid.nx,
            ny = reference.grid.ny,
            crs = ?reference.crs,
            "Loaded reference grid"
        );
        return Ok(reference);
    }

    let section = workflow
        .aoi
        .as_ref()
        .context("Workflow has neither a reference file nor an aoi")?;
    let retriever = ElevationRetriever::new(sources.dem.clone(), collaborators.elevation_api_key.clone())
        .with_buffer(collaborators.dem_buffer_deg);
    retriever
        .reference_grid(&section.area(), section.clip)
        .await
        .context("Failed to build reference grid from the elevation service")
}

pub async fn run_with(
    workflow: &Workflow,
    collaborators: &CollaboratorConfig,
    sources: &Sources,
) -> Result<StackReport> {
    let start = Instant::now();

    let reference = reference_grid(workflow, collaborators, sources).await?;

    // Producers that query remote services work over the workflow's AOI,
    // or the reference extent without one.
    let aoi = match (&workflow.aoi, reference.crs) {
        (Some(section), _) => Some(section.area()),
        (None, Some(crs)) => Some(AreaOfInterest::from_bbox(&reference.grid.bbox(), crs)),
        (None, None) => None,
    };

    let mut inputs: Vec<RasterOrOther> = Vec::new();

    for path in workflow.covariate_files()? {
        let raster = raster_io::read(&path)
            .with_context(|| format!("Failed to read covariate: {}", path.display()))?;
        if raster.crs.is_none() {
            warn!(path = %path.display(), "Covariate has no CRS");
        }
        inputs.push(raster.into());
    }

    if let Some(groups) = &workflow.terrain {
        let analyzer = TerrainAnalyzer::from_config(collaborators);
        let layers = analyzer
            .terrain_layers_by_name(&reference, groups)
            .await
            .context("Terrain analysis failed")?;
        inputs.push(layers);
    }

    if let Some(n) = workflow.oblique_directions {
        inputs.push(oblique_layers(&reference, n).context("Oblique coordinates failed")?);
    }

    if let Some(climate) = &workflow.climate {
        let aoi = aoi
            .as_ref()
            .context("Reference grid needs a CRS to request climate tiles")?;
        let fetcher = Arc::new(HttpFetcher::new(collaborators.fetch.clone())?);
        let cache = Arc::new(FsCache::new(&collaborators.cache_dir));
        let retriever = ClimateRetriever::from_config(collaborators, fetcher, cache);
        let layers = retriever
            .climate_layers(&reference, aoi, &climate.variables, climate.overwrite)
            .await
            .context("Climate retrieval failed")?;
        inputs.push(layers);
    }

    if let Some(rs) = &workflow.remote_sensing {
        let aoi = aoi
            .as_ref()
            .context("Reference grid needs a CRS to request satellite scenes")?;
        let calculator = IndexCalculator::new(sources.scenes.clone());
        let layers = calculator
            .index_layers(aoi, &reference, &rs.sensors()?, &rs.date_ranges()?, &rs.exclude()?)
            .await
            .context("Spectral index computation failed")?;
        inputs.push(layers);
    }

    let aligner = Aligner::new(workflow.align_config())?;
    let stack = tokio::task::spawn_blocking(move || aligner.align(&reference, inputs))
        .await
        .context("Alignment task panicked")?
        .context("Alignment failed")?;

    let files = raster_io::write_stack(stack.raster(), &workflow.output_dir).with_context(|| {
        format!("Failed to write stack to {}", workflow.output_dir.display())
    })?;

    let layers: Vec<String> = stack.names().iter().map(|n| n.to_string()).collect();
    info!(
        layers = layers.len(),
        output = %workflow.output_dir.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Wrote covariate stack"
    );

    Ok(StackReport { layers, files })
}

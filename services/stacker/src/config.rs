//! Workflow file loading.
//!
//! A workflow names the reference grid, the covariate files and the optional
//! producers to run:
//!
//! ```yaml
//! reference: ${DATA_DIR}/dem.tif
//! output_dir: ./stack
//! covariates:
//!   - path: layers/slope.tif
//!   - dir: ${CLIMATE_DIR:-./climate}
//!     recursive: true
//! align:
//!   options:
//!     method: bilinear
//!     remove_constant: true
//!   max_threads: 4
//! oblique_directions: 6
//! terrain: [slope, aspect]
//! climate:
//!   variables: [bio01, bio12, tas_07]
//! remote_sensing:
//!   sensors: [S2]
//!   date_ranges: [2023-04-01/2023-09-30]
//!   exclude: [burn]
//! ```
//!
//! Instead of `reference`, an `aoi` section builds the reference grid from
//! the elevation service:
//!
//! ```yaml
//! aoi:
//!   bbox: [500000, 5760000, 503000, 5763000]
//!   crs: EPSG:32633
//!   clip: polygon
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are substituted before parsing. Relative
//! paths resolve against the workflow file's directory.

use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};

use alignment::AlignConfig;
use anyhow::{bail, Context, Result};
use collaborators::{ClipMode, DateRange, IndexDomain, Sensor};
use covariate_common::{AreaOfInterest, BoundingBox, CrsCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Raster whose grid every layer is aligned to.
    pub reference: Option<PathBuf>,

    /// Area of interest the reference grid is built for when no
    /// `reference` file is given.
    pub aoi: Option<AoiSection>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub covariates: Vec<CovariateSource>,

    /// Alignment settings. Falls back to `COVARIATE_*` variables when absent.
    pub align: Option<AlignConfig>,

    /// Number of oblique coordinate directions to add.
    pub oblique_directions: Option<usize>,

    /// Terrain tool groups to run on the reference DEM. An empty list runs
    /// every group.
    pub terrain: Option<Vec<String>>,

    pub climate: Option<ClimateSection>,

    pub remote_sensing: Option<RemoteSensingSection>,
}

/// A single raster file or a directory of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CovariateSource {
    File {
        path: PathBuf,
    },
    Dir {
        dir: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateSection {
    pub variables: Vec<String>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiSection {
    /// `[min_x, min_y, max_x, max_y]` in `crs`.
    pub bbox: [f64; 4],
    pub crs: CrsCode,
    #[serde(default)]
    pub clip: ClipMode,
}

impl AoiSection {
    pub fn area(&self) -> AreaOfInterest {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        AreaOfInterest::from_bbox(&BoundingBox::new(min_x, min_y, max_x, max_y), self.crs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSensingSection {
    pub sensors: Vec<String>,
    /// `YYYY-MM-DD/YYYY-MM-DD` windows.
    pub date_ranges: Vec<String>,
    /// Index domains to skip.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl RemoteSensingSection {
    pub fn sensors(&self) -> Result<Vec<Sensor>> {
        self.sensors.iter().map(|s| Ok(s.parse()?)).collect()
    }

    pub fn date_ranges(&self) -> Result<Vec<DateRange>> {
        self.date_ranges.iter().map(|s| Ok(s.parse()?)).collect()
    }

    pub fn exclude(&self) -> Result<Vec<IndexDomain>> {
        self.exclude.iter().map(|s| Ok(s.parse()?)).collect()
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("stack")
}

/// Load a workflow, substituting variables from the process environment.
pub fn load_workflow<P: AsRef<Path>>(path: P) -> Result<Workflow> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow: {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_workflow(&content, base, |var| std::env::var(var).ok())
        .with_context(|| format!("Failed to load workflow: {}", path.display()))
}

/// Parse workflow text. `lookup` resolves `${VAR}` references.
pub fn parse_workflow<F>(content: &str, base: &Path, lookup: F) -> Result<Workflow>
where
    F: FnMut(&str) -> Option<String>,
{
    let expanded = expand_env_vars(content, lookup)?;
    let mut workflow: Workflow =
        serde_yaml::from_str(&expanded).context("Failed to parse workflow YAML")?;
    workflow.resolve_paths(base);
    workflow.validate()?;
    Ok(workflow)
}

fn expand_env_vars<F>(content: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let expanded = shellexpand::env_with_context(content, |var| Ok::<_, Infallible>(lookup(var)))
        .map_err(|e| anyhow::anyhow!("Variable substitution failed: {}", e))?;

    // Unresolved references without a default survive expansion verbatim.
    if let Some(start) = expanded.find("${") {
        let rest = &expanded[start..];
        let end = rest.find('}').map_or(rest.len(), |i| i + 1);
        bail!("Environment variable not set: {}", &rest[..end]);
    }
    Ok(expanded.into_owned())
}

impl Workflow {
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(reference) = &mut self.reference {
            resolve(reference);
        }
        resolve(&mut self.output_dir);
        for source in &mut self.covariates {
            match source {
                CovariateSource::File { path } => resolve(path),
                CovariateSource::Dir { dir, .. } => resolve(dir),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match (&self.reference, &self.aoi) {
            (Some(_), Some(_)) => bail!("workflow gives both a reference file and an aoi section"),
            (None, None) => bail!("workflow needs a reference file or an aoi section"),
            _ => {}
        }
        if let Some(aoi) = &self.aoi {
            let [min_x, min_y, max_x, max_y] = aoi.bbox;
            if !(min_x < max_x && min_y < max_y) {
                bail!("aoi bbox {:?} is empty", aoi.bbox);
            }
        }
        if let Some(rs) = &self.remote_sensing {
            if rs.sensors()?.is_empty() {
                bail!("remote_sensing section lists no sensors");
            }
            if rs.date_ranges()?.is_empty() {
                bail!("remote_sensing section lists no date ranges");
            }
            rs.exclude()?;
        }
        if let Some(align) = &self.align {
            align.validate()?;
        }
        if let Some(climate) = &self.climate {
            if climate.variables.is_empty() {
                bail!("climate section lists no variables");
            }
        }
        let has_producer = self.oblique_directions.is_some()
            || self.terrain.is_some()
            || self.climate.is_some()
            || self.remote_sensing.is_some();
        if self.covariates.is_empty() && !has_producer {
            bail!("workflow lists no covariates");
        }
        Ok(())
    }

    /// Alignment settings, from the workflow or the environment.
    pub fn align_config(&self) -> AlignConfig {
        self.align.clone().unwrap_or_else(AlignConfig::from_env)
    }

    /// Every covariate file in declaration order. Directory entries are
    /// sorted by file name.
    pub fn covariate_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for source in &self.covariates {
            match source {
                CovariateSource::File { path } => files.push(path.clone()),
                CovariateSource::Dir { dir, recursive } => {
                    let depth = if *recursive { usize::MAX } else { 1 };
                    let before = files.len();
                    for entry in WalkDir::new(dir).max_depth(depth).sort_by_file_name() {
                        let entry = entry
                            .with_context(|| format!("Failed to list {}", dir.display()))?;
                        let is_raster = entry.file_type().is_file() && raster_io::is_geotiff(entry.path());
                        if is_raster {
                            files.push(entry.into_path());
                        }
                    }
                    debug!(dir = %dir.display(), files = files.len() - before, "Scanned covariate directory");
                }
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alignment::ResampleMethod;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_expand_env_vars_simple() {
        let out = expand_env_vars("reference: ${DATA}/dem.tif", vars(&[("DATA", "/data")])).unwrap();
        assert_eq!(out, "reference: /data/dem.tif");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let out = expand_env_vars("dir: ${MISSING:-./climate}", vars(&[])).unwrap();
        assert_eq!(out, "dir: ./climate");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        let err = expand_env_vars("reference: ${NOPE}/dem.tif", vars(&[])).unwrap_err();
        assert!(err.to_string().contains("${NOPE}"));
    }

    #[test]
    fn test_parse_workflow_resolves_paths() {
        let yaml = r#"
reference: ${DATA}/dem.tif
covariates:
  - path: layers/slope.tif
  - dir: climate
    recursive: true
align:
  options:
    method: bilinear
    crop: false
oblique_directions: 6
"#;
        let wf = parse_workflow(yaml, Path::new("/work"), vars(&[("DATA", "/data")])).unwrap();

        assert_eq!(wf.reference, Some(PathBuf::from("/data/dem.tif")));
        assert_eq!(wf.output_dir, PathBuf::from("/work/stack"));
        assert_eq!(
            wf.covariates,
            vec![
                CovariateSource::File { path: PathBuf::from("/work/layers/slope.tif") },
                CovariateSource::Dir { dir: PathBuf::from("/work/climate"), recursive: true },
            ]
        );
        let align = wf.align_config();
        assert_eq!(align.options.method, ResampleMethod::Bilinear);
        assert!(!align.options.crop);
        assert!(align.options.remove_constant);
        assert_eq!(wf.oblique_directions, Some(6));
    }

    #[test]
    fn test_workflow_without_layers_rejected() {
        let err = parse_workflow("reference: dem.tif\n", Path::new("."), vars(&[])).unwrap_err();
        assert!(err.to_string().contains("no covariates"));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let yaml = "reference: dem.tif\noblique_directions: 4\nalign:\n  max_threads: 0\n";
        assert!(parse_workflow(yaml, Path::new("."), vars(&[])).is_err());
    }

    #[test]
    fn test_covariate_files_from_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        for name in ["b.tif", "a.TIFF", "notes.txt", "a.asc"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        fs::write(nested.join("c.tif"), "").unwrap();

        let flat = Workflow {
            reference: Some(PathBuf::from("dem.tif")),
            aoi: None,
            output_dir: default_output_dir(),
            covariates: vec![CovariateSource::Dir { dir: tmp.path().to_path_buf(), recursive: false }],
            align: None,
            oblique_directions: None,
            terrain: None,
            climate: None,
            remote_sensing: None,
        };
        let names: Vec<_> = flat
            .covariate_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TIFF", "b.tif"]);

        let deep = Workflow {
            covariates: vec![CovariateSource::Dir { dir: tmp.path().to_path_buf(), recursive: true }],
            ..flat
        };
        assert_eq!(deep.covariate_files().unwrap().len(), 3);
    }

    #[test]
    fn test_aoi_and_remote_sensing_sections() {
        let yaml = r#"
aoi:
  bbox: [500010, 5760000, 503010, 5763000]
  crs: EPSG:32633
  clip: polygon
remote_sensing:
  sensors: [S2, landsat-8]
  date_ranges: [2023-01-01/2023-03-31, 2023-04-01/2023-06-30]
  exclude: [water]
"#;
        let wf = parse_workflow(yaml, Path::new("/work"), vars(&[])).unwrap();

        assert!(wf.reference.is_none());
        let aoi = wf.aoi.as_ref().unwrap();
        assert_eq!(aoi.crs, CrsCode::Utm { zone: 33, north: true });
        assert_eq!(aoi.clip, ClipMode::Polygon);
        assert_eq!(aoi.area().bbox(), Some(BoundingBox::new(500010.0, 5760000.0, 503010.0, 5763000.0)));

        let rs = wf.remote_sensing.as_ref().unwrap();
        assert_eq!(rs.sensors().unwrap(), vec![Sensor::Sentinel2, Sensor::Landsat8]);
        assert_eq!(rs.date_ranges().unwrap().len(), 2);
        assert_eq!(rs.exclude().unwrap(), vec![IndexDomain::Water]);
    }

    #[test]
    fn test_reference_source_must_be_unique() {
        let both = "reference: dem.tif\naoi:\n  bbox: [0, 0, 1, 1]\n  crs: EPSG:4326\noblique_directions: 4\n";
        assert!(parse_workflow(both, Path::new("."), vars(&[])).is_err());

        let neither = "oblique_directions: 4\n";
        let err = parse_workflow(neither, Path::new("."), vars(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("reference file or an aoi"));
    }

    #[test]
    fn test_bad_remote_sensing_values_rejected() {
        let bad_sensor = "reference: dem.tif\nremote_sensing:\n  sensors: [modis]\n  date_ranges: [2023-01-01/2023-02-01]\n";
        assert!(parse_workflow(bad_sensor, Path::new("."), vars(&[])).is_err());

        let backwards = "reference: dem.tif\nremote_sensing:\n  sensors: [S2]\n  date_ranges: [2023-02-01/2023-01-01]\n";
        assert!(parse_workflow(backwards, Path::new("."), vars(&[])).is_err());
    }
}

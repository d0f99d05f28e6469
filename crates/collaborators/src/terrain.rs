//! Terrain derivatives computed by an external analysis tool.
//!
//! The DEM is written to a scratch directory as a GeoTIFF, the tool is
//! run once per derivative and each output grid is read back. Invocations
//! follow the WhiteboxTools command line (`--run=<Tool> --dem=<in>
//! --output=<out>`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use covariate_common::{CovResult, CovariateError, Raster, RasterOrOther};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::CollaboratorConfig;

/// Families of terrain derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    Slope,
    Aspect,
    Curvature,
    Roughness,
    Hydrology,
    Visibility,
}

/// One tool run producing one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tool name passed to `--run`.
    pub tool: &'static str,
    /// Flag naming the input DEM.
    pub input_flag: &'static str,
    /// Layer name of the output.
    pub output: &'static str,
    pub extra_args: &'static [&'static str],
}

impl ToolGroup {
    pub const ALL: [ToolGroup; 6] = [
        ToolGroup::Slope,
        ToolGroup::Aspect,
        ToolGroup::Curvature,
        ToolGroup::Roughness,
        ToolGroup::Hydrology,
        ToolGroup::Visibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::Slope => "slope",
            ToolGroup::Aspect => "aspect",
            ToolGroup::Curvature => "curvature",
            ToolGroup::Roughness => "roughness",
            ToolGroup::Hydrology => "hydrology",
            ToolGroup::Visibility => "visibility",
        }
    }

    /// Tool runs making up this group.
    pub fn invocations(&self) -> &'static [ToolInvocation] {
        match self {
            ToolGroup::Slope => SLOPE_TOOLS,
            ToolGroup::Aspect => ASPECT_TOOLS,
            ToolGroup::Curvature => CURVATURE_TOOLS,
            ToolGroup::Roughness => ROUGHNESS_TOOLS,
            ToolGroup::Hydrology => HYDROLOGY_TOOLS,
            ToolGroup::Visibility => VISIBILITY_TOOLS,
        }
    }
}

const fn dem_tool(tool: &'static str, output: &'static str) -> ToolInvocation {
    ToolInvocation {
        tool,
        input_flag: "dem",
        output,
        extra_args: &[],
    }
}

const SLOPE_TOOLS: &[ToolInvocation] = &[dem_tool("Slope", "slope")];

const ASPECT_TOOLS: &[ToolInvocation] = &[dem_tool("Aspect", "aspect")];

const CURVATURE_TOOLS: &[ToolInvocation] = &[
    dem_tool("PlanCurvature", "plan_curvature"),
    dem_tool("ProfileCurvature", "profile_curvature"),
    dem_tool("TangentialCurvature", "tangential_curvature"),
];

const ROUGHNESS_TOOLS: &[ToolInvocation] = &[
    ToolInvocation {
        tool: "RuggednessIndex",
        input_flag: "input",
        output: "ruggedness",
        extra_args: &[],
    },
    ToolInvocation {
        tool: "DevFromMeanElev",
        input_flag: "dem",
        output: "dev_from_mean",
        extra_args: &["--filterx=11", "--filtery=11"],
    },
];

const HYDROLOGY_TOOLS: &[ToolInvocation] = &[
    ToolInvocation {
        tool: "D8FlowAccumulation",
        input_flag: "input",
        output: "flow_accumulation",
        extra_args: &["--out_type=cells", "--log"],
    },
    dem_tool("DepthInSink", "depth_in_sink"),
];

const VISIBILITY_TOOLS: &[ToolInvocation] = &[ToolInvocation {
    tool: "VisibilityIndex",
    input_flag: "dem",
    output: "visibility",
    extra_args: &["--height=2.0", "--res_factor=2"],
}];

impl FromStr for ToolGroup {
    type Err = CovariateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slope" => Ok(ToolGroup::Slope),
            "aspect" => Ok(ToolGroup::Aspect),
            "curvature" => Ok(ToolGroup::Curvature),
            "roughness" => Ok(ToolGroup::Roughness),
            "hydrology" => Ok(ToolGroup::Hydrology),
            "visibility" => Ok(ToolGroup::Visibility),
            other => Err(CovariateError::UnknownTool(other.to_string())),
        }
    }
}

impl fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Captured result of one process run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs the terrain executable.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Whether `program` can be executed.
    fn is_available(&self, program: &Path) -> bool {
        program_exists(program)
    }

    async fn run(&self, program: &Path, args: &[String]) -> CovResult<ToolOutput>;
}

/// A path with a directory component must exist; a bare name is looked up
/// on `PATH`.
pub fn program_exists(program: &Path) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Runs the tool as a child process.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> CovResult<ToolOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Computes terrain derivatives of a DEM.
pub struct TerrainAnalyzer {
    tool: PathBuf,
    scratch_dir: Option<PathBuf>,
    runner: Arc<dyn ToolRunner>,
}

impl TerrainAnalyzer {
    pub fn new(tool: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            tool: tool.into(),
            scratch_dir: None,
            runner,
        }
    }

    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self {
            tool: config.terrain_tool.clone(),
            scratch_dir: config.scratch_dir.clone(),
            runner: Arc::new(ProcessRunner),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Like [`terrain_layers`](Self::terrain_layers) with groups given by name.
    pub async fn terrain_layers_by_name<S: AsRef<str>>(
        &self,
        grid: &Raster,
        tools: &[S],
    ) -> CovResult<RasterOrOther> {
        let groups = tools
            .iter()
            .map(|t| t.as_ref().parse())
            .collect::<CovResult<Vec<ToolGroup>>>()?;
        self.terrain_layers(grid, &groups).await
    }

    /// Run every tool of `groups` (all groups when empty) on the first band
    /// of `grid`. Layers come back in group order on the DEM's grid.
    #[instrument(skip(self, grid), fields(tool = %self.tool.display()))]
    pub async fn terrain_layers(&self, grid: &Raster, groups: &[ToolGroup]) -> CovResult<RasterOrOther> {
        if !self.runner.is_available(&self.tool) {
            return Err(CovariateError::ToolNotFound(self.tool.display().to_string()));
        }
        if grid.bands.is_empty() {
            return Err(CovariateError::InvalidArgument("DEM has no bands".to_string()));
        }

        let groups: &[ToolGroup] = if groups.is_empty() { &ToolGroup::ALL } else { groups };

        let scratch = match &self.scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                tempfile::Builder::new().prefix("terrain-").tempdir_in(parent)?
            }
            None => tempfile::Builder::new().prefix("terrain-").tempdir()?,
        };

        let dem_path = scratch.path().join("dem.tif");
        raster_io::write_band(grid, 0, &dem_path)?;

        let mut layers = Vec::new();
        for group in groups {
            for inv in group.invocations() {
                layers.push(self.run_tool(grid, inv, &dem_path, scratch.path()).await?);
            }
        }

        info!(groups = groups.len(), layers = layers.len(), "Terrain derivatives computed");
        Ok(RasterOrOther::Collection(layers))
    }

    async fn run_tool(
        &self,
        grid: &Raster,
        inv: &ToolInvocation,
        dem_path: &Path,
        scratch: &Path,
    ) -> CovResult<RasterOrOther> {
        let out_path = scratch.join(format!("{}.tif", inv.output));
        let mut args = vec![
            format!("--run={}", inv.tool),
            format!("--{}={}", inv.input_flag, dem_path.display()),
            format!("--output={}", out_path.display()),
        ];
        args.extend(inv.extra_args.iter().map(|a| a.to_string()));

        debug!(tool = inv.tool, "Running terrain tool");
        let output = self.runner.run(&self.tool, &args).await?;
        if !output.success {
            return Err(CovariateError::ToolFailed {
                tool: inv.tool.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        let layer = raster_io::read(&out_path).map_err(|e| CovariateError::ToolFailed {
            tool: inv.tool.to_string(),
            message: format!("unreadable output: {}", e),
        })?;

        // Outputs without GeoKeys share the DEM's CRS.
        let crs = layer.crs.or(grid.crs);
        Ok(Raster { crs, ..layer }.with_name(inv.output).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use test_utils::{elevation_raster, fixtures};

    /// Copies the input DEM to the output, scaled by the call index.
    struct CopyRunner {
        calls: Mutex<Vec<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl CopyRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            })
        }
    }

    fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
        args.iter()
            .find_map(|a| a.strip_prefix(&format!("--{}=", name)))
    }

    #[async_trait]
    impl ToolRunner for CopyRunner {
        fn is_available(&self, _program: &Path) -> bool {
            true
        }

        async fn run(&self, _program: &Path, args: &[String]) -> CovResult<ToolOutput> {
            let tool = flag(args, "run").unwrap_or_default().to_string();
            if self.fail_on == Some(tool.as_str()) {
                return Ok(ToolOutput {
                    success: false,
                    stderr: "boom\n".to_string(),
                    ..Default::default()
                });
            }
            let input = flag(args, "dem").or_else(|| flag(args, "input")).unwrap();
            let output = flag(args, "output").unwrap();
            std::fs::copy(input, output).unwrap();
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(ToolOutput {
                success: true,
                ..Default::default()
            })
        }
    }

    fn dem() -> Raster {
        elevation_raster(fixtures::grid::utm_30m_small(), Some(fixtures::crs::UTM33N))
    }

    fn names(value: &RasterOrOther) -> Vec<String> {
        match value {
            RasterOrOther::Collection(items) => items
                .iter()
                .filter_map(|i| match i {
                    RasterOrOther::Raster(r) => Some(r.name().to_string()),
                    _ => None,
                })
                .collect(),
            _ => panic!("expected a collection"),
        }
    }

    #[test]
    fn test_tool_group_parse() {
        assert_eq!("Slope".parse::<ToolGroup>().unwrap(), ToolGroup::Slope);
        assert!(matches!(
            "teleport".parse::<ToolGroup>(),
            Err(CovariateError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_outputs_are_unique_across_groups() {
        let mut outputs: Vec<&str> = ToolGroup::ALL
            .iter()
            .flat_map(|g| g.invocations().iter().map(|i| i.output))
            .collect();
        let total = outputs.len();
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), total);
    }

    #[tokio::test]
    async fn test_layers_in_group_order() {
        let runner = CopyRunner::new();
        let analyzer = TerrainAnalyzer::new("whitebox_tools", runner.clone());
        let out = analyzer
            .terrain_layers(&dem(), &[ToolGroup::Slope, ToolGroup::Curvature])
            .await
            .unwrap();

        assert_eq!(
            names(&out),
            vec!["slope", "plan_curvature", "profile_curvature", "tangential_curvature"]
        );
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0][0], "--run=Slope");
    }

    #[tokio::test]
    async fn test_outputs_keep_dem_grid_and_crs() {
        let analyzer = TerrainAnalyzer::new("whitebox_tools", CopyRunner::new());
        let dem = dem();
        let out = analyzer.terrain_layers(&dem, &[ToolGroup::Aspect]).await.unwrap();
        match out {
            RasterOrOther::Collection(items) => match &items[0] {
                RasterOrOther::Raster(r) => {
                    assert!(r.grid.same_grid(&dem.grid));
                    assert_eq!(r.crs, dem.crs);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_group_name() {
        let analyzer = TerrainAnalyzer::new("whitebox_tools", CopyRunner::new());
        let err = analyzer
            .terrain_layers_by_name(&dem(), &["slope", "sparkle"])
            .await
            .unwrap_err();
        assert!(matches!(err, CovariateError::UnknownTool(name) if name == "sparkle"));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = test_utils::scratch_dir();
        let analyzer = TerrainAnalyzer::new(dir.path().join("no-such-tool"), Arc::new(ProcessRunner));
        let err = analyzer.terrain_layers(&dem(), &[ToolGroup::Slope]).await.unwrap_err();
        assert!(matches!(err, CovariateError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_tool_failure_reported() {
        let runner = Arc::new(CopyRunner {
            calls: Mutex::new(Vec::new()),
            fail_on: Some("Aspect"),
        });
        let analyzer = TerrainAnalyzer::new("whitebox_tools", runner);
        let err = analyzer
            .terrain_layers(&dem(), &[ToolGroup::Slope, ToolGroup::Aspect])
            .await
            .unwrap_err();
        match err {
            CovariateError::ToolFailed { tool, message } => {
                assert_eq!(tool, "Aspect");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_streams() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let output = ProcessRunner.run(Path::new("sh"), &args).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_scratch_dir_is_cleaned_up() {
        let parent = test_utils::scratch_dir();
        let analyzer = TerrainAnalyzer::new("whitebox_tools", CopyRunner::new())
            .with_scratch_dir(parent.path());
        analyzer.terrain_layers(&dem(), &[ToolGroup::Slope]).await.unwrap();
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }
}

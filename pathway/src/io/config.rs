//! Pathway configuration stored as TOML next to its sidecar files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::budget::Deadline;
use crate::core::geometry::Point3;
use crate::core::pathway::Pathway;
use crate::core::policy::PathwayPolicy;
use crate::core::region::{
    ImageRegion, ImageSelection, Region, RegionRegistry, Sphere, Surface, SurfaceDimension,
    SurfaceSelection,
};
use crate::core::rules::{Rule, RuleName};
use crate::io::regions::SidecarCache;

/// Pathway configuration (TOML).
///
/// Missing `[policy]` and `[run]` fields default; rules are an ordered
/// `[[rule]]` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathwayConfig {
    pub policy: PathwayPolicy,

    pub run: RunConfig,

    #[serde(rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// Batch execution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Worker threads; rayon's default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// Wall-clock budget for a whole batch in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<u64>,

    /// Write discarded streamlines when an output path is given.
    pub keep_discarded: bool,
}

/// One `[[rule]]` entry: a rule name and exactly one region source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuleConfig {
    /// Rule name with optional `_A`/`_B` suffix.
    pub kind: String,

    /// `x,y,z,r`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sphere: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvf: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<SurfaceDimension>,
    /// `x,y,z,r`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
}

/// Canonical description of where a rule's region comes from.
///
/// Equal sources produce equal keys, so rules sharing a source share one
/// registered region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSource {
    Sphere { center: Point3, radius: f64 },
    Image { path: PathBuf, selection: ImageSelection },
    Surface { path: PathBuf, selection: SurfaceSelection },
}

impl RegionSource {
    pub fn key(&self) -> String {
        match self {
            RegionSource::Sphere { center, radius } => Sphere::canonical_key(*center, *radius),
            RegionSource::Image { path, selection } => {
                format!("image:{}#{}", path.display(), selection.key_suffix())
            }
            RegionSource::Surface { path, selection } => {
                format!("surface:{}#{}", path.display(), selection.key_suffix())
            }
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(anyhow!("run.threads must be > 0"));
        }
        if self.time_limit_secs == Some(0) {
            return Err(anyhow!("run.time_limit_secs must be > 0"));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::from_limit(self.time_limit_secs.map(Duration::from_secs))
    }
}

impl RuleConfig {
    pub fn name(&self) -> Result<RuleName> {
        self.kind.parse::<RuleName>().map_err(|err| anyhow!(err))
    }

    /// Resolve the region source, with relative paths joined onto `base`.
    pub fn source(&self, base: &Path) -> Result<RegionSource> {
        let sources = [
            self.sphere.is_some(),
            self.image.is_some(),
            self.surface.is_some(),
        ];
        match sources.iter().filter(|set| **set).count() {
            0 => bail!("rule '{}' needs one of sphere, image or surface", self.kind),
            1 => {}
            _ => bail!(
                "rule '{}' must name only one of sphere, image or surface",
                self.kind
            ),
        }
        let image_options = self.label.is_some() || self.pvf.is_some();
        let surface_options = self.dimension.is_some()
            || self.disc.is_some()
            || self.field.is_some()
            || self.thickness.is_some();
        if image_options && self.image.is_none() {
            bail!("rule '{}': label/pvf only apply to image sources", self.kind);
        }
        if surface_options && self.surface.is_none() {
            bail!(
                "rule '{}': dimension/disc/field/thickness only apply to surface sources",
                self.kind
            );
        }

        if let Some(text) = &self.sphere {
            let (center, radius) =
                parse_sphere(text).with_context(|| format!("rule '{}' sphere", self.kind))?;
            return Ok(RegionSource::Sphere { center, radius });
        }
        if let Some(path) = &self.image {
            let selection = match (self.label, self.pvf) {
                (Some(_), Some(_)) => {
                    bail!("rule '{}': label and pvf are exclusive", self.kind)
                }
                (Some(label), None) => ImageSelection::Label(label),
                (None, Some(channel)) => ImageSelection::Pvf(channel),
                (None, None) => ImageSelection::Mask,
            };
            return Ok(RegionSource::Image {
                path: base.join(path),
                selection,
            });
        }
        let path = self
            .surface
            .as_ref()
            .with_context(|| format!("rule '{}' has no region source", self.kind))?;
        let disc = match &self.disc {
            Some(text) => {
                Some(parse_sphere(text).with_context(|| format!("rule '{}' disc", self.kind))?)
            }
            None => None,
        };
        if let Some(thickness) = self.thickness {
            if !(thickness.is_finite() && thickness > 0.0) {
                bail!("rule '{}': thickness must be > 0", self.kind);
            }
        }
        Ok(RegionSource::Surface {
            path: base.join(path),
            selection: SurfaceSelection {
                dimension: self.dimension,
                disc,
                field: self.field,
                thickness: self.thickness,
            },
        })
    }
}

impl PathwayConfig {
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        for (index, rule) in self.rules.iter().enumerate() {
            rule.name()
                .with_context(|| format!("rule #{index}"))?;
        }
        Ok(())
    }
}

/// Parse `x,y,z,r`.
pub fn parse_sphere(text: &str) -> Result<(Point3, f64)> {
    let values = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("invalid number '{}'", part.trim()))
        })
        .collect::<Result<Vec<f64>>>()?;
    let &[x, y, z, r] = values.as_slice() else {
        bail!("expected 'x,y,z,r', got '{text}'");
    };
    Ok((Point3::new(x, y, z), r))
}

/// Load config from a TOML file.
pub fn load_config(path: &Path) -> Result<PathwayConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PathwayConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write config to disk as TOML.
pub fn write_config(path: &Path, cfg: &PathwayConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Starting point written by `pathway init`: default policy and one seed.
pub fn starter_config() -> PathwayConfig {
    PathwayConfig {
        rules: vec![RuleConfig {
            kind: "seed".to_string(),
            sphere: Some("0,0,0,5".to_string()),
            ..RuleConfig::default()
        }],
        ..PathwayConfig::default()
    }
}

/// Build and verify the pathway a config describes.
///
/// Sidecar paths resolve against `base` (normally the config's directory);
/// each sidecar file is read once however many rules refer to it.
#[instrument(skip_all, fields(rules = cfg.rules.len(), base = %base.display()))]
pub fn build_pathway(cfg: &PathwayConfig, base: &Path) -> Result<Pathway> {
    let mut regions = RegionRegistry::new();
    let mut sidecars = SidecarCache::default();
    let mut rules = Vec::with_capacity(cfg.rules.len());
    for (index, rule_cfg) in cfg.rules.iter().enumerate() {
        let name = rule_cfg.name().with_context(|| format!("rule #{index}"))?;
        let source = rule_cfg
            .source(base)
            .with_context(|| format!("rule #{index}"))?;
        let key = source.key();
        let region = regions
            .get_or_try_insert_with(&key, || build_region(&source, &mut sidecars))
            .with_context(|| format!("rule #{index} ({name})"))?;
        debug!(index, rule = %name, region = %key, "rule loaded");
        rules.push(Rule::sided(name.kind, name.side, region));
    }
    let pathway = Pathway::from_rules(regions, rules, cfg.policy.clone())
        .context("verify pathway rules")?;
    Ok(pathway)
}

/// Load a config file and build its pathway.
pub fn load_pathway(path: &Path) -> Result<(PathwayConfig, Pathway)> {
    let cfg = load_config(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let pathway = build_pathway(&cfg, base).with_context(|| format!("load {}", path.display()))?;
    Ok((cfg, pathway))
}

fn build_region(source: &RegionSource, sidecars: &mut SidecarCache) -> Result<Arc<dyn Region>> {
    let region: Arc<dyn Region> = match source {
        RegionSource::Sphere { center, radius } => Arc::new(Sphere::new(*center, *radius)?),
        RegionSource::Image { path, selection } => {
            let volume = sidecars.volume(path)?;
            Arc::new(
                ImageRegion::new(volume, *selection)
                    .with_context(|| format!("image {}", path.display()))?,
            )
        }
        RegionSource::Surface { path, selection } => {
            let mesh = sidecars.mesh(path)?;
            Arc::new(
                Surface::new(&mesh, *selection)
                    .with_context(|| format!("surface {}", path.display()))?,
            )
        }
    };
    Ok(region)
}

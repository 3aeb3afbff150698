//! JSON run configuration, report and the vector/table writers.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{CropOffset, Georeference, WorldPolygon};
use crate::error::PipelineError;
use crate::pipeline::{ExtractionParams, Outcome};
use crate::reproject::{ProjectorParams, ReprojectionRecord};

pub const PLOTS_FILE: &str = "plots.geojson";
pub const REPROJECTION_FILE: &str = "reverse_projection.csv";
pub const REPORT_FILE: &str = "report.json";

fn default_exg_threshold() -> f32 {
    1.0
}

fn default_output_dir() -> String {
    "out".to_string()
}

/// Where the vegetation mask comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSource {
    /// Pre-binarized map; non-zero pixels are vegetation.
    Binary {
        path: String,
        /// Optional field outline in image pixels; the mask is clipped and
        /// cropped to it.
        #[serde(default)]
        polygon: Option<Vec<[f64; 2]>>,
    },
    /// RGB orthomosaic, binarized with the Excess Green index inside the
    /// field outline.
    Field {
        path: String,
        polygon: Vec<[f64; 2]>,
        /// Fixed ExG threshold; values above 0.999 select Otsu.
        #[serde(default = "default_exg_threshold")]
        exg_threshold: f32,
    },
}

/// Raw image side of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseProjectionConfig {
    /// Pix4D project folder; calibration files are looked up under
    /// `1_initial/params/`.
    #[serde(default)]
    pub pix4d_project: Option<String>,
    /// Explicit calibration file, overrides the project lookup.
    #[serde(default)]
    pub calibration_path: Option<String>,
    #[serde(default)]
    pub offset_path: Option<String>,
    /// Folder of raw photos; restricts the candidate images.
    #[serde(default)]
    pub raw_images: Option<String>,
    #[serde(flatten)]
    pub projector: ProjectorParams,
}

/// Configuration of `microplot run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mask: MaskSource,
    /// Position of a pre-cropped binary mask in the orthomosaic, `[y0, x0]`.
    #[serde(default)]
    pub crop_offset: Option<[usize; 2]>,
    #[serde(default)]
    pub georeference: Option<Georeference>,
    #[serde(flatten)]
    pub extraction: ExtractionParams,
    #[serde(default)]
    pub reverse_projection: Option<ReverseProjectionConfig>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl RunConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(PipelineError::io(path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(PipelineError::io(path))
    }

    /// Example config for a binary mask with reverse projection disabled.
    pub fn template() -> Self {
        Self {
            mask: MaskSource::Binary {
                path: "mask.png".to_string(),
                polygon: None,
            },
            crop_offset: None,
            georeference: None,
            extraction: ExtractionParams::default(),
            reverse_projection: None,
            output_dir: default_output_dir(),
        }
    }

    pub fn crop_offset(&self) -> CropOffset {
        self.crop_offset
            .map(|[y0, x0]| CropOffset::new(y0, x0))
            .unwrap_or_default()
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// Summary of the reverse projection step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionSummary {
    pub candidate_images: usize,
    pub resolved_plots: usize,
    pub unresolved_plots: usize,
    pub records: usize,
}

/// Machine-readable result of a run, written as `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub plot_count: usize,
    pub range_count: usize,
    pub row_count: usize,
    pub crop_offset: [usize; 2],
    pub crs: Option<String>,
    pub mask_width: usize,
    pub mask_height: usize,
    pub plots_path: Option<String>,
    pub reprojection_path: Option<String>,
    pub reprojection: Option<ReprojectionSummary>,
}

impl RunReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(PipelineError::io(path))
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(PipelineError::io(path))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Plot layer as a GeoJSON `FeatureCollection`.
///
/// Each feature is a closed polygon with `plot_id`, `range_index` and
/// `row_index` properties. The collection carries a named `crs` member when
/// the polygons are georeferenced.
pub fn plots_geojson(polygons: &[WorldPolygon]) -> Value {
    let features: Vec<Value> = polygons
        .iter()
        .map(|p| {
            json!({
                "type": "Feature",
                "properties": {
                    "plot_id": p.plot_id,
                    "range_index": p.range_index,
                    "row_index": p.row_index,
                },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [p.ring()],
                },
            })
        })
        .collect();

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let Some(crs) = polygons.iter().find_map(|p| p.crs.as_deref()) {
        collection["crs"] = json!({
            "type": "name",
            "properties": { "name": crs },
        });
    }
    collection
}

pub fn write_plots_geojson(path: impl AsRef<Path>, polygons: &[WorldPolygon]) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(&plots_geojson(polygons))?;
    fs::write(path, json).map_err(PipelineError::io(path))
}

pub const REPROJECTION_HEADER: [&str; 11] = [
    "plot_id", "image", "valid", "x1", "y1", "x2", "y2", "x3", "y3", "x4", "y4",
];

/// Reverse projection table as CSV. Unresolved plots have empty image and
/// corner fields.
pub fn write_reprojection_csv<W: std::io::Write>(
    writer: W,
    records: &[ReprojectionRecord],
) -> Result<(), PipelineError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(REPROJECTION_HEADER)?;
    for rec in records {
        let mut row = Vec::with_capacity(REPROJECTION_HEADER.len());
        row.push(rec.plot_id.to_string());
        row.push(rec.image_id.clone().unwrap_or_default());
        row.push(rec.valid.to_string());
        match &rec.corners {
            Some(corners) => {
                for [x, y] in corners {
                    row.push(format!("{x:.3}"));
                    row.push(format!("{y:.3}"));
                }
            }
            None => row.extend(std::iter::repeat_n(String::new(), 8)),
        }
        wtr.write_record(&row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_reprojection_csv_file(
    path: impl AsRef<Path>,
    records: &[ReprojectionRecord],
) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let file = fs::File::create(path).map_err(PipelineError::io(path))?;
    write_reprojection_csv(file, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Orientation, PlotLayout};
    use nalgebra::Point2;

    fn polygon(plot_id: usize, crs: Option<&str>) -> WorldPolygon {
        WorldPolygon {
            plot_id,
            range_index: plot_id / 2,
            row_index: plot_id % 2,
            corners: [
                Point2::new(0.0, 1.0),
                Point2::new(1.0, 1.0),
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 0.0),
            ],
            crs: crs.map(str::to_string),
        }
    }

    #[test]
    fn config_parses_documented_layout() {
        let raw = r#"{
            "mask": { "field": { "path": "ortho.tif", "polygon": [[10, 10], [900, 12], [880, 450], [15, 440]] } },
            "georeference": { "transform": [0.02, 0.0, 368250.0, 0.0, -0.02, 3955120.0], "crs": "EPSG:32654" },
            "plot": { "rows_per_plot": 2, "columns_per_plot": 3, "orientation": "horizontal" },
            "noise_pixels": 50,
            "segments": { "min_run": 10 },
            "reverse_projection": { "pix4d_project": "p4d", "raw_images": "raw", "ground_elevation": 12.5 }
        }"#;
        let cfg: RunConfig = serde_json::from_str(raw).expect("config");
        assert!(matches!(
            &cfg.mask,
            MaskSource::Field { exg_threshold, polygon, .. } if *exg_threshold == 1.0 && polygon.len() == 4
        ));
        assert_eq!(cfg.extraction.plot, PlotLayout::new(2, 3, Orientation::Horizontal));
        assert_eq!(cfg.extraction.segments.min_run, Some(10));
        assert_eq!(cfg.extraction.segments.smoothing_window, 5);
        let rp = cfg.reverse_projection.as_ref().expect("reverse projection");
        assert_eq!(rp.projector.ground_elevation, 12.5);
        assert_eq!(cfg.output_dir, "out");
        assert_eq!(cfg.crop_offset(), CropOffset::default());
    }

    #[test]
    fn config_orientation_goes_through_from_str() {
        let raw = |orientation: &str| {
            format!(
                r#"{{ "mask": {{ "binary": {{ "path": "mask.png" }} }},
                      "plot": {{ "rows_per_plot": 2, "columns_per_plot": 3, "orientation": "{orientation}" }},
                      "noise_pixels": 50 }}"#
            )
        };
        let cfg: RunConfig = serde_json::from_str(&raw("h")).expect("short name");
        assert_eq!(cfg.extraction.plot.orientation, Orientation::Horizontal);
        let cfg: RunConfig = serde_json::from_str(&raw("Vertical")).expect("mixed case");
        assert_eq!(cfg.extraction.plot.orientation, Orientation::Vertical);

        let err = serde_json::from_str::<RunConfig>(&raw("diagonal")).unwrap_err();
        assert!(err.to_string().contains("unknown plot orientation"), "{err}");
    }

    #[test]
    fn template_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let cfg = RunConfig::template();
        cfg.write_json(&path).expect("write");
        assert_eq!(RunConfig::load_json(&path).expect("load"), cfg);
    }

    #[test]
    fn geojson_has_closed_rings_and_crs() {
        let gj = plots_geojson(&[polygon(0, Some("EPSG:32654")), polygon(1, Some("EPSG:32654"))]);
        assert_eq!(gj["type"], "FeatureCollection");
        assert_eq!(gj["features"].as_array().map(Vec::len), Some(2));
        let ring = &gj["features"][1]["geometry"]["coordinates"][0];
        assert_eq!(ring.as_array().map(Vec::len), Some(5));
        assert_eq!(ring[0], ring[4]);
        assert_eq!(gj["features"][1]["properties"]["row_index"], 1);
        assert_eq!(gj["crs"]["properties"]["name"], "EPSG:32654");

        let pixel_space = plots_geojson(&[polygon(0, None)]);
        assert!(pixel_space.get("crs").is_none());
    }

    #[test]
    fn csv_marks_unresolved_plots() {
        let records = vec![
            ReprojectionRecord {
                plot_id: 0,
                image_id: Some("IMG_1.JPG".to_string()),
                corners: Some([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]]),
                valid: true,
            },
            ReprojectionRecord::unresolved(1),
        ];
        let mut buf = Vec::new();
        write_reprojection_csv(&mut buf, &records).expect("csv");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "plot_id,image,valid,x1,y1,x2,y2,x3,y3,x4,y4");
        assert_eq!(lines[1], "0,IMG_1.JPG,true,1.000,2.000,3.000,4.000,5.000,6.000,7.000,8.000");
        assert_eq!(lines[2], "1,,false,,,,,,,,");
    }
}

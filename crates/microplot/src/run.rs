//! File-driven run: load the mask, extract plots, reverse project and write
//! every output into the configured directory.

use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use nalgebra::Point2;

use crate::core::{draw_mask, BinaryMask, CropOffset};
use crate::error::PipelineError;
use crate::io::{
    write_plots_geojson, write_reprojection_csv_file, MaskSource, ReprojectionSummary,
    ReverseProjectionConfig, RunConfig, RunReport, PLOTS_FILE, REPORT_FILE, REPROJECTION_FILE,
};
use crate::pipeline::{extract_plots, reverse_project, Outcome};
use crate::reproject::{reprojection_table, CameraModelLoader, Pix4dProject};
use crate::vegetation::{binarize_exg, ExgThreshold, RgbView};

#[cfg(feature = "tracing")]
use tracing::instrument;

fn vertices(polygon: &[[f64; 2]]) -> Vec<Point2<f64>> {
    polygon.iter().map(|&[x, y]| Point2::new(x, y)).collect()
}

/// Decode a pre-binarized map; any non-zero luma is vegetation.
pub fn load_binary_mask(path: &Path) -> Result<BinaryMask, PipelineError> {
    let img = image::open(path)?.to_luma8();
    let (w, h) = (img.width() as usize, img.height() as usize);
    let data = img.into_raw().into_iter().map(|v| if v != 0 { 255 } else { 0 }).collect();
    Ok(BinaryMask::from_raw(w, h, data)?)
}

/// Mask and crop offset described by `source`.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn load_mask(
    source: &MaskSource,
    base_offset: CropOffset,
    noise_pixels: usize,
) -> Result<(BinaryMask, CropOffset), PipelineError> {
    match source {
        MaskSource::Binary { path, polygon } => {
            let mask = load_binary_mask(Path::new(path))?;
            let (mask, offset) = match polygon {
                None => (mask, base_offset),
                Some(polygon) => {
                    let (field, offset) = draw_mask(mask.width, mask.height, &vertices(polygon))?;
                    let clipped = BinaryMask::from_fn(field.width, field.height, |x, y| {
                        field.get(x, y) && mask.get(x + offset.x0, y + offset.y0)
                    });
                    (
                        clipped,
                        CropOffset::new(base_offset.y0 + offset.y0, base_offset.x0 + offset.x0),
                    )
                }
            };
            let cleaned = mask.remove_small_objects(noise_pixels);
            debug!(
                "binary mask: {} vegetation pixels, {} after noise removal",
                mask.occupied_count(),
                cleaned.occupied_count()
            );
            Ok((cleaned, offset))
        }
        MaskSource::Field {
            path,
            polygon,
            exg_threshold,
        } => {
            let rgb = image::open(path)?.to_rgb8();
            let (w, h) = (rgb.width() as usize, rgb.height() as usize);
            let (field, offset) = draw_mask(w, h, &vertices(polygon))?;

            let raw = rgb.as_raw();
            let mut cropped = Vec::with_capacity(field.width * field.height * 3);
            for y in offset.y0..offset.y0 + field.height {
                let row = (y * w + offset.x0) * 3;
                cropped.extend_from_slice(&raw[row..row + field.width * 3]);
            }
            let view = RgbView::new(field.width, field.height, &cropped)?;
            let mask = binarize_exg(
                &view,
                Some(&field),
                ExgThreshold::from_value(*exg_threshold),
                noise_pixels,
            )?;
            Ok((mask, offset))
        }
    }
}

/// Calibration provider described by the reverse projection config.
pub fn open_camera_models(cfg: &ReverseProjectionConfig) -> Result<Pix4dProject, PipelineError> {
    let raw = cfg.raw_images.as_deref().map(Path::new);
    let project = match (&cfg.calibration_path, &cfg.pix4d_project) {
        (Some(calibration), _) => Pix4dProject::from_files(
            Path::new(calibration),
            cfg.offset_path.as_deref().map(Path::new),
            raw,
        )?,
        (None, Some(project)) => Pix4dProject::discover(Path::new(project), raw)?,
        (None, None) => return Err(PipelineError::NoCalibrationSource),
    };
    Ok(project)
}

/// Execute a full run and write `plots.geojson`, `reverse_projection.csv`
/// and `report.json` into the output directory.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn run(config: &RunConfig) -> Result<RunReport, PipelineError> {
    let started = Instant::now();
    config.extraction.validate()?;

    let out_dir = config.output_dir();
    fs::create_dir_all(&out_dir).map_err(PipelineError::io(&out_dir))?;

    let (mask, offset) = load_mask(&config.mask, config.crop_offset(), config.extraction.noise_pixels)?;
    info!(
        "mask {}x{} at offset (y0={}, x0={}), {} vegetation pixels",
        mask.width,
        mask.height,
        offset.y0,
        offset.x0,
        mask.occupied_count()
    );

    let extraction = extract_plots(&mask, offset, config.georeference.as_ref(), &config.extraction)?;

    let plots_path = if extraction.outcome.has_plots() {
        let path = out_dir.join(PLOTS_FILE);
        write_plots_geojson(&path, &extraction.polygons)?;
        Some(path.display().to_string())
    } else {
        None
    };

    let mut reprojection = None;
    let mut reprojection_path = None;
    if let Some(rp) = &config.reverse_projection {
        let (candidate_images, projections) = if extraction.outcome == Outcome::Ok {
            let models = open_camera_models(rp)?;
            let candidates = models.list_candidate_images().len();
            (candidates, reverse_project(&extraction, &models, rp.projector.clone()))
        } else {
            (0, Vec::new())
        };
        let records = reprojection_table(&projections);
        let path = out_dir.join(REPROJECTION_FILE);
        write_reprojection_csv_file(&path, &records)?;
        reprojection_path = Some(path.display().to_string());

        let resolved = projections.iter().filter(|p| p.is_resolved()).count();
        reprojection = Some(ReprojectionSummary {
            candidate_images,
            resolved_plots: resolved,
            unresolved_plots: projections.len() - resolved,
            records: records.len(),
        });
    }

    let grid = extraction.grid.as_ref();
    let report = RunReport {
        outcome: extraction.outcome,
        plot_count: extraction.polygons.len(),
        range_count: grid.map_or(0, |g| g.range_count),
        row_count: grid.map_or(0, |g| g.row_count),
        crop_offset: [offset.y0, offset.x0],
        crs: config.georeference.as_ref().map(|g| g.crs.clone()),
        mask_width: mask.width,
        mask_height: mask.height,
        plots_path,
        reprojection_path,
        reprojection,
    };
    report.write_json(out_dir.join(REPORT_FILE))?;

    info!(
        "run finished in {:.2}s: {:?}, {} plots",
        started.elapsed().as_secs_f64(),
        report.outcome,
        report.plot_count
    );
    Ok(report)
}

use approx::assert_relative_eq;
use microplot::core::{
    AffineTransform, BinaryMask, CameraCalibration, CameraIntrinsics, CameraPose, CropOffset,
    Georeference, Orientation, PlotLayout, RadialTangentialDistortion, SegmentParams,
};
use microplot::reproject::{InMemoryCameraModels, ProjectorParams, Rejection};
use microplot::{
    extract_plots, reverse_project, reverse_projection_table, ExtractionParams, Outcome,
};
use nalgebra::{Point2, Vector3};

const WIDTH: usize = 1000;
const HEIGHT: usize = 500;

/// Plant bands along one axis: `count` bands of `plant` pixels separated by
/// `gap` pixels, starting at `first`.
fn in_band(v: usize, first: usize, count: usize, plant: usize, gap: usize) -> bool {
    v >= first && (v - first) / (plant + gap) < count && (v - first) % (plant + gap) < plant
}

/// 12 horizontal ranges by 9 vertical rows of canopy.
fn field_mask(ranges: usize) -> BinaryMask {
    BinaryMask::from_fn(WIDTH, HEIGHT, |x, y| {
        in_band(y, 4, ranges, 25, 16) && in_band(x, 20, 9, 70, 40)
    })
}

fn params() -> ExtractionParams {
    ExtractionParams {
        plot: PlotLayout::new(2, 3, Orientation::Horizontal),
        noise_pixels: 50,
        segments: SegmentParams {
            min_run: Some(10),
            ..SegmentParams::default()
        },
    }
}

fn georef() -> Georeference {
    // 1 cm pixels, origin at the top-left corner of the orthomosaic
    Georeference::new(AffineTransform::new(0.01, 0.0, 0.0, 0.0, -0.01, 5.0), "EPSG:32654")
}

fn nadir(x: f64, y: f64) -> CameraCalibration {
    CameraCalibration {
        intrinsics: CameraIntrinsics {
            fx: 4000.0,
            fy: 4000.0,
            cx: 2000.0,
            cy: 1500.0,
        },
        distortion: RadialTangentialDistortion::default(),
        pose: CameraPose::nadir(Vector3::new(x, y, 40.0)),
        width: 4000,
        height: 3000,
    }
}

#[test]
fn eighteen_plots_from_twelve_ranges_and_nine_rows() {
    let ex = extract_plots(&field_mask(12), CropOffset::default(), Some(&georef()), &params())
        .expect("valid params");

    assert_eq!(ex.outcome, Outcome::Ok);
    let grid = ex.grid.as_ref().expect("grid");
    assert_eq!((grid.range_count, grid.row_count), (6, 3));
    assert_eq!(ex.polygons.len(), 18);

    // row-major over (range, row)
    for (i, poly) in ex.polygons.iter().enumerate() {
        assert_eq!(poly.plot_id, i);
        assert_eq!((poly.range_index, poly.row_index), (i / 3, i % 3));
    }

    // first plot: ranges 0-1 along y, rows 0-2 along x, widened by smoothing
    let first = &grid.cells[0];
    assert!(first.y0 <= 4 && first.y0 >= 2, "y0 {}", first.y0);
    assert!(first.y1 >= 70 && first.y1 <= 72, "y1 {}", first.y1);
    assert!(first.x0 <= 20 && first.x0 >= 18, "x0 {}", first.x0);
    assert!(first.x1 >= 310 && first.x1 <= 312, "x1 {}", first.x1);
}

#[test]
fn single_range_is_not_enough_for_a_plot() {
    let ex = extract_plots(&field_mask(1), CropOffset::default(), Some(&georef()), &params())
        .expect("valid params");
    assert_eq!(ex.outcome, Outcome::NoRangesDetected);
    assert!(ex.polygons.is_empty());
    assert!(ex.grid.is_none());
}

#[test]
fn shared_noise_merges_close_ranges() {
    // without the override the 29 px ranges fall under the 50 px noise size
    let mut p = params();
    p.segments.min_run = None;
    let ex = extract_plots(&field_mask(12), CropOffset::default(), Some(&georef()), &p)
        .expect("valid params");
    assert_eq!(ex.outcome, Outcome::NoRangesDetected);
}

#[test]
fn missing_georeference_keeps_pixel_plots_and_skips_reverse_projection() {
    let offset = CropOffset::new(30, 40);
    let ex = extract_plots(&field_mask(12), offset, None, &params()).expect("valid params");

    assert_eq!(ex.outcome, Outcome::GeoreferenceUnavailable);
    assert_eq!(ex.polygons.len(), 18);
    assert!(ex.polygons.iter().all(|p| p.crs.is_none()));

    // corners are full-image pixels
    let cell = &ex.grid.as_ref().expect("grid").cells[0];
    assert_eq!(
        ex.polygons[0].corners[0],
        Point2::new((cell.x0 + 40) as f64, (cell.y0 + 30) as f64)
    );

    let loader = InMemoryCameraModels::new().with("IMG_0001.JPG", nadir(5.0, 2.5));
    let table = reverse_projection_table(&ex, &loader, ProjectorParams::default());
    assert!(table.is_empty());
}

#[test]
fn reverse_projection_finds_covering_images() {
    let ex = extract_plots(&field_mask(12), CropOffset::default(), Some(&georef()), &params())
        .expect("valid params");
    let loader = InMemoryCameraModels::new()
        .with("centre.jpg", nadir(5.0, 2.5))
        .with("far.jpg", nadir(100.0, 100.0))
        .with_candidates(["centre.jpg", "far.jpg", "uncalibrated.jpg"]);

    let projections = reverse_project(&ex, &loader, ProjectorParams::default());
    assert_eq!(projections.len(), 18);
    for p in &projections {
        assert_eq!(p.accepted.len(), 1);
        assert_eq!(p.accepted[0].image_id, "centre.jpg");
        assert!(p.rejected.contains(&("far.jpg".to_string(), Rejection::OutOfBounds)));
        assert!(p
            .rejected
            .contains(&("uncalibrated.jpg".to_string(), Rejection::CalibrationMissing)));
    }

    // world -> image is 100 px per metre around the principal point
    let poly = &ex.polygons[0];
    let img = &projections[0].accepted[0];
    for (world, px) in poly.corners.iter().zip(img.corners.iter()) {
        assert_relative_eq!(px.x, 2000.0 + (world.x - 5.0) * 100.0, epsilon = 1e-6);
        assert_relative_eq!(px.y, 1500.0 - (world.y - 2.5) * 100.0, epsilon = 1e-6);
    }

    let table = reverse_projection_table(&ex, &loader, ProjectorParams::default());
    assert_eq!(table.len(), 18);
    assert!(table.iter().all(|r| r.valid));
}

#[cfg(feature = "image")]
mod files {
    use super::*;
    use microplot::io::{
        MaskSource, RunConfig, RunReport, PLOTS_FILE, REPORT_FILE, REPROJECTION_FILE,
    };
    use microplot::run::load_mask;
    use std::fs;
    use std::path::Path;

    fn write_mask_png(path: &Path, mask: &BinaryMask) {
        let img = image::GrayImage::from_raw(mask.width as u32, mask.height as u32, mask.data.clone())
            .expect("buffer size");
        img.save(path).expect("save png");
    }

    const CALIBRATION: &str = "\
imageName imageWidth imageHeight
camera matrix K [3x3]
radial distortion [3x1]
tangential distortion [2x1]
camera position t [3x1]
camera rotation R [3x3]
camera model m = K [R|-Rt] X

centre.jpg 4000 3000
4000 0 2000
0 4000 1500
0 0 1
0 0 0
0 0
5 2.5 40
1 0 0
0 -1 0
0 0 -1
";

    #[test]
    fn run_writes_every_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mask_path = dir.path().join("mask.png");
        write_mask_png(&mask_path, &field_mask(12));

        let params_dir = dir.path().join("p4d").join("1_initial").join("params");
        fs::create_dir_all(&params_dir).expect("params dir");
        fs::write(params_dir.join("field_calibrated_camera_parameters.txt"), CALIBRATION).expect("write");
        let raw = dir.path().join("raw");
        fs::create_dir_all(&raw).expect("raw dir");
        fs::write(raw.join("centre.jpg"), b"").expect("write");

        let out = dir.path().join("out");
        let config = serde_json::json!({
            "mask": { "binary": { "path": mask_path } },
            "georeference": { "transform": [0.01, 0.0, 0.0, 0.0, -0.01, 5.0], "crs": "EPSG:32654" },
            "plot": { "rows_per_plot": 2, "columns_per_plot": 3, "orientation": "horizontal" },
            "noise_pixels": 50,
            "segments": { "min_run": 10 },
            "reverse_projection": {
                "pix4d_project": dir.path().join("p4d"),
                "raw_images": raw,
            },
            "output_dir": out,
        });
        let cfg: RunConfig = serde_json::from_value(config).expect("config");

        let report = microplot::run::run(&cfg).expect("run");
        assert_eq!(report.outcome, Outcome::Ok);
        assert_eq!(report.plot_count, 18);
        let summary = report.reprojection.as_ref().expect("reprojection summary");
        assert_eq!(summary.candidate_images, 1);
        assert_eq!(summary.resolved_plots, 18);

        let geojson: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(PLOTS_FILE)).expect("geojson")).expect("json");
        assert_eq!(geojson["features"].as_array().map(Vec::len), Some(18));
        assert_eq!(geojson["crs"]["properties"]["name"], "EPSG:32654");

        let csv = fs::read_to_string(out.join(REPROJECTION_FILE)).expect("csv");
        assert_eq!(csv.lines().count(), 19);
        assert!(csv.lines().skip(1).all(|l| l.contains(",centre.jpg,true,")));

        assert_eq!(RunReport::load_json(out.join(REPORT_FILE)).expect("report"), report);
    }

    #[test]
    fn run_without_georeference_writes_empty_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mask_path = dir.path().join("mask.png");
        write_mask_png(&mask_path, &field_mask(12));
        let out = dir.path().join("out");

        let config = serde_json::json!({
            "mask": { "binary": { "path": mask_path } },
            "plot": { "rows_per_plot": 2, "columns_per_plot": 3, "orientation": "h" },
            "noise_pixels": 50,
            "segments": { "min_run": 10 },
            "reverse_projection": { "pix4d_project": dir.path().join("missing") },
            "output_dir": out,
        });
        let cfg: RunConfig = serde_json::from_value(config).expect("config");
        let report = microplot::run::run(&cfg).expect("run");

        assert_eq!(report.outcome, Outcome::GeoreferenceUnavailable);
        assert_eq!(report.plot_count, 18);
        let csv = fs::read_to_string(out.join(REPROJECTION_FILE)).expect("csv");
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn binary_mask_drops_specks_below_noise_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mask.png");
        let mask = BinaryMask::from_fn(100, 100, |x, y| {
            ((20..70).contains(&x) && (20..70).contains(&y)) || (x == 90 && y == 5)
        });
        write_mask_png(&path, &mask);
        let path_str = path.display().to_string();

        let source = MaskSource::Binary {
            path: path_str.clone(),
            polygon: None,
        };
        let (loaded, offset) = load_mask(&source, CropOffset::new(3, 4), 50).expect("load");
        assert_eq!(offset, CropOffset::new(3, 4));
        assert_eq!(loaded.occupied_count(), 2500);
        assert!(!loaded.get(90, 5));

        let clipped = MaskSource::Binary {
            path: path_str,
            polygon: Some(vec![[10.0, 0.0], [100.0, 0.0], [100.0, 80.0], [10.0, 80.0]]),
        };
        let (loaded, offset) = load_mask(&clipped, CropOffset::default(), 50).expect("load");
        assert_eq!(offset, CropOffset::new(0, 10));
        assert_eq!(loaded.occupied_count(), 2500);
    }

    #[test]
    fn field_polygon_crops_rgb_orthomosaic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ortho = dir.path().join("ortho.png");
        let mask = field_mask(12);
        let mut rgb = image::RgbImage::new(WIDTH as u32, HEIGHT as u32);
        for (x, y, px) in rgb.enumerate_pixels_mut() {
            *px = if mask.get(x as usize, y as usize) {
                image::Rgb([60, 160, 50])
            } else {
                image::Rgb([120, 90, 70])
            };
        }
        rgb.save(&ortho).expect("save png");

        let config = serde_json::json!({
            "mask": { "field": { "path": ortho, "polygon": [[1, 1], [999, 1], [999, 499], [1, 499]] } },
            "plot": { "rows_per_plot": 2, "columns_per_plot": 3, "orientation": "horizontal" },
            "noise_pixels": 50,
            "segments": { "min_run": 10 },
            "output_dir": dir.path().join("out"),
        });
        let cfg: RunConfig = serde_json::from_value(config).expect("config");
        let report = microplot::run::run(&cfg).expect("run");

        assert_eq!(report.crop_offset, [1, 1]);
        assert_eq!((report.mask_width, report.mask_height), (998, 498));
        assert_eq!(report.plot_count, 18);
        assert!(report.reprojection.is_none());
    }
}

//! Pix4D project reader.
//!
//! Pix4D writes one `<project>_calibrated_camera_parameters.txt` per project
//! under `1_initial/params/`. After a seven line header, every calibrated
//! image is a block of ten lines:
//!
//! ```text
//! IMG_0001.JPG 5472 3648          name, width, height
//! fx 0 cx                         K, three rows
//! 0 fy cy
//! 0 0 1
//! k1 k2 k3                        radial distortion
//! p1 p2                           tangential distortion
//! tx ty tz                        camera position
//! r11 r12 r13                     world to camera rotation, three rows
//! r21 r22 r23
//! r31 r32 r33
//! ```
//!
//! The projection is `m = K [R | -R t] X`, with positions relative to the
//! project offset stored in `<project>_offset.xyz`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use microplot_core::{CameraCalibration, CameraIntrinsics, CameraPose, RadialTangentialDistortion};
use nalgebra::{Matrix3, Vector3};

use crate::error::CalibrationError;
use crate::loader::CameraModelLoader;

const CALIBRATION_SUFFIX: &str = "_calibrated_camera_parameters.txt";
const OFFSET_SUFFIX: &str = "_offset.xyz";
const PARAMS_DIR: [&str; 2] = ["1_initial", "params"];
const RAW_IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "tif", "tiff", "png"];
/// Free-form description lines at the top of a calibration file.
const PREAMBLE_LINES: usize = 7;

/// Calibrations of one Pix4D project, optionally restricted to the images
/// present in a raw image directory.
#[derive(Clone, Debug, Default)]
pub struct Pix4dProject {
    calibrations: BTreeMap<String, CameraCalibration>,
    raw_images: Option<Vec<String>>,
}

impl Pix4dProject {
    /// Load from explicit file paths.
    pub fn from_files(
        calibration_path: &Path,
        offset_path: Option<&Path>,
        raw_images_dir: Option<&Path>,
    ) -> Result<Self, CalibrationError> {
        let offset = match offset_path {
            Some(path) => parse_offset(&read(path)?, path)?,
            None => Vector3::zeros(),
        };
        let text = read(calibration_path)?;
        let calibrations = parse_calibrated_camera_parameters(&text, calibration_path, offset)?
            .into_iter()
            .collect::<BTreeMap<_, _>>();

        let raw_images = raw_images_dir.map(list_raw_images).transpose()?;

        info!(
            "loaded {} camera calibrations from {}",
            calibrations.len(),
            calibration_path.display()
        );
        Ok(Self {
            calibrations,
            raw_images,
        })
    }

    /// Locate the calibration and offset files under
    /// `<project_dir>/1_initial/params/` and load them.
    pub fn discover(project_dir: &Path, raw_images_dir: Option<&Path>) -> Result<Self, CalibrationError> {
        let params_dir = PARAMS_DIR.iter().fold(project_dir.to_path_buf(), |p, c| p.join(c));
        let calibration = find_with_suffix(&params_dir, CALIBRATION_SUFFIX)?.ok_or_else(|| {
            CalibrationError::MissingFile {
                dir: params_dir.clone(),
                suffix: CALIBRATION_SUFFIX,
            }
        })?;
        let offset = find_with_suffix(&params_dir, OFFSET_SUFFIX)?;
        if offset.is_none() {
            warn!(
                "no *{} in {}; camera positions are used as is",
                OFFSET_SUFFIX,
                params_dir.display()
            );
        }
        Self::from_files(&calibration, offset.as_deref(), raw_images_dir)
    }

    pub fn len(&self) -> usize {
        self.calibrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calibrations.is_empty()
    }
}

impl CameraModelLoader for Pix4dProject {
    fn list_candidate_images(&self) -> Vec<String> {
        match &self.raw_images {
            Some(list) => list.clone(),
            None => self.calibrations.keys().cloned().collect(),
        }
    }

    fn calibration(&self, image_id: &str) -> Option<CameraCalibration> {
        self.calibrations.get(image_id).copied()
    }
}

fn read(path: &Path) -> Result<String, CalibrationError> {
    fs::read_to_string(path).map_err(|source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CalibrationError {
    let path = path.to_path_buf();
    move |source| CalibrationError::Io { path, source }
}

fn find_with_suffix(dir: &Path, suffix: &str) -> Result<Option<PathBuf>, CalibrationError> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if is_match && path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    if matches.len() > 1 {
        warn!(
            "{} files matching *{} in {}, using {}",
            matches.len(),
            suffix,
            dir.display(),
            matches[0].display()
        );
    }
    Ok(matches.into_iter().next())
}

/// File names of the raw images in `dir`, sorted. Only common photo
/// extensions are listed; the match is case-insensitive.
pub fn list_raw_images(dir: &Path) -> Result<Vec<String>, CalibrationError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| RAW_IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
        if let (true, Some(name)) = (is_image, path.file_name().and_then(|n| n.to_str())) {
            names.push(name.to_string());
        }
    }
    names.sort();
    debug!("{} raw images in {}", names.len(), dir.display());
    Ok(names)
}

/// Parse the project offset, three numbers on the first non-empty line.
pub fn parse_offset(text: &str, path: &Path) -> Result<Vector3<f64>, CalibrationError> {
    let mut lines = Lines::new(text, path);
    let v = lines.numbers::<3>("offset x y z")?;
    Ok(Vector3::new(v[0], v[1], v[2]))
}

/// Parse a calibrated camera parameters file. `offset` is added to every
/// camera position so poses live in the orthomosaic's frame.
pub fn parse_calibrated_camera_parameters(
    text: &str,
    path: &Path,
    offset: Vector3<f64>,
) -> Result<Vec<(String, CameraCalibration)>, CalibrationError> {
    let mut lines = Lines::new(text, path);
    lines.skip_raw(PREAMBLE_LINES);
    let mut out = Vec::new();

    while let Some((line_no, tokens)) = lines.next_tokens() {
        let Some((name, width, height)) = image_header(&tokens) else {
            return Err(lines.error(line_no, "expected `name width height`"));
        };

        let k = lines.rows::<3>("camera matrix K")?;
        let radial = lines.numbers::<3>("radial distortion k1 k2 k3")?;
        let tangential = lines.numbers::<2>("tangential distortion p1 p2")?;
        let t = lines.numbers::<3>("camera position")?;
        let r = lines.rows::<3>("camera rotation R")?;

        let calibration = CameraCalibration {
            intrinsics: CameraIntrinsics {
                fx: k[0][0],
                fy: k[1][1],
                cx: k[0][2],
                cy: k[1][2],
            },
            distortion: RadialTangentialDistortion {
                k1: radial[0],
                k2: radial[1],
                k3: radial[2],
                p1: tangential[0],
                p2: tangential[1],
            },
            pose: CameraPose::new(
                Matrix3::new(
                    r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
                ),
                Vector3::new(t[0], t[1], t[2]) + offset,
            ),
            width,
            height,
        };
        if !calibration.intrinsics.is_valid() {
            return Err(lines.error(line_no, "camera matrix has a zero or non-finite focal length"));
        }
        out.push((name.to_string(), calibration));
    }

    Ok(out)
}

fn image_header<'a>(tokens: &[&'a str]) -> Option<(&'a str, u32, u32)> {
    match tokens {
        [name, w, h] => Some((*name, w.parse().ok()?, h.parse().ok()?)),
        _ => None,
    }
}

/// Non-empty lines with 1-based numbers, for error reporting.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    path: &'a Path,
    last_line: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str, path: &'a Path) -> Self {
        Self {
            inner: text.lines().enumerate(),
            path,
            last_line: 0,
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> CalibrationError {
        CalibrationError::Parse {
            path: self.path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    fn skip_raw(&mut self, count: usize) {
        for (idx, _) in self.inner.by_ref().take(count) {
            self.last_line = idx + 1;
        }
    }

    fn next_tokens(&mut self) -> Option<(usize, Vec<&'a str>)> {
        for (idx, line) in self.inner.by_ref() {
            self.last_line = idx + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if !tokens.is_empty() {
                return Some((idx + 1, tokens));
            }
        }
        None
    }

    fn numbers<const N: usize>(&mut self, what: &str) -> Result<[f64; N], CalibrationError> {
        let Some((line_no, tokens)) = self.next_tokens() else {
            return Err(self.error(self.last_line, format!("unexpected end of file, expected {what}")));
        };
        if tokens.len() != N {
            return Err(self.error(
                line_no,
                format!("expected {N} values for {what}, found {}", tokens.len()),
            ));
        }
        let mut out = [0.0; N];
        for (slot, token) in out.iter_mut().zip(&tokens) {
            *slot = token
                .parse()
                .map_err(|_| self.error(line_no, format!("invalid number {token:?} in {what}")))?;
        }
        Ok(out)
    }

    fn rows<const N: usize>(&mut self, what: &str) -> Result<[[f64; N]; N], CalibrationError> {
        let mut out = [[0.0; N]; N];
        for row in out.iter_mut() {
            *row = self.numbers::<N>(what)?;
        }
        Ok(out)
    }
}

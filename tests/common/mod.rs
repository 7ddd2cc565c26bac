//! Builds small Level 5 MAT-files in memory for tests.
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};

const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_CHAR: u32 = 4;
const MX_SPARSE: u32 = 5;
const MX_DOUBLE: u32 = 6;

/// A MATLAB array to write. Data is given in column-major order.
#[derive(Clone)]
pub enum Mat {
    Double(Vec<usize>, Vec<f64>),
    Char(String),
    Cell(Vec<usize>, Vec<Mat>),
    Struct(Vec<usize>, Vec<&'static str>, Vec<Vec<Mat>>),
    Sparse,
}

impl Mat {
    pub fn scalar(x: f64) -> Mat {
        Mat::Double(vec![1, 1], vec![x])
    }

    pub fn row(values: &[f64]) -> Mat {
        Mat::Double(vec![1, values.len()], values.to_vec())
    }

    pub fn column(values: &[f64]) -> Mat {
        Mat::Double(vec![values.len(), 1], values.to_vec())
    }
}

/// A MAT-file holding `variables`, optionally zlib-compressed per variable.
pub fn mat_file(variables: &[(&str, Mat)], compressed: bool) -> Vec<u8> {
    let mut bytes = vec![b' '; 116];
    let text = b"MATLAB 5.0 MAT-file, written by neuroimport tests";
    bytes[..text.len()].copy_from_slice(text);
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.write_u16::<LittleEndian>(0x0100).unwrap();
    bytes.extend_from_slice(b"IM");

    for (name, value) in variables {
        let matrix = element(MI_MATRIX, &matrix_body(name, value));
        if compressed {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&matrix).unwrap();
            let deflated = encoder.finish().unwrap();
            bytes.write_u32::<LittleEndian>(MI_COMPRESSED).unwrap();
            bytes.write_u32::<LittleEndian>(deflated.len() as u32).unwrap();
            bytes.extend_from_slice(&deflated);
        } else {
            bytes.extend_from_slice(&matrix);
        }
    }
    bytes
}

/// Writes `bytes` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn element(data_type: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.write_u32::<LittleEndian>(data_type).unwrap();
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

fn header(class: u32, dims: &[usize], name: &str) -> Vec<u8> {
    let mut flags = Vec::new();
    flags.write_u32::<LittleEndian>(class).unwrap();
    flags.write_u32::<LittleEndian>(0).unwrap();

    let mut dim_bytes = Vec::new();
    for &d in dims {
        dim_bytes.write_i32::<LittleEndian>(d as i32).unwrap();
    }

    let mut out = element(MI_UINT32, &flags);
    out.extend(element(MI_INT32, &dim_bytes));
    out.extend(element(MI_INT8, name.as_bytes()));
    out
}

fn matrix_body(name: &str, value: &Mat) -> Vec<u8> {
    match value {
        Mat::Double(dims, data) => {
            let mut out = header(MX_DOUBLE, dims, name);
            let mut raw = Vec::new();
            for &x in data {
                raw.write_f64::<LittleEndian>(x).unwrap();
            }
            out.extend(element(MI_DOUBLE, &raw));
            out
        }
        Mat::Char(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            let mut out = header(MX_CHAR, &[1, units.len()], name);
            let mut raw = Vec::new();
            for unit in units {
                raw.write_u16::<LittleEndian>(unit).unwrap();
            }
            out.extend(element(MI_UINT16, &raw));
            out
        }
        Mat::Cell(dims, cells) => {
            let mut out = header(MX_CELL, dims, name);
            for cell in cells {
                out.extend(element(MI_MATRIX, &matrix_body("", cell)));
            }
            out
        }
        Mat::Struct(dims, fields, elements) => {
            let mut out = header(MX_STRUCT, dims, name);
            let width = fields.iter().map(|f| f.len()).max().unwrap_or(0) + 1;

            let mut len = Vec::new();
            len.write_i32::<LittleEndian>(width as i32).unwrap();
            // Field name length travels as a small data element
            out.write_u32::<LittleEndian>((4 << 16) | MI_INT32).unwrap();
            out.extend_from_slice(&len);

            let mut names = Vec::new();
            for field in fields {
                let mut padded = field.as_bytes().to_vec();
                padded.resize(width, 0);
                names.extend(padded);
            }
            out.extend(element(MI_INT8, &names));

            for values in elements {
                for value in values {
                    out.extend(element(MI_MATRIX, &matrix_body("", value)));
                }
            }
            out
        }
        Mat::Sparse => header(MX_SPARSE, &[1, 1], name),
    }
}

/// The 12 positional fields of a legacy trial record
pub const TRIAL_FIELDS: [&str; 12] = [
    "CTX_events",
    "NLX_events",
    "trialID",
    "cond_num",
    "RT_evnt",
    "RT_EPP",
    "target_dim",
    "rf_dim",
    "position_RF",
    "position_out1",
    "position_out2",
    "fixbreak",
];

/// One trial record with the given id and condition code
pub fn trial(id: f64, cond: f64) -> Vec<Mat> {
    vec![
        Mat::column(&[0.0, 150.0, 900.0]),
        Mat::column(&[12.5]),
        Mat::scalar(id),
        Mat::scalar(cond),
        Mat::scalar(412.0),
        Mat::scalar(398.6),
        Mat::scalar(2.0),
        Mat::scalar(1.0),
        Mat::scalar(3.0),
        Mat::scalar(1.0),
        Mat::scalar(2.0),
        Mat::scalar(0.0),
    ]
}

/// A `trialdata` 1xN struct array
pub fn trialdata(trials: Vec<Vec<Mat>>) -> Mat {
    Mat::Struct(vec![1, trials.len()], TRIAL_FIELDS.to_vec(), trials)
}

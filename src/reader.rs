use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use log::{debug, info};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use crate::source::RecordReader;
use crate::types::*;

// Header layout (from the MATLAB Level 5 MAT-file format description)
const HEADER_TEXT_LEN: usize = 116;
const HEADER_LEN: usize = 128;
const MAT5_VERSION: u16 = 0x0100;

// Data element types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

// Array classes
const MX_CELL: u8 = 1;
const MX_STRUCT: u8 = 2;
const MX_OBJECT: u8 = 3;
const MX_CHAR: u8 = 4;
const MX_SPARSE: u8 = 5;
const MX_DOUBLE: u8 = 6;
const MX_UINT64: u8 = 15;
const MX_FUNCTION: u8 = 16;

const FLAG_COMPLEX: u32 = 0x0800;

/// Reads Level 5 MAT-files (versions 6 and 7) from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatReader;

impl RecordReader for MatReader {
    fn read(&self, path: &Path, variable_names: Option<&[String]>) -> Result<Record, LoadError> {
        load_file(path, variable_names)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// A data element borrowed from the file buffer.
struct Element<'a> {
    data_type: u32,
    data: &'a [u8],
}

/// Header shared by every array (`miMATRIX`) element.
struct MatrixHeader {
    class: u8,
    flags: u32,
    dims: Vec<usize>,
    name: String,
}

/// Loads a MAT-file and returns its variables in file order.
///
/// # Arguments
///
/// * `file_path` - Path to the MAT-file
/// * `variable_names` - Variables to keep; all variables are kept when `None`
///
/// The whole file is buffered in memory before parsing.
pub fn load_file<P: AsRef<Path>>(
    file_path: P,
    variable_names: Option<&[String]>,
) -> Result<Record, LoadError> {
    let tic = Instant::now();

    let file = File::open(file_path.as_ref())?;
    let mut reader = BufReader::with_capacity(65536, file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let record = read_mat(&bytes, variable_names)?;

    info!(
        "Done! Read {} variable{} from {} in {:.1} seconds",
        record.len(),
        if record.len() != 1 { "s" } else { "" },
        file_path.as_ref().display(),
        tic.elapsed().as_secs_f64()
    );

    Ok(record)
}

/// Parses an in-memory MAT-file.
pub fn read_mat(bytes: &[u8], variable_names: Option<&[String]>) -> Result<Record, LoadError> {
    let body = &bytes[HEADER_LEN.min(bytes.len())..];
    match check_header(bytes)? {
        Endian::Little => read_variables::<LittleEndian>(body, variable_names),
        Endian::Big => read_variables::<BigEndian>(body, variable_names),
    }
}

/// Checks the 128-byte header and returns the byte order of the file
fn check_header(bytes: &[u8]) -> Result<Endian, LoadError> {
    if bytes.len() < HEADER_LEN {
        return Err(LoadError::UnrecognizedFileFormat(
            "file is shorter than a MAT-file header".to_string(),
        ));
    }

    let endian = match &bytes[126..128] {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        _ => {
            return Err(LoadError::UnrecognizedFileFormat(
                "missing MAT-file endian indicator".to_string(),
            ))
        }
    };

    let version = match endian {
        Endian::Little => LittleEndian::read_u16(&bytes[124..126]),
        Endian::Big => BigEndian::read_u16(&bytes[124..126]),
    };
    if version != MAT5_VERSION {
        return Err(LoadError::UnrecognizedFileFormat(format!(
            "unsupported MAT-file version {:#06x} (v7.3 files are HDF5)",
            version
        )));
    }

    let text = String::from_utf8_lossy(&bytes[..HEADER_TEXT_LEN]);
    debug!("MAT-file header: {}", text.trim_end_matches(|c| c == '\0' || c == ' '));

    Ok(endian)
}

/// Reads the next data element starting at `pos` and advances past it
fn next_element<'a, B: ByteOrder>(buf: &'a [u8], pos: &mut usize) -> Result<Element<'a>, LoadError> {
    let truncated = || LoadError::UnrecognizedFileFormat("truncated data element".to_string());

    if *pos + 8 > buf.len() {
        return Err(truncated());
    }

    let first = B::read_u32(&buf[*pos..*pos + 4]);
    let small_size = (first >> 16) as usize;

    // Small data element: tag and up to 4 bytes of data packed into 8 bytes
    if small_size != 0 {
        if small_size > 4 {
            return Err(truncated());
        }
        let data = &buf[*pos + 4..*pos + 4 + small_size];
        *pos += 8;
        return Ok(Element {
            data_type: first & 0xffff,
            data,
        });
    }

    let data_type = first;
    let size = B::read_u32(&buf[*pos + 4..*pos + 8]) as usize;
    let start = *pos + 8;
    let end = start.checked_add(size).ok_or_else(truncated)?;
    if end > buf.len() {
        return Err(truncated());
    }

    // Compressed elements are not padded
    *pos = if data_type == MI_COMPRESSED {
        end
    } else {
        (start + size.div_ceil(8) * 8).min(buf.len())
    };

    Ok(Element {
        data_type,
        data: &buf[start..end],
    })
}

/// Reads all top-level variables
fn read_variables<B: ByteOrder>(
    body: &[u8],
    variable_names: Option<&[String]>,
) -> Result<Record, LoadError> {
    let mut record = Record::new();
    let mut pos = 0;

    while pos < body.len() {
        let element = next_element::<B>(body, &mut pos)?;

        if element.data_type == MI_COMPRESSED {
            let inflated = inflate(element.data)?;
            let mut inner = 0;
            while inner < inflated.len() {
                let element = next_element::<B>(&inflated, &mut inner)?;
                read_variable::<B>(element, variable_names, &mut record)?;
            }
        } else {
            read_variable::<B>(element, variable_names, &mut record)?;
        }
    }

    Ok(record)
}

/// Decodes one top-level element into `record` unless it is filtered out
fn read_variable<B: ByteOrder>(
    element: Element<'_>,
    variable_names: Option<&[String]>,
    record: &mut Record,
) -> Result<(), LoadError> {
    if element.data_type != MI_MATRIX {
        debug!("Skipping top-level element of type {}", element.data_type);
        return Ok(());
    }

    let mut pos = 0;
    let header = read_matrix_header::<B>(element.data, &mut pos)?;

    if let Some(names) = variable_names {
        if !names.iter().any(|name| *name == header.name) {
            debug!("Skipping variable {}", header.name);
            return Ok(());
        }
    }

    let value = read_matrix_body::<B>(&header, element.data, &mut pos)?;
    debug!(
        "Read variable {} ({} {:?})",
        header.name,
        value.class_name(),
        header.dims
    );
    record.insert(header.name, value);

    Ok(())
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, LoadError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated)?;
    Ok(inflated)
}

/// Reads the array flags, dimensions and name sub-elements
fn read_matrix_header<B: ByteOrder>(data: &[u8], pos: &mut usize) -> Result<MatrixHeader, LoadError> {
    let flags = next_element::<B>(data, pos)?;
    if flags.data.len() < 8 {
        return Err(LoadError::UnrecognizedFileFormat(
            "array flags too short".to_string(),
        ));
    }
    let flags = B::read_u32(&flags.data[0..4]);

    let dims = next_element::<B>(data, pos)?;
    let dims = dims
        .data
        .chunks_exact(4)
        .map(|chunk| B::read_i32(chunk).max(0) as usize)
        .collect();

    let name = next_element::<B>(data, pos)?;
    let name = String::from_utf8_lossy(name.data).into_owned();

    Ok(MatrixHeader {
        class: (flags & 0xff) as u8,
        flags,
        dims,
        name,
    })
}

/// Parses a nested `miMATRIX` element (cell contents and struct fields)
fn read_matrix<B: ByteOrder>(element: Element<'_>) -> Result<Value, LoadError> {
    if element.data_type != MI_MATRIX {
        return Err(LoadError::UnrecognizedFileFormat(format!(
            "expected a nested array, found data type {}",
            element.data_type
        )));
    }

    // Empty arrays inside cells and structs are written without any sub-elements
    if element.data.is_empty() {
        return Ok(Value::Numeric(ArrayD::zeros(IxDyn(&[0, 0]))));
    }

    let mut pos = 0;
    let header = read_matrix_header::<B>(element.data, &mut pos)?;
    read_matrix_body::<B>(&header, element.data, &mut pos)
}

fn read_matrix_body<B: ByteOrder>(
    header: &MatrixHeader,
    data: &[u8],
    pos: &mut usize,
) -> Result<Value, LoadError> {
    let count = element_count(&header.dims)?;
    let shape = IxDyn(&header.dims).f();

    match header.class {
        MX_CELL => {
            check_nested_count(count, data, *pos)?;
            let mut cells = Vec::with_capacity(count);
            for _ in 0..count {
                cells.push(read_matrix::<B>(next_element::<B>(data, pos)?)?);
            }
            Ok(Value::Cell(ArrayD::from_shape_vec(shape, cells)?))
        }
        MX_STRUCT => {
            let field_name_len = next_element::<B>(data, pos)?;
            let field_name_len = if field_name_len.data.len() >= 4 {
                B::read_i32(field_name_len.data).max(0) as usize
            } else {
                0
            };

            let names = next_element::<B>(data, pos)?;
            let field_names: Vec<String> = if field_name_len == 0 {
                Vec::new()
            } else {
                names
                    .data
                    .chunks(field_name_len)
                    .map(|chunk| {
                        let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                        String::from_utf8_lossy(&chunk[..end]).into_owned()
                    })
                    .collect()
            };

            let nested = count.checked_mul(field_names.len()).ok_or_else(|| {
                LoadError::UnrecognizedFileFormat(format!(
                    "struct of {:?} with {} fields is too large",
                    header.dims,
                    field_names.len()
                ))
            })?;
            check_nested_count(nested, data, *pos)?;
            // Field-less elements take no bytes; bound them by the element size instead
            if count > data.len() {
                return Err(LoadError::UnrecognizedFileFormat(format!(
                    "struct of {:?} does not fit in {} bytes",
                    header.dims,
                    data.len()
                )));
            }

            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                let mut values = Vec::with_capacity(field_names.len());
                for _ in 0..field_names.len() {
                    values.push(read_matrix::<B>(next_element::<B>(data, pos)?)?);
                }
                elements.push(values);
            }

            Ok(Value::Struct(StructArray {
                field_names,
                elements: ArrayD::from_shape_vec(shape, elements)?,
            }))
        }
        MX_CHAR => {
            let element = next_element::<B>(data, pos)?;
            Ok(Value::Char(decode_chars::<B>(&element, &header.dims)?))
        }
        MX_DOUBLE..=MX_UINT64 => {
            if header.flags & FLAG_COMPLEX != 0 {
                return Ok(Value::Unsupported("complex".to_string()));
            }
            let element = next_element::<B>(data, pos)?;
            let values = decode_numeric::<B>(&element)?;
            Ok(Value::Numeric(ArrayD::from_shape_vec(shape, values)?))
        }
        other => Ok(Value::Unsupported(class_name(other).to_string())),
    }
}

/// Number of elements of an array with `dims`, failing on overflow
fn element_count(dims: &[usize]) -> Result<usize, LoadError> {
    dims.iter()
        .try_fold(1usize, |count, &d| count.checked_mul(d))
        .ok_or_else(|| {
            LoadError::UnrecognizedFileFormat(format!("array dimensions {:?} overflow", dims))
        })
}

/// Every nested array takes at least one 8-byte tag, so `count` of them must fit in what is left
fn check_nested_count(count: usize, data: &[u8], pos: usize) -> Result<(), LoadError> {
    let available = data.len().saturating_sub(pos) / 8;
    if count > available {
        return Err(LoadError::UnrecognizedFileFormat(format!(
            "{} nested arrays declared but only room for {}",
            count, available
        )));
    }
    Ok(())
}

fn class_name(class: u8) -> &'static str {
    match class {
        MX_OBJECT => "object",
        MX_SPARSE => "sparse",
        MX_FUNCTION => "function_handle",
        _ => "unknown",
    }
}

/// Converts numeric data of any storage type to `f64`
fn decode_numeric<B: ByteOrder>(element: &Element<'_>) -> Result<Vec<f64>, LoadError> {
    let d = element.data;
    let values = match element.data_type {
        MI_INT8 => d.iter().map(|&b| b as i8 as f64).collect(),
        MI_UINT8 => d.iter().map(|&b| b as f64).collect(),
        MI_INT16 => d.chunks_exact(2).map(|c| B::read_i16(c) as f64).collect(),
        MI_UINT16 => d.chunks_exact(2).map(|c| B::read_u16(c) as f64).collect(),
        MI_INT32 => d.chunks_exact(4).map(|c| B::read_i32(c) as f64).collect(),
        MI_UINT32 => d.chunks_exact(4).map(|c| B::read_u32(c) as f64).collect(),
        MI_SINGLE => d.chunks_exact(4).map(|c| B::read_f32(c) as f64).collect(),
        MI_DOUBLE => d.chunks_exact(8).map(B::read_f64).collect(),
        MI_INT64 => d.chunks_exact(8).map(|c| B::read_i64(c) as f64).collect(),
        MI_UINT64 => d.chunks_exact(8).map(|c| B::read_u64(c) as f64).collect(),
        other => {
            return Err(LoadError::UnrecognizedFileFormat(format!(
                "unexpected data type {} for numeric data",
                other
            )))
        }
    };
    Ok(values)
}

/// Decodes a character array, joining rows with newlines
fn decode_chars<B: ByteOrder>(element: &Element<'_>, dims: &[usize]) -> Result<String, LoadError> {
    let d = element.data;
    let chars: Vec<char> = match element.data_type {
        MI_UTF8 => String::from_utf8_lossy(d).chars().collect(),
        MI_INT8 | MI_UINT8 => d.iter().map(|&b| b as char).collect(),
        MI_UINT16 | MI_UTF16 => {
            let units = d.chunks_exact(2).map(B::read_u16);
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        MI_UINT32 | MI_UTF32 | MI_INT32 => d
            .chunks_exact(4)
            .map(|c| char::from_u32(B::read_u32(c)).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
        other => {
            return Err(LoadError::UnrecognizedFileFormat(format!(
                "unexpected data type {} for character data",
                other
            )))
        }
    };

    let rows = dims.first().copied().unwrap_or(0);
    let declared = dims.iter().try_fold(1usize, |count, &d| count.checked_mul(d));
    if rows <= 1 || declared != Some(chars.len()) {
        return Ok(chars.into_iter().collect());
    }

    // Column-major: character (r, c) is at r + c * rows
    let cols = chars.len() / rows;
    let lines: Vec<String> = (0..rows)
        .map(|r| (0..cols).map(|c| chars[r + c * rows]).collect())
        .collect();
    Ok(lines.join("\n"))
}

pub mod animate;
pub mod canvas;
pub mod normalize;
mod reader;
pub mod source;
pub mod trials;
pub mod types;

use std::path::Path;

// Re-export types
pub use animate::{
    advance_lines, advance_lines_with_counter, create_lines, format_counter, Marker, Surface,
};
pub use canvas::{Canvas, HandleId, LineState};
pub use normalize::{file_category, normalize_recording, FileTypeTable};
pub use reader::{load_file, read_mat, MatReader};
pub use source::{load_raw, resolve_source, RecordReader, Source};
pub use trials::{normalize_trial_table, Attention, TrialTable, TRIAL_SCHEMA};
pub use types::*;

/// Loads a MATLAB recording and returns its normalized fields
///
/// `variable_names` restricts both what is read and what is returned.
/// The file type (analog or not) is taken from the file name.
///
/// # Examples
///
/// ```no_run
/// use neuroimport::load_data;
///
/// let result = load_data("path/to/LFP.mat", None);
/// match result {
///     Ok(recording) => println!("Fields: {:?}", recording.keys().collect::<Vec<_>>()),
///     Err(e) => println!("Error loading file: {}", e),
/// }
/// ```
pub fn load_data(
    identifier: &str,
    variable_names: Option<&[String]>,
) -> Result<Recording, LoadError> {
    load_data_with(identifier, variable_names, &MatReader, &FileTypeTable::default())
}

/// [`load_data`] with an explicit reader and file-type table.
pub fn load_data_with<R: RecordReader + ?Sized>(
    identifier: &str,
    variable_names: Option<&[String]>,
    reader: &R,
    table: &FileTypeTable,
) -> Result<Recording, LoadError> {
    let raw = load_raw(identifier, variable_names, reader)?;
    normalize_recording(&raw, Path::new(identifier), variable_names, table)
}

/// Loads a MATLAB trial file into a table with one row per trial
///
/// # Examples
///
/// ```no_run
/// use neuroimport::load_trialdata;
///
/// let trials = load_trialdata("path/to/trialdata.mat").unwrap();
/// println!("{} trials", trials.len());
/// ```
pub fn load_trialdata<P: AsRef<Path>>(file_path: P) -> Result<TrialTable, LoadError> {
    trials::load_trialdata_with(file_path.as_ref(), &MatReader)
}

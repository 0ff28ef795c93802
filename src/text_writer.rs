use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::config::get_output_file;
use super::element::Element;
use super::error::SinkError;
use super::run_id::RunId;

#[derive(Debug)]
struct TextState {
    file: BufWriter<File>,
    path: PathBuf,
    run_id: RunId
}

/// # TextWriter
/// Human readable sink. One file per run, with a block per generation: a column header, an
/// @timestamp line and one fixed width row per record.
#[derive(Debug)]
pub struct TextWriter {
    directory: PathBuf,
    basename: String,
    state: Mutex<TextState>
}

impl TextWriter {

    pub fn new(directory: &Path, basename: &str, run_id: RunId) -> Result<Self, SinkError> {
        if !directory.exists() {
            return Err(SinkError::BadOutputPath(directory.to_path_buf()));
        }
        let state = Self::open(directory, basename, run_id)?;
        Ok( Self {
            directory: directory.to_path_buf(),
            basename: basename.to_string(),
            state: Mutex::new(state)
        } )
    }

    fn open(directory: &Path, basename: &str, run_id: RunId) -> Result<TextState, SinkError> {
        let path = get_output_file(directory, basename, &run_id, "txt");
        let mut file = BufWriter::new(File::create(&path)?);
        writeln!(file, "# runID: {}", run_id)?;
        file.flush()?;
        log::info!("Opened text output {}", path.display());
        Ok(TextState { file, path, run_id })
    }

    pub fn get_path(&self) -> PathBuf {
        match self.state.lock() {
            Ok(state) => state.path.clone(),
            Err(poisoned) => poisoned.into_inner().path.clone()
        }
    }

    pub fn get_run_id(&self) -> RunId {
        match self.state.lock() {
            Ok(state) => state.run_id,
            Err(poisoned) => poisoned.into_inner().run_id
        }
    }

    pub fn add_digitizer(&self, digitizer_id: u32) -> Result<(), SinkError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        };
        writeln!(state.file, "# digitizerID: {}", digitizer_id)?;
        state.file.flush()?;
        Ok(())
    }

    /// Close the current file and start a new one for the given run
    pub fn split(&self, run_id: RunId) -> Result<(), SinkError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        };
        state.file.flush()?;
        *state = Self::open(&self.directory, &self.basename, run_id)?;
        Ok(())
    }

    pub fn write<E: Element>(&self, elements: &[E], digitizer_id: u32, timestamp: u64) -> Result<(), SinkError> {
        if elements.is_empty() {
            return Ok(());
        }
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        };
        writeln!(state.file, "#{:>9} {}", "digitizer", E::column_header())?;
        writeln!(state.file, "@{}", timestamp)?;
        for element in elements.iter() {
            writeln!(state.file, "{:>10} {}", digitizer_id, element)?;
        }
        state.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ListElement422;

    #[test]
    fn writes_banner_and_generation_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TextWriter::new(dir.path(), "qdc_", RunId(0xabc)).unwrap();
        writer.add_digitizer(3).unwrap();
        let elements = vec![
            ListElement422 { time: 10, channel: 1, charge: 100 },
            ListElement422 { time: 11, channel: 2, charge: 200 },
        ];
        writer.write(&elements, 3, 1234).unwrap();
        writer.write::<ListElement422>(&[], 3, 1235).unwrap();

        let path = dir.path().join("qdc_0000000000000abc.txt");
        assert_eq!(writer.get_path(), path);
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# runID: 0000000000000abc");
        assert_eq!(lines[1], "# digitizerID: 3");
        assert!(lines[2].starts_with("#digitizer "));
        //Header columns sit above the row columns
        assert_eq!(lines[2].find("digitizer").map(|i| i + "digitizer".len()), Some(10));
        assert_eq!(lines[4].find('3'), Some(9));
        assert_eq!(lines[3], "@1234");
        let fields: Vec<&str> = lines[4].split_whitespace().collect();
        assert_eq!(fields, vec!["3", "10", "1", "100"]);
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn split_opens_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TextWriter::new(dir.path(), "run_", RunId(1)).unwrap();
        writer.split(RunId(2)).unwrap();
        writer.write(&[ListElement422 { time: 1, channel: 1, charge: 1 }], 0, 5).unwrap();
        let first = std::fs::read_to_string(dir.path().join("run_0000000000000001.txt")).unwrap();
        let second = std::fs::read_to_string(dir.path().join("run_0000000000000002.txt")).unwrap();
        assert!(!first.contains('@'));
        assert!(second.starts_with("# runID: 0000000000000002"));
        assert!(second.contains("@5"));
        assert_eq!(writer.get_run_id(), RunId(2));
    }

    #[test]
    fn missing_directory_is_fatal() {
        let result = TextWriter::new(Path::new("/not/a/real/dir"), "run_", RunId(1));
        assert!(matches!(result, Err(SinkError::BadOutputPath(_))));
    }
}

use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use fxhash::FxHashMap;
use hdf5::File;
use ndarray::{s, ArrayView1};

use super::config::get_output_file;
use super::element::{Element, ElementType};
use super::error::SinkError;
use super::run_id::RunId;

const ELEMENT_TYPE_ATTR: &str = "element_type";
const CHUNK_ROWS: usize = 1024;
const OPEN_GENERATIONS: usize = 2;

/// # GenerationWindow
/// Keeps at most two generations open (previous and current), ordered by timestamp.
/// Opening a third hands back the oldest so the caller can finalize it. Once the window is
/// full, anything older than both is stale.
#[derive(Debug)]
pub struct GenerationWindow<T> {
    entries: Vec<(u64, T)>
}

impl<T> Default for GenerationWindow<T> {
    fn default() -> Self {
        GenerationWindow { entries: Vec::with_capacity(OPEN_GENERATIONS + 1) }
    }
}

impl<T> GenerationWindow<T> {

    pub fn is_stale(&self, generation: u64) -> bool {
        self.entries.len() == OPEN_GENERATIONS && generation < self.entries[0].0
    }

    pub fn get_mut(&mut self, generation: u64) -> Option<&mut T> {
        self.entries.iter_mut().find(|(g, _)| *g == generation).map(|(_, item)| item)
    }

    /// Open a new generation, returning the evicted oldest one if the window overflowed
    pub fn open(&mut self, generation: u64, item: T) -> Option<(u64, T)> {
        let position = self.entries.partition_point(|(g, _)| *g < generation);
        self.entries.insert(position, (generation, item));
        if self.entries.len() > OPEN_GENERATIONS {
            Some(self.entries.remove(0))
        } else {
            None
        }
    }

    pub fn generations(&self) -> Vec<u64> {
        self.entries.iter().map(|(g, _)| *g).collect()
    }

    pub fn drain(&mut self) -> Vec<(u64, T)> {
        self.entries.drain(..).collect()
    }
}

#[derive(Debug)]
struct Table {
    dataset: hdf5::Dataset,
    rows: usize
}

#[derive(Debug)]
struct DigitizerGroup {
    group: hdf5::Group,
    element_type: Option<ElementType>,
    tables: GenerationWindow<Table>
}

#[derive(Debug)]
struct HdfState {
    file_handle: File,
    path: PathBuf,
    run_id: RunId,
    digitizers: FxHashMap<u32, DigitizerGroup>
}

impl HdfState {

    fn group_for(&mut self, digitizer_id: u32) -> Result<&mut DigitizerGroup, SinkError> {
        match self.digitizers.entry(digitizer_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let group = self.file_handle.create_group(&digitizer_id.to_string())?;
                Ok(entry.insert(DigitizerGroup { group, element_type: None, tables: GenerationWindow::default() }))
            }
        }
    }

    fn finalize_all(&mut self) {
        for (id, digitizer) in self.digitizers.iter_mut() {
            for (generation, table) in digitizer.tables.drain() {
                finalize_table(*id, generation, table);
            }
        }
    }
}

fn finalize_table(digitizer_id: u32, generation: u64, table: Table) {
    log::debug!("Closing digitizer {} generation {} with {} rows", digitizer_id, generation, table.rows);
    drop(table.dataset);
}

/// # HDFWriter
/// Wraps the hdf5-rust library. One file per run, one group per digitizer and one
/// extendible table per generation.
#[derive(Debug)]
pub struct HDFWriter {
    directory: PathBuf,
    basename: String,
    state: Mutex<HdfState>
}

impl HDFWriter {

    /// Create the writer, opening <directory>/<basename><run id>.h5
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

    fn open(directory: &Path, basename: &str, run_id: RunId) -> Result<HdfState, SinkError> {
        let path = get_output_file(directory, basename, &run_id, "h5");
        let file_handle = File::create(&path)?;
        log::info!("Opened HDF5 output {}", path.display());
        Ok(HdfState { file_handle, path, run_id, digitizers: FxHashMap::default() })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HdfState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        }
    }

    pub fn get_path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    pub fn get_run_id(&self) -> RunId {
        self.lock().run_id
    }

    pub fn add_digitizer(&self, digitizer_id: u32) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.group_for(digitizer_id)?;
        Ok(())
    }

    /// Finalize every open table, close the file and open a new one for the given run
    pub fn split(&self, run_id: RunId) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.finalize_all();
        state.file_handle.flush()?;
        *state = Self::open(&self.directory, &self.basename, run_id)?;
        Ok(())
    }

    /// Append records to the table of their generation. Generations older than the two open
    /// ones are dropped with a warning.
    pub fn write<E: Element>(&self, elements: &[E], digitizer_id: u32, timestamp: u64) -> Result<(), SinkError> {
        if elements.is_empty() {
            return Ok(());
        }
        let mut state = self.lock();
        let digitizer = state.group_for(digitizer_id)?;

        match digitizer.element_type {
            None => {
                let attr = digitizer.group.new_attr::<u16>().create(ELEMENT_TYPE_ATTR)?;
                attr.write_scalar(&E::TYPE.code())?;
                digitizer.element_type = Some(E::TYPE);
            }
            Some(stored) if stored != E::TYPE => {
                return Err(SinkError::ElementTypeMismatch(digitizer_id, stored.code(), E::TYPE.code()));
            }
            Some(_) => ()
        }

        if digitizer.tables.is_stale(timestamp) {
            log::warn!("Digitizer {} generation {} is older than the open tables {:?}, dropping {} records",
                digitizer_id, timestamp, digitizer.tables.generations(), elements.len());
            return Ok(());
        }

        if digitizer.tables.get_mut(timestamp).is_none() {
            let dataset = digitizer.group.new_dataset::<E::Row>()
                .chunk(CHUNK_ROWS)
                .shape(0..)
                .create(timestamp.to_string().as_str())?;
            if let Some((generation, table)) = digitizer.tables.open(timestamp, Table { dataset, rows: 0 }) {
                finalize_table(digitizer_id, generation, table);
            }
        }

        if let Some(table) = digitizer.tables.get_mut(timestamp) {
            let rows: Vec<E::Row> = elements.iter().map(|e| e.to_row()).collect();
            let new_size = table.rows + rows.len();
            table.dataset.resize(new_size)?;
            table.dataset.write_slice(ArrayView1::from(rows.as_slice()), s![table.rows..new_size])?;
            table.rows = new_size;
        }
        Ok(())
    }
}

impl Drop for HDFWriter {
    fn drop(&mut self) {
        let mut state = self.lock();
        state.finalize_all();
        if let Err(e) = state.file_handle.flush() {
            log::error!("Could not flush HDF5 output {}: {}", state.path.display(), e);
        }
    }
}

//! Struct archiving functionality
//!
//! To add archiving functionality to a struct implement the `Archived` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::Path;
use std::fs::{File, OpenOptions};
use csv::WriterBuilder;
pub use csv::Writer;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
///
/// The default archiver has no file behind it and silently discards records,
/// which lets modules run without a session (in tests for example).
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a timestamped csv.
///
/// To implement this trait, the struct shall have an `Archiver` member which
/// shall be ignored by Serde using `#[serde(skip_serializing)]. The archiver
/// member shall be setup in the struct's `init` or `new` functions.
pub trait Archived {
    /// Write the archives for this struct
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session_path = session.arch_root.join(path);

        // Make sure any module subdirectory exists
        if let Some(parent) = session_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::from_file_path(session_path)
    }

    /// Create a new archiver writing to the given file, truncating anything
    /// already in it.
    pub fn from_file_path<P: AsRef<Path>>(
        path: P
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // Create the file if it does not exist
        File::create(path.as_ref())?;

        // Open the file in append mode
        let file = OpenOptions::new()
            .append(true)
            .open(path.as_ref())?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            writer: Some(w)
        })
    }

    /// Returns true if this archiver is backed by a file.
    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Serialise a record into the archive.
    ///
    /// Records must be flat structs, csv cannot write headers for nested
    /// containers.
    pub fn serialise<T: serde::Serialize>(
        &mut self, record: T
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut w) = self.writer {
            w.serialize(record)?;
            w.flush()?
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Record {
        time_s: f64,
        tracking: bool
    }

    #[test]
    fn test_archiver() -> Result<(), Box<dyn std::error::Error>> {
        // Disabled archivers accept records
        let mut disabled = Archiver::default();
        assert!(!disabled.is_enabled());
        disabled.serialise(Record { time_s: 0.0, tracking: false })?;

        let path = std::env::temp_dir()
            .join(format!("util_archive_test_{}.csv", std::process::id()));

        let mut arch = Archiver::from_file_path(&path)?;
        assert!(arch.is_enabled());
        arch.serialise(Record { time_s: 0.0, tracking: true })?;
        arch.serialise(Record { time_s: 0.005, tracking: false })?;

        let contents = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["time_s,tracking", "0.0,true", "0.005,false"]);

        std::fs::remove_file(&path)?;

        Ok(())
    }
}

//! Result packaging
//!
//! Serializes separated stems into a single zip archive with one
//! `<source>.wav` entry per declared source, in declared order. Entries are
//! stored uncompressed: float WAV data barely deflates.

use crate::error::{Result, SeparationError};
use std::io::{Cursor, Write};
use stemsplit_common::Stem;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Builds the stems archive returned to clients
#[derive(Debug, Clone, Default)]
pub struct ResultPackager;

impl ResultPackager {
    pub fn new() -> Self {
        Self
    }

    /// Package `stems` into a zip archive.
    ///
    /// `stems` must match `declared_sources` exactly, name for name and in
    /// order. Anything else is a `ModelFailure` and no archive is produced.
    pub fn package(&self, stems: &[Stem], declared_sources: &[String]) -> Result<Vec<u8>> {
        check_against_declared(stems, declared_sources)?;

        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for stem in stems {
            let wav = stem.audio.to_wav_bytes().map_err(|e| {
                SeparationError::ModelFailure(format!("encode stem '{}': {}", stem.name, e))
            })?;
            writer
                .start_file(entry_name(&stem.name), options)
                .map_err(archive_error)?;
            writer.write_all(&wav).map_err(|e| archive_error(e.into()))?;
        }

        let archive = writer.finish().map_err(archive_error)?.into_inner();

        debug!(
            entries = stems.len(),
            bytes = archive.len(),
            "Packaged stems archive"
        );

        Ok(archive)
    }
}

/// Archive entry name for a source
pub fn entry_name(source: &str) -> String {
    format!("{}.wav", source)
}

fn check_against_declared(stems: &[Stem], declared: &[String]) -> Result<()> {
    if stems.len() != declared.len() {
        return Err(SeparationError::ModelFailure(format!(
            "got {} stems for {} declared sources",
            stems.len(),
            declared.len()
        )));
    }
    for (stem, expected) in stems.iter().zip(declared) {
        if &stem.name != expected {
            return Err(SeparationError::ModelFailure(format!(
                "stem '{}' where '{}' was declared",
                stem.name, expected
            )));
        }
    }
    Ok(())
}

fn archive_error(e: zip::result::ZipError) -> SeparationError {
    SeparationError::ModelFailure(format!("archive write failed: {}", e))
}

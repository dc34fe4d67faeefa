//! Grammar index: which wav files the recognizers can match, and as what.
//!
//! Built once from two inputs and immutable afterwards:
//! - the speech-grammar XML document, whose recognizable phrases surface as
//!   the attribute values of its `<l>` elements;
//! - a tab-separated map file of `<wavFilePath>\t<propertyName>` lines,
//!   filtered to the properties the grammar actually contains.
//!
//! File names and property names are case-folded once at ingestion; every
//! lookup works on the normalized form.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::domain::{AnalyzerError, Result};

/// Immutable lookup from wav file names to grammar property names.
#[derive(Debug, Clone)]
pub struct GrammarIndex {
    properties: HashSet<String>,
    by_file: HashMap<String, String>,
}

impl GrammarIndex {
    /// Load the grammar document and map file.
    ///
    /// Fails if either file is missing or malformed; a map entry whose
    /// property is not in the grammar is silently dropped (the endpoint
    /// could never recognize it).
    pub fn load(grammar_file: &Path, map_file: &Path) -> Result<Self> {
        let properties = read_grammar_properties(grammar_file)?;
        let by_file = read_map_file(map_file, &properties)?;
        debug!(
            properties = properties.len(),
            mapped_files = by_file.len(),
            "grammar index loaded"
        );
        Ok(Self {
            properties,
            by_file,
        })
    }

    /// Grammar property name for `wav_file`, or `None` when the file has no
    /// representation in the grammar. Accepts full paths with either
    /// separator style.
    pub fn property_for(&self, wav_file: &str) -> Option<&str> {
        let name = base_file_name(wav_file)?.to_lowercase();
        self.by_file.get(&name).map(String::as_str)
    }

    /// Whether playing `wav_file` can be recognized by the other party.
    pub fn recognizable(&self, wav_file: &str) -> bool {
        self.property_for(wav_file).is_some()
    }

    /// Whether `property` is a phrase the grammar exposes.
    pub fn contains_property(&self, property: &str) -> bool {
        self.properties.contains(&property.to_lowercase())
    }
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| AnalyzerError::InputUnavailable {
        path: path.display().to_string(),
        source,
    })
}

fn read_grammar_properties(path: &Path) -> Result<HashSet<String>> {
    let mut reader = Reader::from_reader(BufReader::new(open_input(path)?));
    let mut properties = HashSet::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"l" {
                    for attr in e.attributes() {
                        let attr = attr.map_err(quick_xml::Error::from)?;
                        let value = String::from_utf8_lossy(&attr.value);
                        if !value.is_empty() {
                            properties.insert(value.to_lowercase());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(properties)
}

fn read_map_file(path: &Path, properties: &HashSet<String>) -> Result<HashMap<String, String>> {
    let reader = BufReader::new(open_input(path)?);
    let mut by_file = HashMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split('\t').collect();
        if tokens.len() != 2 {
            return Err(AnalyzerError::MapFileFormat { line: idx + 1 });
        }
        let property = tokens[1].trim().to_lowercase();
        let Some(file_name) = base_file_name(tokens[0].trim()) else {
            return Err(AnalyzerError::MapFileFormat { line: idx + 1 });
        };
        if properties.contains(&property) {
            by_file.insert(file_name.to_lowercase(), property);
        } else {
            debug!(file = file_name, property, "map entry not in grammar, dropped");
        }
    }
    Ok(by_file)
}

/// Strip the directory part of a path written with either separator.
fn base_file_name(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\']).next().filter(|n| !n.is_empty())
}

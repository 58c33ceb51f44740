//! FASTA reading and UniProt header parsing
//!
//! Headers follow the UniProt layout extended with proteome ids:
//!
//! ```text
//! >tr|A0A0F7|Elongation factor Tu OS=Bacteroides fragilis OX=817 GN=tuf PE=3 SV=1 UPId=UP000001 PPId=UP000002
//! ```
//!
//! Contaminant entries carry only a database tag and an accession
//! (`>sp|P00761|`) and are filed under the contaminant proteome.

use crate::error::{PipelineError, Result};
use crate::settings::CONTAMINANT_PROTEOME;
use crate::store::ReferenceProtein;
use regex::Regex;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const UNIPROT_HEADER: &str = r">?[^|]+\|(?P<accession>[^|]+)\|(?P<description>.+)\sOS=(?P<os>.+)\sOX=(?P<ox>[^\s]+)\s(GN=(?P<gn>[^\s]+)\s)?.+UPId=(?P<upid>[^\s]+)\sPPId=(?P<ppid>.+)$";
const BARE_HEADER: &str = r">?[^|]+\|(?P<accession>[^|]+)\|?$";

/// Marker of decoy entries appended by search front ends
const DECOY_MARKER: &str = "_REVERSED";

/// One FASTA record: header line without `>` and the joined sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub header: String,
    pub sequence: String,
}

impl FastaRecord {
    /// Text of the record as it would appear in a FASTA file, 60 residues
    /// per line.
    pub fn to_fasta(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.sequence.len() * 61 / 60 + 3);
        out.push('>');
        out.push_str(&self.header);
        out.push('\n');
        for chunk in self.sequence.as_bytes().chunks(60) {
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push('\n');
        }
        out
    }
}

/// Streaming FASTA reader
pub struct FastaReader<R: BufRead> {
    lines: std::io::Lines<R>,
    pending: Option<String>,
}

impl FastaReader<BufReader<std::fs::File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::file(path, e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            pending: None,
        }
    }
}

impl<R: Read> FastaReader<BufReader<R>> {
    pub fn from_reader(reader: R) -> Self {
        Self::new(BufReader::new(reader))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => loop {
                match self.lines.next()? {
                    Ok(line) => {
                        if let Some(header) = line.strip_prefix('>') {
                            break header.trim_end().to_string();
                        }
                        // residues before the first header are ignored
                    },
                    Err(e) => return Some(Err(e.into())),
                }
            },
        };

        let mut sequence = String::new();
        for line in self.lines.by_ref() {
            match line {
                Ok(line) => {
                    if let Some(next) = line.strip_prefix('>') {
                        self.pending = Some(next.trim_end().to_string());
                        break;
                    }
                    sequence.extend(line.chars().filter(|c| !c.is_whitespace()));
                },
                Err(e) => return Some(Err(e.into())),
            }
        }

        Some(Ok(FastaRecord { header, sequence }))
    }
}

/// Accession and metadata parsed from a header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub accession: String,
    pub description: String,
    pub organism: String,
    pub taxonomy_id: Option<i64>,
    pub gene: Option<String>,
    pub proteome: String,
}

/// Parser for catalog FASTA headers
pub struct HeaderParser {
    uniprot: Regex,
    bare: Regex,
}

impl HeaderParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            uniprot: Regex::new(UNIPROT_HEADER).map_err(|e| PipelineError::parse(e.to_string()))?,
            bare: Regex::new(BARE_HEADER).map_err(|e| PipelineError::parse(e.to_string()))?,
        })
    }

    /// Parse a header. Returns `None` for decoys and unrecognized headers.
    pub fn parse(&self, header: &str) -> Option<ParsedHeader> {
        if let Some(caps) = self.uniprot.captures(header) {
            let accession = caps.name("accession")?.as_str();
            if accession.contains(DECOY_MARKER) {
                return None;
            }
            return Some(ParsedHeader {
                accession: accession.to_string(),
                description: caps["description"].trim().to_string(),
                organism: caps["os"].trim().to_string(),
                taxonomy_id: caps["ox"].parse().ok(),
                gene: caps.name("gn").map(|m| m.as_str().to_string()),
                proteome: caps["ppid"].trim().to_string(),
            });
        }

        let caps = self.bare.captures(header)?;
        let accession = caps.name("accession")?.as_str();
        if accession.contains(DECOY_MARKER) {
            return None;
        }
        Some(ParsedHeader {
            accession: accession.to_string(),
            description: "CRAP".to_string(),
            organism: String::new(),
            taxonomy_id: None,
            gene: None,
            proteome: CONTAMINANT_PROTEOME.to_string(),
        })
    }

    /// Bare accession of a header, used to deduplicate written databases.
    pub fn accession<'h>(&self, header: &'h str) -> Option<&'h str> {
        self.uniprot
            .captures(header)
            .or_else(|| self.bare.captures(header))
            .and_then(|caps| caps.name("accession"))
            .map(|m| m.as_str())
    }

    pub fn reference_protein(&self, record: &FastaRecord) -> Option<ReferenceProtein> {
        let parsed = self.parse(&record.header)?;
        Some(ReferenceProtein {
            accession: parsed.accession,
            proteome: parsed.proteome,
            length: record.sequence.len() as i64,
            description: parsed.description,
            organism: parsed.organism,
            gene: parsed.gene,
        })
    }
}

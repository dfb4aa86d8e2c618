//! Keyed text archives.
//!
//! An archive is a sequence of records, each a key line followed by the
//! record body and terminated by a blank line (or end of input). Inputs are
//! compact lattices, the output is plain FSTs in OpenFst text form.
//! Specifiers look like `ark:path`, `ark,t:path` or `ark:-` for stdin/stdout.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use fstext::StdVectorFst;
use rustfst::prelude::*;
use tracing::{debug, warn};

use crate::error::{ParseError, TableError};
use crate::lattice::CompactLattice;

const KNOWN_OPTIONS: &[&str] = &["t", "s", "cs", "o", "p", "f", "nf", "ns", "ncs", "no", "np"];

/// Parsed `ark[,opts]:path` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub spec: String,
    pub options: Vec<String>,
    pub path: String,
}

impl Specifier {
    pub fn parse(spec: &str) -> Result<Self, TableError> {
        let (prefix, path) = spec
            .split_once(':')
            .ok_or_else(|| TableError::specifier(spec, "expected '<type>[,opts]:<path>'"))?;
        let mut parts = prefix.split(',').map(str::trim);
        match parts.next() {
            Some("ark") => {}
            Some("scp") => {
                return Err(TableError::unsupported(spec, "script files are not supported, use an archive"))
            }
            Some(other) => {
                return Err(TableError::specifier(spec, format!("unknown table type '{other}'")))
            }
            None => return Err(TableError::specifier(spec, "missing table type")),
        }
        let mut options = Vec::new();
        for opt in parts {
            match opt {
                "b" => return Err(TableError::unsupported(spec, "binary archives are not supported")),
                o if KNOWN_OPTIONS.contains(&o) => options.push(o.to_string()),
                o => return Err(TableError::specifier(spec, format!("unknown option '{o}'"))),
            }
        }
        if path.is_empty() {
            return Err(TableError::specifier(spec, "empty path"));
        }
        Ok(Self {
            spec: spec.to_string(),
            options,
            path: path.to_string(),
        })
    }

    fn is_stdio(&self) -> bool {
        self.path == "-"
    }

    fn open_read(&self) -> Result<Box<dyn BufRead>, TableError> {
        if self.is_stdio() {
            return Ok(Box::new(BufReader::new(io::stdin())));
        }
        let file = File::open(&self.path)
            .map_err(|e| TableError::io(format!("opening {} for reading", self.path), e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self) -> Result<BufWriter<Box<dyn Write>>, TableError> {
        let sink: Box<dyn Write> = if self.is_stdio() {
            Box::new(io::stdout())
        } else {
            Box::new(
                File::create(&self.path)
                    .map_err(|e| TableError::io(format!("opening {} for writing", self.path), e))?,
            )
        };
        Ok(BufWriter::new(sink))
    }
}

/// Splits an input stream into (key, numbered body lines) records.
struct RecordReader {
    input: Box<dyn BufRead>,
    path: String,
    line_no: usize,
}

type RawRecord = (String, Vec<(usize, String)>);

impl RecordReader {
    fn new(spec: &Specifier) -> Result<Self, TableError> {
        Ok(Self {
            input: spec.open_read()?,
            path: spec.path.clone(),
            line_no: 0,
        })
    }

    fn read_line(&mut self) -> Result<Option<String>, TableError> {
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(|e| TableError::io(format!("reading {}", self.path), e))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>, TableError> {
        let key_line = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };
        let mut fields = key_line.split_whitespace();
        let key = fields.next().unwrap_or_default().to_string();
        if fields.next().is_some() {
            return Err(TableError::parse(
                &self.path,
                ParseError::new(self.line_no, format!("expected a key on its own line, found '{key_line}'")),
            ));
        }
        let mut body = Vec::new();
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            body.push((self.line_no, line));
        }
        Ok(Some((key, body)))
    }

    fn next_lattice(&mut self) -> Result<Option<(String, CompactLattice)>, TableError> {
        let Some((key, body)) = self.next_record()? else {
            return Ok(None);
        };
        let clat = CompactLattice::parse_lines(body.iter().map(|(n, l)| (*n, l.as_str())))
            .map_err(|e| TableError::parse(&self.path, e))?;
        Ok(Some((key, clat)))
    }
}

/// One forward pass over a lattice archive, in file order.
pub struct SequentialLatticeReader {
    records: RecordReader,
    done: bool,
}

impl SequentialLatticeReader {
    pub fn open(rspecifier: &str) -> Result<Self, TableError> {
        let spec = Specifier::parse(rspecifier)?;
        Ok(Self {
            records: RecordReader::new(&spec)?,
            done: false,
        })
    }
}

impl Iterator for SequentialLatticeReader {
    type Item = Result<(String, CompactLattice), TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.records.next_lattice() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Point lookups into a lattice archive.
///
/// The archive is read lazily in file order and every record passed over is
/// cached, so lookups in any order cost at most one pass over the file.
/// When a key occurs twice the first occurrence wins.
pub struct RandomAccessLatticeReader {
    records: RecordReader,
    cache: HashMap<String, CompactLattice>,
    exhausted: bool,
}

impl RandomAccessLatticeReader {
    pub fn open(rspecifier: &str) -> Result<Self, TableError> {
        let spec = Specifier::parse(rspecifier)?;
        Ok(Self {
            records: RecordReader::new(&spec)?,
            cache: HashMap::new(),
            exhausted: false,
        })
    }

    /// Whether `key` is present. Absence is not an error; only a failure to
    /// read the archive is.
    pub fn has_key(&mut self, key: &str) -> Result<bool, TableError> {
        while !self.cache.contains_key(key) && !self.exhausted {
            match self.records.next_lattice()? {
                Some((k, clat)) => {
                    if self.cache.contains_key(&k) {
                        warn!("Duplicate key {k} in {}, keeping the first entry", self.records.path);
                    } else {
                        self.cache.insert(k, clat);
                    }
                }
                None => {
                    debug!("Reached end of {} with {} keys", self.records.path, self.cache.len());
                    self.exhausted = true;
                }
            }
        }
        Ok(self.cache.contains_key(key))
    }

    pub fn value(&mut self, key: &str) -> Result<Option<&CompactLattice>, TableError> {
        if !self.has_key(key)? {
            return Ok(None);
        }
        Ok(self.cache.get(key))
    }
}

fn is_token(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(char::is_whitespace)
}

fn format_weight(w: &TropicalWeight) -> Option<String> {
    let v = *w.value();
    if v == 0.0 {
        None
    } else {
        Some(format!("{v}"))
    }
}

/// Render `fst` in OpenFst text form, start state first. Weights equal to
/// one are omitted.
pub fn fst_to_text(fst: &StdVectorFst) -> anyhow::Result<String> {
    let mut out = String::new();
    let Some(start) = fst.start() else {
        return Ok(out);
    };
    let order = std::iter::once(start).chain(fst.states_iter().filter(|&s| s != start));
    for state in order {
        for tr in fst.get_trs(state)?.iter() {
            out.push_str(&format!("{state}\t{}\t{}\t{}", tr.nextstate, tr.ilabel, tr.olabel));
            if let Some(w) = format_weight(&tr.weight) {
                out.push('\t');
                out.push_str(&w);
            }
            out.push('\n');
        }
        if let Some(fw) = fst.final_weight(state)? {
            out.push_str(&state.to_string());
            if let Some(w) = format_weight(&fw) {
                out.push('\t');
                out.push_str(&w);
            }
            out.push('\n');
        }
    }
    Ok(out)
}

/// Parse an OpenFst text body: `src dst ilabel olabel [weight]` arcs and
/// `state [weight]` finals. The first line's source state is the start.
/// Sparse state ids are renumbered densely in increasing order.
pub fn fst_from_text<'a, I>(lines: I) -> Result<StdVectorFst, ParseError>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    enum FstLine {
        Arc(Tr<TropicalWeight>),
        Final(TropicalWeight),
    }

    let mut entries: Vec<(usize, StateId, FstLine)> = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let num = |i: usize| {
            fields[i]
                .parse::<u32>()
                .map_err(|e| ParseError::new(line_no, format!("bad field '{}': {e}", fields[i])))
        };
        let weight = |i: usize| match fields.get(i) {
            Some(w) => w
                .parse::<f32>()
                .map(TropicalWeight::new)
                .map_err(|e| ParseError::new(line_no, format!("bad weight '{w}': {e}"))),
            None => Ok(TropicalWeight::one()),
        };
        let entry = match fields.len() {
            1 | 2 => FstLine::Final(weight(1)?),
            4 | 5 => FstLine::Arc(Tr::new(num(2)?, num(3)?, weight(4)?, num(1)?)),
            n => {
                return Err(ParseError::new(
                    line_no,
                    format!("expected 1, 2, 4 or 5 fields in an FST line, found {n}"),
                ))
            }
        };
        entries.push((line_no, num(0)?, entry));
    }

    let mut ids: BTreeMap<StateId, StateId> = BTreeMap::new();
    for (_, state, entry) in &entries {
        ids.insert(*state, 0);
        if let FstLine::Arc(tr) = entry {
            ids.insert(tr.nextstate, 0);
        }
    }
    for (dense, id) in ids.values_mut().enumerate() {
        *id = dense as StateId;
    }

    let mut fst = StdVectorFst::new();
    for _ in 0..ids.len() {
        fst.add_state();
    }
    for (line_no, state, entry) in entries {
        let state = ids[&state];
        if fst.start().is_none() {
            fst.set_start(state)
                .map_err(|e| ParseError::new(line_no, e.to_string()))?;
        }
        match entry {
            FstLine::Arc(mut tr) => {
                tr.nextstate = ids[&tr.nextstate];
                fst.add_tr(state, tr)
                    .map_err(|e| ParseError::new(line_no, e.to_string()))?;
            }
            FstLine::Final(final_weight) => {
                fst.set_final(state, final_weight)
                    .map_err(|e| ParseError::new(line_no, e.to_string()))?;
            }
        }
    }
    Ok(fst)
}

/// Write-only archive of FSTs.
///
/// Each entry is rendered in full before any byte reaches the stream, so a
/// failed entry is never half-written. The stream is flushed by [`close`]
/// and, on any other exit path, when the writer is dropped.
///
/// [`close`]: FstWriter::close
pub struct FstWriter {
    out: Option<BufWriter<Box<dyn Write>>>,
    path: String,
    written: usize,
}

impl FstWriter {
    pub fn create(wspecifier: &str) -> Result<Self, TableError> {
        let spec = Specifier::parse(wspecifier)?;
        Ok(Self {
            out: Some(spec.open_write()?),
            path: spec.path,
            written: 0,
        })
    }

    pub fn write(&mut self, key: &str, fst: &StdVectorFst) -> anyhow::Result<()> {
        if !is_token(key) {
            return Err(TableError::InvalidKey(key.to_string()).into());
        }
        let entry = format!("{key} \n{}\n", fst_to_text(fst)?);
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| TableError::io(format!("writing {}", self.path), io::ErrorKind::BrokenPipe.into()))?;
        out.write_all(entry.as_bytes())
            .map_err(|e| TableError::io(format!("writing key {key} to {}", self.path), e))?;
        self.written += 1;
        Ok(())
    }

    /// Number of entries written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and release the output stream.
    pub fn close(mut self) -> Result<(), TableError> {
        if let Some(mut out) = self.out.take() {
            out.flush()
                .map_err(|e| TableError::io(format!("flushing {}", self.path), e))?;
        }
        Ok(())
    }
}

impl Drop for FstWriter {
    fn drop(&mut self) {
        if let Some(mut out) = self.out.take() {
            if let Err(e) = out.flush() {
                warn!("Failed to flush {}: {e}", self.path);
            }
        }
    }
}

/// One forward pass over an archive written by [`FstWriter`].
pub struct SequentialFstReader {
    records: RecordReader,
}

impl SequentialFstReader {
    pub fn open(rspecifier: &str) -> Result<Self, TableError> {
        let spec = Specifier::parse(rspecifier)?;
        Ok(Self {
            records: RecordReader::new(&spec)?,
        })
    }
}

impl Iterator for SequentialFstReader {
    type Item = Result<(String, StdVectorFst), TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, body) = match self.records.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        Some(
            fst_from_text(body.iter().map(|(n, l)| (*n, l.as_str())))
                .map(|fst| (key, fst))
                .map_err(|e| TableError::parse(&self.records.path, e)),
        )
    }
}

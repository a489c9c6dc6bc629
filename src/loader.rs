//! Format-specific loaders.
//!
//! [`select_loader`] maps a file extension to a [`Format`]; anything without
//! a loader is [`IndexError::UnsupportedFormat`]. [`load_and_split`] reads the
//! file, extracts plain UTF-8 text and splits it with the configured
//! chunk-size/overlap policy.
//!
//! | Extension | Extraction |
//! |-----------|------------|
//! | `txt`, `md` | file contents as text |
//! | `csv` | one `column: value` block per row |
//! | `pdf` | `pdf-extract` |
//! | `docx` | `<w:t>` runs from `word/document.xml` |
//! | `xlsx` | shared strings and literal values from every worksheet |
//!
//! Everything here is blocking I/O and CPU work; callers run it on the
//! blocking pool.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::error::{IndexError, Result};
use crate::models::Chunk;

/// Maximum sheets read from one workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells read from one sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_ZIP_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    PlainText,
    Csv,
    Pdf,
    Docx,
    Xlsx,
}

/// Loader for a lowercase extension without the leading dot.
pub fn select_loader(extension: &str) -> Result<Format> {
    match extension.to_ascii_lowercase().as_str() {
        "txt" | "md" => Ok(Format::PlainText),
        "csv" => Ok(Format::Csv),
        "pdf" => Ok(Format::Pdf),
        "docx" => Ok(Format::Docx),
        "xlsx" => Ok(Format::Xlsx),
        other => Err(IndexError::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

/// Lowercased extension of `path`, empty if it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Text content of a file plus its chunks.
#[derive(Debug)]
pub struct LoadedFile {
    pub content: String,
    pub chunks: Vec<Chunk>,
}

/// Select a loader for `path`, extract its text and split it.
pub fn load_and_split(path: &Path, policy: &ChunkingConfig) -> Result<LoadedFile> {
    let format = select_loader(&extension_of(path))?;
    let content = extract(path, format)?;
    let chunks = chunk_text(
        &path.to_string_lossy(),
        &content,
        policy.chunk_size,
        policy.chunk_overlap,
    );
    Ok(LoadedFile { content, chunks })
}

pub fn extract(path: &Path, format: Format) -> Result<String> {
    let bytes = std::fs::read(path)?;
    match format {
        Format::PlainText => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Format::Csv => Ok(csv_to_text(&String::from_utf8_lossy(&bytes))),
        Format::Pdf => pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| IndexError::Extract(format!("pdf: {}", e))),
        Format::Docx => extract_docx(&bytes),
        Format::Xlsx => extract_xlsx(&bytes),
    }
}

// ============ CSV ============

const CSV_DELIMITERS: &[char] = &[',', '\t', '|', ';'];

/// Most frequent candidate delimiter in the header line; comma if none.
fn detect_delimiter(header: &str) -> char {
    let mut best = ',';
    let mut best_count = 0usize;
    for &delim in CSV_DELIMITERS {
        let count = header.matches(delim).count();
        if count > best_count {
            best_count = count;
            best = delim;
        }
    }
    best
}

/// Split one record, honouring double-quoted fields with `""` escapes.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Group physical lines into records. A line that leaves a double quote
/// open continues into the next one, so quoted fields may contain newlines.
/// Blank lines outside quotes are dropped.
fn split_records(src: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for line in src.lines() {
        if in_quotes {
            current.push('\n');
        } else if line.trim().is_empty() {
            continue;
        }
        current.push_str(line);
        // `""` escapes toggle twice and cancel out.
        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
        if !in_quotes {
            records.push(std::mem::take(&mut current));
        }
    }
    // unterminated quote: keep what was read
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Render every data row as `header: value` lines, rows separated by a
/// blank line so the splitter keeps rows together.
fn csv_to_text(src: &str) -> String {
    let records = split_records(src);
    let mut lines = records.iter().map(String::as_str);
    let Some(header_line) = lines.next() else {
        return String::new();
    };
    let delimiter = detect_delimiter(header_line);
    let headers: Vec<String> = split_record(header_line, delimiter)
        .into_iter()
        .enumerate()
        .map(|(i, h)| if h.is_empty() { format!("column_{}", i) } else { h })
        .collect();

    let mut rows = Vec::new();
    for line in lines {
        let values = split_record(line, delimiter);
        let row = headers
            .iter()
            .zip(values.iter().chain(std::iter::repeat(&String::new())))
            .map(|(h, v)| format!("{}: {}", h, v))
            .collect::<Vec<_>>()
            .join("\n");
        rows.push(row);
    }
    rows.join("\n\n")
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn ooxml_err(e: impl std::fmt::Display) -> IndexError {
    IndexError::Extract(format!("ooxml: {}", e))
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_err)
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_ZIP_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_ZIP_ENTRY_BYTES {
        return Err(ooxml_err(format!("{} exceeds size limit", name)));
    }
    Ok(out)
}

/// Text of every `<tag>` element in document order, separated by spaces.
fn collect_elements(xml: &[u8], tag: &[u8]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut inside = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == tag => inside = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == tag => inside = false,
            Ok(Event::Text(t)) if inside => {
                out.push(t.unescape().map_err(ooxml_err)?.into_owned());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    Ok(collect_elements(&xml, b"t")?.join(" "))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let shared = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        let xml = read_entry(&mut archive, "xl/sharedStrings.xml")?;
        collect_elements(&xml, b"t")?
    } else {
        Vec::new()
    };

    let mut sheets: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheets.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut parts = Vec::new();
    for name in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_entry(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &shared)?;
        if !cells.is_empty() {
            parts.push(cells.join(" "));
        }
    }
    Ok(parts.join("\n\n"))
}

/// Cell values of one worksheet; shared-string cells are resolved.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<Vec<String>> {
    let mut cells = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared_cell = false;

    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                let raw = t.unescape().map_err(ooxml_err)?;
                let value = raw.trim();
                if shared_cell {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
                in_value = false;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared_cell = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

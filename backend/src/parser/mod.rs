//! Streaming CSV source with encoding and delimiter auto-detection.
//!
//! Encoding is detected on a leading sample of the file and applied per
//! field, which is safe for UTF-8 and for the single-byte encodings we
//! recognize (delimiters and quotes are ASCII in all of them). Rows are read
//! lazily so the pipeline never holds the whole file in memory.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use crate::error::{CsvError, CsvResult};
use crate::models::RawRecord;

/// Bytes inspected for encoding and delimiter detection.
const SAMPLE_SIZE: usize = 64 * 1024;

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode one field using the detected encoding.
///
/// Any label `encoding_rs` knows is honored; unknown labels fall back to
/// lossy UTF-8.
pub fn decode_field(bytes: &[u8], encoding: &str) -> String {
    match encoding_rs::Encoding::for_label(encoding.as_bytes()) {
        Some(enc) if enc != encoding_rs::UTF_8 => enc.decode_without_bom_handling(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Read up to [`SAMPLE_SIZE`] bytes from the front of a reader.
fn read_sample<R: Read>(reader: &mut R) -> CsvResult<Vec<u8>> {
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    reader.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

/// Map a csv-crate error onto our error type.
fn csv_error(row: usize, e: csv::Error) -> CsvError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => CsvError::IoError(io),
            other => CsvError::ParseError { row, message: format!("{:?}", other) },
        }
    } else {
        CsvError::ParseError { row, message: e.to_string() }
    }
}

/// File metadata established when the source is opened.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// A CSV file opened for streaming.
pub struct CsvSource<R: Read> {
    reader: csv::Reader<std::io::Chain<Cursor<Vec<u8>>, R>>,
    info: CsvInfo,
    headers: Arc<[String]>,
}

impl CsvSource<File> {
    /// Open a file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> CsvResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }
}

impl CsvSource<Cursor<Vec<u8>>> {
    /// Open an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> CsvResult<Self> {
        Self::from_reader(Cursor::new(bytes.into()))
    }
}

impl<R: Read> CsvSource<R> {
    /// Sniff encoding and delimiter, then read the header row.
    pub fn from_reader(mut inner: R) -> CsvResult<Self> {
        let sample = read_sample(&mut inner)?;
        if sample.iter().all(u8::is_ascii_whitespace) {
            return Err(CsvError::EmptyFile);
        }

        let encoding = detect_encoding(&sample);
        let delimiter = detect_delimiter(&decode_field(&sample, &encoding));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .flexible(true)
            .has_headers(true)
            .from_reader(Cursor::new(sample).chain(inner));

        let header_record = reader.byte_headers().map_err(|e| csv_error(0, e))?.clone();
        let headers: Vec<String> = header_record
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let decoded = decode_field(h, &encoding);
                let trimmed = decoded.trim();
                if i == 0 {
                    trimmed.trim_start_matches('\u{feff}').trim().to_string()
                } else {
                    trimmed.to_string()
                }
            })
            .collect();

        if headers.iter().all(String::is_empty) {
            return Err(CsvError::NoHeaders);
        }

        Ok(Self {
            reader,
            headers: headers.clone().into(),
            info: CsvInfo { encoding, delimiter, headers },
        })
    }

    pub fn info(&self) -> &CsvInfo {
        &self.info
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Stream data rows. Blank lines are skipped; short rows read as empty
    /// trailing values. Values are trimmed.
    pub fn records(self) -> impl Iterator<Item = CsvResult<RawRecord>> {
        let CsvSource { reader, info, headers } = self;
        let encoding = info.encoding;

        reader
            .into_byte_records()
            .enumerate()
            .map(move |(row, result)| {
                let record = result.map_err(|e| csv_error(row, e))?;
                let values = record
                    .iter()
                    .map(|v| decode_field(v, &encoding).trim().to_string())
                    .collect();
                Ok(RawRecord::new(Arc::clone(&headers), values))
            })
    }
}

/// Read just the header row and metadata of a file.
pub fn read_info<P: AsRef<Path>>(path: P) -> CsvResult<CsvInfo> {
    Ok(CsvSource::open(path)?.info().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(csv: &str) -> Vec<RawRecord> {
        CsvSource::from_bytes(csv.as_bytes().to_vec())
            .unwrap()
            .records()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_simple_csv() {
        let records = rows("msisdn;port\n336;443\n337;80");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("msisdn"), Some("336"));
        assert_eq!(records[1].get("port"), Some("80"));
    }

    #[test]
    fn test_quoted_values_with_delimiter() {
        let records = rows("name,value\n\"Acme, Inc\",\" 42 \"");

        assert_eq!(records[0].get("name"), Some("Acme, Inc"));
        assert_eq!(records[0].get("value"), Some("42"));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let records = rows("a;b\n1;2\n\n3;4\n");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_values() {
        let records = rows("a;b;c\n1;;3\n4");

        assert_eq!(records[0].get("b"), Some(""));
        assert_eq!(records[1].get("a"), Some("4"));
        assert_eq!(records[1].get("c"), Some(""));
    }

    #[test]
    fn test_headers_trimmed_and_bom_stripped() {
        let source = CsvSource::from_bytes("\u{feff} MSISDN , Dest IP \n1,2".as_bytes().to_vec()).unwrap();
        assert_eq!(source.headers(), &["MSISDN".to_string(), "Dest IP".to_string()]);
        assert_eq!(source.info().delimiter, ',');
    }

    #[test]
    fn test_empty_file_error() {
        assert!(matches!(CsvSource::from_bytes(Vec::new()), Err(CsvError::EmptyFile)));
        assert!(matches!(CsvSource::from_bytes(b"\n\n".to_vec()), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_field(bytes, "iso-8859-1"), "Société");
    }

    #[test]
    fn test_decode_any_known_label() {
        // "При" in windows-1251
        let bytes: &[u8] = &[0xCF, 0xF0, 0xE8];
        assert_eq!(decode_field(bytes, "windows-1251"), "При");
        assert_eq!(decode_field(bytes, "WINDOWS-1251"), "При");
        // "Größe" in ISO-8859-2
        assert_eq!(decode_field(&[0x47, 0x72, 0xF6, 0xDF, 0x65], "iso-8859-2"), "Größe");
        assert_eq!(decode_field("naïve".as_bytes(), "no-such-charset"), "naïve");
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.csv");
        std::fs::write(&path, "MSISDN|Dst Port\n1|53\n").unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!(info.delimiter, '|');
        assert_eq!(info.headers, vec!["MSISDN", "Dst Port"]);

        let records: Vec<_> = CsvSource::open(&path).unwrap().records().collect();
        assert_eq!(records.len(), 1);
    }
}

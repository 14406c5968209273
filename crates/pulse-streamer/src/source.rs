//! CSV row source
//!
//! Reads a CSV file on a blocking task and feeds raw rows through a
//! bounded channel, which paces the reader against the publish loop.
//! Header names are lower-cased and trimmed once at open.

use pulse_core::{Error, ReplayMode, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Capacity of the raw row channel between the reader and the loop.
const ROW_CHANNEL_CAPACITY: usize = 1024;

/// A CSV-backed source of `(headers, row)` tuples.
pub struct CsvSource {
    headers: Vec<String>,
    rows: mpsc::Receiver<Vec<String>>,
}

impl CsvSource {
    /// Open the file, parse the header row, and start the reader task.
    pub fn open(path: impl AsRef<Path>, replay: ReplayMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let mut header_line = String::new();
        if reader.read_line(&mut header_line)? == 0 {
            return Err(Error::invalid_request(format!(
                "csv file {} has no header row",
                path.display()
            )));
        }
        let headers: Vec<String> = parse_csv_line(header_line.trim_end_matches(['\r', '\n']))
            .into_iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let (tx, rows) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || read_rows(reader, path, replay, tx));

        Ok(Self { headers, rows })
    }

    /// Normalized header names.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Receive the next raw row; `None` once the source is exhausted
    /// (never in `loop` replay mode).
    pub async fn next_row(&mut self) -> Option<Vec<String>> {
        self.rows.recv().await
    }
}

fn read_rows(
    mut reader: BufReader<File>,
    path: PathBuf,
    replay: ReplayMode,
    tx: mpsc::Sender<Vec<String>>,
) {
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => match replay {
                ReplayMode::Once => {
                    info!("csv source exhausted");
                    return;
                }
                ReplayMode::Loop => match File::open(&path) {
                    Ok(file) => {
                        reader = BufReader::new(file);
                        let mut skipped_header = String::new();
                        if reader.read_line(&mut skipped_header).is_err() {
                            error!("csv rewind: failed to re-read header");
                            return;
                        }
                    }
                    Err(e) => {
                        error!("csv rewind: {}", e);
                        return;
                    }
                },
            },
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\r', '\n']);
                if trimmed.is_empty() {
                    continue;
                }
                if tx.blocking_send(parse_csv_line(trimmed)).is_err() {
                    // Consumer is gone; stop reading.
                    return;
                }
            }
            Err(e) => {
                error!("csv read: {}", e);
                return;
            }
        }
    }
}

/// Split one CSV line into fields, honoring double-quoted fields with
/// `""` escapes.
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else if field.is_empty() {
                    in_quotes = true;
                } else {
                    field.push('"');
                }
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_plain_line() {
        assert_eq!(parse_csv_line("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_quoted_fields() {
        assert_eq!(
            parse_csv_line(r#"GPU-0,"NVIDIA H100, SXM",42.5"#),
            vec!["GPU-0", "NVIDIA H100, SXM", "42.5"]
        );
    }

    #[test]
    fn test_parse_escaped_quotes() {
        assert_eq!(parse_csv_line(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn test_parse_empty_fields() {
        assert_eq!(parse_csv_line("a,,c,"), vec!["a", "", "c", ""]);
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_source_normalizes_headers_and_yields_rows() {
        let file = write_csv("GPU_ID , Power_Watts\nGPU-0,250.0\nGPU-1,300.0\n");
        let mut source = CsvSource::open(file.path(), ReplayMode::Once).unwrap();

        assert_eq!(source.headers(), &["gpu_id", "power_watts"]);
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-0", "250.0"]);
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-1", "300.0"]);
        assert!(source.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_source_skips_blank_lines() {
        let file = write_csv("gpu_id\nGPU-0\n\nGPU-1\n");
        let mut source = CsvSource::open(file.path(), ReplayMode::Once).unwrap();
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-0"]);
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-1"]);
        assert!(source.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_source_loop_replay_rewinds() {
        let file = write_csv("gpu_id\nGPU-0\n");
        let mut source = CsvSource::open(file.path(), ReplayMode::Loop).unwrap();
        // The single data row comes around again after EOF.
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-0"]);
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-0"]);
        assert_eq!(source.next_row().await.unwrap(), vec!["GPU-0"]);
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = write_csv("");
        assert!(CsvSource::open(file.path(), ReplayMode::Once).is_err());
    }
}

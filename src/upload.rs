// src/upload.rs

use crate::error::{FormatError, PipelineError};
use base64::{Engine as _, engine::general_purpose};
use calamine::{Data, ExcelDateTime, Range, Reader, open_workbook_auto_from_rs};
use chrono::NaiveTime;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

const CSV_MIME: &str = "text/csv";

/// A user-selected document, fully read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// The document as it travels to the extraction service.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinePayload {
    pub mime_type: String,
    /// Standard base64 of the file content.
    pub data: String,
}

impl UploadFile {
    /// Read a file from disk, deriving its media type from the extension.
    /// Only the document types the upload form accepts are allowed.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = media_type_for(&name)?;
        let bytes = tokio::fs::read(path).await?;

        info!(file = %name, mime = mime_type, bytes = bytes.len(), "Read upload");
        Ok(Self {
            name,
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    /// Short content digest used to tag log lines for one upload.
    pub fn token(&self) -> String {
        let digest = format!("{:x}", Sha256::digest(&self.bytes));
        digest[..12].to_string()
    }

    fn extension(&self) -> String {
        extension_of(&self.name)
    }

    fn is_spreadsheet(&self) -> bool {
        let mime = self.mime_type.to_ascii_lowercase();
        mime.contains("excel")
            || mime.contains("spreadsheet")
            || matches!(self.extension().as_str(), "xlsx" | "xls" | "ods")
    }
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Media type for the file types the upload form accepts.
pub fn media_type_for(name: &str) -> Result<&'static str, FormatError> {
    match extension_of(name).as_str() {
        "pdf" => Ok("application/pdf"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "csv" => Ok(CSV_MIME),
        "xlsx" => Ok("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "xls" => Ok("application/vnd.ms-excel"),
        "ods" => Ok("application/vnd.oasis.opendocument.spreadsheet"),
        _ => Err(FormatError::Unsupported(name.to_string())),
    }
}

/// Spreadsheets are converted to CSV of their first sheet; every other
/// file is returned unchanged.
pub fn normalize_format(file: UploadFile) -> Result<UploadFile, FormatError> {
    if !file.is_spreadsheet() {
        return Ok(file);
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(file.bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(FormatError::NoSheets)??;
    let csv = sheet_to_csv(&range);

    info!(
        from = %file.name,
        rows = range.height(),
        chars = csv.len(),
        "Converted spreadsheet to CSV"
    );
    Ok(UploadFile {
        name: "converted.csv".to_string(),
        mime_type: CSV_MIME.to_string(),
        bytes: csv.into_bytes(),
    })
}

fn sheet_to_csv(range: &Range<Data>) -> String {
    range
        .rows()
        .map(|row| row.iter().map(csv_cell).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

fn csv_cell(cell: &Data) -> String {
    let text = match cell {
        Data::Empty => return String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::DateTime(dt) => excel_date(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    };
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

/// Render a date cell as text; Excel stores dates as day serials.
fn excel_date(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(when) if when.time() == NaiveTime::MIN => when.format("%Y-%m-%d").to_string(),
        Some(when) => when.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => dt.as_f64().to_string(),
    }
}

/// Base64-encode the file for inline transport.
pub fn encode_payload(file: &UploadFile) -> InlinePayload {
    InlinePayload {
        mime_type: file.mime_type.clone(),
        data: general_purpose::STANDARD.encode(&file.bytes),
    }
}

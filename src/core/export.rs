// MedScan - core/export.rs
//
// CSV and JSON export of the scan history.
// Core layer: writes to any Write trait object.

use crate::core::model::ScanRecord;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Export history records to CSV format.
///
/// Writes: scan_id, timestamp, image, verdict, score, error, warning
pub fn export_csv<W: Write>(
    records: &[ScanRecord],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: export_path.to_path_buf(),
        source,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([
            "scan_id",
            "timestamp",
            "image",
            "verdict",
            "score",
            "error",
            "warning",
        ])
        .map_err(csv_err)?;

    for record in records {
        let scan_id = record.scan_id.to_string();
        let timestamp = record.timestamp.to_rfc3339();
        let score = record.score.map(|s| s.to_string()).unwrap_or_default();
        csv_writer
            .write_record([
                scan_id.as_str(),
                timestamp.as_str(),
                record.image.as_str(),
                record.verdict.map(|v| v.label()).unwrap_or(""),
                score.as_str(),
                record.error.as_deref().unwrap_or(""),
                record.warning.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(records.len())
}

/// Export history records to JSON format (array of objects).
pub fn export_json<W: Write>(
    records: &[ScanRecord],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, records).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(records.len())
}

/// Write `records` to `path`, choosing CSV for a `.csv` extension and JSON
/// otherwise.
pub fn export_to_file(records: &[ScanRecord], path: &Path) -> Result<usize, ExportError> {
    let file = std::fs::File::create(path).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let writer = std::io::BufWriter::new(file);

    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let count = if is_csv {
        export_csv(records, writer, path)?
    } else {
        export_json(records, writer, path)?
    };

    tracing::info!(path = %path.display(), count, "Scan history exported");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Verdict;
    use chrono::Utc;
    use uuid::Uuid;

    fn make_record(image: &str, verdict: Option<Verdict>, error: Option<&str>) -> ScanRecord {
        ScanRecord {
            scan_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            image: image.to_string(),
            verdict,
            score: verdict.map(|_| 88),
            error: error.map(str::to_string),
            warning: None,
        }
    }

    #[test]
    fn test_csv_export() {
        let records = vec![
            make_record("front.jpg", Some(Verdict::Authentic), None),
            make_record("back.jpg", None, Some("service unavailable")),
        ];
        let mut buf = Vec::new();
        let count = export_csv(&records, &mut buf, Path::new("out.csv")).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        assert!(output.starts_with("scan_id,timestamp,image,verdict,score"));
        assert!(output.contains("front.jpg"));
        assert!(output.contains("Authentic"));
        assert!(output.contains("service unavailable"));
    }

    #[test]
    fn test_json_export() {
        let records = vec![make_record("pill.png", Some(Verdict::Counterfeit), None)];
        let mut buf = Vec::new();
        let count = export_json(&records, &mut buf, Path::new("out.json")).unwrap();
        assert_eq!(count, 1);

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["image"], "pill.png");
        assert_eq!(value[0]["verdict"], "Counterfeit");
        assert_eq!(value[0]["score"], 88);
    }

    #[test]
    fn test_export_to_file_picks_format_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let records = vec![make_record("pill.png", Some(Verdict::Suspicious), None)];

        let csv_path = dir.path().join("history.CSV");
        export_to_file(&records, &csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("scan_id,"));

        let json_path = dir.path().join("history.json");
        export_to_file(&records, &json_path).unwrap();
        let json = std::fs::read_to_string(&json_path).unwrap();
        assert!(json.trim_start().starts_with('['));
    }
}

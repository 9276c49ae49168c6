//! Native spreadsheet conversion between CSV, TSV text, JSON records and XLSX.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::Path;

use super::ooxml::{is_element, parse_xml, Package, R_NS, S_NS};
use super::render::{escape_xml, write_package};
use super::{require_source, AttemptContext, Backend, BackendDescriptor};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::ConcurrencyHost;

const ACCEPTED: &[&str] = &["csv", "txt", "json", "xlsx"];

/// Sheet bounds of the xlsx format.
const XLSX_MAX_COLUMNS: usize = 16_384;
const XLSX_MAX_ROWS: u64 = 1_048_576;

/// Upper bound on cells materialized from one sheet, padding included.
const MAX_TABLE_CELLS: usize = 4_000_000;

/// Rows of cells; the first row is the header.
pub type Table = Vec<Vec<String>>;

/// Reads a table and writes it in another tabular format.
pub struct TabularBackend {
    descriptor: BackendDescriptor,
}

impl TabularBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::library("tabular-native", "spreadsheet reader"),
        }
    }
}

impl Default for TabularBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for TabularBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, _host: &ConcurrencyHost) -> Result<(), ConversionError> {
        require_source(&self.descriptor, source, ACCEPTED)
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let input = ctx.input.clone();
        let extension = ctx.source.extension.clone();
        let target = ctx.target;
        let output = ctx.output_path();
        let written = output.clone();

        ctx.host
            .run_blocking(move || -> Result<(), ConversionError> {
                let table = read_table(&input, &extension)?;
                write_table(&table, &written, target)
            })
            .await??;

        Ok(BackendOutput::single(output))
    }
}

/// Reads a table from a file with the given (lowercase) extension.
pub fn read_table(path: &Path, extension: &str) -> Result<Table, ConversionError> {
    let table = match extension {
        "csv" => read_delimited(&std::fs::read(path)?, b',')?,
        "txt" => {
            let bytes = std::fs::read(path)?;
            let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
            let delimiter = if first_line.contains(&b'\t') { b'\t' } else { b',' };
            read_delimited(&bytes, delimiter)?
        }
        "json" => read_json(&std::fs::read_to_string(path)?)?,
        "xlsx" => read_xlsx(path)?,
        other => {
            return Err(ConversionError::incompatible(format!(
                ".{} is not a tabular format",
                other
            )))
        }
    };
    Ok(normalize(table))
}

fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<Table, ConversionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ConversionError::corrupt(format!("unparseable table: {}", e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_json(text: &str) -> Result<Table, ConversionError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ConversionError::corrupt(format!("unparseable JSON: {}", e)))?;

    let not_tabular = || ConversionError::incompatible("JSON must be an array of objects");
    let records = value.as_array().ok_or_else(not_tabular)?;

    let mut headers: Vec<String> = Vec::new();
    for record in records {
        let object = record.as_object().ok_or_else(not_tabular)?;
        for key in object.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let mut rows = vec![headers.clone()];
    for record in records {
        let object = record.as_object().ok_or_else(not_tabular)?;
        rows.push(
            headers
                .iter()
                .map(|h| object.get(h).map(json_cell).unwrap_or_default())
                .collect(),
        );
    }
    Ok(rows)
}

fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First worksheet of a workbook, with shared strings resolved.
fn read_xlsx(path: &Path) -> Result<Table, ConversionError> {
    let mut package = Package::open(path)?;
    let sheet_part = first_sheet_part(&mut package)?;

    let shared = match package.text("xl/sharedStrings.xml")? {
        Some(text) => shared_strings(&text)?,
        None => Vec::new(),
    };

    let text = package.required_text(&sheet_part)?;
    let doc = parse_xml(&sheet_part, &text)?;

    let mut rows = Vec::new();
    let mut total_cells = 0usize;
    for row in doc.descendants().filter(|n| is_element(n, S_NS, "row")) {
        let mut cells: Vec<String> = Vec::new();
        for cell in row.children().filter(|n| is_element(n, S_NS, "c")) {
            let column = match cell.attribute("r") {
                Some(r) if r.starts_with(|c: char| c.is_ascii_alphabetic()) => column_index(r)
                    .filter(|c| *c < XLSX_MAX_COLUMNS)
                    .ok_or_else(|| {
                        ConversionError::corrupt(format!("cell reference '{}' is outside the sheet", r))
                    })?,
                _ => cells.len(),
            };
            if column >= XLSX_MAX_COLUMNS {
                return Err(ConversionError::corrupt("row has more columns than a sheet allows"));
            }
            if column >= cells.len() {
                total_cells += column + 1 - cells.len();
                if total_cells > MAX_TABLE_CELLS {
                    return Err(ConversionError::corrupt(format!(
                        "sheet has more than {} cells",
                        MAX_TABLE_CELLS
                    )));
                }
                cells.resize(column + 1, String::new());
            }
            cells[column] = cell_value(&cell, &shared);
        }
        let index = match row.attribute("r").and_then(|r| r.parse::<u64>().ok()) {
            Some(r) if r > XLSX_MAX_ROWS => {
                return Err(ConversionError::corrupt(format!("row {} is outside the sheet", r)))
            }
            Some(r) => (r.saturating_sub(1)) as usize,
            None => rows.len(),
        };
        while rows.len() < index {
            rows.push(Vec::new());
        }
        rows.push(cells);
    }
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width.saturating_mul(rows.len()) > MAX_TABLE_CELLS {
        return Err(ConversionError::corrupt(format!(
            "sheet has more than {} cells",
            MAX_TABLE_CELLS
        )));
    }
    Ok(rows)
}

/// Resolves the first `<sheet>` through the workbook relationships.
fn first_sheet_part(package: &mut Package) -> Result<String, ConversionError> {
    const FALLBACK: &str = "xl/worksheets/sheet1.xml";

    let Some(workbook) = package.text("xl/workbook.xml")? else {
        return Ok(FALLBACK.to_string());
    };
    let doc = parse_xml("xl/workbook.xml", &workbook)?;
    let rel_id = doc
        .descendants()
        .find(|n| is_element(n, S_NS, "sheet"))
        .and_then(|n| n.attribute((R_NS, "id")))
        .map(str::to_string);

    let (Some(rel_id), Some(rels)) = (rel_id, package.text("xl/_rels/workbook.xml.rels")?) else {
        return Ok(FALLBACK.to_string());
    };
    let rels_doc = parse_xml("xl/_rels/workbook.xml.rels", &rels)?;
    let target = rels_doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .find(|n| n.attribute("Id") == Some(rel_id.as_str()))
        .and_then(|n| n.attribute("Target"));

    Ok(match target {
        Some(t) if t.starts_with('/') => t.trim_start_matches('/').to_string(),
        Some(t) => format!("xl/{}", t),
        None => FALLBACK.to_string(),
    })
}

fn shared_strings(text: &str) -> Result<Vec<String>, ConversionError> {
    let doc = parse_xml("xl/sharedStrings.xml", text)?;
    Ok(doc
        .descendants()
        .filter(|n| is_element(n, S_NS, "si"))
        .map(|si| {
            si.descendants()
                .filter(|n| is_element(n, S_NS, "t"))
                .filter_map(|t| t.text())
                .collect()
        })
        .collect())
}

fn cell_value(cell: &roxmltree::Node<'_, '_>, shared: &[String]) -> String {
    let value = cell
        .children()
        .find(|n| is_element(n, S_NS, "v"))
        .and_then(|v| v.text())
        .unwrap_or_default();

    match cell.attribute("t") {
        Some("s") => value
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => cell
            .descendants()
            .filter(|n| is_element(n, S_NS, "t"))
            .filter_map(|t| t.text())
            .collect(),
        Some("b") => (if value == "1" { "TRUE" } else { "FALSE" }).to_string(),
        _ => value.to_string(),
    }
}

/// Zero-based column of a cell reference such as `AB12`; `None` on overflow.
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).to_string()
}

/// Pads every row to the same width and drops trailing blank rows.
fn normalize(mut table: Table) -> Table {
    while table
        .last()
        .is_some_and(|row| row.iter().all(|c| c.trim().is_empty()))
    {
        table.pop();
    }
    let width = table.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut table {
        row.resize(width, String::new());
    }
    table
}

/// Writes a table in the target format.
pub fn write_table(table: &Table, output: &Path, target: TargetFormat) -> Result<(), ConversionError> {
    if table.is_empty() {
        return Err(ConversionError::execution("table has no rows"));
    }
    match target {
        TargetFormat::Csv => write_delimited(table, output, b','),
        TargetFormat::Txt => write_delimited(table, output, b'\t'),
        TargetFormat::Json => {
            let json = serde_json::to_vec_pretty(&records(table))
                .map_err(|e| ConversionError::execution(format!("failed to encode JSON: {}", e)))?;
            std::fs::write(output, json)?;
            Ok(())
        }
        TargetFormat::Xlsx => {
            std::fs::write(output, to_xlsx(table)?)?;
            Ok(())
        }
        other => Err(ConversionError::incompatible(format!(
            "tables cannot be written as {}",
            other
        ))),
    }
}

fn write_delimited(table: &Table, output: &Path, delimiter: u8) -> Result<(), ConversionError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(output)
        .map_err(csv_write_error)?;
    for row in table {
        writer.write_record(row).map_err(csv_write_error)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_write_error(e: csv::Error) -> ConversionError {
    ConversionError::execution(format!("failed to write table: {}", e))
}

/// Header row as keys, one object per data row.
fn records(table: &Table) -> Vec<serde_json::Map<String, serde_json::Value>> {
    let Some((headers, rows)) = table.split_first() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            headers
                .iter()
                .zip(row)
                .map(|(h, cell)| (h.clone(), json_value(cell)))
                .collect()
        })
        .collect()
}

fn json_value(cell: &str) -> serde_json::Value {
    if cell.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return n.into();
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| cell.into()),
        _ => cell.into(),
    }
}

fn is_number(cell: &str) -> bool {
    !cell.is_empty() && cell.parse::<f64>().is_ok_and(f64::is_finite)
}

fn to_xlsx(table: &Table) -> Result<Vec<u8>, ConversionError> {
    let mut data = String::new();
    for (r, row) in table.iter().enumerate() {
        let _ = write!(data, r#"<row r="{}">"#, r + 1);
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_name(c), r + 1);
            if is_number(cell) {
                let _ = write!(data, r#"<c r="{}"><v>{}</v></c>"#, reference, cell.trim());
            } else if !cell.is_empty() {
                let _ = write!(
                    data,
                    r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    reference,
                    escape_xml(cell)
                );
            }
        }
        data.push_str("</row>");
    }

    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
        data
    );

    write_package(&[
        ("[Content_Types].xml", XLSX_CONTENT_TYPES),
        ("_rels/.rels", XLSX_RELS),
        ("xl/workbook.xml", XLSX_WORKBOOK),
        ("xl/_rels/workbook.xml.rels", XLSX_WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", &sheet),
    ])
}

const XLSX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const XLSX_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const XLSX_WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const XLSX_WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FailureClass;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    fn sample() -> Table {
        vec![
            vec!["name".into(), "qty".into()],
            vec!["apple".into(), "3".into()],
            vec!["pear, green".into(), "1.5".into()],
        ]
    }

    #[test]
    fn test_csv_to_json_records() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("fruit.csv");
        fixtures::write_csv(&input, &sample());
        let output = dir.path().join("fruit.json");

        let table = read_table(&input, "csv").unwrap();
        write_table(&table, &output, TargetFormat::Json).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(json[0]["name"], "apple");
        assert_eq!(json[0]["qty"], 3);
        assert_eq!(json[1]["name"], "pear, green");
        assert_eq!(json[1]["qty"], 1.5);
    }

    #[test]
    fn test_xlsx_written_then_read_back() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("fruit.xlsx");
        write_table(&sample(), &output, TargetFormat::Xlsx).unwrap();

        let table = read_table(&output, "xlsx").unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn test_txt_prefers_tabs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.txt");
        std::fs::write(&input, "a\tb,c\n1\t2\n").unwrap();

        let table = read_table(&input, "txt").unwrap();
        assert_eq!(table[0], vec!["a", "b,c"]);
        assert_eq!(table[1], vec!["1", "2"]);
    }

    #[test]
    fn test_json_must_be_records() {
        let err = read_json(r#"{"not": "a list"}"#).unwrap_err();
        assert_eq!(err.class(), FailureClass::FatalInput);

        let err = read_json("[1, 2").unwrap_err();
        assert!(matches!(err, ConversionError::CorruptInput { .. }));
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ragged.csv");
        std::fs::write(&input, "a,b,c\n1\n\n").unwrap();

        let table = read_table(&input, "csv").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[1], vec!["1", "", ""]);
    }

    #[test]
    fn test_column_references() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(27), "AB");
    }

    fn write_sheet(path: &Path, rows_xml: &str) {
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{}"><sheetData>{}</sheetData></worksheet>"#,
            S_NS, rows_xml
        );
        fixtures::write_zip(path, &[("xl/worksheets/sheet1.xml", sheet.as_bytes())]);
    }

    #[test]
    fn test_column_reference_overflow() {
        assert_eq!(column_index("ZZZZZZZZZZZZZZZZ1"), None);
        assert_eq!(column_index("XFD1"), Some(16_383));
    }

    #[test]
    fn test_xlsx_cell_beyond_last_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("wide.xlsx");
        write_sheet(
            &input,
            r#"<row r="1"><c r="ZZZZZZ1" t="inlineStr"><is><t>x</t></is></c></row>"#,
        );

        let err = read_table(&input, "xlsx").unwrap_err();
        assert_eq!(err.class(), FailureClass::FatalInput);

        write_sheet(
            &input,
            r#"<row r="1"><c r="ZZZZZZZZZZZZZZZZ1"><v>1</v></c></row>"#,
        );
        let err = read_table(&input, "xlsx").unwrap_err();
        assert!(matches!(err, ConversionError::CorruptInput { .. }));
    }

    #[test]
    fn test_xlsx_row_beyond_last_row_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("tall.xlsx");
        write_sheet(&input, r#"<row r="99999999999"><c r="A99999999999"><v>1</v></c></row>"#);

        let err = read_table(&input, "xlsx").unwrap_err();
        assert_eq!(err.class(), FailureClass::FatalInput);
    }

    #[test]
    fn test_xlsx_sparse_rows_within_bounds() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("sparse.xlsx");
        write_sheet(
            &input,
            r#"<row r="1"><c r="B1"><v>7</v></c></row><row r="3"><c r="A3"><v>8</v></c></row>"#,
        );

        let table = read_table(&input, "xlsx").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0], vec!["", "7"]);
        assert_eq!(table[1], vec!["", ""]);
        assert_eq!(table[2], vec!["8", ""]);
    }

    #[test]
    fn test_xlsx_padding_is_bounded() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("corner.xlsx");
        write_sheet(
            &input,
            r#"<row r="1"><c r="XFD1"><v>1</v></c></row><row r="1048576"><c r="A1048576"><v>2</v></c></row>"#,
        );

        let err = read_table(&input, "xlsx").unwrap_err();
        assert_eq!(err.class(), FailureClass::FatalInput);
    }
}

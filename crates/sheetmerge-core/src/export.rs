//! Export functionality for merged tables
//!
//! This module provides:
//! - CSV export, UTF-8 with a byte-order mark so spreadsheet apps detect the encoding
//! - XLSX export with a single sheet named [`EXPORT_SHEET_NAME`]
//! - JSON export of the full table including provenance
//!
//! The fixed export file names are the reserved names the locator skips, so
//! an exported result dropped into the working directory is never merged again.

use crate::error::Result;
use crate::merger::MergedTable;
use crate::table::CellValue;
use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::escape::escape;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name of the CSV export
pub const EXPORT_CSV_NAME: &str = "tong_hop.csv";

/// File name of the spreadsheet export
pub const EXPORT_XLSX_NAME: &str = "tong_hop.xlsx";

/// Sheet name used in the spreadsheet export
pub const EXPORT_SHEET_NAME: &str = "combined";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Index into `cellXfs` of the date-time number format in [`STYLES_XML`]
const DATETIME_STYLE: usize = 1;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Write the table as CSV: BOM, header row, then one record per row
pub fn write_csv<W: Write>(table: &MergedTable, mut writer: W) -> Result<()> {
    writer.write_all(UTF8_BOM)?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    if table.column_count() > 0 {
        csv_writer.write_record(table.column_names())?;
    }
    for row in &table.rows {
        csv_writer.write_record(row.cells.iter().map(CellValue::to_string_value))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the table, provenance included, as pretty-printed JSON
pub fn write_json<W: Write>(table: &MergedTable, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, table)?;
    Ok(())
}

/// Write the table as an XLSX workbook with one sheet
pub fn write_xlsx<W: Write + Seek>(table: &MergedTable, writer: W) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);

    let parts: [(&str, String); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("xl/workbook.xml", workbook_xml(EXPORT_SHEET_NAME)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/styles.xml", STYLES_XML.to_string()),
        ("xl/worksheets/sheet1.xml", worksheet_xml(table)),
    ];

    for (name, content) in parts {
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(())
}

/// Write both fixed-name exports into `dir` and return the paths written
pub fn export_all<P: AsRef<Path>>(table: &MergedTable, dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let csv_path = dir.join(EXPORT_CSV_NAME);
    write_csv(table, BufWriter::new(File::create(&csv_path)?))?;

    let xlsx_path = dir.join(EXPORT_XLSX_NAME);
    write_xlsx(table, BufWriter::new(File::create(&xlsx_path)?))?;

    info!(
        rows = table.row_count(),
        dir = %dir.display(),
        "exported merged table"
    );
    Ok(vec![csv_path, xlsx_path])
}

/// A CSV file re-read with every value as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextTable {
    /// Header names
    pub headers: Vec<String>,
    /// Records, one per data row
    pub records: Vec<Vec<String>>,
}

/// Parse exported CSV back into text records, tolerating a leading BOM
pub fn read_csv_text<R: Read>(mut reader: R) -> Result<TextTable> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    let body = content.strip_prefix(UTF8_BOM).unwrap_or(&content[..]);

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);

    let headers = csv_reader.headers()?.iter().map(str::to_string).collect();
    let records = csv_reader
        .records()
        .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;

    Ok(TextTable { headers, records })
}

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
    r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    r#"</Types>"#,
);

const ROOT_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"</Relationships>"#,
);

const WORKBOOK_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    r#"</Relationships>"#,
);

// Style 0 is the default, style 1 is built-in number format 22 (date and time)
const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="2">"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
    r#"</cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    r#"</styleSheet>"#,
);

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>"#,
            r#"</workbook>"#,
        ),
        escape(sheet_name)
    )
}

fn worksheet_xml(table: &MergedTable) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<sheetData>"#,
    ));

    if table.column_count() > 0 {
        xml.push_str(r#"<row r="1">"#);
        for (col, name) in table.column_names().into_iter().enumerate() {
            xml.push_str(&inline_string_cell(&cell_ref(0, col), name));
        }
        xml.push_str("</row>");
    }

    for (r, row) in table.rows.iter().enumerate() {
        let sheet_row = r + 1;
        xml.push_str(&format!(r#"<row r="{}">"#, sheet_row + 1));
        for (col, value) in row.cells.iter().enumerate() {
            xml.push_str(&value_cell(&cell_ref(sheet_row, col), value));
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn value_cell(reference: &str, value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Integer(i) => format!(r#"<c r="{}"><v>{}</v></c>"#, reference, i),
        CellValue::Float(f) if f.is_finite() => {
            format!(r#"<c r="{}"><v>{}</v></c>"#, reference, f)
        }
        CellValue::Bool(b) => {
            format!(r#"<c r="{}" t="b"><v>{}</v></c>"#, reference, u8::from(*b))
        }
        CellValue::DateTime(dt) => match excel_serial(dt) {
            Some(serial) => format!(
                r#"<c r="{}" s="{}"><v>{}</v></c>"#,
                reference, DATETIME_STYLE, serial
            ),
            None => inline_string_cell(reference, &value.to_string_value()),
        },
        other => inline_string_cell(reference, &other.to_string_value()),
    }
}

/// Serial day number in the 1900 date system, or `None` before 1900-03-01
/// where that system counts the nonexistent 1900-02-29
fn excel_serial(dt: &NaiveDateTime) -> Option<f64> {
    if dt.date() < NaiveDate::from_ymd_opt(1900, 3, 1)? {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let ms = dt.signed_duration_since(epoch).num_milliseconds();
    Some(ms as f64 / MS_PER_DAY)
}

fn inline_string_cell(reference: &str, text: &str) -> String {
    format!(
        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        reference,
        escape(text)
    )
}

/// A1-style reference for a 0-based row and column
fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// Spreadsheet column letters for a 0-based index: 0 -> A, 25 -> Z, 26 -> AA
fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::{merge_tables, SOURCE_COLUMN};
    use crate::reader::{read_sheet, SheetSelector};
    use crate::table::{Column, Row, Table};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn sample() -> MergedTable {
        let mut jan = Table::new(PathBuf::from("data/jan.xlsx"));
        jan.columns = vec![
            Column::new("id".to_string(), 0),
            Column::new("note".to_string(), 1),
        ];
        jan.rows = vec![
            Row::new(vec![CellValue::Integer(1), CellValue::from("plain")]),
            Row::new(vec![CellValue::Integer(2), CellValue::from("with,comma")]),
        ];

        let mut feb = Table::new(PathBuf::from("data/feb.xlsx"));
        feb.columns = vec![
            Column::new("id".to_string(), 0),
            Column::new("amt".to_string(), 1),
            Column::new("ok".to_string(), 2),
        ];
        feb.rows = vec![Row::new(vec![
            CellValue::Integer(3),
            CellValue::Float(12.5),
            CellValue::Bool(true),
        ])];

        merge_tables(vec![jan, feb])
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
        assert_eq!(cell_ref(0, 2), "C1");
    }

    #[test]
    fn test_csv_starts_with_bom() {
        let mut out = Vec::new();
        write_csv(&sample(), &mut out).unwrap();

        assert!(out.starts_with(UTF8_BOM));
        let text = String::from_utf8(out[UTF8_BOM.len()..].to_vec()).unwrap();
        let first_line = text.lines().next().unwrap();
        assert_eq!(first_line, "id,note,amt,ok,source file");
    }

    #[test]
    fn test_csv_round_trip() {
        let table = sample();
        let mut out = Vec::new();
        write_csv(&table, &mut out).unwrap();

        let parsed = read_csv_text(out.as_slice()).unwrap();
        assert_eq!(parsed.headers, table.column_names());
        assert_eq!(parsed.headers.last().map(String::as_str), Some(SOURCE_COLUMN));
        assert_eq!(parsed.records.len(), table.row_count());

        assert_eq!(parsed.records[1][1], "with,comma");
        assert_eq!(parsed.records[2][1], "");
        assert_eq!(parsed.records[2][2], "12.5");
        assert_eq!(parsed.records[2][3], "True");
        assert_eq!(parsed.records[2][4], "feb.xlsx");
    }

    #[test]
    fn test_csv_empty_table() {
        let mut out = Vec::new();
        write_csv(&MergedTable::empty(), &mut out).unwrap();
        assert_eq!(out, UTF8_BOM);

        let parsed = read_csv_text(out.as_slice()).unwrap();
        assert!(parsed.headers.is_empty());
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn test_json_export_includes_provenance() {
        let mut out = Vec::new();
        write_json(&sample(), &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["rows"].as_array().unwrap().len(), 3);
        assert_eq!(value["rows"][0]["source"], "data/jan.xlsx");
        assert_eq!(value["columns"][4]["name"], SOURCE_COLUMN);
    }

    #[test]
    fn test_worksheet_xml_escapes_text() {
        let mut t = Table::new(PathBuf::from("x.xlsx"));
        t.columns = vec![Column::new("a<b".to_string(), 0)];
        t.rows = vec![Row::new(vec![CellValue::from("Tom & Jerry")])];

        let xml = worksheet_xml(&merge_tables(vec![t]));
        assert!(xml.contains("a&lt;b"));
        assert!(xml.contains("Tom &amp; Jerry"));
        assert!(xml.contains(r#"<row r="2">"#));
    }

    #[test]
    fn test_xlsx_package_parts() {
        let mut buffer = Cursor::new(Vec::new());
        write_xlsx(&sample(), &mut buffer).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(buffer.into_inner())).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"xl/workbook.xml".to_string()));
        assert!(names.contains(&"xl/worksheets/sheet1.xml".to_string()));
        assert!(names.contains(&"xl/styles.xml".to_string()));

        let mut workbook = String::new();
        archive
            .by_name("xl/workbook.xml")
            .unwrap()
            .read_to_string(&mut workbook)
            .unwrap();
        assert!(workbook.contains(r#"name="combined""#));
    }

    #[test]
    fn test_xlsx_readable_as_source() {
        let dir = TempDir::new().unwrap();
        let table = sample();
        let path = dir.path().join("out.xlsx");
        write_xlsx(&table, File::create(&path).unwrap()).unwrap();

        let read = read_sheet(&path, &SheetSelector::Name(EXPORT_SHEET_NAME.to_string())).unwrap();
        let names: Vec<&str> = read.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, table.column_names());
        assert_eq!(read.row_count(), 3);

        assert_eq!(read.rows[0].cells[0], CellValue::Float(1.0));
        assert_eq!(read.rows[1].cells[1], CellValue::from("with,comma"));
        assert_eq!(read.rows[2].cells[1], CellValue::Empty);
        assert_eq!(read.rows[2].cells[2], CellValue::Float(12.5));
        assert_eq!(read.rows[2].cells[3], CellValue::Bool(true));
        assert_eq!(read.rows[2].cells[4], CellValue::from("feb.xlsx"));
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, sec)
            .unwrap()
    }

    #[test]
    fn test_excel_serial() {
        assert_eq!(excel_serial(&at(1900, 3, 1, 0, 0, 0)), Some(61.0));
        assert_eq!(excel_serial(&at(2024, 1, 31, 0, 0, 0)), Some(45322.0));
        assert_eq!(excel_serial(&at(2024, 1, 31, 12, 0, 0)), Some(45322.5));
        assert_eq!(excel_serial(&at(1900, 1, 15, 0, 0, 0)), None);
    }

    #[test]
    fn test_xlsx_keeps_datetime_cells() {
        let mut t = Table::new(PathBuf::from("events.xlsx"));
        t.columns = vec![Column::new("when".to_string(), 0)];
        t.rows = vec![
            Row::new(vec![CellValue::DateTime(at(2024, 1, 31, 8, 30, 5))]),
            Row::new(vec![CellValue::DateTime(at(1899, 6, 1, 0, 0, 0))]),
        ];
        let table = merge_tables(vec![t]);

        let xml = worksheet_xml(&table);
        assert!(xml.contains(r#"<c r="A2" s="1"><v>"#));
        assert!(xml.contains("1899-06-01 00:00:00"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xlsx");
        write_xlsx(&table, File::create(&path).unwrap()).unwrap();

        let read = read_sheet(&path, &SheetSelector::default()).unwrap();
        assert_eq!(
            read.rows[0].cells[0],
            CellValue::DateTime(at(2024, 1, 31, 8, 30, 5))
        );
        assert_eq!(read.rows[1].cells[0], CellValue::from("1899-06-01 00:00:00"));
        assert_eq!(read.rows[1].cells[1], CellValue::from("events.xlsx"));
    }

    #[test]
    fn test_export_all_writes_reserved_names() {
        let dir = TempDir::new().unwrap();
        let written = export_all(&sample(), dir.path()).unwrap();

        assert_eq!(
            written,
            vec![dir.path().join(EXPORT_CSV_NAME), dir.path().join(EXPORT_XLSX_NAME)]
        );
        assert!(written.iter().all(|p| p.is_file()));

        // A later discovery in the same directory ignores the export
        let found = crate::locator::locate_in(dir.path(), None).unwrap();
        assert!(found.is_empty());
    }
}

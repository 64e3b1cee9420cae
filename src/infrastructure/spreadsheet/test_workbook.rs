//! Minimal `.xlsx` assembly for tests.

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone)]
pub enum TestCell {
    Text(String),
    Number(f64),
    Bool(bool),
    Blank,
}

impl TestCell {
    pub fn text(value: &str) -> Self {
        TestCell::Text(value.to_string())
    }

    pub fn number(value: f64) -> Self {
        TestCell::Number(value)
    }

    pub fn boolean(value: bool) -> Self {
        TestCell::Bool(value)
    }
}

#[derive(Default)]
pub struct WorkbookBuilder {
    sheets: Vec<(String, String)>,
    extra_entries: Vec<(String, Vec<u8>)>,
}

impl WorkbookBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(mut self, name: &str, rows: Vec<Vec<TestCell>>) -> Self {
        self.sheets.push((name.to_string(), sheet_xml(&rows)));
        self
    }

    /// Sheet holding text cells at explicit references, e.g. `("Z1000000", "x")`.
    pub fn sparse_sheet(mut self, name: &str, cells: &[(&str, &str)]) -> Self {
        let mut xml = sheet_open();
        for (cell_ref, text) in cells {
            let row_num = cell_ref.trim_start_matches(|c: char| c.is_ascii_alphabetic());
            xml.push_str(&format!(
                r#"<row r="{}"><c r="{}" t="inlineStr"><is><t>{}</t></is></c></row>"#,
                row_num,
                cell_ref,
                escape(text)
            ));
        }
        xml.push_str(SHEET_CLOSE);
        self.sheets.push((name.to_string(), xml));
        self
    }

    /// Add an arbitrary container entry (e.g. `xl/vbaProject.bin`).
    pub fn entry(mut self, path: &str, content: &[u8]) -> Self {
        self.extra_entries.push((path.to_string(), content.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();

        let put = |zip: &mut ZipWriter<Cursor<Vec<u8>>>, path: &str, body: &[u8]| {
            zip.start_file(path, options).unwrap();
            zip.write_all(body).unwrap();
        };

        let mut content_types = format!(
            concat!(
                "{}<Types xmlns=\"{}/package/2006/content-types\">",
                r#"<Default Extension="rels" ContentType="{}"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/xl/workbook.xml" ContentType="{}.sheet.main+xml"/>"#,
            ),
            XML_DECL, OOXML, RELS_CONTENT_TYPE, SPREADSHEETML_TYPE
        );
        for idx in 1..=self.sheets.len() {
            content_types.push_str(&format!(
                concat!(
                    r#"<Override PartName="/xl/worksheets/sheet{}.xml" "#,
                    r#"ContentType="{}.worksheet+xml"/>"#,
                ),
                idx, SPREADSHEETML_TYPE
            ));
        }
        content_types.push_str("</Types>");
        put(&mut zip, "[Content_Types].xml", content_types.as_bytes());

        let root_rels = format!(
            concat!(
                r#"{}<Relationships xmlns="{}/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/>"#,
                "</Relationships>",
            ),
            XML_DECL, OOXML, DOC_RELS
        );
        put(&mut zip, "_rels/.rels", root_rels.as_bytes());

        let mut workbook = format!(
            r#"{}<workbook xmlns="{}" xmlns:r="{}"><sheets>"#,
            XML_DECL, SPREADSHEETML_NS, DOC_RELS
        );
        let mut rels = format!(
            r#"{}<Relationships xmlns="{}/package/2006/relationships">"#,
            XML_DECL, OOXML
        );
        for (idx, (name, _)) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(name),
                n,
                n
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                n, DOC_RELS, n
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str("</Relationships>");
        put(&mut zip, "xl/workbook.xml", workbook.as_bytes());
        put(&mut zip, "xl/_rels/workbook.xml.rels", rels.as_bytes());

        for (idx, (_, xml)) in self.sheets.iter().enumerate() {
            let path = format!("xl/worksheets/sheet{}.xml", idx + 1);
            put(&mut zip, &path, xml.as_bytes());
        }

        for (path, body) in &self.extra_entries {
            put(&mut zip, path, body);
        }

        zip.finish().unwrap().into_inner()
    }
}

/// Header row followed by `count` rows of `(id, label)` pairs.
pub fn numbered_rows(count: usize) -> Vec<Vec<TestCell>> {
    let mut rows = vec![vec![TestCell::text("id"), TestCell::text("label")]];
    rows.extend((0..count).map(|i| {
        vec![
            TestCell::number(i as f64),
            TestCell::Text(format!("row {}", i)),
        ]
    }));
    rows
}

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const OOXML: &str = "http://schemas.openxmlformats.org";
const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const DOC_RELS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const RELS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";
const SPREADSHEETML_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml";
fn sheet_open() -> String {
    format!(r#"{}<worksheet xmlns="{}"><sheetData>"#, XML_DECL, SPREADSHEETML_NS)
}

const SHEET_CLOSE: &str = "</sheetData></worksheet>";

fn sheet_xml(rows: &[Vec<TestCell>]) -> String {
    let mut xml = sheet_open();
    for (r, row) in rows.iter().enumerate() {
        let row_num = r + 1;
        xml.push_str(&format!(r#"<row r="{}">"#, row_num));
        for (c, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letters(c), row_num);
            match cell {
                TestCell::Text(s) => xml.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    cell_ref,
                    escape(s)
                )),
                TestCell::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, cell_ref, n))
                }
                TestCell::Bool(b) => xml.push_str(&format!(
                    r#"<c r="{}" t="b"><v>{}</v></c>"#,
                    cell_ref,
                    if *b { 1 } else { 0 }
                )),
                TestCell::Blank => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str(SHEET_CLOSE);
    xml
}

fn column_letters(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[test]
fn test_column_letters() {
    assert_eq!(column_letters(0), "A");
    assert_eq!(column_letters(25), "Z");
    assert_eq!(column_letters(26), "AA");
    assert_eq!(column_letters(27), "AB");
}

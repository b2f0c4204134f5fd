//! XLSX container writer: assembles workbook parts into one in-memory ZIP.

use std::io::{Cursor, Seek, Write};

use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::conf::{C_LOG_TARGET, N_ZIP_COMPRESSION_LEVEL, TUP_ZIP_ENTRY_TIME};
use crate::shared_strings::SharedStringTable;
use crate::sheet::{SpecSheetContext, build_sheet_xml};
use crate::spec::{
    EnumColumnType, Result, SpecTable, SpecXlsxConvertOptions, SpecXlsxReport, XlsxConvertError,
};
use crate::style::{SpecFormatPatterns, StyleRegistry};
use crate::util::{sanitize_sheet_name, xml_escape};

const C_PATH_CONTENT_TYPES: &str = "[Content_Types].xml";
const C_PATH_RELS: &str = "_rels/.rels";
const C_PATH_WORKBOOK: &str = "xl/workbook.xml";
const C_PATH_WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const C_PATH_STYLES: &str = "xl/styles.xml";
const C_PATH_SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const C_PATH_SHEET: &str = "xl/worksheets/sheet1.xml";

const RELS_DOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"</Relationships>"#,
);

const WORKBOOK_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
    r#"</Relationships>"#,
);

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
    r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
    r#"</Types>"#,
);

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<bookViews><workbookView activeTab="0"/></bookViews>"#,
            r#"<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>"#,
            r#"<calcPr fullCalcOnLoad="1"/>"#,
            r#"</workbook>"#,
        ),
        xml_escape(sheet_name)
    )
}

/// Options shared by every archive entry: Deflate, fixed level, fixed mtime.
pub fn derive_zip_entry_options() -> SimpleFileOptions {
    let (n_year, n_month, n_day, n_hour, n_minute, n_second) = TUP_ZIP_ENTRY_TIME;
    let mtime =
        zip::DateTime::from_date_and_time(n_year, n_month, n_day, n_hour, n_minute, n_second)
            .unwrap_or_default();
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(N_ZIP_COMPRESSION_LEVEL))
        .last_modified_time(mtime)
        .unix_permissions(0o644)
}

fn zip_write_str<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    path: &str,
    content: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(path, options)?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

/// Single-sheet workbook writer.
///
/// Holds the style registry and shared-string table for one conversion. The
/// sheet is rendered by [`Self::write_sheet`]; [`Self::finish`] packs all parts.
pub struct XlsxWriter {
    sheet_name: String,
    styles: StyleRegistry,
    shared_strings: SharedStringTable,
    c_sheet_xml: Option<String>,
    report: SpecXlsxReport,
}

impl XlsxWriter {
    /// Create a writer for `options` (sheet name sanitised, patterns resolved).
    pub fn new(options: &SpecXlsxConvertOptions) -> Self {
        let sheet_name = sanitize_sheet_name(&options.sheet_name, "_");
        let mut report = SpecXlsxReport {
            sheet_name: sheet_name.clone(),
            ..Default::default()
        };
        if sheet_name != options.sheet_name {
            warn!(
                target: C_LOG_TARGET,
                requested = %options.sheet_name,
                written = %sheet_name,
                "sheet name sanitised"
            );
            report.warn(format!(
                "sheet name {:?} written as {:?}",
                options.sheet_name, sheet_name
            ));
        }

        Self {
            sheet_name,
            styles: StyleRegistry::new(SpecFormatPatterns::from_options(options)),
            shared_strings: SharedStringTable::new(),
            c_sheet_xml: None,
            report,
        }
    }

    /// Sheet name written into the workbook.
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Snapshot of the report so far.
    pub fn report(&self) -> &SpecXlsxReport {
        &self.report
    }

    /// Render the worksheet for `table` using resolved `column_types`.
    pub fn write_sheet(
        &mut self,
        table: &SpecTable,
        column_types: &[EnumColumnType],
        options: &SpecXlsxConvertOptions,
    ) -> Result<()> {
        if self.c_sheet_xml.is_some() {
            return Err(XlsxConvertError::InvalidOption(
                "workbook already holds a worksheet".to_string(),
            ));
        }

        let c_sheet_xml = build_sheet_xml(
            table,
            column_types,
            options,
            &mut SpecSheetContext {
                styles: &mut self.styles,
                shared_strings: &mut self.shared_strings,
                warnings: &mut self.report.warnings,
            },
        )?;

        self.report.n_rows = table.height() + usize::from(options.if_write_header);
        self.report.n_cols = table.width();
        self.report.column_types = column_types.to_vec();
        self.c_sheet_xml = Some(c_sheet_xml);
        Ok(())
    }

    /// Pack every part into a ZIP archive and return its bytes.
    ///
    /// Parts are written in a fixed order with fixed entry options, so the
    /// same input always yields the same bytes.
    pub fn finish(mut self) -> Result<(Vec<u8>, SpecXlsxReport)> {
        let c_sheet_xml = self.c_sheet_xml.take().ok_or_else(|| {
            XlsxConvertError::InvalidOption("workbook has no worksheet".to_string())
        })?;

        let options = derive_zip_entry_options();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip_write_str(&mut zip, C_PATH_CONTENT_TYPES, CONTENT_TYPES, options)?;
        zip_write_str(&mut zip, C_PATH_RELS, RELS_DOT_RELS, options)?;
        zip_write_str(
            &mut zip,
            C_PATH_WORKBOOK,
            &workbook_xml(&self.sheet_name),
            options,
        )?;
        zip_write_str(&mut zip, C_PATH_WORKBOOK_RELS, WORKBOOK_RELS, options)?;
        zip_write_str(&mut zip, C_PATH_STYLES, &self.styles.to_xml(), options)?;
        zip_write_str(
            &mut zip,
            C_PATH_SHARED_STRINGS,
            &self.shared_strings.to_xml(),
            options,
        )?;
        zip_write_str(&mut zip, C_PATH_SHEET, &c_sheet_xml, options)?;
        let v_bytes = zip.finish()?.into_inner();

        self.report.n_styles = self.styles.len();
        self.report.n_shared_strings = self.shared_strings.unique_count();
        self.report.n_bytes = v_bytes.len();
        debug!(
            target: C_LOG_TARGET,
            bytes = v_bytes.len(),
            styles = self.report.n_styles,
            shared_strings = self.report.n_shared_strings,
            "archive written"
        );
        Ok((v_bytes, self.report))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use zip::ZipArchive;

    use super::*;
    use crate::spec::SpecColumn;

    fn derive_bytes(table: &SpecTable, options: &SpecXlsxConvertOptions) -> Vec<u8> {
        let column_types: Vec<EnumColumnType> = table
            .columns()
            .iter()
            .map(|col| crate::infer::infer_column_type(&col.values))
            .collect();
        let mut writer = XlsxWriter::new(options);
        writer
            .write_sheet(table, &column_types, options)
            .expect("sheet");
        writer.finish().expect("archive").0
    }

    #[test]
    fn archive_holds_parts_in_fixed_order() {
        let table = SpecTable::new(vec![SpecColumn::new("a", ["x", "y"])]);
        let v_bytes = derive_bytes(&table, &SpecXlsxConvertOptions::default());
        let mut archive = ZipArchive::new(Cursor::new(v_bytes)).expect("zip");
        let l_names: Vec<String> = (0..archive.len())
            .map(|n_idx| archive.by_index(n_idx).expect("entry").name().to_string())
            .collect();
        assert_eq!(
            l_names,
            vec![
                C_PATH_CONTENT_TYPES,
                C_PATH_RELS,
                C_PATH_WORKBOOK,
                C_PATH_WORKBOOK_RELS,
                C_PATH_STYLES,
                C_PATH_SHARED_STRINGS,
                C_PATH_SHEET,
            ]
        );

        let mut c_workbook = String::new();
        archive
            .by_name(C_PATH_WORKBOOK)
            .expect("workbook")
            .read_to_string(&mut c_workbook)
            .expect("read");
        assert!(c_workbook.contains(r#"<sheet name="Sheet1" sheetId="1" r:id="rId1"/>"#));
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let table = SpecTable::new(vec![
            SpecColumn::new("a", [1i64, 2, 3]),
            SpecColumn::new("b", ["p", "q", "p"]),
        ]);
        let options = SpecXlsxConvertOptions::default();
        assert_eq!(
            derive_bytes(&table, &options),
            derive_bytes(&table, &options)
        );
    }

    #[test]
    fn sanitised_sheet_name_is_reported() {
        let options = SpecXlsxConvertOptions {
            sheet_name: "a/b".to_string(),
            ..Default::default()
        };
        let writer = XlsxWriter::new(&options);
        assert_eq!(writer.sheet_name(), "a_b");
        assert_eq!(writer.report().warnings.len(), 1);
    }

    #[test]
    fn finish_without_sheet_fails() {
        let writer = XlsxWriter::new(&SpecXlsxConvertOptions::default());
        assert!(writer.finish().is_err());
    }
}

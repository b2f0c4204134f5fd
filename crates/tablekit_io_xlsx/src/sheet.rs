//! Worksheet part builder: frozen panes, column widths and cell records.

use std::fmt::Write as FmtWrite;

use tracing::{trace, warn};

use crate::cell::{derive_date_serial, derive_datetime_serial};
use crate::conf::{
    C_LOG_TARGET, N_INT_EXACT_F64_MAX, N_LEN_EXCEL_CELL_TEXT_MAX, N_NCOLS_EXCEL_MAX,
    N_NROWS_EXCEL_MAX, N_STYLE_INDEX_GENERAL,
};
use crate::shared_strings::SharedStringTable;
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumColumnType, EnumNonFiniteRule, Result,
    SpecAutofitCellsPolicy, SpecTable, SpecXlsxConvertOptions, SpecXlsxValuePolicy,
    XlsxConvertError,
};
use crate::style::StyleRegistry;
use crate::util::{
    estimate_unicode_string_width, estimate_width_len, make_cell_ref, validate_table_shape,
};

const N_WIDTH_COLUMN_LIMIT: usize = 255;

/// Mutable state threaded through one worksheet build.
pub struct SpecSheetContext<'a> {
    /// Style registry of the workbook.
    pub styles: &'a mut StyleRegistry,
    /// Shared-string table of the workbook.
    pub shared_strings: &'a mut SharedStringTable,
    /// Non-fatal warnings collected while rendering.
    pub warnings: &'a mut Vec<String>,
}

/// Fail when the sheet would exceed Excel's row or column limits.
pub fn validate_sheet_bounds(n_rows: usize, n_cols: usize) -> Result<()> {
    if n_rows > N_NROWS_EXCEL_MAX {
        return Err(XlsxConvertError::LimitExceeded {
            what: "rows",
            limit: N_NROWS_EXCEL_MAX,
            found: n_rows,
        });
    }
    if n_cols > N_NCOLS_EXCEL_MAX {
        return Err(XlsxConvertError::LimitExceeded {
            what: "columns",
            limit: N_NCOLS_EXCEL_MAX,
            found: n_cols,
        });
    }
    Ok(())
}

/// Render `xl/worksheets/sheet1.xml` for `table`.
///
/// `column_types` holds one resolved type per column. Cells are visited in
/// row-major order, header first, so shared-string indices follow first sight.
pub fn build_sheet_xml(
    table: &SpecTable,
    column_types: &[EnumColumnType],
    options: &SpecXlsxConvertOptions,
    ctx: &mut SpecSheetContext<'_>,
) -> Result<String> {
    validate_table_shape(table)?;
    if column_types.len() != table.width() {
        return Err(XlsxConvertError::InvalidOption(format!(
            "{} column types given for {} columns",
            column_types.len(),
            table.width()
        )));
    }
    let n_cols = table.width();
    let n_rows_body = table.height();
    let n_rows_header = usize::from(options.if_write_header);
    let n_rows_total = n_rows_header + n_rows_body;
    validate_sheet_bounds(n_rows_total, n_cols)?;

    let mut sheet_data = String::with_capacity(64 + n_rows_total * n_cols * 24);
    let mut l_width_header = vec![0usize; n_cols];
    let mut l_width_body = vec![0usize; n_cols];
    let mut l_n_imprecise = vec![0usize; n_cols];
    let policy_autofit = &options.policy_autofit;
    let if_autofit = policy_autofit.rule_columns != EnumAutofitColumnsRule::None;

    if options.if_write_header {
        sheet_data.push_str(r#"<row r="1">"#);
        for (n_idx_col, c_name) in table.column_names().into_iter().enumerate() {
            let n_len = c_name.chars().count();
            if n_len > N_LEN_EXCEL_CELL_TEXT_MAX {
                return Err(XlsxConvertError::LimitExceeded {
                    what: "header text",
                    limit: N_LEN_EXCEL_CELL_TEXT_MAX,
                    found: n_len,
                });
            }
            let n_sst = ctx.shared_strings.add_string(c_name)?;
            write_shared_string_cell(&mut sheet_data, 0, n_idx_col, N_STYLE_INDEX_GENERAL, n_sst);
            l_width_header[n_idx_col] = estimate_unicode_string_width(c_name);
        }
        sheet_data.push_str("</row>");
    }

    let n_rows_inspected = policy_autofit.height_body_inferred_max.unwrap_or(usize::MAX);
    for n_idx_row in 0..n_rows_body {
        let n_row_sheet = n_rows_header + n_idx_row;
        let _ = write!(sheet_data, r#"<row r="{}">"#, n_row_sheet + 1);
        for (n_idx_col, col) in table.columns().iter().enumerate() {
            let rule_type = column_types[n_idx_col];
            let value = &col.values[n_idx_row];
            if let EnumCellValue::Integer(n) = value
                && n.unsigned_abs() > N_INT_EXACT_F64_MAX
            {
                l_n_imprecise[n_idx_col] += 1;
            }
            write_body_cell(
                &mut sheet_data,
                (n_idx_row, n_row_sheet, n_idx_col),
                value,
                rule_type,
                &options.value_policy,
                ctx,
            )?;
            if if_autofit && n_idx_row < n_rows_inspected {
                l_width_body[n_idx_col] = usize::max(
                    l_width_body[n_idx_col],
                    estimate_width_len(value, rule_type),
                );
            }
        }
        sheet_data.push_str("</row>");
    }

    for (col, &n_imprecise) in table.columns().iter().zip(&l_n_imprecise) {
        if n_imprecise == 0 {
            continue;
        }
        warn!(
            target: C_LOG_TARGET,
            column = %col.name,
            cells = n_imprecise,
            "integers beyond 2^53 lose precision in spreadsheet apps"
        );
        ctx.warnings.push(format!(
            "column {:?}: {n_imprecise} integer(s) beyond 2^53 lose precision when opened",
            col.name
        ));
    }

    let n_row_freeze = options.row_freeze.unwrap_or(n_rows_header);
    let mut out = String::with_capacity(sheet_data.len() + 1024);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push_str(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );
    let _ = write!(
        out,
        r#"<dimension ref="{}"/>"#,
        derive_dimension_ref(n_rows_total, n_cols)
    );
    write_sheet_views(&mut out, n_row_freeze, options.col_freeze);
    if if_autofit && n_cols > 0 {
        let l_widths = derive_column_widths(&l_width_header, &l_width_body, policy_autofit);
        write_cols(&mut out, &l_widths);
    }
    if sheet_data.is_empty() {
        out.push_str("<sheetData/>");
    } else {
        out.push_str("<sheetData>");
        out.push_str(&sheet_data);
        out.push_str("</sheetData>");
    }
    out.push_str(
        r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#,
    );
    out.push_str("</worksheet>");

    trace!(
        target: C_LOG_TARGET,
        rows = n_rows_total,
        cols = n_cols,
        bytes = out.len(),
        "worksheet rendered"
    );
    Ok(out)
}

////////////////////////////////////////////////////////////////////////////////
// #region CellRecords

fn write_body_cell(
    out: &mut String,
    pos: (usize, usize, usize),
    value: &EnumCellValue,
    rule_type: EnumColumnType,
    value_policy: &SpecXlsxValuePolicy,
    ctx: &mut SpecSheetContext<'_>,
) -> Result<()> {
    let (n_idx_row, n_row_sheet, n_idx_col) = pos;
    let n_style = ctx.styles.assign_cell(value, rule_type);

    match value {
        EnumCellValue::Empty => write_empty_cell(out, n_row_sheet, n_idx_col, n_style),
        EnumCellValue::Text(s) => {
            let n_len = s.chars().count();
            if n_len > N_LEN_EXCEL_CELL_TEXT_MAX {
                return Err(XlsxConvertError::TextTooLong {
                    row: n_idx_row,
                    col: n_idx_col,
                    len: n_len,
                    limit: N_LEN_EXCEL_CELL_TEXT_MAX,
                });
            }
            let n_sst = ctx.shared_strings.add_string(s)?;
            write_shared_string_cell(out, n_row_sheet, n_idx_col, n_style, n_sst);
        }
        EnumCellValue::Integer(n) => {
            write_number_cell(
                out,
                n_row_sheet,
                n_idx_col,
                n_style,
                itoa::Buffer::new().format(*n),
            );
        }
        EnumCellValue::Float(x) if x.is_finite() => {
            write_number_cell(
                out,
                n_row_sheet,
                n_idx_col,
                n_style,
                ryu::Buffer::new().format_finite(*x),
            );
        }
        EnumCellValue::Float(x) => match value_policy.rule_non_finite {
            EnumNonFiniteRule::Error => {
                return Err(XlsxConvertError::UnrepresentableValue {
                    row: n_idx_row,
                    col: n_idx_col,
                    reason: format!("non-finite float {x}"),
                });
            }
            EnumNonFiniteRule::Blank => {
                write_empty_cell(out, n_row_sheet, n_idx_col, N_STYLE_INDEX_GENERAL);
            }
            EnumNonFiniteRule::Text => {
                let c_text = derive_non_finite_text(*x, value_policy);
                let n_sst = ctx.shared_strings.add_string(c_text)?;
                write_shared_string_cell(
                    out,
                    n_row_sheet,
                    n_idx_col,
                    N_STYLE_INDEX_GENERAL,
                    n_sst,
                );
            }
        },
        EnumCellValue::Boolean(b) => {
            write_cell_open(out, n_row_sheet, n_idx_col, n_style);
            out.push_str(if *b {
                r#" t="b"><v>1</v></c>"#
            } else {
                r#" t="b"><v>0</v></c>"#
            });
        }
        EnumCellValue::Date(date) => {
            let n_serial = derive_date_serial(*date).ok_or_else(|| {
                XlsxConvertError::UnrepresentableValue {
                    row: n_idx_row,
                    col: n_idx_col,
                    reason: format!("date {date} outside 1900-01-01..=9999-12-31"),
                }
            })?;
            write_number_cell(
                out,
                n_row_sheet,
                n_idx_col,
                n_style,
                itoa::Buffer::new().format(n_serial),
            );
        }
        EnumCellValue::DateTime { value: dt, .. } => {
            let x_serial = derive_datetime_serial(*dt).ok_or_else(|| {
                XlsxConvertError::UnrepresentableValue {
                    row: n_idx_row,
                    col: n_idx_col,
                    reason: format!("date-time {dt} outside 1900-01-01..=9999-12-31"),
                }
            })?;
            write_number_cell(
                out,
                n_row_sheet,
                n_idx_col,
                n_style,
                ryu::Buffer::new().format_finite(x_serial),
            );
        }
    }
    Ok(())
}

fn derive_non_finite_text(x: f64, value_policy: &SpecXlsxValuePolicy) -> &str {
    if x.is_nan() {
        &value_policy.nan_str
    } else if x.is_sign_positive() {
        &value_policy.posinf_str
    } else {
        &value_policy.neginf_str
    }
}

fn write_cell_open(out: &mut String, row: usize, col: usize, style: u32) {
    let _ = write!(out, r#"<c r="{}""#, make_cell_ref(row, col));
    if style != N_STYLE_INDEX_GENERAL {
        let _ = write!(out, r#" s="{style}""#);
    }
}

fn write_empty_cell(out: &mut String, row: usize, col: usize, style: u32) {
    write_cell_open(out, row, col, style);
    out.push_str("/>");
}

fn write_number_cell(out: &mut String, row: usize, col: usize, style: u32, number: &str) {
    write_cell_open(out, row, col, style);
    out.push_str("><v>");
    out.push_str(number);
    out.push_str("</v></c>");
}

fn write_shared_string_cell(out: &mut String, row: usize, col: usize, style: u32, idx: u32) {
    write_cell_open(out, row, col, style);
    let _ = write!(out, r#" t="s"><v>{idx}</v></c>"#);
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetLayout

fn derive_dimension_ref(n_rows: usize, n_cols: usize) -> String {
    if n_rows == 0 || n_cols == 0 {
        return "A1".to_string();
    }
    if n_rows == 1 && n_cols == 1 {
        return "A1".to_string();
    }
    format!("A1:{}", make_cell_ref(n_rows - 1, n_cols - 1))
}

fn write_sheet_views(out: &mut String, n_row_freeze: usize, n_col_freeze: usize) {
    if n_row_freeze == 0 && n_col_freeze == 0 {
        out.push_str(r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>"#);
        return;
    }

    let c_pane = match (n_row_freeze > 0, n_col_freeze > 0) {
        (true, true) => "bottomRight",
        (true, false) => "bottomLeft",
        _ => "topRight",
    };
    out.push_str(r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0"><pane"#);
    if n_col_freeze > 0 {
        let _ = write!(out, r#" xSplit="{n_col_freeze}""#);
    }
    if n_row_freeze > 0 {
        let _ = write!(out, r#" ySplit="{n_row_freeze}""#);
    }
    let c_top_left = make_cell_ref(n_row_freeze, n_col_freeze);
    let _ = write!(
        out,
        r#" topLeftCell="{c_top_left}" activePane="{c_pane}" state="frozen"/><selection pane="{c_pane}" activeCell="{c_top_left}" sqref="{c_top_left}"/></sheetView></sheetViews>"#
    );
}

/// Final column widths from header/body estimates under `policy`.
pub fn derive_column_widths(
    l_width_header: &[usize],
    l_width_body: &[usize],
    policy: &SpecAutofitCellsPolicy,
) -> Vec<usize> {
    let n_min = usize::max(1, policy.width_cell_min);
    let n_max = usize::min(
        N_WIDTH_COLUMN_LIMIT,
        usize::max(n_min, policy.width_cell_max),
    );
    l_width_header
        .iter()
        .zip(l_width_body)
        .map(|(&n_header, &n_body)| {
            let n_recorded = match policy.rule_columns {
                EnumAutofitColumnsRule::Header => n_header,
                EnumAutofitColumnsRule::Body => n_body,
                EnumAutofitColumnsRule::All => usize::max(n_header, n_body),
                EnumAutofitColumnsRule::None => 0,
            };
            usize::min(
                n_max,
                usize::max(n_min, n_recorded + policy.width_cell_padding),
            )
        })
        .collect()
}

fn write_cols(out: &mut String, l_widths: &[usize]) {
    out.push_str("<cols>");
    for (n_idx_col, n_width) in l_widths.iter().enumerate() {
        let _ = write!(
            out,
            r#"<col min="{n}" max="{n}" width="{n_width}" customWidth="1"/>"#,
            n = n_idx_col + 1
        );
    }
    out.push_str("</cols>");
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

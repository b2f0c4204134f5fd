//! Stateless helper utilities used by the XLSX conversion kernel.

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumCellValue, EnumColumnType, Result, SpecTable, XlsxConvertError};

////////////////////////////////////////////////////////////////////////////////
// #region CellReferences

/// Convert zero-based column index to letters (`0 -> A`, `26 -> AA`).
pub fn col_to_letters(col: usize) -> String {
    let mut v_letters = Vec::with_capacity(3);
    let mut n_col = col;
    loop {
        v_letters.push(b'A' + (n_col % 26) as u8);
        if n_col < 26 {
            break;
        }
        n_col = n_col / 26 - 1;
    }
    v_letters.reverse();
    v_letters.into_iter().map(char::from).collect()
}

/// Build an A1-style reference from zero-based row/column indices.
pub fn make_cell_ref(row: usize, col: usize) -> String {
    let mut c_ref = col_to_letters(col);
    c_ref.push_str(itoa::Buffer::new().format(row + 1));
    c_ref
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XmlText

/// Escape text for XML content/attributes.
///
/// Characters not allowed in XML 1.0 are written as `_xHHHH_`. An `_` that
/// would otherwise be read back as the start of such an escape is written as
/// `_x005F_`.
pub fn xml_escape(s: &str) -> String {
    if !s.contains("_x")
        && !s
            .chars()
            .any(|chr| matches!(chr, '&' | '<' | '>' | '"' | '\'') || is_xml_illegal_char(chr))
    {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 8);
    for (n_idx, chr) in s.char_indices() {
        match chr {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '_' if is_escape_lookalike(&s[n_idx..]) => out.push_str("_x005F_"),
            _ if is_xml_illegal_char(chr) => {
                let _ = write!(out, "_x{:04X}_", chr as u32);
            }
            _ => out.push(chr),
        }
    }
    out
}

fn is_xml_illegal_char(chr: char) -> bool {
    ((chr as u32) < 0x20 && !matches!(chr, '\t' | '\n' | '\r'))
        || matches!(chr, '\u{FFFE}' | '\u{FFFF}')
}

/// `_x` + 4 hex digits, closed by `_` or by a char that is itself escaped.
fn is_escape_lookalike(tail: &str) -> bool {
    let v_bytes = tail.as_bytes();
    if v_bytes.len() < 7 || &v_bytes[..2] != b"_x" {
        return false;
    }
    if !v_bytes[2..6].iter().all(u8::is_ascii_hexdigit) {
        return false;
    }
    tail[6..]
        .chars()
        .next()
        .is_some_and(|chr| chr == '_' || is_xml_illegal_char(chr))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region NameNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name
        .chars()
        .filter(|chr| !chr.is_control())
        .collect::<String>()
        .trim()
        .trim_matches('\'')
        .to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Normalized header form of a column name: control chars dropped, trimmed.
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|chr| !chr.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Validate that `table` has columns and every column matches the first one's length.
pub fn validate_table_shape(table: &SpecTable) -> Result<()> {
    let n_height = table.height();
    if table.width() == 0 {
        return Err(XlsxConvertError::EmptyTable);
    }
    if let Some((n_idx, col)) = table
        .columns()
        .iter()
        .enumerate()
        .find(|(_, col)| col.len() != n_height)
    {
        return Err(XlsxConvertError::ColumnLengthMismatch {
            col: n_idx,
            name: col.name.clone(),
            expected: n_height,
            found: col.len(),
        });
    }
    Ok(())
}

/// Validate that `columns` has no duplicated or blank names.
pub fn validate_unique_columns(columns: &[&str]) -> Result<()> {
    if let Some(n_idx) = columns.iter().position(|c_name| c_name.trim().is_empty()) {
        return Err(XlsxConvertError::EmptyColumnName(n_idx));
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }
    if dict_pos.len() == columns.len() {
        return Ok(());
    }

    let c_msg = dict_pos
        .iter()
        .filter_map(|(c_name, l_pos)| {
            if l_pos.len() > 1 {
                Some(format!(
                    "{c_name:?} x{} at indices {:?}",
                    l_pos.len(),
                    l_pos
                ))
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(XlsxConvertError::DuplicateColumnName(c_msg))
}

/// Fail when two distinct names share the same normalized form.
pub fn validate_normalized_columns(columns: &[&str]) -> Result<Vec<String>> {
    let mut dict_seen: BTreeMap<String, &str> = BTreeMap::new();
    let mut l_normalized = Vec::with_capacity(columns.len());
    for c_name in columns {
        let c_normalized = normalize_column_name(c_name);
        if let Some(c_first) = dict_seen.get(&c_normalized) {
            return Err(XlsxConvertError::ColumnNameCollision {
                first: (*c_first).to_string(),
                second: (*c_name).to_string(),
                normalized: c_normalized,
            });
        }
        dict_seen.insert(c_normalized.clone(), c_name);
        l_normalized.push(c_normalized);
    }
    Ok(l_normalized)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Estimate displayed width units for one cell value under its column type.
///
/// Used by autofit inference logic.
pub fn estimate_width_len(value: &EnumCellValue, rule_type: EnumColumnType) -> usize {
    match value {
        EnumCellValue::Empty => 0,
        EnumCellValue::Text(s) => estimate_unicode_string_width(s),
        EnumCellValue::Integer(n) => {
            if rule_type == EnumColumnType::Float {
                format!("{n}.0000").len()
            } else {
                itoa::Buffer::new().format(*n).len()
            }
        }
        EnumCellValue::Float(x) => {
            if x.is_finite() {
                format!("{x:.4}").len()
            } else {
                3
            }
        }
        EnumCellValue::Boolean(b) => {
            if *b {
                4
            } else {
                5
            }
        }
        EnumCellValue::Date(_) => 10,
        EnumCellValue::DateTime { offset, .. } => {
            if offset.is_some() {
                28
            } else {
                19
            }
        }
    }
}

/// Width of text where non-ASCII glyphs count as 1.6 units.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

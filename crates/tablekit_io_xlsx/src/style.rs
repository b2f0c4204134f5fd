//! Style/format registry: deduplicated number formats and cell formats.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use crate::cell::derive_datetime_pattern;
use crate::conf::{
    C_FMT_DATE_DEFAULT, C_FMT_DATETIME_DEFAULT, C_FMT_FLOAT_DEFAULT, C_FMT_INTEGER_DEFAULT,
    N_NUM_FMT_ID_CUSTOM_BASE, N_STYLE_INDEX_GENERAL, derive_builtin_num_fmt_id,
};
use crate::spec::{EnumCellValue, EnumColumnType, SpecStyleRecord, SpecXlsxConvertOptions};
use crate::util::xml_escape;

/// Number-format patterns in effect for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFormatPatterns {
    /// Date-only pattern.
    pub date: String,
    /// Date-time pattern (offset literal appended per cell).
    pub datetime: String,
    /// Integer pattern.
    pub integer: String,
    /// Decimal pattern.
    pub float: String,
}

impl Default for SpecFormatPatterns {
    fn default() -> Self {
        Self {
            date: C_FMT_DATE_DEFAULT.to_string(),
            datetime: C_FMT_DATETIME_DEFAULT.to_string(),
            integer: C_FMT_INTEGER_DEFAULT.to_string(),
            float: C_FMT_FLOAT_DEFAULT.to_string(),
        }
    }
}

impl SpecFormatPatterns {
    /// Built-in patterns overlaid with option overrides.
    pub fn from_options(options: &SpecXlsxConvertOptions) -> Self {
        let base = Self::default();
        Self {
            date: options.date_format.clone().unwrap_or(base.date),
            datetime: options.datetime_format.clone().unwrap_or(base.datetime),
            integer: options.integer_format.clone().unwrap_or(base.integer),
            float: options.float_format.clone().unwrap_or(base.float),
        }
    }
}

/// Registry assigning style indices in first-seen order.
///
/// Index 0 is the built-in "General" format shared by Text, Boolean and
/// Mixed cells. Every other (semantic type, format) pair gets exactly one
/// index, reused on repeat requests.
#[derive(Debug)]
pub struct StyleRegistry {
    patterns: SpecFormatPatterns,
    l_records: Vec<SpecStyleRecord>,
    dict_style_index: HashMap<(EnumColumnType, String), u32>,
    l_num_fmts_custom: Vec<(u32, String)>,
    dict_num_fmt_id: HashMap<String, u32>,
    n_num_fmt_id_next: u32,
}

impl StyleRegistry {
    /// Create an empty registry using `patterns`.
    pub fn new(patterns: SpecFormatPatterns) -> Self {
        Self {
            patterns,
            l_records: Vec::new(),
            dict_style_index: HashMap::new(),
            l_num_fmts_custom: Vec::new(),
            dict_num_fmt_id: HashMap::new(),
            n_num_fmt_id_next: N_NUM_FMT_ID_CUSTOM_BASE,
        }
    }

    /// Patterns in effect.
    pub fn patterns(&self) -> &SpecFormatPatterns {
        &self.patterns
    }

    /// Return the style index for a (type, format) pair, registering it once.
    pub fn assign(&mut self, column_type: EnumColumnType, num_format: &str) -> u32 {
        if matches!(
            column_type,
            EnumColumnType::Text | EnumColumnType::Boolean | EnumColumnType::Mixed
        ) {
            return N_STYLE_INDEX_GENERAL;
        }

        let key = (column_type, num_format.to_string());
        if let Some(&n_idx) = self.dict_style_index.get(&key) {
            return n_idx;
        }

        let num_fmt_id = self.intern_num_fmt(num_format);
        let n_idx = N_STYLE_INDEX_GENERAL + 1 + self.l_records.len() as u32;
        self.l_records.push(SpecStyleRecord {
            column_type,
            num_format: num_format.to_string(),
            num_fmt_id,
            style_index: n_idx,
        });
        self.dict_style_index.insert(key, n_idx);
        n_idx
    }

    /// Style index for one cell under its column's resolved type.
    ///
    /// In a Mixed column the cell's own type decides; otherwise the column
    /// type does (so Integer cells of a Float column use the decimal format).
    /// Date-time cells append their own offset to the pattern.
    pub fn assign_cell(&mut self, value: &EnumCellValue, column_type: EnumColumnType) -> u32 {
        let rule_type = match column_type {
            EnumColumnType::Mixed => match value.column_type() {
                Some(cell_type) => cell_type,
                None => return N_STYLE_INDEX_GENERAL,
            },
            _ => column_type,
        };

        let c_format = match rule_type {
            EnumColumnType::Integer => self.patterns.integer.clone(),
            EnumColumnType::Float => self.patterns.float.clone(),
            EnumColumnType::Date => self.patterns.date.clone(),
            EnumColumnType::DateTime => match value {
                EnumCellValue::DateTime { offset, .. } => {
                    derive_datetime_pattern(&self.patterns.datetime, offset.as_ref())
                }
                _ => self.patterns.datetime.clone(),
            },
            EnumColumnType::Text | EnumColumnType::Boolean | EnumColumnType::Mixed => {
                return N_STYLE_INDEX_GENERAL;
            }
        };
        self.assign(rule_type, &c_format)
    }

    /// Registered records, excluding the built-in General entry.
    pub fn records(&self) -> &[SpecStyleRecord] {
        &self.l_records
    }

    /// Total cell formats, including the built-in General entry.
    pub fn len(&self) -> usize {
        self.l_records.len() + 1
    }

    /// Whether only the built-in General entry exists.
    pub fn is_empty(&self) -> bool {
        self.l_records.is_empty()
    }

    fn intern_num_fmt(&mut self, code: &str) -> u32 {
        if let Some(n_id) = derive_builtin_num_fmt_id(code) {
            return n_id;
        }
        if let Some(&n_id) = self.dict_num_fmt_id.get(code) {
            return n_id;
        }
        let n_id = self.n_num_fmt_id_next;
        self.n_num_fmt_id_next += 1;
        self.dict_num_fmt_id.insert(code.to_string(), n_id);
        self.l_num_fmts_custom.push((n_id, code.to_string()));
        n_id
    }

    /// Render `xl/styles.xml` (numFmts, fonts, fills, borders, then cellXfs).
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(1024 + self.l_records.len() * 96);
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push_str(
            r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );

        if !self.l_num_fmts_custom.is_empty() {
            let _ = write!(out, r#"<numFmts count="{}">"#, self.l_num_fmts_custom.len());
            for (n_id, c_code) in &self.l_num_fmts_custom {
                let _ = write!(
                    out,
                    r#"<numFmt numFmtId="{n_id}" formatCode="{}"/>"#,
                    xml_escape(c_code)
                );
            }
            out.push_str("</numFmts>");
        }

        out.push_str(
            r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts>"#,
        );
        out.push_str(
            r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
        );
        out.push_str(
            r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
        );
        out.push_str(
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
        );

        let _ = write!(out, r#"<cellXfs count="{}">"#, self.len());
        out.push_str(r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#);
        for record in &self.l_records {
            let _ = write!(
                out,
                r#"<xf numFmtId="{}" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
                record.num_fmt_id
            );
        }
        out.push_str("</cellXfs>");

        out.push_str(
            r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
        );
        out.push_str("</styleSheet>");
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    use super::*;

    fn derive_registry() -> StyleRegistry {
        StyleRegistry::new(SpecFormatPatterns::default())
    }

    #[test]
    fn identical_pairs_share_one_index() {
        let mut registry = derive_registry();
        let n_a = registry.assign(EnumColumnType::Date, "yyyy-mm-dd");
        let n_b = registry.assign(EnumColumnType::Integer, "0");
        let n_c = registry.assign(EnumColumnType::Date, "yyyy-mm-dd");
        assert_eq!(n_a, 1);
        assert_eq!(n_b, 2);
        assert_eq!(n_a, n_c);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn general_types_map_to_index_zero() {
        let mut registry = derive_registry();
        assert_eq!(registry.assign_cell(&"x".into(), EnumColumnType::Text), 0);
        assert_eq!(registry.assign_cell(&true.into(), EnumColumnType::Mixed), 0);
        assert_eq!(
            registry.assign_cell(&EnumCellValue::Empty, EnumColumnType::Mixed),
            0
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn float_column_formats_integer_cells_as_decimal() {
        let mut registry = derive_registry();
        let n_int = registry.assign_cell(&1i64.into(), EnumColumnType::Float);
        let n_float = registry.assign_cell(&1.5f64.into(), EnumColumnType::Float);
        assert_eq!(n_int, n_float);
        assert_eq!(registry.records()[0].num_format, C_FMT_FLOAT_DEFAULT);
    }

    #[test]
    fn datetime_offsets_get_their_own_pattern() {
        let mut registry = derive_registry();
        let east = FixedOffset::east_opt(8 * 3600).expect("offset");
        let value_tz: EnumCellValue = east
            .with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
            .single()
            .expect("datetime")
            .into();
        let value_naive: EnumCellValue = NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .expect("datetime")
            .into();

        let n_tz = registry.assign_cell(&value_tz, EnumColumnType::DateTime);
        let n_naive = registry.assign_cell(&value_naive, EnumColumnType::DateTime);
        assert_ne!(n_tz, n_naive);
        assert_eq!(
            registry.records()[0].num_format,
            "yyyy-mm-dd hh:mm:ss \"+08:00\""
        );

        let c_xml = registry.to_xml();
        assert!(c_xml.contains(r#"formatCode="yyyy-mm-dd hh:mm:ss &quot;+08:00&quot;""#));
        assert!(c_xml.contains(r#"<cellXfs count="3">"#));
    }

    #[test]
    fn builtin_codes_skip_num_fmt_declaration() {
        let mut registry = derive_registry();
        registry.assign(EnumColumnType::Integer, "0");
        let c_xml = registry.to_xml();
        assert!(!c_xml.contains("<numFmts"));
        assert!(c_xml.contains(r#"<xf numFmtId="1" "#));
        assert!(
            c_xml.find("<fonts").expect("fonts") < c_xml.find("<cellXfs").expect("xfs")
        );
    }
}

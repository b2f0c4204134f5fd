//! XLSX constants and default preset factories.

use crate::spec::SpecXlsxConvertOptions;

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Excel maximum characters in one cell.
pub const N_LEN_EXCEL_CELL_TEXT_MAX: usize = 32_767;
/// Largest integer magnitude a spreadsheet double holds exactly (2^53).
pub const N_INT_EXACT_F64_MAX: u64 = 1 << 53;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Default worksheet name.
pub const C_SHEET_NAME_DEFAULT: &str = "Sheet1";

/// Style index reserved for the built-in "General" cell format.
pub const N_STYLE_INDEX_GENERAL: u32 = 0;
/// First number-format id available for custom format codes.
pub const N_NUM_FMT_ID_CUSTOM_BASE: u32 = 164;

/// Default date-only pattern.
pub const C_FMT_DATE_DEFAULT: &str = "yyyy-mm-dd";
/// Default date-time pattern.
pub const C_FMT_DATETIME_DEFAULT: &str = "yyyy-mm-dd hh:mm:ss";
/// Default integer pattern.
pub const C_FMT_INTEGER_DEFAULT: &str = "0";
/// Default decimal pattern.
pub const C_FMT_FLOAT_DEFAULT: &str = "0.0000";

/// Built-in number formats that need no `<numFmt>` declaration.
pub const TUP_NUM_FMT_BUILTIN: [(u32, &str); 13] = [
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (14, "mm-dd-yy"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (49, "@"),
];

/// Seconds per day, used by serial date encoding.
pub const N_SECONDS_PER_DAY: f64 = 86_400.0;

/// Fixed ZIP entry timestamp so identical input yields identical bytes.
pub const TUP_ZIP_ENTRY_TIME: (u16, u8, u8, u8, u8, u8) = (1980, 1, 1, 0, 0, 0);
/// Deflate level used for every archive part.
pub const N_ZIP_COMPRESSION_LEVEL: i64 = 6;

/// Tracing target shared by the kernel.
pub const C_LOG_TARGET: &str = "tablekit_io_xlsx";

/// Look up a built-in number-format id by exact format code.
pub fn derive_builtin_num_fmt_id(code: &str) -> Option<u32> {
    TUP_NUM_FMT_BUILTIN
        .iter()
        .find(|(_, c_code)| *c_code == code)
        .map(|(n_id, _)| *n_id)
}

/// Build default conversion options.
pub fn derive_default_xlsx_convert_options() -> SpecXlsxConvertOptions {
    SpecXlsxConvertOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup_matches_exact_codes_only() {
        assert_eq!(derive_builtin_num_fmt_id("General"), Some(0));
        assert_eq!(derive_builtin_num_fmt_id("0"), Some(1));
        assert_eq!(derive_builtin_num_fmt_id("0.00"), Some(2));
        assert_eq!(derive_builtin_num_fmt_id(C_FMT_DATE_DEFAULT), None);
        assert_eq!(derive_builtin_num_fmt_id(C_FMT_FLOAT_DEFAULT), None);
    }
}

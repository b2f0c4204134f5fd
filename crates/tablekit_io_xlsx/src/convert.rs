//! Public conversion entry point: validate, infer, style, encode.

use tracing::debug;

use crate::conf::{C_LOG_TARGET, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
use crate::infer::derive_column_types;
use crate::spec::{
    EnumColumnType, Result, SpecAutofitCellsPolicy, SpecTable, SpecXlsxConvertOptions,
    SpecXlsxReport, XlsxConvertError,
};
use crate::util::{validate_normalized_columns, validate_table_shape, validate_unique_columns};
use crate::writer::XlsxWriter;

/// Convert `table` into the bytes of a single-sheet `.xlsx` workbook.
///
/// Structural problems are reported before any encoding work starts. No
/// bytes are returned on failure.
pub fn convert(table: &SpecTable, options: &SpecXlsxConvertOptions) -> Result<Vec<u8>> {
    convert_with_report(table, options).map(|(v_bytes, _)| v_bytes)
}

/// Same as [`convert`], also returning a summary of what was written.
pub fn convert_with_report(
    table: &SpecTable,
    options: &SpecXlsxConvertOptions,
) -> Result<(Vec<u8>, SpecXlsxReport)> {
    validate_table(table)?;
    validate_convert_options(options)?;
    debug!(
        target: C_LOG_TARGET,
        rows = table.height(),
        cols = table.width(),
        should_infer_types = options.should_infer_types,
        "converting table"
    );

    let column_types = derive_convert_column_types(table, options);
    validate_normalized_columns(&table.column_names())?;

    let mut writer = XlsxWriter::new(options);
    writer.write_sheet(table, &column_types, options)?;
    writer.finish()
}

/// Resolved column types: inferred, or all Mixed when inference is off.
pub fn derive_convert_column_types(
    table: &SpecTable,
    options: &SpecXlsxConvertOptions,
) -> Vec<EnumColumnType> {
    if options.should_infer_types {
        derive_column_types(table)
    } else {
        vec![EnumColumnType::Mixed; table.width()]
    }
}

/// Structural checks: non-empty, equal lengths, usable unique names.
pub fn validate_table(table: &SpecTable) -> Result<()> {
    validate_table_shape(table)?;
    validate_unique_columns(&table.column_names())
}

/// Reject option combinations that cannot produce a workbook.
pub fn validate_convert_options(options: &SpecXlsxConvertOptions) -> Result<()> {
    for (c_field, value) in [
        ("date_format", &options.date_format),
        ("datetime_format", &options.datetime_format),
        ("integer_format", &options.integer_format),
        ("float_format", &options.float_format),
    ] {
        if let Some(c_format) = value
            && c_format.trim().is_empty()
        {
            return Err(XlsxConvertError::InvalidOption(format!(
                "{c_field} must not be blank"
            )));
        }
    }
    if let Some(n_row_freeze) = options.row_freeze
        && n_row_freeze >= N_NROWS_EXCEL_MAX
    {
        return Err(XlsxConvertError::InvalidOption(format!(
            "row_freeze must be < {N_NROWS_EXCEL_MAX}, got {n_row_freeze}"
        )));
    }
    if options.col_freeze >= N_NCOLS_EXCEL_MAX {
        return Err(XlsxConvertError::InvalidOption(format!(
            "col_freeze must be < {N_NCOLS_EXCEL_MAX}, got {}",
            options.col_freeze
        )));
    }
    validate_policy_autofit(&options.policy_autofit)
}

fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<()> {
    if policy_autofit.width_cell_min == 0 {
        return Err(XlsxConvertError::InvalidOption(
            "policy_autofit.width_cell_min must be >= 1".to_string(),
        ));
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(XlsxConvertError::InvalidOption(
            "policy_autofit.width_cell_max must be >= policy_autofit.width_cell_min".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecColumn;

    #[test]
    fn validation_runs_before_encoding() {
        let err =
            convert(&SpecTable::default(), &SpecXlsxConvertOptions::default()).expect_err("empty");
        assert!(err.is_validation());

        let table = SpecTable::new(vec![
            SpecColumn::new("a", [1i64]),
            SpecColumn::new("a", [2i64]),
        ]);
        let err = convert(&table, &SpecXlsxConvertOptions::default()).expect_err("duplicate");
        assert!(matches!(err, XlsxConvertError::DuplicateColumnName(_)));
    }

    #[test]
    fn blank_format_override_is_rejected() {
        let options = SpecXlsxConvertOptions {
            date_format: Some("  ".to_string()),
            ..Default::default()
        };
        let err = validate_convert_options(&options).expect_err("blank");
        assert!(err.to_string().contains("date_format"));
        assert!(err.is_validation());
    }

    #[test]
    fn autofit_bounds_are_checked() {
        let mut options = SpecXlsxConvertOptions::default();
        options.policy_autofit.width_cell_min = 10;
        options.policy_autofit.width_cell_max = 5;
        assert!(validate_convert_options(&options).is_err());
    }

    #[test]
    fn inference_switch_controls_column_types() {
        let table = SpecTable::new(vec![SpecColumn::new("n", [1i64, 2])]);
        let mut options = SpecXlsxConvertOptions::default();
        assert_eq!(
            derive_convert_column_types(&table, &options),
            vec![EnumColumnType::Integer]
        );
        options.should_infer_types = false;
        assert_eq!(
            derive_convert_column_types(&table, &options),
            vec![EnumColumnType::Mixed]
        );
    }

    #[test]
    fn report_describes_written_sheet() {
        let table = SpecTable::new(vec![
            SpecColumn::new("n", [1i64, 2]),
            SpecColumn::new("t", ["x", "x"]),
        ]);
        let options = SpecXlsxConvertOptions {
            if_write_header: true,
            ..Default::default()
        };
        let (v_bytes, report) = convert_with_report(&table, &options).expect("convert");
        assert_eq!(report.n_bytes, v_bytes.len());
        assert_eq!(report.n_rows, 3);
        assert_eq!(report.n_cols, 2);
        assert_eq!(
            report.column_types,
            vec![EnumColumnType::Integer, EnumColumnType::Text]
        );
        assert_eq!(report.n_styles, 2);
        assert_eq!(report.n_shared_strings, 3);
    }
}

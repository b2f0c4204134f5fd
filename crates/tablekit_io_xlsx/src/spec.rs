//! Shared XLSX conversion models: table, cell values, options and errors.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::conf::C_SHEET_NAME_DEFAULT;

////////////////////////////////////////////////////////////////////////////////
// #region CellValueModel

/// Closed cell value variant every input is mapped into before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    Empty,
    /// Text value.
    Text(String),
    /// Signed integer value.
    ///
    /// Written as exact decimal text, but spreadsheet apps read numbers as
    /// doubles: magnitudes above 2^53 lose precision when opened. Conversion
    /// reports such columns in [`SpecXlsxReport::warnings`].
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Calendar date without time of day.
    Date(NaiveDate),
    /// Wall-clock date-time, optionally tagged with its UTC offset.
    ///
    /// `value` is the local reading at `offset`; it is never shifted to UTC.
    DateTime {
        /// Local wall-clock reading.
        value: NaiveDateTime,
        /// UTC offset the reading was taken at, if known.
        offset: Option<FixedOffset>,
    },
}

impl EnumCellValue {
    /// Build a naive (offset-less) date-time value.
    pub fn datetime_naive(value: NaiveDateTime) -> Self {
        Self::DateTime {
            value,
            offset: None,
        }
    }

    /// Build an offset-aware date-time value, keeping the local reading.
    pub fn datetime_with_offset(value: DateTime<FixedOffset>) -> Self {
        Self::DateTime {
            value: value.naive_local(),
            offset: Some(*value.offset()),
        }
    }

    /// Semantic type of this single cell; `None` for [`EnumCellValue::Empty`].
    pub fn column_type(&self) -> Option<EnumColumnType> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some(EnumColumnType::Text),
            Self::Integer(_) => Some(EnumColumnType::Integer),
            Self::Float(_) => Some(EnumColumnType::Float),
            Self::Boolean(_) => Some(EnumColumnType::Boolean),
            Self::Date(_) => Some(EnumColumnType::Date),
            Self::DateTime { .. } => Some(EnumColumnType::DateTime),
        }
    }

    /// Whether the cell carries no value.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for EnumCellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDate> for EnumCellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for EnumCellValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::datetime_naive(value)
    }
}

impl From<DateTime<FixedOffset>> for EnumCellValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::datetime_with_offset(value)
    }
}

impl<T: Into<EnumCellValue>> From<Option<T>> for EnumCellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Resolved semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumColumnType {
    /// Text column.
    Text,
    /// Integer column.
    Integer,
    /// Decimal column (also the widening target of Integer + Float).
    Float,
    /// Boolean column.
    Boolean,
    /// Date-only column.
    Date,
    /// Date-time column.
    DateTime,
    /// No single type applies; every cell is styled on its own.
    Mixed,
}

impl EnumColumnType {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for EnumColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TableModel

/// One named column of cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecColumn {
    /// Column name (unique within its table).
    pub name: String,
    /// Cell values, top to bottom.
    pub values: Vec<EnumCellValue>,
}

impl SpecColumn {
    /// Build a column from anything convertible into cell values.
    pub fn new<V>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<EnumCellValue>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered sequence of named columns. Read-only input of a conversion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecTable {
    columns: Vec<SpecColumn>,
}

impl SpecTable {
    /// Wrap columns as a table. Structure is validated by the conversion call.
    pub fn new(columns: Vec<SpecColumn>) -> Self {
        Self { columns }
    }

    /// Build a table from string rows, classifying each raw value.
    ///
    /// Rows shorter than `names` are padded with [`EnumCellValue::Empty`].
    /// Values beyond `names` land in unnamed columns, which fail validation.
    pub fn from_raw_rows<S, R>(names: &[S], rows: impl IntoIterator<Item = R>) -> Self
    where
        S: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let mut l_columns: Vec<SpecColumn> = names
            .iter()
            .map(|name| SpecColumn {
                name: name.as_ref().to_string(),
                values: Vec::new(),
            })
            .collect();

        for (n_idx_row, row) in rows.into_iter().enumerate() {
            for (n_idx_col, raw) in row.into_iter().enumerate() {
                if n_idx_col >= l_columns.len() {
                    l_columns.push(SpecColumn {
                        name: String::new(),
                        values: vec![EnumCellValue::Empty; n_idx_row],
                    });
                }
                l_columns[n_idx_col]
                    .values
                    .push(crate::cell::classify_raw_text(raw.as_ref()));
            }
            for col in l_columns.iter_mut() {
                if col.values.len() < n_idx_row + 1 {
                    col.values.push(EnumCellValue::Empty);
                }
            }
        }

        Self { columns: l_columns }
    }

    /// Columns in order.
    pub fn columns(&self) -> &[SpecColumn] {
        &self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|col| col.name.as_str()).collect()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Row count of the first column (0 for an empty table).
    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, SpecColumn::len)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StyleModel

/// One deduplicated (semantic type, number format) style entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecStyleRecord {
    /// Semantic type the style was requested for.
    pub column_type: EnumColumnType,
    /// Number format code.
    pub num_format: String,
    /// Number format id referenced by the cell format.
    pub num_fmt_id: u32,
    /// Cell style index (`s` attribute).
    pub style_index: u32,
}

/// Summary of one finished conversion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Sheet name actually written (after sanitation).
    pub sheet_name: String,
    /// Worksheet rows, header included.
    pub n_rows: usize,
    /// Worksheet columns.
    pub n_cols: usize,
    /// Resolved type per column.
    pub column_types: Vec<EnumColumnType>,
    /// Cell formats, built-in General included.
    pub n_styles: usize,
    /// Distinct shared strings.
    pub n_shared_strings: usize,
    /// Archive size in bytes.
    pub n_bytes: usize,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ConvertOptions

/// Handling of NaN and +/-Inf float cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumNonFiniteRule {
    /// Fail with an encoding error naming the cell.
    #[default]
    Error,
    /// Write an empty cell.
    Blank,
    /// Write the policy replacement text.
    Text,
}

/// Value conversion policy for non-finite floats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxValuePolicy {
    /// Non-finite handling rule.
    pub rule_non_finite: EnumNonFiniteRule,
    /// Replacement text for NaN.
    pub nan_str: String,
    /// Replacement text for positive infinity.
    pub posinf_str: String,
    /// Replacement text for negative infinity.
    pub neginf_str: String,
}

impl Default for SpecXlsxValuePolicy {
    fn default() -> Self {
        Self {
            rule_non_finite: EnumNonFiniteRule::Error,
            nan_str: "NaN".to_string(),
            posinf_str: "Inf".to_string(),
            neginf_str: "-Inf".to_string(),
        }
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy for the worksheet `<cols>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Options for one table-to-workbook conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxConvertOptions {
    /// Resolve one semantic type per column; `false` keeps per-cell typing.
    pub should_infer_types: bool,
    /// Worksheet name (sanitised before use).
    pub sheet_name: String,
    /// Override for the date-only pattern.
    pub date_format: Option<String>,
    /// Override for the date-time pattern.
    pub datetime_format: Option<String>,
    /// Override for the integer pattern.
    pub integer_format: Option<String>,
    /// Override for the decimal pattern.
    pub float_format: Option<String>,
    /// Write column names as the first row.
    pub if_write_header: bool,
    /// Frozen row count; defaults to the header height when `None`.
    pub row_freeze: Option<usize>,
    /// Frozen column count.
    pub col_freeze: usize,
    /// Non-finite float handling.
    pub value_policy: SpecXlsxValuePolicy,
    /// Column width inference.
    pub policy_autofit: SpecAutofitCellsPolicy,
}

impl Default for SpecXlsxConvertOptions {
    fn default() -> Self {
        Self {
            should_infer_types: true,
            sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
            date_format: None,
            datetime_format: None,
            integer_format: None,
            float_format: None,
            if_write_header: false,
            row_freeze: None,
            col_freeze: 0,
            value_policy: SpecXlsxValuePolicy::default(),
            policy_autofit: SpecAutofitCellsPolicy::default(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Result alias for conversion calls.
pub type Result<T> = std::result::Result<T, XlsxConvertError>;

/// Conversion failure: structural validation or archive encoding.
#[derive(Error, Debug)]
pub enum XlsxConvertError {
    /// Table has zero columns.
    #[error("Validation error: table has no columns")]
    EmptyTable,

    /// Columns have different row counts.
    #[error(
        "Validation error: column {name:?} (index {col}) has {found} rows, expected {expected}"
    )]
    ColumnLengthMismatch {
        /// Zero-based column index.
        col: usize,
        /// Column name.
        name: String,
        /// Row count of the first column.
        expected: usize,
        /// Row count of this column.
        found: usize,
    },

    /// Same column name used more than once.
    #[error("Validation error: duplicate column names detected: {0}")]
    DuplicateColumnName(String),

    /// Column name is empty or whitespace only.
    #[error("Validation error: column at index {0} has an empty name")]
    EmptyColumnName(usize),

    /// Options are inconsistent.
    #[error("Validation error: {0}")]
    InvalidOption(String),

    /// Distinct column names become equal after normalization.
    #[error("Encoding error: column names {first:?} and {second:?} collide as {normalized:?}")]
    ColumnNameCollision {
        /// First column name as given.
        first: String,
        /// Second column name as given.
        second: String,
        /// Shared normalized form.
        normalized: String,
    },

    /// A worksheet or part limit was exceeded.
    #[error("Encoding error: {what} limit exceeded ({found} > {limit})")]
    LimitExceeded {
        /// Limited quantity.
        what: &'static str,
        /// Maximum allowed.
        limit: usize,
        /// Requested amount.
        found: usize,
    },

    /// Cell value cannot be stored in the archive.
    #[error("Encoding error: unrepresentable value at row {row}, column {col}: {reason}")]
    UnrepresentableValue {
        /// Zero-based table row index.
        row: usize,
        /// Zero-based column index.
        col: usize,
        /// Description of the problem.
        reason: String,
    },

    /// Text cell longer than the per-cell limit.
    #[error("Encoding error: text at row {row}, column {col} has {len} chars (max {limit})")]
    TextTooLong {
        /// Zero-based table row index.
        row: usize,
        /// Zero-based column index.
        col: usize,
        /// Character count.
        len: usize,
        /// Maximum allowed.
        limit: usize,
    },

    /// ZIP archive could not be finalized.
    #[error("Encoding error: archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Writing into the in-memory archive failed.
    #[error("Encoding error: IO: {0}")]
    Io(#[from] std::io::Error),

    /// Boundary input (e.g. DataFrame bytes) could not be read.
    #[error("Validation error: input: {0}")]
    Input(String),
}

impl XlsxConvertError {
    /// Whether the error was raised before any archive work began.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyTable
                | Self::ColumnLengthMismatch { .. }
                | Self::DuplicateColumnName(_)
                | Self::EmptyColumnName(_)
                | Self::InvalidOption(_)
                | Self::Input(_)
        )
    }

    /// Whether the error was raised while building the archive.
    pub fn is_encoding(&self) -> bool {
        !self.is_validation()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

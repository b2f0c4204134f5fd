//! `tablekit_io_xlsx` v1:
//! Rust-side table-to-XLSX conversion kernel.
//!
//! Architecture:
//! - `conf`           : constants and default presets
//! - `spec`           : table model, options, errors
//! - `cell`           : raw-value classification and serial dates
//! - `infer`          : per-column type inference
//! - `style`          : deduplicated number/cell formats
//! - `shared_strings` : shared-string table
//! - `sheet`          : worksheet part builder
//! - `writer`         : ZIP container writer
//! - `convert`        : public conversion entry point
//! - `frame`          : polars DataFrame boundary
//! - `util`           : pure helper functions
pub mod cell;
pub mod conf;
pub mod convert;
pub mod frame;
pub mod infer;
pub mod shared_strings;
pub mod sheet;
pub mod spec;
pub mod style;
pub mod util;
pub mod writer;

pub use cell::{classify_raw_text, derive_date_serial, derive_datetime_serial};
pub use conf::{
    N_LEN_EXCEL_CELL_TEXT_MAX, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    TUP_EXCEL_ILLEGAL, derive_default_xlsx_convert_options,
};
pub use convert::{convert, convert_with_report};
pub use frame::{
    convert_dataframe, derive_dataframe_from_ipc_bytes, derive_table_from_dataframe,
    derive_table_from_ipc_bytes,
};
pub use infer::{derive_column_types, infer_column_type};
pub use shared_strings::SharedStringTable;
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumColumnType, EnumNonFiniteRule, Result,
    SpecAutofitCellsPolicy, SpecColumn, SpecStyleRecord, SpecTable, SpecXlsxConvertOptions,
    SpecXlsxReport, SpecXlsxValuePolicy, XlsxConvertError,
};
pub use style::{SpecFormatPatterns, StyleRegistry};
pub use util::sanitize_sheet_name;
pub use writer::XlsxWriter;

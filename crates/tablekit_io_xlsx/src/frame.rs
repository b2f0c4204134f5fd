//! polars `DataFrame` boundary: maps dynamic column values into [`SpecTable`].

use std::io::Cursor;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use polars::prelude::{AnyValue, Column, DataFrame, IpcReader, SerReader, TimeUnit};
use tracing::warn;

use crate::cell::parse_fixed_offset;
use crate::conf::C_LOG_TARGET;
use crate::convert::convert;
use crate::spec::{
    EnumCellValue, Result, SpecColumn, SpecTable, SpecXlsxConvertOptions, XlsxConvertError,
};

const N_DAYS_CE_TO_UNIX_EPOCH: i32 = 719_163;

/// Read an IPC-serialized DataFrame.
pub fn derive_dataframe_from_ipc_bytes(v_ipc_df: &[u8]) -> Result<DataFrame> {
    IpcReader::new(Cursor::new(v_ipc_df))
        .finish()
        .map_err(|err| XlsxConvertError::Input(format!("Failed to read IPC dataframe: {err}")))
}

/// Map every column of `df` into a table, keeping column order and names.
pub fn derive_table_from_dataframe(df: &DataFrame) -> Result<SpecTable> {
    let l_columns = df
        .get_columns()
        .iter()
        .map(derive_spec_column)
        .collect::<Result<Vec<_>>>()?;
    Ok(SpecTable::new(l_columns))
}

/// Read IPC bytes and map them into a table.
pub fn derive_table_from_ipc_bytes(v_ipc_df: &[u8]) -> Result<SpecTable> {
    derive_table_from_dataframe(&derive_dataframe_from_ipc_bytes(v_ipc_df)?)
}

/// Convert a DataFrame straight into workbook bytes.
pub fn convert_dataframe(df: &DataFrame, options: &SpecXlsxConvertOptions) -> Result<Vec<u8>> {
    convert(&derive_table_from_dataframe(df)?, options)
}

fn derive_spec_column(col: &Column) -> Result<SpecColumn> {
    let c_name = col.name().as_str();
    let mut tracker = SpecLossTracker::default();
    let mut l_values = Vec::with_capacity(col.len());
    for n_idx_row in 0..col.len() {
        let value = col.get(n_idx_row).map_err(|err| {
            XlsxConvertError::Input(format!(
                "Failed to access cell value at row {n_idx_row} of column {c_name:?}: {err}"
            ))
        })?;
        l_values.push(derive_cell_value_from_any_value(value, &mut tracker));
    }

    if tracker.if_display_fallback {
        warn!(
            target: C_LOG_TARGET,
            column = c_name,
            dtype = %col.dtype(),
            "unsupported dtype written as text"
        );
    }
    if let Some(c_zone) = tracker.time_zone_fallback {
        warn!(
            target: C_LOG_TARGET,
            column = c_name,
            time_zone = %c_zone,
            "time zone not a fixed offset; written as UTC"
        );
    }

    Ok(SpecColumn {
        name: c_name.to_string(),
        values: l_values,
    })
}

#[derive(Default)]
struct SpecLossTracker {
    if_display_fallback: bool,
    time_zone_fallback: Option<String>,
}

fn derive_cell_value_from_any_value(
    value: AnyValue<'_>,
    tracker: &mut SpecLossTracker,
) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::Empty,
        AnyValue::String(val) => EnumCellValue::Text(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::Text(val.to_string()),
        AnyValue::Boolean(val) => EnumCellValue::Boolean(val),
        AnyValue::UInt8(val) => EnumCellValue::Integer(i64::from(val)),
        AnyValue::UInt16(val) => EnumCellValue::Integer(i64::from(val)),
        AnyValue::UInt32(val) => EnumCellValue::Integer(i64::from(val)),
        AnyValue::UInt64(val) => match i64::try_from(val) {
            Ok(n) => EnumCellValue::Integer(n),
            Err(_) => EnumCellValue::Float(val as f64),
        },
        AnyValue::Int8(val) => EnumCellValue::Integer(i64::from(val)),
        AnyValue::Int16(val) => EnumCellValue::Integer(i64::from(val)),
        AnyValue::Int32(val) => EnumCellValue::Integer(i64::from(val)),
        AnyValue::Int64(val) => EnumCellValue::Integer(val),
        AnyValue::Int128(val) => match i64::try_from(val) {
            Ok(n) => EnumCellValue::Integer(n),
            Err(_) => EnumCellValue::Float(val as f64),
        },
        AnyValue::Float32(val) => EnumCellValue::Float(f64::from(val)),
        AnyValue::Float64(val) => EnumCellValue::Float(val),
        AnyValue::Date(n_days) => match derive_date_from_unix_days(n_days) {
            Some(date) => EnumCellValue::Date(date),
            None => derive_display_fallback(&value, tracker),
        },
        AnyValue::Datetime(n_ts, unit, tz) => {
            derive_datetime_value(n_ts, unit, tz.map(|tz| tz.as_str()), tracker)
                .unwrap_or_else(|| derive_display_fallback(&value, tracker))
        }
        AnyValue::DatetimeOwned(n_ts, unit, ref tz) => {
            derive_datetime_value(n_ts, unit, tz.as_ref().map(|tz| tz.as_str()), tracker)
                .unwrap_or_else(|| derive_display_fallback(&value, tracker))
        }
        _ => derive_display_fallback(&value, tracker),
    }
}

fn derive_display_fallback(value: &AnyValue<'_>, tracker: &mut SpecLossTracker) -> EnumCellValue {
    tracker.if_display_fallback = true;
    EnumCellValue::Text(value.to_string())
}

fn derive_date_from_unix_days(n_days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(N_DAYS_CE_TO_UNIX_EPOCH.checked_add(n_days)?)
}

fn derive_utc_from_timestamp(n_ts: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(n_ts)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(n_ts),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(n_ts),
    }
}

/// Fixed offset for a polars time-zone name; named zones resolve to UTC.
///
/// The flag is `true` when the name was not a fixed offset.
pub fn derive_offset_from_time_zone(name: &str) -> (FixedOffset, bool) {
    match parse_fixed_offset(name) {
        Some(offset) => (offset, false),
        None => (Utc.fix(), true),
    }
}

fn derive_datetime_value(
    n_ts: i64,
    unit: TimeUnit,
    tz: Option<&str>,
    tracker: &mut SpecLossTracker,
) -> Option<EnumCellValue> {
    let dt_utc = derive_utc_from_timestamp(n_ts, unit)?;
    let Some(c_zone) = tz else {
        return Some(EnumCellValue::datetime_naive(dt_utc.naive_utc()));
    };

    let (offset, if_fallback) = derive_offset_from_time_zone(c_zone);
    if if_fallback && tracker.time_zone_fallback.is_none() {
        tracker.time_zone_fallback = Some(c_zone.to_string());
    }
    Some(EnumCellValue::datetime_with_offset(
        dt_utc.with_timezone(&offset),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::prelude::{DataType, IpcWriter, SerWriter};

    use super::*;
    use crate::spec::EnumColumnType;

    #[test]
    fn dataframe_columns_map_to_cell_values() {
        let df = DataFrame::new(vec![
            Column::new("i".into(), &[Some(1i64), None]),
            Column::new("f".into(), &[1.5f64, 2.0]),
            Column::new("s".into(), &["a", "b"]),
            Column::new("b".into(), &[true, false]),
            Column::new("u".into(), &[u64::MAX, 1]),
        ])
        .expect("dataframe");
        let table = derive_table_from_dataframe(&df).expect("table");
        assert_eq!(table.column_names(), vec!["i", "f", "s", "b", "u"]);
        let l_cols = table.columns();
        assert_eq!(
            l_cols[0].values,
            vec![EnumCellValue::Integer(1), EnumCellValue::Empty]
        );
        assert_eq!(l_cols[1].values[0], EnumCellValue::Float(1.5));
        assert_eq!(l_cols[2].values[1], EnumCellValue::Text("b".to_string()));
        assert_eq!(l_cols[3].values[0], EnumCellValue::Boolean(true));
        assert_eq!(l_cols[4].values[0], EnumCellValue::Float(u64::MAX as f64));
        assert_eq!(l_cols[4].values[1], EnumCellValue::Integer(1));
    }

    #[test]
    fn temporal_columns_keep_wall_clock() {
        let col_date = Column::new("d".into(), &[19_737i32])
            .cast(&DataType::Date)
            .expect("date");
        let col_dt = Column::new("t".into(), &[1_705_312_800_000i64])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .expect("datetime");
        let df = DataFrame::new(vec![col_date, col_dt]).expect("dataframe");
        let table = derive_table_from_dataframe(&df).expect("table");

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).expect("date");
        assert_eq!(table.columns()[0].values[0], EnumCellValue::Date(date));
        assert_eq!(
            table.columns()[1].values[0],
            EnumCellValue::datetime_naive(date.and_hms_opt(10, 0, 0).expect("time"))
        );
    }

    #[test]
    fn named_zones_fall_back_to_utc() {
        let (offset, if_fallback) = derive_offset_from_time_zone("+08:00");
        assert_eq!(offset.local_minus_utc(), 8 * 3600);
        assert!(!if_fallback);
        let (offset, if_fallback) = derive_offset_from_time_zone("Europe/Paris");
        assert_eq!(offset.local_minus_utc(), 0);
        assert!(if_fallback);

        let mut tracker = SpecLossTracker::default();
        let value = derive_datetime_value(
            1_705_276_800_000,
            TimeUnit::Milliseconds,
            Some("+08:00"),
            &mut tracker,
        )
        .expect("value");
        match value {
            EnumCellValue::DateTime { value, offset } => {
                assert_eq!(value.to_string(), "2024-01-15 08:00:00");
                assert_eq!(offset.map(|o| o.local_minus_utc()), Some(8 * 3600));
            }
            other => panic!("expected datetime, got {other:?}"),
        }
        assert!(tracker.time_zone_fallback.is_none());
    }

    #[test]
    fn ipc_bytes_round_trip_into_workbook() {
        let mut df = DataFrame::new(vec![
            Column::new("n".into(), &[1i64, 2]),
            Column::new("t".into(), &["x", "y"]),
        ])
        .expect("dataframe");
        let mut v_ipc = Vec::new();
        IpcWriter::new(&mut v_ipc).finish(&mut df).expect("ipc");

        let table = derive_table_from_ipc_bytes(&v_ipc).expect("table");
        assert_eq!(
            crate::infer::derive_column_types(&table),
            vec![EnumColumnType::Integer, EnumColumnType::Text]
        );
        let v_bytes = convert_dataframe(&df, &SpecXlsxConvertOptions::default()).expect("xlsx");
        assert_eq!(&v_bytes[..2], b"PK");
    }

    #[test]
    fn garbage_ipc_is_an_input_error() {
        let err = derive_table_from_ipc_bytes(b"not ipc").expect_err("garbage");
        assert!(err.is_validation());
    }
}

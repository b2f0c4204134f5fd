use std::sync::Arc;

use arrow::array::{StructArray, TryExtend};
use arrow::datatypes::{ArrowDataType, ArrowSchema, Field as ArrowField};
use arrow::record_batch::RecordBatchT;
use polars::prelude::DataFrame;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::ffi as pyffi;
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBytes};
use tablekit_io_xlsx::conf::{C_LOG_TARGET, derive_default_xlsx_convert_options};
use tablekit_io_xlsx::convert_dataframe;
use tablekit_io_xlsx::spec::{
    EnumAutofitColumnsRule, EnumNonFiniteRule, SpecAutofitCellsPolicy, SpecXlsxConvertOptions,
    SpecXlsxValuePolicy, XlsxConvertError,
};
use tracing::debug;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "tablekit.xlsx.convert.v1";
const C_BRIDGE_TRANSPORT: &str = "arrow_c_data";
const C_ARROW_ARRAY_STREAM_CAPSULE_NAME: &[u8] = b"arrow_array_stream\0";

/// Convert a DataFrame-like object into the bytes of an `.xlsx` workbook.
///
/// Anything `polars.DataFrame(...)` accepts is allowed. Validation failures
/// raise `ValueError`; encoding failures raise `RuntimeError`.
#[pyfunction]
#[pyo3(signature = (
    df,
    should_infer_types = true,
    sheet_name = None,
    date_format = None,
    datetime_format = None,
    integer_format = None,
    float_format = None,
    if_write_header = false,
    row_freeze = None,
    col_freeze = 0,
    value_policy = None,
    policy_autofit = None
))]
#[allow(clippy::too_many_arguments)]
fn df_to_xlsx<'py>(
    py: Python<'py>,
    df: &Bound<'py, PyAny>,
    should_infer_types: bool,
    sheet_name: Option<String>,
    date_format: Option<String>,
    datetime_format: Option<String>,
    integer_format: Option<String>,
    float_format: Option<String>,
    if_write_header: bool,
    row_freeze: Option<usize>,
    col_freeze: usize,
    value_policy: Option<&Bound<'py, PyAny>>,
    policy_autofit: Option<&Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyBytes>> {
    let df_data = derive_dataframe_from_any_dataframe(py, df)?;

    let mut cfg_options = derive_default_xlsx_convert_options();
    cfg_options.should_infer_types = should_infer_types;
    if let Some(c_sheet_name) = sheet_name {
        cfg_options.sheet_name = c_sheet_name;
    }
    cfg_options.date_format = date_format;
    cfg_options.datetime_format = datetime_format;
    cfg_options.integer_format = integer_format;
    cfg_options.float_format = float_format;
    cfg_options.if_write_header = if_write_header;
    cfg_options.row_freeze = row_freeze;
    cfg_options.col_freeze = col_freeze;
    if let Some(policy) = parse_spec_xlsx_value_policy(value_policy)? {
        cfg_options.value_policy = policy;
    }
    if let Some(policy) = parse_spec_autofit_cells_policy(policy_autofit)? {
        cfg_options.policy_autofit = policy;
    }

    debug!(
        target: C_LOG_TARGET,
        rows = df_data.height(),
        cols = df_data.width(),
        "df_to_xlsx called from Python"
    );
    let v_bytes = run_convert(py, &df_data, &cfg_options)?;
    Ok(PyBytes::new(py, &v_bytes))
}

fn run_convert(
    py: Python<'_>,
    df: &DataFrame,
    options: &SpecXlsxConvertOptions,
) -> PyResult<Vec<u8>> {
    py.allow_threads(|| convert_dataframe(df, options))
        .map_err(derive_py_err)
}

fn derive_py_err(err: XlsxConvertError) -> PyErr {
    if err.is_validation() {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

fn derive_dataframe_from_any_dataframe(
    py: Python<'_>,
    df: &Bound<'_, PyAny>,
) -> PyResult<DataFrame> {
    let df_polars = convert_to_polars_dataframe(py, df)?;
    let obj_capsule = df_polars.call_method0("__arrow_c_stream__")?;
    derive_dataframe_from_arrow_c_stream_capsule(&obj_capsule)
}

fn derive_dataframe_from_arrow_c_stream_capsule(
    obj_capsule: &Bound<'_, PyAny>,
) -> PyResult<DataFrame> {
    let ptr_capsule = obj_capsule.as_ptr();
    let ptr_stream_name = C_ARROW_ARRAY_STREAM_CAPSULE_NAME
        .as_ptr()
        .cast::<std::os::raw::c_char>();

    // Safety: We only pass pointers owned by the Python object for validation.
    let if_valid_capsule = unsafe { pyffi::PyCapsule_IsValid(ptr_capsule, ptr_stream_name) };
    if if_valid_capsule == 0 {
        return Err(PyValueError::new_err(
            "Expected a valid `arrow_array_stream` PyCapsule.",
        ));
    }

    // Safety: Capsule name was validated as `arrow_array_stream` above.
    let ptr_stream = unsafe { pyffi::PyCapsule_GetPointer(ptr_capsule, ptr_stream_name) };
    if ptr_stream.is_null() {
        return Err(PyValueError::new_err(
            "Arrow C stream capsule pointer is null.",
        ));
    }

    let stream = ptr_stream.cast::<arrow::ffi::ArrowArrayStream>();
    // Safety: `stream` points to a live ArrowArrayStream owned by the capsule.
    let mut reader = unsafe { arrow::ffi::ArrowArrayStreamReader::try_new(&mut *stream) }
        .map_err(|err| PyValueError::new_err(format!("Failed to open Arrow C stream: {err}")))?;

    let schema_arrow = derive_arrow_schema_from_stream_field(reader.field())?;
    let schema_ref = Arc::new(schema_arrow.clone());
    let mut df = DataFrame::empty_with_arrow_schema(&schema_arrow);

    while let Some(res_array) = unsafe { reader.next() } {
        let array_row_batch = res_array.map_err(|err| {
            PyValueError::new_err(format!("Failed to read Arrow stream batch: {err}"))
        })?;

        let array_struct = array_row_batch
            .as_any()
            .downcast_ref::<StructArray>()
            .ok_or_else(|| {
                PyValueError::new_err(
                    "Arrow C stream must yield StructArray batches for DataFrame import.",
                )
            })?;

        let l_arrays = array_struct.values().to_vec();
        let record_batch = RecordBatchT::try_new(array_struct.len(), schema_ref.clone(), l_arrays)
            .map_err(|err| {
                PyValueError::new_err(format!(
                    "Failed to construct Arrow record batch from stream: {err}"
                ))
            })?;

        df.try_extend(std::iter::once(record_batch))
            .map_err(|err| {
                PyValueError::new_err(format!(
                    "Failed to append Arrow record batch to DataFrame: {err}"
                ))
            })?;
    }

    Ok(df)
}

fn derive_arrow_schema_from_stream_field(field: &ArrowField) -> PyResult<ArrowSchema> {
    match field.dtype() {
        ArrowDataType::Struct(fields) => Ok(fields
            .iter()
            .cloned()
            .map(|field_inner| (field_inner.name.clone(), field_inner))
            .collect::<ArrowSchema>()),
        dtype => Err(PyValueError::new_err(format!(
            "Arrow stream schema must be Struct, got: {dtype:?}"
        ))),
    }
}

fn parse_rule_non_finite(value: &str) -> PyResult<EnumNonFiniteRule> {
    match value {
        "error" => Ok(EnumNonFiniteRule::Error),
        "blank" => Ok(EnumNonFiniteRule::Blank),
        "text" => Ok(EnumNonFiniteRule::Text),
        _ => Err(PyValueError::new_err(
            "value_policy.rule_non_finite must be one of: 'error', 'blank', 'text'.",
        )),
    }
}

fn parse_spec_xlsx_value_policy(
    obj: Option<&Bound<'_, PyAny>>,
) -> PyResult<Option<SpecXlsxValuePolicy>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    if obj.is_none() {
        return Ok(None);
    }

    let mut policy = SpecXlsxValuePolicy::default();
    if let Some(v) = extract_optional_attr::<String>(obj, "rule_non_finite")? {
        policy.rule_non_finite = parse_rule_non_finite(&v)?;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "nan_str")? {
        policy.nan_str = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "posinf_str")? {
        policy.posinf_str = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "neginf_str")? {
        policy.neginf_str = v;
    }

    Ok(Some(policy))
}

fn parse_rule_autofit_columns(value: &str) -> PyResult<EnumAutofitColumnsRule> {
    match value {
        "none" => Ok(EnumAutofitColumnsRule::None),
        "header" => Ok(EnumAutofitColumnsRule::Header),
        "body" => Ok(EnumAutofitColumnsRule::Body),
        "all" => Ok(EnumAutofitColumnsRule::All),
        _ => Err(PyValueError::new_err(
            "policy_autofit.rule_columns must be one of: 'none', 'header', 'body', 'all'.",
        )),
    }
}

fn parse_spec_autofit_cells_policy(
    obj: Option<&Bound<'_, PyAny>>,
) -> PyResult<Option<SpecAutofitCellsPolicy>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    if obj.is_none() {
        return Ok(None);
    }

    let mut policy = SpecAutofitCellsPolicy::default();

    if let Some(v) = extract_optional_attr::<String>(obj, "rule_columns")? {
        policy.rule_columns = parse_rule_autofit_columns(&v)?;
    }
    if obj.hasattr("height_body_inferred_max")? {
        let val = obj.getattr("height_body_inferred_max")?;
        if val.is_none() {
            policy.height_body_inferred_max = None;
        } else {
            policy.height_body_inferred_max = Some(val.extract::<usize>()?);
        }
    }
    if let Some(v) = extract_optional_attr::<usize>(obj, "width_cell_min")? {
        policy.width_cell_min = v;
    }
    if let Some(v) = extract_optional_attr::<usize>(obj, "width_cell_max")? {
        policy.width_cell_max = v;
    }
    if let Some(v) = extract_optional_attr::<usize>(obj, "width_cell_padding")? {
        policy.width_cell_padding = v;
    }

    Ok(Some(policy))
}

fn convert_to_polars_dataframe<'py>(
    py: Python<'py>,
    df: &Bound<'py, PyAny>,
) -> PyResult<Bound<'py, PyAny>> {
    let module_polars = py.import("polars")?;
    let cls_dataframe = module_polars.getattr("DataFrame")?;

    if df.is_instance(&cls_dataframe)? {
        return Ok(df.clone());
    }

    cls_dataframe.call1((df,))
}

fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let val = obj.getattr(attr)?;
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

#[pymodule]
fn _tablekit_io_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(df_to_xlsx, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}

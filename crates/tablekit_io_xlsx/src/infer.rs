//! Column type inference.

use std::collections::BTreeSet;

use tracing::trace;

use crate::conf::C_LOG_TARGET;
use crate::spec::{EnumCellValue, EnumColumnType, SpecTable};

/// Resolve one semantic type for a column of cells.
///
/// - all non-empty cells share a type: that type
/// - only Integer and Float cells: Float
/// - cells present but all empty: Text
/// - zero cells, or any other disagreement: Mixed
///
/// Inference never fails.
pub fn infer_column_type(values: &[EnumCellValue]) -> EnumColumnType {
    if values.is_empty() {
        return EnumColumnType::Mixed;
    }

    let set_types: BTreeSet<EnumColumnType> =
        values.iter().filter_map(EnumCellValue::column_type).collect();

    let mut iter_types = set_types.iter().copied();
    match (iter_types.next(), iter_types.next(), iter_types.next()) {
        (None, _, _) => EnumColumnType::Text,
        (Some(only), None, _) => only,
        (Some(EnumColumnType::Integer), Some(EnumColumnType::Float), None) => {
            EnumColumnType::Float
        }
        _ => EnumColumnType::Mixed,
    }
}

/// Infer every column of `table`, in column order.
pub fn derive_column_types(table: &SpecTable) -> Vec<EnumColumnType> {
    table
        .columns()
        .iter()
        .map(|col| {
            let rule_type = infer_column_type(&col.values);
            trace!(
                target: C_LOG_TARGET,
                column = %col.name,
                inferred = %rule_type,
                "column type inferred"
            );
            rule_type
        })
        .collect()
}

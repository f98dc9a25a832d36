//! Parquet: the schema comes from the footer at the end of the file.

use super::Extraction;
use crate::error::{Result, ScoutError};
use ::parquet::arrow::parquet_to_arrow_schema;
use ::parquet::file::metadata::ParquetMetaDataReader;
use arrow::datatypes::DataType;
use blobscout_protocol::{ColumnDescriptor, InferredType, SchemaDescriptor};

const MAGIC: &[u8; 4] = b"PAR1";
/// Metadata length (u32 LE) followed by the magic.
const FOOTER_LEN: usize = 8;

/// Decode the file metadata from a tail window.
///
/// The window must contain the whole footer; a footer larger than the window
/// is reported as an error and degrades to an unknown schema.
pub(super) fn extract(tail: &[u8]) -> Result<Extraction> {
    if tail.len() < FOOTER_LEN || &tail[tail.len() - 4..] != MAGIC {
        return Err(ScoutError::SchemaInference(
            "sample does not end with the parquet magic".to_string(),
        ));
    }

    let len_bytes: [u8; 4] = tail[tail.len() - FOOTER_LEN..tail.len() - 4]
        .try_into()
        .map_err(|_| ScoutError::SchemaInference("bad parquet footer".to_string()))?;
    let metadata_len = u32::from_le_bytes(len_bytes) as usize;
    let available = tail.len() - FOOTER_LEN;
    if metadata_len > available {
        return Err(ScoutError::SchemaInference(format!(
            "parquet footer is {} bytes, sample window holds {}",
            metadata_len, available
        )));
    }

    let metadata = ParquetMetaDataReader::decode_metadata(&tail[available - metadata_len..available])?;
    let file = metadata.file_metadata();
    let arrow_schema = parquet_to_arrow_schema(file.schema_descr(), file.key_value_metadata())?;

    let columns: Vec<ColumnDescriptor> = arrow_schema
        .fields()
        .iter()
        .map(|field| {
            ColumnDescriptor::new(field.name().as_str(), map_type(field.data_type()))
                .with_nullable(field.is_nullable())
        })
        .collect();

    let num_rows = u64::try_from(file.num_rows()).ok();
    let mut schema = SchemaDescriptor::from_columns(columns, num_rows)
        .with_format_detail("row_groups", metadata.num_row_groups() as u64)
        .with_format_detail("format_version", file.version());
    if let Some(created_by) = file.created_by() {
        schema = schema.with_format_detail("created_by", created_by);
    }

    Ok(Extraction {
        schema,
        column_values: Vec::new(),
        degraded: None,
    })
}

fn map_type(data_type: &DataType) -> InferredType {
    match data_type {
        DataType::Null => InferredType::Null,
        DataType::Boolean => InferredType::Bool,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => InferredType::Int64,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => InferredType::Double,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => InferredType::Date,
        DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _) => {
            InferredType::array_of(map_type(item.data_type()))
        }
        DataType::Struct(_) | DataType::Map(_, _) => InferredType::Object,
        DataType::Dictionary(_, values) => map_type(values),
        _ => InferredType::String,
    }
}

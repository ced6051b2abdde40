//! Error types for the Fact Normalizer.
//!
//! Every variant is a format error: the uploaded file cannot be turned into
//! canonical facts and no fact-store mutation happens for it.

use thiserror::Error;

/// Result type for ingestion stages
pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The bytes are not a readable spreadsheet or CSV document.
    #[error("Unable to read '{file_name}': {message}")]
    Unreadable { file_name: String, message: String },

    /// The workbook has no worksheet or the first worksheet is blank.
    #[error("'{0}' contains no worksheet data")]
    EmptyWorkbook(String),

    /// No row within the search window carries every expected header.
    #[error("The full list of headers was not found (missing: {})", .missing.join(", "))]
    HeaderNotFound { missing: Vec<String> },

    /// A column the stage depends on is absent from the located table.
    #[error("Required column '{0}' is absent")]
    MissingColumn(String),

    /// A required cell is empty or cannot be converted to its target type.
    #[error("Row {row}: cannot read '{column}' from value '{value}'")]
    Coercion {
        row: usize,
        column: String,
        value: String,
    },

    /// The table was located but holds no data rows.
    #[error("'{0}' holds no data rows")]
    EmptyImport(String),
}

impl IngestError {
    pub fn unreadable(file_name: impl Into<String>, message: impl ToString) -> Self {
        IngestError::Unreadable {
            file_name: file_name.into(),
            message: message.to_string(),
        }
    }

    pub fn coercion(row: usize, column: impl Into<String>, value: impl Into<String>) -> Self {
        IngestError::Coercion {
            row,
            column: column.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_not_found_lists_missing_headers() {
        let err = IngestError::HeaderNotFound {
            missing: vec!["Тип операции".into(), "№ вагона".into()],
        };
        assert_eq!(
            err.to_string(),
            "The full list of headers was not found (missing: Тип операции, № вагона)"
        );
    }

    #[test]
    fn test_coercion_message_names_row_and_column() {
        let err = IngestError::coercion(7, "Отчётная дата", "yesterday");
        assert_eq!(
            err.to_string(),
            "Row 7: cannot read 'Отчётная дата' from value 'yesterday'"
        );
    }
}

use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by every parse entry point.
///
/// One enum is shared by the normalizer, the workbook reader, the row mapper and the
/// record decoder. Use [`IngestionError::kind`] when only the failure class matters.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error while draining the input stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited text could not be read (unequal field counts, invalid UTF-8, ...).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook bytes could not be opened or a sheet could not be loaded.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// The normalizer failed to build the intermediate workbook.
    #[error("workbook write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Input bytes are not in the expected format.
    #[error("format error: {message}")]
    Format { message: String },

    /// A schema column address cannot be resolved against a workbook grid.
    #[error("cannot access column '{column}' (field '{field}'): {message}")]
    CellAccess {
        column: String,
        field: String,
        message: String,
    },

    /// A mapped row could not be converted into the destination type.
    #[error("failed to decode row {row} of sheet '{sheet}': {message}")]
    Decode {
        sheet: String,
        row: u32,
        message: String,
    },

    /// The schema (or the requested format) is not usable.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// The parallel execution engine could not be set up.
    #[error("execution error: {message}")]
    Execution { message: String },
}

/// Coarse failure class of an [`IngestionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    CellAccess,
    Decode,
    Schema,
    Execution,
}

impl IngestionError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Csv(err) => match err.kind() {
                csv::ErrorKind::Io(_) => ErrorKind::Io,
                _ => ErrorKind::Format,
            },
            Self::Excel(_) | Self::XlsxWrite(_) | Self::Format { .. } => ErrorKind::Format,
            Self::CellAccess { .. } => ErrorKind::CellAccess,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::SchemaMismatch { .. } => ErrorKind::Schema,
            Self::Execution { .. } => ErrorKind::Execution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, IngestionError};

    #[test]
    fn kind_classifies_variants() {
        let io = IngestionError::from(std::io::Error::other("boom"));
        assert_eq!(io.kind(), ErrorKind::Io);

        let decode = IngestionError::Decode {
            sheet: "default".to_string(),
            row: 3,
            message: "invalid type".to_string(),
        };
        assert_eq!(decode.kind(), ErrorKind::Decode);
        assert_eq!(
            decode.to_string(),
            "failed to decode row 3 of sheet 'default': invalid type"
        );

        let format = IngestionError::Format {
            message: "too many columns".to_string(),
        };
        assert_eq!(format.kind(), ErrorKind::Format);
    }
}

//! Unified parse entry points.
//!
//! [`parse_delimited_text`] and [`parse_workbook`] cover the common case. [`parse_source`]
//! and [`parse_path`] take [`IngestionOptions`] for format selection, parallel decoding,
//! strict schema validation and observer reporting.
//!
//! Every entry point appends to the caller's output vector and never replaces it. On
//! failure, records decoded before the failing row stay appended.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{IngestionError, IngestionResult};
use crate::execution::{ExecutionEngine, ExecutionOptions, TracingExecutionObserver};
use crate::types::{CompiledField, FieldKind, Schema};

use super::csv::{normalize_csv_with_options, CsvOptions};
use super::decode::decode_mapped_row;
use super::excel::{Sheet, WorkbookReader};
use super::mapper::{map_row, MappedRow};
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// Comma-delimited text, normalized into a single-sheet workbook first.
    DelimitedText,
    /// Native workbook bytes.
    Workbook,
}

impl IngestionFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::DelimitedText),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Self::Workbook),
            _ => None,
        }
    }

    /// Infer a format from a file name or path such as `"students.csv"`.
    pub fn from_source_name(source: &str) -> Option<Self> {
        Path::new(source)
            .extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
    }
}

/// Options controlling a parse.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// If `None`, the format is inferred from the source name.
    pub format: Option<IngestionFormat>,
    /// Delimited-text options.
    pub csv: CsvOptions,
    /// Decode rows on a thread pool. `None` decodes sequentially.
    pub execution: Option<ExecutionOptions>,
    /// Reject schemas that [`Schema::validate`] flags instead of skipping malformed fields.
    pub strict_schema: bool,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("format", &self.format)
            .field("csv", &self.csv)
            .field("execution", &self.execution)
            .field("strict_schema", &self.strict_schema)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            format: None,
            csv: CsvOptions::default(),
            execution: None,
            strict_schema: false,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

impl IngestionOptions {
    /// Default options with a fixed format.
    pub fn for_format(format: IngestionFormat) -> Self {
        Self {
            format: Some(format),
            ..Default::default()
        }
    }
}

/// Parse comma-delimited text and append one `T` per row to `output`.
///
/// # Examples
///
/// ```rust
/// use rust_sheet_ingest::ingestion::parse_delimited_text;
/// use rust_sheet_ingest::types::{FieldSpec, Schema};
///
/// #[derive(Debug, Default, serde::Deserialize)]
/// #[serde(default)]
/// struct Student {
///     first_name: String,
///     email: String,
/// }
///
/// # fn main() -> Result<(), rust_sheet_ingest::IngestionError> {
/// let schema = Schema::new(
///     true,
///     vec![FieldSpec::new("A", "first_name"), FieldSpec::new("B", "email")],
/// );
/// let csv = "First Name,Email\nAnakin,anakin@x\n";
///
/// let mut students: Vec<Student> = Vec::new();
/// parse_delimited_text(&mut students, csv.as_bytes(), &schema)?;
/// assert_eq!(students[0].first_name, "Anakin");
/// # Ok(())
/// # }
/// ```
pub fn parse_delimited_text<T, R>(output: &mut Vec<T>, input: R, schema: &Schema) -> IngestionResult<()>
where
    T: DeserializeOwned + Send,
    R: Read,
{
    let options = IngestionOptions::for_format(IngestionFormat::DelimitedText);
    parse_source(output, "<delimited text>", input, schema, &options)
}

/// Parse workbook bytes and append one `T` per row, sheet by sheet, to `output`.
pub fn parse_workbook<T, R>(output: &mut Vec<T>, input: R, schema: &Schema) -> IngestionResult<()>
where
    T: DeserializeOwned + Send,
    R: Read,
{
    let options = IngestionOptions::for_format(IngestionFormat::Workbook);
    parse_source(output, "<workbook>", input, schema, &options)
}

/// Parse a file, inferring the format from its extension unless `options.format` is set.
pub fn parse_path<T>(
    output: &mut Vec<T>,
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &IngestionOptions,
) -> IngestionResult<()>
where
    T: DeserializeOwned + Send,
{
    let path = path.as_ref();
    let source = path.display().to_string();
    match File::open(path) {
        Ok(file) => parse_source(output, &source, file, schema, options),
        Err(e) => {
            let err = IngestionError::from(e);
            let format = options.format.or_else(|| IngestionFormat::from_source_name(&source));
            report_failure(options, &context(&source, format, schema), &err);
            Err(err)
        }
    }
}

/// Parse `input` with explicit options.
///
/// `source` labels the input for format inference and observer reports.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with row and sheet counts
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
pub fn parse_source<T, R>(
    output: &mut Vec<T>,
    source: &str,
    input: R,
    schema: &Schema,
    options: &IngestionOptions,
) -> IngestionResult<()>
where
    T: DeserializeOwned + Send,
    R: Read,
{
    let format = options.format.or_else(|| IngestionFormat::from_source_name(source));
    let ctx = context(source, format, schema);

    let before = output.len();
    let result = match format {
        Some(format) => run_parse(output, format, input, schema, options),
        None => Err(IngestionError::SchemaMismatch {
            message: format!("cannot infer input format from source name '{source}'"),
        }),
    };

    match result {
        Ok(sheets) => {
            let stats = IngestionStats {
                rows: output.len() - before,
                sheets,
            };
            if let Some(obs) = options.observer.as_ref() {
                obs.on_success(&ctx, stats);
            }
            Ok(())
        }
        Err(e) => {
            report_failure(options, &ctx, &e);
            Err(e)
        }
    }
}

fn context(source: &str, format: Option<IngestionFormat>, schema: &Schema) -> IngestionContext {
    IngestionContext {
        source: source.to_string(),
        format,
        schema_type: schema.schema_type.clone(),
        schema_version: schema.version.clone(),
    }
}

fn report_failure(options: &IngestionOptions, ctx: &IngestionContext, error: &IngestionError) {
    if let Some(obs) = options.observer.as_ref() {
        let sev = IngestionSeverity::for_error(error);
        obs.on_failure(ctx, sev, error);
        if sev >= options.alert_at_or_above {
            obs.on_alert(ctx, sev, error);
        }
    }
}

/// Normalize → read → map → decode. Returns the number of sheets read.
fn run_parse<T, R>(
    output: &mut Vec<T>,
    format: IngestionFormat,
    mut input: R,
    schema: &Schema,
    options: &IngestionOptions,
) -> IngestionResult<usize>
where
    T: DeserializeOwned + Send,
    R: Read,
{
    if options.strict_schema {
        schema.validate()?;
    }
    let fields = schema.compile()?;
    warn_malformed(&fields);

    let engine = options
        .execution
        .clone()
        .map(|opts| ExecutionEngine::new(opts).map(|e| e.with_observer(Arc::new(TracingExecutionObserver))))
        .transpose()?;

    let bytes = match format {
        IngestionFormat::DelimitedText => normalize_csv_with_options(input, &options.csv)?,
        IngestionFormat::Workbook => {
            let mut bytes = Vec::new();
            input.read_to_end(&mut bytes)?;
            bytes
        }
    };

    // Load every sheet before the first row is decoded so a corrupt sheet leaves the
    // output untouched.
    let sheets = WorkbookReader::from_bytes(bytes, schema.headers)?.collect::<IngestionResult<Vec<Sheet>>>()?;

    for sheet in &sheets {
        let before = output.len();
        let name: Arc<str> = Arc::from(sheet.name());
        let mapped = sheet.rows().map(|row| MappedRow {
            sheet: Arc::clone(&name),
            row: row.index(),
            values: map_row(&row, &fields),
        });

        match &engine {
            None => {
                for row in mapped {
                    output.push(decode_mapped_row(row)?);
                }
            }
            Some(engine) => {
                for decoded in engine.decode_rows::<T>(mapped.collect()) {
                    output.push(decoded?);
                }
            }
        }

        tracing::debug!(
            sheet = %name,
            rows = output.len() - before,
            skip_header = schema.headers,
            "sheet decoded"
        );
    }

    Ok(sheets.len())
}

fn warn_malformed(fields: &[CompiledField]) {
    for field in fields {
        if let FieldKind::Malformed { name } = &field.kind {
            tracing::warn!(
                column = %field.column_ref,
                name = %name,
                "map field name is not 'group.key'; field is skipped"
            );
        }
    }
}

/// Convenience helper for callers that want an owned request object.
///
/// This can be useful if you want to enqueue parse work in a job system.
#[derive(Clone)]
pub struct IngestionRequest {
    /// Label for the input; also used for format inference.
    pub source: String,
    /// Raw input bytes.
    pub bytes: Vec<u8>,
    /// Mapping schema.
    pub schema: Schema,
    /// Options controlling the parse.
    pub options: IngestionOptions,
}

impl fmt::Debug for IngestionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionRequest")
            .field("source", &self.source)
            .field("bytes_len", &self.bytes.len())
            .field("schema_fields", &self.schema.fields.len())
            .field("options", &self.options)
            .finish()
    }
}

impl IngestionRequest {
    /// Execute the request by calling [`parse_source`] into a fresh vector.
    pub fn run<T>(&self) -> IngestionResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut out = Vec::new();
        parse_source(&mut out, &self.source, self.bytes.as_slice(), &self.schema, &self.options)?;
        Ok(out)
    }
}

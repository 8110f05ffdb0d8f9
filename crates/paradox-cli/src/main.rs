use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use paradox_format::{Encoding, OpenOptions, ParadoxTable, TableSchema};
use paradox_query::{Catalog, EvalContext, Expr, Predicate, QuerySpec, Row, TableRef, Value};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pdx-dump", about = "Print the schema and rows of a Paradox table")]
struct Args {
    /// Table file (.DB). A companion .MB file next to it is used for memo and blob fields.
    input: PathBuf,

    /// Print the schema and advisories only.
    #[arg(long)]
    schema: bool,

    /// Columns to print, comma-separated (default: all).
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Keep rows whose column matches a LIKE pattern (`%` any run, `?` one character).
    #[arg(long = "where-like", value_name = "COLUMN=PATTERN")]
    where_like: Option<String>,

    /// Drop duplicate output rows.
    #[arg(long)]
    distinct: bool,

    /// Stop after this many rows.
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Encoding label overriding the table's code page (e.g. `windows-1250`).
    #[arg(long)]
    encoding: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Tab-separated with a header line.
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct SchemaReport {
    table: String,
    version: u8,
    record_size: usize,
    block_size: usize,
    row_count: u32,
    encoding: &'static str,
    fields: Vec<FieldReport>,
    advisories: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FieldReport {
    name: String,
    field_type: &'static str,
    size: u8,
    kind: String,
}

impl SchemaReport {
    fn new(schema: &TableSchema) -> Self {
        SchemaReport {
            table: schema.name().to_string(),
            version: schema.version(),
            record_size: schema.record_size(),
            block_size: schema.block_size(),
            row_count: schema.row_count(),
            encoding: schema.encoding().name(),
            fields: schema
                .fields()
                .iter()
                .map(|field| FieldReport {
                    name: field.name.clone(),
                    field_type: field.field_type.name(),
                    size: field.declared_size,
                    kind: field.value_kind().to_string(),
                })
                .collect(),
            advisories: schema
                .advisories()
                .iter()
                .map(|advisory| advisory.message.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DumpOutput {
    schema: SchemaReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = open_options(args.encoding.as_deref())?;
    let table = ParadoxTable::open(&args.input, &options)
        .with_context(|| format!("open table {}", args.input.display()))?;
    for advisory in table.schema().advisories() {
        tracing::warn!("{}", advisory.message);
    }
    let report = SchemaReport::new(table.schema());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.schema {
        match args.format {
            OutputFormat::Json => print_json(
                &mut out,
                &DumpOutput {
                    schema: report,
                    rows: None,
                },
            )?,
            OutputFormat::Text => write_schema_text(&mut out, &report)?,
        }
        return Ok(out.flush()?);
    }

    let spec = build_query(&args, table.name(), table.schema())?;
    let catalog = Catalog::new().with_table(table);
    let query = spec.bind(&catalog).context("invalid query")?;
    let names = query.column_names();
    let cursor = query
        .execute(&EvalContext::default())
        .context("start query")?;
    let limit = args.limit.unwrap_or(usize::MAX);

    match args.format {
        OutputFormat::Text => {
            writeln!(out, "{}", names.join("\t"))?;
            let mut count = 0usize;
            for row in cursor.take(limit) {
                let row = row.context("read row")?;
                writeln!(out, "{}", format_text_row(&row))?;
                count += 1;
            }
            tracing::info!("{count} row(s)");
        }
        OutputFormat::Json => {
            let mut rows = Vec::new();
            for row in cursor.take(limit) {
                rows.push(row_to_json(&names, &row.context("read row")?));
            }
            tracing::info!("{} row(s)", rows.len());
            print_json(
                &mut out,
                &DumpOutput {
                    schema: report,
                    rows: Some(rows),
                },
            )?;
        }
    }
    Ok(out.flush()?)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pdx_dump=debug,paradox_format=debug,paradox_query=debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();
}

fn open_options(encoding: Option<&str>) -> Result<OpenOptions> {
    let options = OpenOptions::default();
    match encoding {
        Some(label) => {
            let encoding = Encoding::for_label(label.as_bytes())
                .ok_or_else(|| anyhow!("unknown encoding label {label:?}"))?;
            Ok(options.with_encoding(encoding))
        }
        None => Ok(options),
    }
}

fn build_query(args: &Args, table: &str, schema: &TableSchema) -> Result<QuerySpec> {
    let mut spec = QuerySpec::from_table(TableRef::new(table));
    if args.columns.is_empty() {
        for field in schema.fields() {
            spec = spec.select(Expr::column(field.name.as_str()));
        }
    } else {
        for column in &args.columns {
            spec = spec.select(Expr::column(column.trim()));
        }
    }
    if let Some(condition) = &args.where_like {
        let (column, pattern) = parse_like(condition)?;
        spec = spec.filter(Predicate::like(Expr::column(column), pattern));
    }
    if args.distinct {
        spec = spec.distinct();
    }
    Ok(spec)
}

fn parse_like(condition: &str) -> Result<(&str, &str)> {
    let (column, pattern) = condition
        .split_once('=')
        .ok_or_else(|| anyhow!("expected COLUMN=PATTERN, got {condition:?}"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(anyhow!("missing column name in {condition:?}"));
    }
    Ok((column, pattern))
}

fn write_schema_text(out: &mut impl Write, report: &SchemaReport) -> Result<()> {
    writeln!(
        out,
        "table {} (version {:#x}, {} rows, {}-byte records, {}-byte blocks, {})",
        report.table,
        report.version,
        report.row_count,
        report.record_size,
        report.block_size,
        report.encoding
    )?;
    for field in &report.fields {
        writeln!(
            out,
            "  {}\t{}({})\t{}",
            field.name, field.field_type, field.size, field.kind
        )?;
    }
    for advisory in &report.advisories {
        writeln!(out, "note: {advisory}")?;
    }
    Ok(())
}

fn format_text_row(row: &Row) -> String {
    row.iter()
        .map(|value| match value {
            Value::Null => String::new(),
            Value::Text(text) => text.replace(['\t', '\n'], " "),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\t")
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Binary(bytes) => serde_json::Value::String(
            bytes.iter().map(|b| format!("{b:02x}")).collect::<String>(),
        ),
        // Decimals stay strings so no digits are lost.
        other => serde_json::Value::String(other.to_string()),
    }
}

fn row_to_json(names: &[String], row: &Row) -> serde_json::Map<String, serde_json::Value> {
    names
        .iter()
        .cloned()
        .zip(row.iter().map(value_to_json))
        .collect()
}

fn print_json(out: &mut impl Write, output: &DumpOutput) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, output).context("serialize output")?;
    writeln!(out)?;
    Ok(())
}

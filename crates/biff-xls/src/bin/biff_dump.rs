use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use biff_xls::{
    decode_workbook_with_options, Cell, CellValue, DecodeOptions, Dimensions, Range, Sheet,
    SheetVisibility, Workbook,
};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(about = "Dump the cells of a raw BIFF7/BIFF8 workbook stream.")]
struct Args {
    /// Raw `Workbook` stream (already extracted from the compound file).
    path: PathBuf,

    /// Only dump this sheet (0-based index or name).
    #[arg(long)]
    sheet: Option<String>,

    /// Include formula text for formula cells.
    #[arg(long)]
    formulas: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Maximum warnings kept per sheet.
    #[arg(long, default_value_t = biff_xls::DEFAULT_MAX_WARNINGS)]
    max_warnings: usize,

    /// Fail on the first corrupt record instead of skipping to the next substream.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct JsonCell<'a> {
    cell: String,
    #[serde(flatten)]
    data: &'a Cell,
    hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonSheet<'a> {
    name: &'a str,
    visibility: SheetVisibility,
    complete: bool,
    dimensions: Option<Dimensions>,
    merged: Vec<String>,
    cells: Vec<JsonCell<'a>>,
    warnings: &'a [String],
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    version: String,
    date_system: String,
    sheets: Vec<JsonSheet<'a>>,
    warnings: &'a [String],
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("read {}", args.path.display()))?;
    let options = DecodeOptions {
        max_warnings: args.max_warnings,
        recover_after_corruption: !args.strict,
        ..DecodeOptions::default()
    };
    let workbook = decode_workbook_with_options(&bytes, &options)
        .with_context(|| format!("decode {}", args.path.display()))?;

    let selected = select_sheets(&workbook, args.sheet.as_deref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => write_text(&mut out, &workbook, &selected, args.formulas)?,
        OutputFormat::Json => {
            let report = json_report(&workbook, &selected, args.formulas);
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn select_sheets(workbook: &Workbook, selector: Option<&str>) -> Result<Vec<usize>> {
    let Some(selector) = selector else {
        return Ok((0..workbook.sheets().len()).collect());
    };
    if let Ok(index) = selector.parse::<usize>() {
        if index < workbook.sheets().len() {
            return Ok(vec![index]);
        }
    }
    match workbook
        .sheets()
        .iter()
        .position(|sheet| sheet.name().eq_ignore_ascii_case(selector))
    {
        Some(index) => Ok(vec![index]),
        None => bail!("no sheet named `{selector}`"),
    }
}

fn formula(workbook: &Workbook, sheet: usize, cell: &Cell) -> Option<Result<String, String>> {
    workbook
        .formula_text(sheet, cell.coordinate())
        .map(|text| text.map_err(|err| err.to_string()))
}

fn display_value(value: &CellValue) -> String {
    match value {
        CellValue::Blank => String::new(),
        CellValue::Number(n) => n.to_string(),
        CellValue::Date {
            datetime: Some(datetime),
            ..
        } => datetime.to_string(),
        CellValue::Date { serial, .. } => serial.to_string(),
        CellValue::Text(text) => format!("{text:?}"),
        CellValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        CellValue::Error(err) => err.to_string(),
    }
}

fn write_text(
    out: &mut impl Write,
    workbook: &Workbook,
    selected: &[usize],
    formulas: bool,
) -> Result<()> {
    writeln!(
        out,
        "{} workbook, {:?} date system, {} shared strings",
        workbook.version(),
        workbook.date_system(),
        workbook.shared_strings().len()
    )?;
    for warning in workbook.warnings() {
        writeln!(out, "warning: {warning}")?;
    }
    for &index in selected {
        let Some(sheet) = workbook.sheet(index) else {
            continue;
        };
        write_sheet_header(out, sheet)?;
        for cell in sheet.cells() {
            let coord = cell.coordinate();
            write!(
                out,
                "  {:<8} {:<28} {}",
                coord.to_a1(),
                format!("{:?}", cell.cell_type),
                display_value(&cell.value)
            )?;
            if sheet.is_hidden(coord) {
                write!(out, " (hidden)")?;
            }
            if formulas {
                match formula(workbook, index, cell) {
                    Some(Ok(text)) => write!(out, "  ={text}")?,
                    Some(Err(err)) => write!(out, "  <formula unavailable: {err}>")?,
                    None => {}
                }
            }
            writeln!(out)?;
        }
        for warning in sheet.warnings() {
            writeln!(out, "  warning: {warning}")?;
        }
    }
    Ok(())
}

fn write_sheet_header(out: &mut impl Write, sheet: &Sheet) -> Result<()> {
    let (rows, cols) = sheet.extent();
    writeln!(
        out,
        "sheet `{}` ({:?}, {} rows x {} cols{})",
        sheet.name(),
        sheet.visibility(),
        rows,
        cols,
        if sheet.is_complete() { "" } else { ", truncated" }
    )?;
    if !sheet.merged_ranges().is_empty() {
        let merged: Vec<String> = sheet.merged_ranges().iter().map(Range::to_string).collect();
        writeln!(out, "  merged: {}", merged.join(", "))?;
    }
    Ok(())
}

fn json_report<'a>(workbook: &'a Workbook, selected: &[usize], formulas: bool) -> JsonReport<'a> {
    let sheets = selected
        .iter()
        .filter_map(|&index| workbook.sheet(index).map(|sheet| (index, sheet)))
        .map(|(index, sheet)| JsonSheet {
            name: sheet.name(),
            visibility: sheet.visibility(),
            complete: sheet.is_complete(),
            dimensions: sheet.dimensions(),
            merged: sheet.merged_ranges().iter().map(Range::to_string).collect(),
            cells: sheet
                .cells()
                .map(|cell| {
                    let (formula, formula_error) = match formulas
                        .then(|| formula(workbook, index, cell))
                        .flatten()
                    {
                        Some(Ok(text)) => (Some(text), None),
                        Some(Err(err)) => (None, Some(err)),
                        None => (None, None),
                    };
                    JsonCell {
                        cell: cell.coordinate().to_a1(),
                        data: cell,
                        hidden: sheet.is_hidden(cell.coordinate()),
                        formula,
                        formula_error,
                    }
                })
                .collect(),
            warnings: sheet.warnings(),
        })
        .collect();
    JsonReport {
        version: workbook.version().to_string(),
        date_system: format!("{:?}", workbook.date_system()),
        sheets,
        warnings: workbook.warnings(),
    }
}

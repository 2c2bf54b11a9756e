//! `objectform` builds an object form from a form model document, applies
//! field edits the way a user would (running the form script and its
//! `onchange` handlers), and prints the resulting form state.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use objectform::{
    DirectoryScriptSource, DocumentFormat, ExtractOptions, FormEnvironment, FormOptions,
    ObjectForm, ObjectFormInput, OutputDestination, OutputOptions, Situation, ValidationError,
    emit, parse_document_str, parse_form_model,
};

#[derive(Debug, Parser)]
#[command(
    name = "objectform",
    version,
    about = "Build object forms from form model documents and report their state"
)]
struct Cli {
    /// Form model spec: file path, inline payload, or "-" for stdin
    #[arg(short = 's', long = "schema", value_name = "SPEC")]
    schema: String,

    /// Object data spec (a filter list when searching): file path, inline payload, or "-"
    #[arg(short = 'd', long = "data", value_name = "SPEC")]
    data: Option<String>,

    /// Situation the form is built for
    #[arg(long = "situation", value_enum, default_value_t = SituationArg::Edit)]
    situation: SituationArg,

    /// Directory holding global scripts referenced through `uses`
    #[arg(long = "scripts", value_name = "DIR")]
    scripts: Option<PathBuf>,

    /// Do not run the form script
    #[arg(long = "no-scripts")]
    no_scripts: bool,

    /// Object id exposed to scripts as `scope.objectId`
    #[arg(long = "object-id", value_name = "ID")]
    object_id: Option<String>,

    /// Field edit applied after loading, as NAME=JSON (plain text is taken as a string)
    #[arg(long = "set", value_name = "NAME=JSON", action = ArgAction::Append)]
    edits: Vec<String>,

    /// Emit `null` for fields explicitly searched as "not set"
    #[arg(long = "include-not-set")]
    include_not_set: bool,

    /// Exit with an error when the form ends up invalid
    #[arg(long = "fail-invalid")]
    fail_invalid: bool,

    /// Output destinations ("-" writes to stdout). Accepts multiple values per flag use.
    #[arg(short = 'o', long = "output", value_name = "DEST", num_args = 1.., action = ArgAction::Append)]
    outputs: Vec<String>,

    /// Emit compact JSON/TOML rather than pretty formatting
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Overwrite output files even if they already exist
    #[arg(short = 'f', long = "force", short_alias = 'y', alias = "yes")]
    force: bool,

    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SituationArg {
    Create,
    Edit,
    Search,
}

impl From<SituationArg> for Situation {
    fn from(arg: SituationArg) -> Self {
        match arg {
            SituationArg::Create => Situation::Create,
            SituationArg::Edit => Situation::Edit,
            SituationArg::Search => Situation::Search,
        }
    }
}

#[derive(Debug)]
enum InputSource {
    File(PathBuf),
    Stdin,
}

/// What the command prints once the form has settled.
#[derive(Debug, Serialize)]
struct FormReport {
    situation: String,
    valid: bool,
    dirty: bool,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    errors: IndexMap<String, IndexMap<String, ValidationError>>,
    data: Value,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut diagnostics = DiagnosticCollector::default();

    if cli.schema == "-" && cli.data.as_deref() == Some("-") {
        diagnostics.push_input(
            "schema/data",
            "cannot read schema and data from stdin simultaneously; provide inline content or files",
        );
    }
    let schema_value = load_required_value(&cli.schema, "schema", &mut diagnostics);
    let data_value = cli
        .data
        .as_deref()
        .and_then(|spec| load_required_value(spec, "data", &mut diagnostics));
    let edits = parse_edits(&cli.edits, &mut diagnostics);
    let (output, output_paths) = build_output_options(&cli, &mut diagnostics);
    ensure_output_paths_available(&output_paths, cli.force, &mut diagnostics);

    diagnostics.into_result()?;

    let schema_value = schema_value.ok_or_else(|| eyre!("missing form model"))?;
    let model = parse_form_model(&schema_value)
        .map_err(Report::msg)
        .wrap_err("invalid form model")?;
    let situation = Situation::from(cli.situation);
    let data = data_value.unwrap_or_else(|| empty_data(situation));

    let mut input = ObjectFormInput::new(model, data, situation);
    if let Some(object_id) = cli.object_id.clone() {
        input = input.with_object_id(object_id);
    }
    let mut env = FormEnvironment::default();
    if let Some(dir) = cli.scripts.as_ref() {
        env = env.with_scripts(Rc::new(DirectoryScriptSource::new(dir.clone())));
    }
    let options = FormOptions::default().with_scripts_enabled(!cli.no_scripts);

    let mut form = ObjectForm::new(input, options, env);
    info!(
        %situation,
        controls = form.tree().controls().len(),
        scripted = form.scope().is_some(),
        "form built"
    );

    for (name, value) in edits {
        let changed = form
            .set_value(&name, value)
            .map_err(Report::msg)
            .wrap_err_with(|| format!("failed to set field '{name}'"))?;
        debug!(field = %name, changed, "applied edit");
    }

    let report = FormReport {
        situation: situation.to_string(),
        valid: form.is_valid(),
        dirty: form.is_dirty(),
        errors: form.errors(),
        data: form.extract_with(ExtractOptions {
            include_not_set: cli.include_not_set,
        }),
    };
    emit(&report, &output).map_err(Report::msg)?;

    if cli.fail_invalid && !report.valid {
        let fields: Vec<&str> = report.errors.keys().map(String::as_str).collect();
        return Err(eyre!("form is invalid: {}", fields.join(", ")));
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn empty_data(situation: Situation) -> Value {
    match situation {
        Situation::Search => Value::Array(Vec::new()),
        Situation::Create | Situation::Edit => Value::Object(Default::default()),
    }
}

fn parse_edits(raw: &[String], diagnostics: &mut DiagnosticCollector) -> Vec<(String, Value)> {
    raw.iter()
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                let value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                Some((name.trim().to_string(), value))
            }
            _ => {
                diagnostics.push_input("set", format!("expected NAME=JSON, got '{entry}'"));
                None
            }
        })
        .collect()
}

fn load_required_value(
    spec: &str,
    label: &str,
    diagnostics: &mut DiagnosticCollector,
) -> Option<Value> {
    let format = if spec == "-" {
        DocumentFormat::default()
    } else {
        DocumentFormat::from_extension(Path::new(spec)).unwrap_or_default()
    };
    match load_value(spec, format, label) {
        Ok(value) => Some(value),
        Err(err) => {
            diagnostics.push_input(label, format!("{err:#}"));
            None
        }
    }
}

fn load_value(spec: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    if spec == "-" {
        let contents = read_from_source(&InputSource::Stdin)?;
        return parse_contents(&contents, format, label);
    }
    if looks_inline(spec) {
        return parse_contents(spec, format, &format!("inline {label}"));
    }

    let path = PathBuf::from(spec);
    match read_from_source(&InputSource::File(path.clone())) {
        Ok(contents) => parse_contents(&contents, format, label),
        Err(err) => {
            if is_not_found(&err) {
                let inline_label = format!("inline {label}");
                return parse_contents(spec, format, &inline_label);
            }
            Err(err.wrap_err(format!("failed to load {label} from {}", path.display())))
        }
    }
}

/// JSON payloads are never file names.
fn looks_inline(spec: &str) -> bool {
    spec.trim_start().starts_with(['{', '['])
}

fn read_from_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .wrap_err("failed to read from stdin")?;
            Ok(buffer)
        }
        InputSource::File(path) => fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read file {}", path.display())),
    }
}

fn is_not_found(err: &Report) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
}

fn parse_contents(contents: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    match parse_document_str(contents, format) {
        Ok(value) => Ok(value),
        Err(primary) => {
            for candidate in DocumentFormat::available_formats() {
                if candidate == format {
                    continue;
                }
                if let Ok(value) = parse_document_str(contents, candidate) {
                    return Ok(value);
                }
            }
            Err(Report::msg(format!(
                "failed to parse {label}: tried {} (first error: {primary})",
                format_list()
            )))
        }
    }
}

fn format_list() -> String {
    let items: Vec<String> = DocumentFormat::available_formats()
        .into_iter()
        .map(|fmt| fmt.to_string())
        .collect();
    items.join(", ")
}

#[derive(Default)]
struct DiagnosticCollector {
    messages: Vec<String>,
}

impl DiagnosticCollector {
    fn push_input(&mut self, label: &str, message: impl Into<String>) {
        self.messages
            .push(format!("input ({label}): {}", message.into()));
    }

    fn push_output(&mut self, message: impl Into<String>) {
        self.messages.push(format!("output: {}", message.into()));
    }

    fn len(&self) -> usize {
        self.messages.len()
    }

    fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let mut body = String::from("encountered input/output issues:\n");
        for (idx, msg) in self.messages.iter().enumerate() {
            let _ = writeln!(body, "  {}. {}", idx + 1, msg);
        }
        Err(eyre!(body))
    }
}

/// Stdout unless destinations are given; file extensions pick the format.
fn build_output_options(
    cli: &Cli,
    diagnostics: &mut DiagnosticCollector,
) -> (OutputOptions, Vec<PathBuf>) {
    let mut destinations = Vec::new();
    for raw in &cli.outputs {
        if raw.trim().is_empty() {
            diagnostics.push_output("output destination cannot be empty");
            continue;
        }
        if raw == "-" {
            destinations.push(OutputDestination::Stdout);
        } else {
            destinations.push(OutputDestination::file(raw));
        }
    }
    if destinations.is_empty() {
        destinations.push(OutputDestination::Stdout);
    }

    let file_paths: Vec<PathBuf> = destinations
        .iter()
        .filter_map(|dest| match dest {
            OutputDestination::File(path) => Some(path.clone()),
            OutputDestination::Stdout => None,
        })
        .collect();

    let format = infer_format_from_files(&file_paths, diagnostics).unwrap_or_default();
    (
        OutputOptions::new(format, destinations).with_pretty(!cli.no_pretty),
        file_paths,
    )
}

fn infer_format_from_files(
    file_paths: &[PathBuf],
    diagnostics: &mut DiagnosticCollector,
) -> Option<DocumentFormat> {
    let mut detected: Option<DocumentFormat> = None;
    for path in file_paths {
        match DocumentFormat::from_extension(path) {
            Some(format) => match detected {
                Some(existing) if existing != format => diagnostics.push_output(format!(
                    "output file {} uses {format} but other destinations use {existing}; align extensions",
                    path.display()
                )),
                Some(_) => {}
                None => detected = Some(format),
            },
            None => diagnostics.push_output(format!(
                "cannot infer format from output file {}; use one of {}",
                path.display(),
                format_list()
            )),
        }
    }
    detected
}

fn ensure_output_paths_available(
    paths: &[PathBuf],
    force: bool,
    diagnostics: &mut DiagnosticCollector,
) {
    if force {
        return;
    }
    for path in paths {
        if path.exists() {
            diagnostics.push_output(format!(
                "file {} already exists (pass --force to overwrite)",
                path.display()
            ));
        }
    }
}

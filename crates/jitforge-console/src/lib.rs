//! Colorful console output for engine events.
//!
//! Provides a custom `tracing` layer that formats jitforge events with colors.
//!
//! ## Log Levels
//!
//! - **INFO**: Lifecycle events (engine created, module submitted/linked)
//! - **WARN**: Modules that failed to compile or link, missing process symbols
//! - **DEBUG**: Per-function compilation, symbol resolution, memory protection
//! - **TRACE**: Individual relocations

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: OnceLock<()> = OnceLock::new();
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "jitforge=info";

/// Initializes console output for engine events.
///
/// Safe to call multiple times - only the first call has effect.
/// Honors `RUST_LOG`, defaulting to `jitforge=info`.
pub fn init() {
    INIT.get_or_init(|| {
        EPOCH.get_or_init(Instant::now);

        let filter = EnvFilter::builder()
            .with_default_directive(
                DEFAULT_DIRECTIVE
                    .parse()
                    .unwrap_or_else(|_| Level::INFO.into()),
            )
            .from_env_lossy();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(JitConsoleLayer)
            .try_init();
    });
}

fn elapsed_secs() -> f64 {
    EPOCH.get().map_or(0.0, |epoch| epoch.elapsed().as_secs_f64())
}

/// A tracing layer that formats engine events with colors.
pub struct JitConsoleLayer;

impl<S: Subscriber> Layer<S> for JitConsoleLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("jitforge") {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let output = format_event(&visitor, *metadata.level());
        if !output.is_empty() {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    event: Option<String>,
    module: Option<String>,
    namespace: Option<String>,
    name: Option<String>,
    function: Option<String>,
    symbol: Option<String>,
    kind: Option<String>,
    section: Option<String>,
    protection: Option<String>,
    error: Option<String>,
    triple: Option<String>,
    data_layout: Option<String>,
    functions: Option<u64>,
    data: Option<u64>,
    imports: Option<u64>,
    symbols: Option<u64>,
    memory_bytes: Option<u64>,
    code_bytes: Option<u64>,
    relocations: Option<u64>,
    bytes: Option<u64>,
    address: Option<u64>,
    at: Option<u64>,
    target: Option<u64>,
    process_symbols: Option<bool>,
}

impl EventVisitor {
    fn set_str(&mut self, name: &str, value: String) {
        let slot = match name {
            "event" => &mut self.event,
            "module" => &mut self.module,
            "namespace" => &mut self.namespace,
            "name" => &mut self.name,
            "function" => &mut self.function,
            "symbol" => &mut self.symbol,
            "kind" => &mut self.kind,
            "section" => &mut self.section,
            "protection" => &mut self.protection,
            "error" => &mut self.error,
            "triple" => &mut self.triple,
            "data_layout" => &mut self.data_layout,
            _ => return,
        };
        *slot = Some(value);
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        self.set_str(field.name(), s.trim_matches('"').to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "functions" => self.functions = Some(value),
            "data" => self.data = Some(value),
            "imports" => self.imports = Some(value),
            "symbols" => self.symbols = Some(value),
            "memory_bytes" => self.memory_bytes = Some(value),
            "code_bytes" => self.code_bytes = Some(value),
            "relocations" => self.relocations = Some(value),
            "bytes" => self.bytes = Some(value),
            "address" => self.address = Some(value),
            "at" => self.at = Some(value),
            "target" => self.target = Some(value),
            _ => {}
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_u64(field, value as u64);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "process_symbols" {
            self.process_symbols = Some(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set_str(field.name(), value.to_string());
    }
}

fn format_event(v: &EventVisitor, level: Level) -> String {
    let event = v.event.as_deref().unwrap_or("");

    match event {
        "engine_created" => format_engine_created(v),
        "process_symbols_unavailable" => format_process_symbols_unavailable(v),
        "module_submitted" => format_module_submitted(v),
        "namespace_created" => format_namespace_created(v),
        "function_compiled" => format_function_compiled(v),
        "symbol_resolved" => format_symbol_resolved(v),
        "memory_finalized" => format_memory_finalized(v),
        "relocation_applied" => format_relocation(v, level),
        "module_linked" => format_module_linked(v),
        "module_failed" => format_module_failed(v),
        _ => String::new(),
    }
}

fn format_elapsed() -> String {
    format!("{:>7.3}s", elapsed_secs())
        .bright_black()
        .to_string()
}

fn format_count(n: u64) -> String {
    n.to_formatted_string(&Locale::en)
}

fn format_address(address: u64) -> String {
    format!("{:#014x}", address)
}

fn format_engine_created(v: &EventVisitor) -> String {
    let triple = v.triple.as_deref().unwrap_or("unknown");
    let layout = v.data_layout.as_deref().unwrap_or("?");
    let process = if v.process_symbols.unwrap_or(false) {
        "process symbols".bright_green().to_string()
    } else {
        "no process symbols".yellow().to_string()
    };

    format!(
        "{} {} Engine │ {} │ {} │ {}",
        format_elapsed(),
        "▶".bright_green().bold(),
        triple.bright_white().bold(),
        layout.bright_black(),
        process
    )
}

fn format_process_symbols_unavailable(v: &EventVisitor) -> String {
    format!(
        "{} {} Process symbols unavailable │ {}",
        format_elapsed(),
        "!".yellow().bold(),
        v.error.as_deref().unwrap_or("unknown error").yellow(),
    )
}

fn format_module_submitted(v: &EventVisitor) -> String {
    let module = v.module.as_deref().unwrap_or("?");

    format!(
        "{} {} Submitted {} │ {} functions │ {} data │ {} imports",
        format_elapsed(),
        "→".bright_blue(),
        module.white().bold(),
        format_count(v.functions.unwrap_or(0)).bright_yellow(),
        format_count(v.data.unwrap_or(0)).bright_yellow(),
        format_count(v.imports.unwrap_or(0)).bright_yellow(),
    )
}

fn format_namespace_created(v: &EventVisitor) -> String {
    format!(
        "{} {} Namespace {} {}",
        format_elapsed(),
        "+".bright_blue(),
        v.namespace.as_deref().unwrap_or("?").bright_magenta(),
        v.name.as_deref().unwrap_or("").white()
    )
}

fn format_function_compiled(v: &EventVisitor) -> String {
    format!(
        "{}   {} {} │ {} bytes │ {} relocations",
        format_elapsed(),
        "ƒ".cyan(),
        v.function.as_deref().unwrap_or("?").white(),
        format_count(v.code_bytes.unwrap_or(0)).bright_yellow(),
        format_count(v.relocations.unwrap_or(0)).bright_yellow(),
    )
}

fn format_symbol_resolved(v: &EventVisitor) -> String {
    format!(
        "{}   {} {} → {}",
        format_elapsed(),
        "↳".cyan(),
        v.symbol.as_deref().unwrap_or("?").white(),
        format_address(v.address.unwrap_or(0)).bright_black()
    )
}

fn format_memory_finalized(v: &EventVisitor) -> String {
    format!(
        "{}   {} {} │ {} │ {} bytes",
        format_elapsed(),
        "▣".cyan(),
        v.section.as_deref().unwrap_or("?").white(),
        v.protection.as_deref().unwrap_or("?").bright_magenta(),
        format_count(v.bytes.unwrap_or(0)).bright_yellow(),
    )
}

fn format_relocation(v: &EventVisitor, level: Level) -> String {
    if level != Level::TRACE {
        return String::new();
    }

    format!(
        "{}     {} {} at {} → {}",
        format_elapsed(),
        "·".bright_black(),
        v.kind.as_deref().unwrap_or("?").bright_black(),
        format_address(v.at.unwrap_or(0)).bright_black(),
        format_address(v.target.unwrap_or(0)).bright_black()
    )
}

fn format_module_linked(v: &EventVisitor) -> String {
    format!(
        "{} {} Linked {} {} │ {} symbols │ {}",
        format_elapsed(),
        "✓".bright_green().bold(),
        v.namespace.as_deref().unwrap_or("?").bright_magenta(),
        v.module.as_deref().unwrap_or("?").white().bold(),
        format_count(v.symbols.unwrap_or(0)).bright_yellow(),
        format_bytes(v.memory_bytes.unwrap_or(0)).yellow(),
    )
}

fn format_module_failed(v: &EventVisitor) -> String {
    format!(
        "{} {} Failed {} {} │ {}",
        format_elapsed(),
        "✗".bright_red().bold(),
        v.namespace.as_deref().unwrap_or("?").bright_magenta(),
        v.module.as_deref().unwrap_or("?").white().bold(),
        v.error.as_deref().unwrap_or("unknown error").bright_red(),
    )
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}

//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Entity state, colored by what it usually means.
pub fn paint_state(state: &str, color: bool) -> String {
    if !color {
        return state.to_owned();
    }
    match state {
        "on" | "open" | "home" | "playing" | "unlocked" => state.green().to_string(),
        "off" | "closed" | "not_home" | "idle" | "locked" => state.bright_black().to_string(),
        "unavailable" | "unknown" => state.red().to_string(),
        _ => state.cyan().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of items in the chosen format.
///
/// - `table`: builds rows with `to_row` and renders them with `tabled`
/// - `json` / `json-compact` / `yaml`: serializes the original data
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
        structured => render_structured(structured, data),
    }
}

/// Render a single item. Table rendering uses `detail_fn`, since detail
/// views are key/value blocks rather than rows.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Plain => Ok(id_fn(data)),
        structured => render_structured(structured, data),
    }
}

/// Serialize as JSON or YAML; table and plain fall back to pretty JSON.
pub fn render_structured<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| CliError::Validation {
            field: "output".into(),
            reason: format!("cannot render YAML: {e}"),
        }),
        _ => Ok(serde_json::to_string_pretty(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        entity_id: &'static str,
        state: &'static str,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ENTITY")]
        entity_id: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                entity_id: "light.kitchen",
                state: "on",
            },
            Item {
                entity_id: "sun.sun",
                state: "above_horizon",
            },
        ]
    }

    fn row(item: &Item) -> ItemRow {
        ItemRow {
            entity_id: item.entity_id.into(),
        }
    }

    #[test]
    fn table_has_header_and_rows() {
        let out = render_list(OutputFormat::Table, &items(), row, |i| i.entity_id.into()).unwrap();
        assert!(out.contains("ENTITY"));
        assert!(out.contains("light.kitchen"));
        assert!(out.contains("sun.sun"));
    }

    #[test]
    fn plain_prints_one_id_per_line() {
        let out = render_list(OutputFormat::Plain, &items(), row, |i| i.entity_id.into()).unwrap();
        assert_eq!(out, "light.kitchen\nsun.sun");
    }

    #[test]
    fn structured_formats_serialize_the_data() {
        let out = render_list(OutputFormat::JsonCompact, &items(), row, |i| i.entity_id.into()).unwrap();
        assert_eq!(
            out,
            r#"[{"entity_id":"light.kitchen","state":"on"},{"entity_id":"sun.sun","state":"above_horizon"}]"#
        );

        let out = render_single(OutputFormat::Yaml, &items()[0], |_| String::new(), |_| String::new()).unwrap();
        assert!(out.contains("entity_id: light.kitchen"), "{out}");
    }

    #[test]
    fn colorless_state_is_untouched() {
        assert_eq!(paint_state("on", false), "on");
        assert_ne!(paint_state("on", true), "on");
    }
}
